//! The tracing engine.
//!
//! The tracer receives every runtime event, decides per event whether
//! execution continues or the owning thread suspends, and owns the global
//! stop condition. All shared debugger state lives in one [`ControlState`]
//! guarded by a single mutex; the paired condition variable is broadcast
//! whenever `stopped_by` changes or steps are begun or abandoned. A debuggee
//! thread suspends only inside a tracing callback, by waiting on that
//! condition; it holds no locks of its own while waiting.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, info};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::breakpoint::{
    Breakpoint, BreakpointStore, Condition, HitCondition, LogMessage, Triggered,
};
use crate::channel::EventSink;
use crate::dap_type;
use crate::event::{Event, StoppedReason};
use crate::exception::{ExceptionBreakMode, ExceptionInfo, ExceptionPolicy};
use crate::frame::{ContainerKey, ContainerRegistry, FrameArena};
use crate::ids::IdSource;
use crate::runtime::{
    CodeRef, EvalMode, ExceptionRef, FrameRef, RuntimeFacade, ScopeKind, ThreadRef, TraceAction,
    TraceSink, ValueRef,
};
use crate::source::Source;
use crate::step::StepKind;
use crate::step::StepTracker;
use crate::thread::ThreadRegistry;
use crate::Error;

/// Everything mutated under the control lock.
struct ControlState {
    /// The thread that owns the current stop. While `Some`, every traced
    /// thread that reaches a tracing callback must park itself.
    stopped_by: Option<i32>,
    threads: ThreadRegistry,
    frames: FrameArena,
    containers: ContainerRegistry,
    breakpoints: BreakpointStore,
    steps: StepTracker,
    exceptions: ExceptionPolicy,
    /// Set on disconnect: suppress new stops and release parked threads.
    detached: bool,
}

/// The central coordinator between the runtime's event stream and the DAP
/// dispatcher.
pub struct Tracer {
    runtime: Arc<dyn RuntimeFacade>,
    events: Arc<dyn EventSink>,
    ids: IdSource,
    control: Mutex<ControlState>,
    resumed: Condvar,
    /// Cached from the facade; consulted on every raise.
    control_flow_exceptions: HashSet<String>,
}

impl Tracer {
    pub fn new(
        runtime: Arc<dyn RuntimeFacade>,
        events: Arc<dyn EventSink>,
        ids: IdSource,
    ) -> Arc<Self> {
        let control_flow_exceptions = runtime.control_flow_exception_types();
        Arc::new(Tracer {
            control: Mutex::new(ControlState {
                stopped_by: None,
                threads: ThreadRegistry::new(ids.clone()),
                frames: FrameArena::new(),
                containers: ContainerRegistry::new(ids.clone()),
                breakpoints: BreakpointStore::new(),
                steps: StepTracker::new(),
                exceptions: ExceptionPolicy::new(),
                detached: false,
            }),
            resumed: Condvar::new(),
            runtime,
            events,
            ids,
            control_flow_exceptions,
        })
    }

    // ---- client-facing operations, called from the dispatcher ----

    /// Atomically replace the breakpoints of one source file. Returns the
    /// breakpoint descriptors in the order the specs were given.
    pub fn set_breakpoints(
        &self,
        path: &str,
        specs: &[dap_type::SourceBreakpoint],
    ) -> Vec<dap_type::Breakpoint> {
        let source = Source::resolve(&*self.runtime, path);
        let mut breakpoints = Vec::with_capacity(specs.len());
        let mut descriptors = Vec::with_capacity(specs.len());

        for spec in specs {
            let id = self.ids.next_id();
            let mut verified = true;
            let mut message = None;
            let mut note_failure = |text: String| {
                error!("breakpoint {} is unverified: {}", id, text);
                verified = false;
                message = Some(text);
            };

            let condition = match spec.condition.as_deref().filter(|c| !c.is_empty()) {
                Some(expression) => {
                    if let Err(diagnostic) = self.runtime.check_expression(expression) {
                        note_failure(format!("invalid condition: {}", diagnostic));
                    }
                    Some(Condition::new(expression))
                }
                None => None,
            };

            let hit_condition = match spec.hit_condition.as_deref().filter(|c| !c.is_empty()) {
                Some(text) => match text.parse::<HitCondition>() {
                    Ok(hit_condition) => Some(hit_condition),
                    Err(failure) => {
                        note_failure(failure);
                        None
                    }
                },
                None => None,
            };

            let log_message = match spec.log_message.as_deref().filter(|m| !m.is_empty()) {
                Some(template) => match LogMessage::parse(template) {
                    Ok(log_message) => {
                        for expression in log_message.expressions() {
                            if let Err(diagnostic) = self.runtime.check_expression(expression) {
                                note_failure(format!(
                                    "invalid log message expression {:?}: {}",
                                    expression, diagnostic
                                ));
                            }
                        }
                        Some(log_message)
                    }
                    Err(failure) => {
                        note_failure(failure);
                        None
                    }
                },
                None => None,
            };

            descriptors.push(dap_type::Breakpoint {
                id,
                verified,
                message: message.clone(),
                source: source.clone(),
                line: spec.line,
            });
            breakpoints.push(Breakpoint {
                id,
                source: source.clone(),
                line: spec.line,
                is_enabled: true,
                condition,
                hit_condition,
                log_message,
                hit_count: 0,
                verified,
                message,
            });
        }

        {
            let mut state = self.control.lock();
            state.breakpoints.replace(&source, breakpoints);
        }
        // Line events previously turned off for lack of breakpoints must be
        // re-armed.
        self.runtime.restart_events();
        info!("replaced breakpoints for {}", source);
        descriptors
    }

    /// Configure the exception policy from a setExceptionBreakpoints
    /// request. `exceptionOptions`, when present, replaces `filters`.
    pub fn set_exception_breakpoints(
        &self,
        filters: &[String],
        options: Option<Vec<dap_type::ExceptionOptions>>,
    ) {
        let mut state = self.control.lock();
        match options {
            Some(options) if !options.is_empty() => {
                let entries = options
                    .into_iter()
                    .map(|option| {
                        let names = option
                            .path
                            .as_ref()
                            .and_then(|path| path.last())
                            .map(|segment| segment.names.clone());
                        (names, ExceptionBreakMode::from_dap(&option.break_mode))
                    })
                    .collect();
                state.exceptions.set_overrides(entries);
            }
            _ => state.exceptions.set_filters(filters),
        }
    }

    /// The live threads known to the client, in id order.
    pub fn threads(&self) -> Vec<dap_type::Thread> {
        let state = self.control.lock();
        let mut threads: Vec<_> = state
            .threads
            .live()
            .map(|thread| dap_type::Thread {
                id: thread.external_id,
                name: thread.name.clone(),
            })
            .collect();
        threads.sort_by_key(|thread| thread.id);
        threads
    }

    /// The stack of a suspended thread, topmost frame first, internal frames
    /// skipped. Returns the requested window and the total frame count.
    pub fn stack_trace(
        &self,
        thread_id: i32,
        start_frame: Option<usize>,
        levels: Option<usize>,
    ) -> Result<(Vec<dap_type::StackFrame>, usize), Error> {
        let mut guard = self.control.lock();
        let state = &mut *guard;

        let thread = state
            .threads
            .get(thread_id)
            .ok_or_else(|| Error::request(format!("unknown thread id {}", thread_id)))?;
        let suspended = thread.suspended_frame.ok_or_else(|| {
            Error::request(format!("thread {} is not suspended", thread_id))
        })?;

        let mut described = Vec::new();
        for handle in self.runtime.walk_stack(suspended) {
            if self.runtime.is_internal_frame(handle) {
                continue;
            }
            let id = match state.frames.lookup(thread_id, handle) {
                Some(id) => id,
                None => {
                    let source =
                        Source::resolve(&*self.runtime, &self.runtime.frame_path(handle));
                    state.frames.insert(
                        thread_id,
                        handle,
                        source,
                        self.runtime.frame_line(handle),
                        self.runtime.frame_function(handle),
                    )
                }
            };
            described.push(state.frames.get(id).unwrap().describe());
        }

        let total = described.len();
        let start = start_frame.unwrap_or(0);
        let levels = levels.filter(|levels| *levels > 0).unwrap_or(usize::max_value());
        let window = described.into_iter().skip(start).take(levels).collect();
        Ok((window, total))
    }

    /// The local and global scopes of a frame, with lazily allocated
    /// variable container ids.
    pub fn scopes(&self, frame_id: i32) -> Result<Vec<dap_type::Scope>, Error> {
        let mut guard = self.control.lock();
        let state = &mut *guard;

        let frame = state.frames.get(frame_id).ok_or_else(|| {
            Error::request(format!("frame id {} is stale or unknown", frame_id))
        })?;
        let thread_id = frame.thread_id;

        let scopes = [
            (ScopeKind::Local, "Locals", "locals"),
            (ScopeKind::Global, "Globals", "globals"),
        ]
        .iter()
        .map(|(kind, name, hint)| {
            let reference = state
                .containers
                .intern(thread_id, ContainerKey::Scope { frame_id, kind: *kind });
            dap_type::Scope {
                name: name.to_string(),
                presentation_hint: hint.to_string(),
                variables_reference: reference,
                expensive: false,
            }
        })
        .collect();
        Ok(scopes)
    }

    /// One level of a variable tree. A stale or unknown reference is a
    /// failed request; a facade read failure is logged and reported as an
    /// empty result.
    pub fn variables(&self, reference: i32) -> Result<Vec<dap_type::Variable>, Error> {
        let mut guard = self.control.lock();
        let state = &mut *guard;

        let (thread_id, key) = state.containers.get(reference).ok_or_else(|| {
            Error::request(format!("unknown or stale variablesReference {}", reference))
        })?;

        let read = match key {
            ContainerKey::Scope { frame_id, kind } => {
                let frame = state.frames.get(frame_id).ok_or_else(|| {
                    Error::request(format!("frame id {} is stale or unknown", frame_id))
                })?;
                self.runtime.read_scope(frame.handle, kind)
            }
            ContainerKey::Children { value } => self.runtime.read_children(value),
        };

        let descriptors = match read {
            Ok(descriptors) => descriptors,
            Err(diagnostic) => {
                error!("reading variablesReference {} failed: {}", reference, diagnostic);
                return Ok(Vec::new());
            }
        };

        Ok(descriptors
            .into_iter()
            .map(|descriptor| describe_variable(state, thread_id, descriptor))
            .collect())
    }

    /// Assign a new value to a variable in a scope container and return its
    /// re-read descriptor.
    pub fn set_variable(
        &self,
        reference: i32,
        name: &str,
        value: &str,
    ) -> Result<dap_type::Variable, Error> {
        let mut guard = self.control.lock();
        let state = &mut *guard;

        let (thread_id, key) = state.containers.get(reference).ok_or_else(|| {
            Error::request(format!("unknown or stale variablesReference {}", reference))
        })?;
        let frame_id = match key {
            ContainerKey::Scope { frame_id, .. } => frame_id,
            ContainerKey::Children { .. } => {
                return Err(Error::request("only variables in a scope can be set"))
            }
        };
        let frame = state.frames.get(frame_id).ok_or_else(|| {
            Error::request(format!("frame id {} is stale or unknown", frame_id))
        })?;
        let handle = frame.handle;

        let assignment = format!("{} = {}", name, value);
        self.runtime
            .evaluate(handle, &assignment, EvalMode::Statement)
            .map_err(|diagnostic| Error::request(diagnostic.message))?;
        let descriptor = self
            .runtime
            .evaluate(handle, name, EvalMode::Expression)
            .map_err(|diagnostic| Error::request(diagnostic.message))?;
        Ok(describe_variable(state, thread_id, descriptor))
    }

    /// Evaluate an expression in a frame.
    pub fn evaluate(
        &self,
        frame_id: Option<i32>,
        expression: &str,
        context: Option<&str>,
    ) -> Result<dap_type::Variable, Error> {
        let mut guard = self.control.lock();
        let state = &mut *guard;

        let frame_id = frame_id
            .ok_or_else(|| Error::request("evaluation requires a stopped stack frame"))?;
        let frame = state.frames.get(frame_id).ok_or_else(|| {
            Error::request(format!("frame id {} is stale or unknown", frame_id))
        })?;
        let thread_id = frame.thread_id;
        let handle = frame.handle;

        let mode = match context {
            // Hovers must not cause side effects; the runtime suppresses
            // them as far as it is able to.
            Some("hover") => EvalMode::Hover,
            // The debug console accepts statements.
            Some("repl") => EvalMode::Statement,
            _ => EvalMode::Expression,
        };

        let descriptor = self
            .runtime
            .evaluate(handle, expression, mode)
            .map_err(|diagnostic| Error::request(diagnostic.message))?;
        Ok(describe_variable(state, thread_id, descriptor))
    }

    /// Stop all threads. The stop is nominally owned by the runtime's main
    /// thread, or any live traced thread if there is none.
    pub fn pause(&self) -> Result<(), Error> {
        let mut guard = self.control.lock();
        if guard.stopped_by.is_some() {
            return Err(Error::request("all threads are already stopped"));
        }

        let preferred = self
            .runtime
            .main_thread()
            .filter(|handle| !self.runtime.is_debugger_thread(*handle));
        if let Some(handle) = preferred {
            self.observe_thread(&mut guard, handle);
        }
        let owner = guard
            .threads
            .pick_traced(preferred)
            .map(|thread| thread.external_id)
            .ok_or_else(|| Error::request("no threads to pause"))?;

        info!("pausing all threads");
        self.begin_stop(
            &mut guard,
            owner,
            Event::stopped(StoppedReason::Pause, owner, Vec::new()),
        );
        Ok(())
    }

    /// Resume all threads, abandoning any pending steps.
    pub fn continue_all(&self) -> Result<(), Error> {
        let mut guard = self.control.lock();
        if guard.stopped_by.is_none() {
            return Err(Error::request("the debuggee is not stopped"));
        }
        info!("resuming all threads");
        guard.steps.abandon(None);
        self.end_stop(&mut guard);
        Ok(())
    }

    /// Begin a step on a thread and resume all threads. Only the stepping
    /// thread's completion matters; everything else just runs.
    pub fn step(&self, thread_id: i32, kind: StepKind) -> Result<(), Error> {
        {
            let mut guard = self.control.lock();
            if guard.stopped_by.is_none() {
                return Err(Error::request("the debuggee is not stopped"));
            }
            if guard.threads.get(thread_id).is_none() {
                return Err(Error::request(format!("unknown thread id {}", thread_id)));
            }
            info!("step {} on Thread({})", kind, thread_id);
            guard.steps.begin(thread_id, kind);
            self.end_stop(&mut guard);
        }
        self.runtime.restart_events();
        Ok(())
    }

    /// The exception details of a thread stopped with reason `exception`.
    pub fn exception_info(&self, thread_id: i32) -> Result<ExceptionInfo, Error> {
        let guard = self.control.lock();
        let thread = guard
            .threads
            .get(thread_id)
            .ok_or_else(|| Error::request(format!("unknown thread id {}", thread_id)))?;
        thread.current_exception.clone().ok_or_else(|| {
            Error::request(format!("thread {} is not stopped on an exception", thread_id))
        })
    }

    /// Tear down for disconnect: abandon steps, drop breakpoints, reset the
    /// exception policy, release any current stop and suppress future ones.
    pub fn detach(&self) {
        {
            let mut guard = self.control.lock();
            guard.detached = true;
            guard.breakpoints.clear(None);
            guard.steps.abandon(None);
            guard.exceptions.reset();
            guard.stopped_by = None;
            self.resumed.notify_all();
        }
        self.runtime.restart_events();
        info!("detached; debuggee released");
    }

    // ---- stop protocol ----

    /// Transition to stopped: publish the owner, wake parked threads so they
    /// can observe the stop, and tell the client. The caller parks the owner
    /// afterwards. Returns false when detached.
    fn begin_stop(&self, state: &mut ControlState, thread_id: i32, stopped: Event) -> bool {
        if state.detached {
            return false;
        }
        state.stopped_by = Some(thread_id);
        self.resumed.notify_all();
        // Other threads may have had their line events disabled; re-arm them
        // so they park at the next opportunity.
        self.runtime.restart_events();
        info!("stopped by Thread({})", thread_id);
        self.events.send_event(stopped);
        true
    }

    fn end_stop(&self, state: &mut ControlState) {
        if let Some(owner) = state.stopped_by.take() {
            self.resumed.notify_all();
            if !state.detached {
                self.events.send_event(Event::continued(owner));
            }
        }
    }

    /// Park the calling debuggee thread until the current stop ends. Frames
    /// materialized for this thread die here, and a step requested during
    /// the stop captures its origin here.
    fn park(&self, guard: &mut MutexGuard<'_, ControlState>, thread_id: i32, frame: FrameRef) {
        if guard.stopped_by.is_none() || guard.detached {
            return;
        }
        info!("Thread({}) suspended", thread_id);
        if let Some(thread) = guard.threads.get_mut(thread_id) {
            thread.suspended_frame = Some(frame);
        }
        while guard.stopped_by.is_some() && !guard.detached {
            self.resumed.wait(guard);
        }
        if let Some(thread) = guard.threads.get_mut(thread_id) {
            thread.suspended_frame = None;
        }
        info!("Thread({}) resumed", thread_id);
        guard.frames.invalidate_thread(thread_id);
        guard.containers.invalidate_thread(thread_id);

        // A step requested while this thread was parked starts now, from the
        // frame and line it was parked at.
        let line = self.runtime.frame_line(frame);
        if let Some(step) = guard.steps.get_mut(thread_id) {
            if !step.in_effect() {
                step.capture_origin(frame, line);
                debug!("Thread({}) starts {} at line {}", thread_id, step, line);
            }
        }
    }

    /// The registry entry for the calling thread: `(external id, is_traced)`.
    /// `None` during interpreter shutdown. Emits the started event for
    /// threads observed for the first time.
    fn observe_current_thread(&self, state: &mut ControlState) -> Option<(i32, bool)> {
        let handle = self.runtime.current_thread()?;
        Some(self.observe_thread(state, handle))
    }

    fn observe_thread(&self, state: &mut ControlState, handle: ThreadRef) -> (i32, bool) {
        let (thread, newly_known) = state.threads.from_runtime(&*self.runtime, handle);
        let id = thread.external_id;
        let traced = thread.is_traced;
        if newly_known {
            self.events.send_event(Event::thread_started(id));
        }
        (id, traced)
    }

    fn capture_exception(
        &self,
        exception: ExceptionRef,
        break_mode: ExceptionBreakMode,
        fallback_frame: Option<FrameRef>,
    ) -> ExceptionInfo {
        let mut frames = self.runtime.exception_traceback(exception);
        if frames.is_empty() {
            if let Some(frame) = fallback_frame {
                frames = self.runtime.walk_stack(frame);
            }
        }

        let mut stack_trace = String::new();
        let mut source = None;
        for (index, frame) in frames.iter().enumerate() {
            let path = self.runtime.frame_path(*frame);
            if index == 0 {
                source = Some(Source::resolve(&*self.runtime, &path));
            }
            stack_trace.push_str(&format!(
                "{} ({}:{})\n",
                self.runtime.frame_function(*frame),
                path,
                self.runtime.frame_line(*frame),
            ));
        }

        ExceptionInfo {
            type_name: self.runtime.exception_type_name(exception),
            description: self.runtime.exception_message(exception),
            stack_trace,
            source,
            break_mode,
        }
    }
}

/// Turn a facade descriptor into a DAP variable, interning a container for
/// its children if it has any.
fn describe_variable(
    state: &mut ControlState,
    thread_id: i32,
    descriptor: crate::runtime::VariableDescriptor,
) -> dap_type::Variable {
    let variables_reference = match descriptor.children {
        Some(value) => state
            .containers
            .intern(thread_id, ContainerKey::Children { value }),
        None => 0,
    };
    dap_type::Variable {
        name: descriptor.name,
        value: descriptor.value,
        type_name: descriptor.type_name,
        variables_reference,
    }
}

impl TraceSink for Tracer {
    /// The hot path: every line the debuggee executes lands here.
    fn line(&self, frame: FrameRef, code: CodeRef, line: u32) -> TraceAction {
        let mut guard = self.control.lock();
        let (thread_id, traced) = match self.observe_current_thread(&mut guard) {
            Some(entry) => entry,
            // Interpreter shutdown: leave everything alone.
            None => return TraceAction::Disable,
        };
        if !traced {
            return TraceAction::Disable;
        }
        debug!("LINE({}, {:?}) on Thread({})", line, code, thread_id);

        // A step that just completed stops the world before anything else is
        // considered at this line.
        if let Some(step) = guard.steps.get_mut(thread_id) {
            if !step.in_effect() {
                // The thread was never parked during the stop that requested
                // the step; its origin is this first line event.
                step.capture_origin(frame, line);
            }
        }
        if let Some(step) = guard.steps.get(thread_id) {
            if step.in_effect() && step.is_complete(&*self.runtime, frame, line) {
                info!("{} finished on Thread({})", step, thread_id);
                guard.steps.remove(thread_id);
                let stopped = Event::stopped(StoppedReason::Step, thread_id, Vec::new());
                if self.begin_stop(&mut guard, thread_id, stopped) {
                    self.park(&mut guard, thread_id, frame);
                }
                return TraceAction::Continue;
            }
        }

        // Another thread owns a stop: park here. Debugger-internal code on a
        // user thread keeps running, or it could deadlock the dispatcher.
        if guard.stopped_by.is_some() && guard.stopped_by != Some(thread_id) {
            if self.runtime.is_internal_frame(frame) {
                return TraceAction::Continue;
            }
            self.park(&mut guard, thread_id, frame);
            // Fall through: this line still gets its breakpoint evaluation.
        }

        let source = Source::resolve(&*self.runtime, &self.runtime.frame_path(frame));
        let stepping = guard.steps.is_pending(thread_id);

        if !guard.breakpoints.has_any_at(&source, line) {
            // An owner arriving here (pause) still has to park.
            if guard.stopped_by == Some(thread_id) {
                self.park(&mut guard, thread_id, frame);
                return TraceAction::Continue;
            }
            if stepping {
                return TraceAction::Continue;
            }
            // Nothing to do at this location until breakpoints change.
            return TraceAction::Disable;
        }

        let mut hit_breakpoint_ids = Vec::new();
        let mut log_outputs = Vec::new();
        for breakpoint in guard.breakpoints.at_mut(&source, line) {
            match breakpoint.is_triggered(&*self.runtime, frame, &source, line) {
                Triggered::No => {}
                Triggered::Log(text) => log_outputs.push(text),
                Triggered::Stop => hit_breakpoint_ids.push(breakpoint.id),
            }
        }
        for text in log_outputs {
            self.events
                .send_event(Event::console_output(text, Some(source.clone()), Some(line)));
        }

        if !hit_breakpoint_ids.is_empty() && guard.stopped_by.is_none() {
            info!(
                "Thread({}) hit breakpoints {:?} at {}:{}",
                thread_id, hit_breakpoint_ids, source, line
            );
            let stopped = Event::stopped(StoppedReason::Breakpoint, thread_id, hit_breakpoint_ids);
            self.begin_stop(&mut guard, thread_id, stopped);
        }
        if guard.stopped_by == Some(thread_id) {
            self.park(&mut guard, thread_id, frame);
        }
        TraceAction::Continue
    }

    fn function_start(&self, _frame: FrameRef, code: CodeRef) -> TraceAction {
        let mut guard = self.control.lock();
        match self.observe_current_thread(&mut guard) {
            Some((thread_id, true)) => {
                debug!("PY_START({:?}) on Thread({})", code, thread_id);
                TraceAction::Continue
            }
            _ => TraceAction::Disable,
        }
    }

    fn function_resume(&self, _frame: FrameRef, code: CodeRef) -> TraceAction {
        let mut guard = self.control.lock();
        match self.observe_current_thread(&mut guard) {
            Some((thread_id, true)) => {
                debug!("RESUME({:?}) on Thread({})", code, thread_id);
                TraceAction::Continue
            }
            _ => TraceAction::Disable,
        }
    }

    fn function_return(
        &self,
        _frame: FrameRef,
        code: CodeRef,
        _value: Option<ValueRef>,
    ) -> TraceAction {
        let mut guard = self.control.lock();
        match self.observe_current_thread(&mut guard) {
            Some((thread_id, true)) => {
                debug!("RETURN({:?}) on Thread({})", code, thread_id);
                TraceAction::Continue
            }
            _ => TraceAction::Disable,
        }
    }

    fn function_yield(
        &self,
        _frame: FrameRef,
        code: CodeRef,
        _value: Option<ValueRef>,
    ) -> TraceAction {
        let mut guard = self.control.lock();
        match self.observe_current_thread(&mut guard) {
            Some((thread_id, true)) => {
                debug!("YIELD({:?}) on Thread({})", code, thread_id);
                TraceAction::Continue
            }
            _ => TraceAction::Disable,
        }
    }

    fn raised(&self, frame: FrameRef, exception: ExceptionRef) {
        let type_name = self.runtime.exception_type_name(exception);
        if self.control_flow_exceptions.contains(&type_name) {
            return;
        }
        let mut guard = self.control.lock();
        let (thread_id, traced) = match self.observe_current_thread(&mut guard) {
            Some(entry) => entry,
            None => return,
        };
        if !traced {
            return;
        }
        debug!("RAISE({}) on Thread({})", type_name, thread_id);

        if guard.exceptions.effective_mode(&type_name) != ExceptionBreakMode::Always {
            return;
        }

        let info = self.capture_exception(exception, ExceptionBreakMode::Always, Some(frame));
        if let Some(thread) = guard.threads.get_mut(thread_id) {
            thread.current_exception = Some(info);
        }
        let stopped = Event::stopped_on_exception(thread_id, type_name);
        if self.begin_stop(&mut guard, thread_id, stopped) {
            self.park(&mut guard, thread_id, frame);
        }
        if let Some(thread) = guard.threads.get_mut(thread_id) {
            thread.current_exception = None;
        }
    }

    fn reraised(&self, _frame: FrameRef, exception: ExceptionRef) {
        let type_name = self.runtime.exception_type_name(exception);
        if self.control_flow_exceptions.contains(&type_name) {
            return;
        }
        // A reraise of an exception already reported at its raise site never
        // produces a second stop.
        debug!("RERAISE({})", type_name);
    }

    fn unwound(&self, _frame: FrameRef, exception: ExceptionRef) {
        debug!("UNWIND({})", self.runtime.exception_type_name(exception));
    }

    fn exception_handled(&self, _frame: FrameRef, exception: ExceptionRef) {
        debug!(
            "EXCEPTION_HANDLED({})",
            self.runtime.exception_type_name(exception)
        );
    }

    /// The unhandled hook: the exception is about to take down its thread.
    /// The normal stack has already unwound, so the stack is recovered from
    /// the exception's traceback.
    fn unhandled(&self, exception: ExceptionRef) {
        let type_name = self.runtime.exception_type_name(exception);
        let mut guard = self.control.lock();
        let (thread_id, traced) = match self.observe_current_thread(&mut guard) {
            Some(entry) => entry,
            None => return,
        };
        if !traced {
            return;
        }
        debug!("UNHANDLED({}) on Thread({})", type_name, thread_id);

        let mode = guard.exceptions.effective_mode(&type_name);
        let traceback = self.runtime.exception_traceback(exception);
        let origin = traceback.first().copied();
        let stop = match mode {
            ExceptionBreakMode::Unhandled => true,
            // Only exceptions originating in user code are interesting.
            ExceptionBreakMode::UserUnhandled => {
                origin.map_or(false, |frame| !self.runtime.is_internal_frame(frame))
            }
            _ => false,
        };
        if !stop {
            return;
        }
        let park_frame = match origin {
            Some(frame) => frame,
            None => {
                error!("unhandled {} has no traceback; not stopping", type_name);
                return;
            }
        };

        let info = self.capture_exception(exception, mode, None);
        if let Some(thread) = guard.threads.get_mut(thread_id) {
            thread.current_exception = Some(info);
        }
        info!("unhandled {} on Thread({})", type_name, thread_id);
        let stopped = Event::stopped_on_exception(thread_id, type_name);
        if self.begin_stop(&mut guard, thread_id, stopped) {
            self.park(&mut guard, thread_id, park_frame);
        }
        if let Some(thread) = guard.threads.get_mut(thread_id) {
            thread.current_exception = None;
        }
    }

    fn thread_exited(&self, handle: ThreadRef) {
        let mut guard = self.control.lock();
        if let Some(thread) = guard.threads.remove(handle) {
            let thread_id = thread.external_id;
            info!("{} exited", thread);
            guard.steps.abandon(Some(&[thread_id]));
            guard.frames.invalidate_thread(thread_id);
            guard.containers.invalidate_thread(thread_id);
            if guard.stopped_by == Some(thread_id) {
                // The stop owner is gone; release the other threads.
                self.end_stop(&mut guard);
            }
            if thread.is_known_to_client {
                self.events.send_event(Event::thread_exited(thread_id));
            }
        }
    }
}
