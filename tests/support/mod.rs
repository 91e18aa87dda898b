//! Test harness: a scripted in-memory runtime standing in for a real
//! interpreter, a recording event sink standing in for the client channel,
//! and a driver that runs debuggee scripts on their own threads.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use newt_dap::channel::EventSink;
use newt_dap::event::Event;
use newt_dap::runtime::{
    CodeRef, Diagnostic, EvalMode, ExceptionRef, FrameRef, RuntimeFacade, ScopeKind, ThreadRef,
    TraceAction, TraceSink, ValueRef, VariableDescriptor,
};
use newt_dap::tracer::Tracer;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---- recording sink ----

/// Captures events the way the wire channel would, and lets the test thread
/// block until an expected event arrives.
pub struct RecordingSink {
    inner: Mutex<SinkState>,
    arrived: Condvar,
}

#[derive(Default)]
struct SinkState {
    events: Vec<Event>,
    /// Per-event-name scan positions for `wait_for`.
    cursors: HashMap<&'static str, usize>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSink {
            inner: Mutex::new(SinkState::default()),
            arrived: Condvar::new(),
        })
    }

    /// Every event seen so far.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().events.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    /// Block until the next not-yet-consumed event with the given name.
    pub fn wait_for(&self, name: &'static str) -> Event {
        let deadline = Instant::now() + WAIT_LIMIT;
        let mut inner = self.inner.lock();
        loop {
            let cursor = inner.cursors.get(name).copied().unwrap_or(0);
            let found = inner.events[cursor..]
                .iter()
                .position(|event| event.name() == name)
                .map(|offset| cursor + offset);
            if let Some(index) = found {
                inner.cursors.insert(name, index + 1);
                return inner.events[index].clone();
            }
            let timeout = deadline.saturating_duration_since(Instant::now());
            if timeout.is_zero()
                || self.arrived.wait_for(&mut inner, timeout).timed_out()
            {
                panic!(
                    "timed out waiting for {:?} event; saw {:?}",
                    name,
                    inner
                        .events
                        .iter()
                        .map(|event| event.name())
                        .collect::<Vec<_>>()
                );
            }
        }
    }
}

impl EventSink for RecordingSink {
    fn send_event(&self, event: Event) {
        self.inner.lock().events.push(event);
        self.arrived.notify_all();
    }
}

// ---- the scripted runtime ----

struct FrameState {
    path: String,
    line: u32,
    function: String,
    internal: bool,
    parent: Option<u64>,
    locals: HashMap<String, String>,
    globals: HashMap<String, String>,
    compound: HashMap<String, u64>,
}

struct ExceptionState {
    type_name: String,
    message: String,
    /// Raise site first, toward callers.
    traceback: Vec<u64>,
}

#[derive(Default)]
struct RuntimeState {
    /// OS thread -> runtime thread handle.
    registered: HashMap<thread::ThreadId, u64>,
    names: HashMap<u64, String>,
    debugger_threads: HashSet<u64>,
    main: Option<u64>,
    frames: HashMap<u64, FrameState>,
    /// Per-thread stacks, topmost frame last.
    stacks: HashMap<u64, Vec<u64>>,
    exceptions: HashMap<u64, ExceptionState>,
    children: HashMap<u64, Vec<(String, String)>>,
    /// Locations the tracer turned line events off for.
    disabled_lines: HashSet<(u64, u32)>,
    restarts: usize,
}

/// An interpreter in miniature: threads, frames with variables, a toy
/// expression evaluator, exceptions with tracebacks, and the
/// disable/restart contract for line events.
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
    next_id: AtomicU64,
    sink: Mutex<Option<Arc<dyn TraceSink>>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRuntime {
            state: Mutex::new(RuntimeState::default()),
            next_id: AtomicU64::new(100),
            sink: Mutex::new(None),
        })
    }

    fn fresh_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn sink(&self) -> Arc<dyn TraceSink> {
        self.sink.lock().clone().expect("no trace sink installed")
    }

    pub fn restart_count(&self) -> usize {
        self.state.lock().restarts
    }

    fn register_current(&self, handle: u64, name: &str, main: bool, debugger: bool) {
        let mut state = self.state.lock();
        state.registered.insert(thread::current().id(), handle);
        state.names.insert(handle, name.to_string());
        state.stacks.insert(handle, Vec::new());
        if main {
            state.main = Some(handle);
        }
        if debugger {
            state.debugger_threads.insert(handle);
        }
    }

    fn operand(frame: &FrameState, text: &str) -> Option<String> {
        let text = text.trim();
        if let Some(value) = frame.locals.get(text).or_else(|| frame.globals.get(text)) {
            return Some(value.clone());
        }
        if text.parse::<i64>().is_ok() {
            return Some(text.to_string());
        }
        let quoted = text.len() >= 2
            && ((text.starts_with('"') && text.ends_with('"'))
                || (text.starts_with('\'') && text.ends_with('\'')));
        if quoted {
            return Some(text[1..text.len() - 1].to_string());
        }
        None
    }

    fn type_of(value: &str) -> &'static str {
        if value.parse::<i64>().is_ok() {
            "int"
        } else if value == "True" || value == "False" {
            "bool"
        } else {
            "str"
        }
    }
}

impl RuntimeFacade for FakeRuntime {
    fn install(&self, sink: Arc<dyn TraceSink>) {
        *self.sink.lock() = Some(sink);
    }

    fn current_thread(&self) -> Option<ThreadRef> {
        self.state
            .lock()
            .registered
            .get(&thread::current().id())
            .map(|handle| ThreadRef(*handle))
    }

    fn main_thread(&self) -> Option<ThreadRef> {
        self.state.lock().main.map(ThreadRef)
    }

    fn thread_name(&self, thread: ThreadRef) -> String {
        self.state
            .lock()
            .names
            .get(&thread.0)
            .cloned()
            .unwrap_or_default()
    }

    fn is_debugger_thread(&self, thread: ThreadRef) -> bool {
        self.state.lock().debugger_threads.contains(&thread.0)
    }

    fn walk_stack(&self, frame: FrameRef) -> Vec<FrameRef> {
        let state = self.state.lock();
        let mut walk = Vec::new();
        let mut current = Some(frame.0);
        while let Some(id) = current {
            walk.push(FrameRef(id));
            current = state.frames.get(&id).and_then(|frame| frame.parent);
        }
        walk
    }

    fn frame_path(&self, frame: FrameRef) -> String {
        self.state.lock().frames[&frame.0].path.clone()
    }

    fn frame_line(&self, frame: FrameRef) -> u32 {
        self.state.lock().frames[&frame.0].line
    }

    fn frame_function(&self, frame: FrameRef) -> String {
        self.state.lock().frames[&frame.0].function.clone()
    }

    fn is_internal_frame(&self, frame: FrameRef) -> bool {
        self.state.lock().frames[&frame.0].internal
    }

    fn evaluate(
        &self,
        frame: FrameRef,
        text: &str,
        mode: EvalMode,
    ) -> Result<VariableDescriptor, Diagnostic> {
        let mut state = self.state.lock();
        let text = text.trim();

        // Assignment statements, for setVariable and the debug console.
        if mode == EvalMode::Statement && text.contains('=') && !text.contains("==") {
            let (name, value) = text.split_at(text.find('=').unwrap());
            let name = name.trim().to_string();
            let value = {
                let frame = &state.frames[&frame.0];
                Self::operand(frame, &value[1..])
                    .ok_or_else(|| Diagnostic::new(format!("cannot evaluate {:?}", text)))?
            };
            let frame = state.frames.get_mut(&frame.0).unwrap();
            frame.locals.insert(name.clone(), value.clone());
            return Ok(VariableDescriptor {
                name,
                value,
                type_name: None,
                children: None,
            });
        }

        let frame = &state.frames[&frame.0];
        if let Some(index) = text.find("==") {
            let (lhs, rhs) = text.split_at(index);
            let lhs = Self::operand(frame, lhs)
                .ok_or_else(|| Diagnostic::new(format!("name {:?} is not defined", lhs.trim())))?;
            let rhs = Self::operand(frame, &rhs[2..])
                .ok_or_else(|| Diagnostic::new(format!("name {:?} is not defined", rhs.trim())))?;
            let value = if lhs == rhs { "True" } else { "False" };
            return Ok(VariableDescriptor {
                name: text.to_string(),
                value: value.to_string(),
                type_name: Some("bool".to_string()),
                children: None,
            });
        }

        let value = Self::operand(frame, text)
            .ok_or_else(|| Diagnostic::new(format!("name {:?} is not defined", text)))?;
        Ok(VariableDescriptor {
            name: text.to_string(),
            value: value.clone(),
            type_name: Some(Self::type_of(&value).to_string()),
            children: frame.compound.get(text).map(|id| ValueRef(*id)),
        })
    }

    fn check_expression(&self, text: &str) -> Result<(), Diagnostic> {
        if text.trim().is_empty() || text.starts_with('!') {
            Err(Diagnostic::new(format!("invalid syntax: {:?}", text)))
        } else {
            Ok(())
        }
    }

    fn read_scope(
        &self,
        frame: FrameRef,
        kind: ScopeKind,
    ) -> Result<Vec<VariableDescriptor>, Diagnostic> {
        let state = self.state.lock();
        let frame = &state.frames[&frame.0];
        let variables = match kind {
            ScopeKind::Local => &frame.locals,
            ScopeKind::Global => &frame.globals,
        };
        let mut descriptors: Vec<VariableDescriptor> = variables
            .iter()
            .map(|(name, value)| VariableDescriptor {
                name: name.clone(),
                value: value.clone(),
                type_name: Some(Self::type_of(value).to_string()),
                children: frame.compound.get(name).map(|id| ValueRef(*id)),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }

    fn read_children(&self, value: ValueRef) -> Result<Vec<VariableDescriptor>, Diagnostic> {
        let state = self.state.lock();
        let children = state
            .children
            .get(&value.0)
            .ok_or_else(|| Diagnostic::new("value has no children"))?;
        Ok(children
            .iter()
            .map(|(name, value)| VariableDescriptor {
                name: name.clone(),
                value: value.clone(),
                type_name: Some(Self::type_of(value).to_string()),
                children: None,
            })
            .collect())
    }

    fn exception_type_name(&self, exception: ExceptionRef) -> String {
        self.state.lock().exceptions[&exception.0].type_name.clone()
    }

    fn exception_message(&self, exception: ExceptionRef) -> String {
        self.state.lock().exceptions[&exception.0].message.clone()
    }

    fn exception_traceback(&self, exception: ExceptionRef) -> Vec<FrameRef> {
        self.state.lock().exceptions[&exception.0]
            .traceback
            .iter()
            .map(|id| FrameRef(*id))
            .collect()
    }

    fn control_flow_exception_types(&self) -> HashSet<String> {
        let mut types = HashSet::new();
        types.insert("StopIteration".to_string());
        types.insert("GeneratorExit".to_string());
        types
    }

    fn normalize_source_path(&self, raw: &str) -> String {
        // Resolution in miniature: relative paths live under /work.
        if raw.starts_with('<') || raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/work/{}", raw)
        }
    }

    fn restart_events(&self) {
        let mut state = self.state.lock();
        state.disabled_lines.clear();
        state.restarts += 1;
    }
}

// ---- the debuggee driver ----

/// Handle to a running debuggee script.
pub struct Debuggee {
    join: JoinHandle<()>,
}

impl Debuggee {
    /// Run a script on its own thread, registered with the runtime under
    /// the given native thread id. The script's tracing callbacks will park
    /// the thread whenever the debugger stops the world.
    pub fn spawn<F>(
        runtime: &Arc<FakeRuntime>,
        native_id: u64,
        name: &str,
        main: bool,
        script: F,
    ) -> Debuggee
    where
        F: FnOnce(&ScriptCtx) + Send + 'static,
    {
        let runtime = runtime.clone();
        let name = name.to_string();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                runtime.register_current(native_id, &name, main, false);
                let ctx = ScriptCtx {
                    sink: runtime.sink(),
                    runtime,
                    thread: native_id,
                };
                script(&ctx);
                ctx.sink.thread_exited(ThreadRef(native_id));
            })
            .expect("failed to spawn debuggee thread");
        Debuggee { join }
    }

    /// Wait for the script to finish, propagating its panics.
    pub fn finish(self) {
        if self.join.join().is_err() {
            panic!("debuggee thread panicked");
        }
    }
}

/// The operations a debuggee script can perform. Every tracing callback is
/// invoked on the script's thread, exactly like a real runtime would.
pub struct ScriptCtx {
    runtime: Arc<FakeRuntime>,
    sink: Arc<dyn TraceSink>,
    thread: u64,
}

impl ScriptCtx {
    /// Enter a function: push a frame and deliver the start event.
    pub fn call(&self, path: &str, function: &str) -> u64 {
        self.call_frame(path, function, false)
    }

    /// Enter a debugger-internal or stdlib function.
    pub fn call_internal(&self, path: &str, function: &str) -> u64 {
        self.call_frame(path, function, true)
    }

    fn call_frame(&self, path: &str, function: &str, internal: bool) -> u64 {
        let id = self.runtime.fresh_id();
        {
            let mut state = self.runtime.state.lock();
            let parent = state.stacks[&self.thread].last().copied();
            state.frames.insert(
                id,
                FrameState {
                    path: path.to_string(),
                    line: 0,
                    function: function.to_string(),
                    internal,
                    parent,
                    locals: HashMap::new(),
                    globals: HashMap::new(),
                    compound: HashMap::new(),
                },
            );
            state.stacks.get_mut(&self.thread).unwrap().push(id);
        }
        let _ = self.sink.function_start(FrameRef(id), CodeRef(id));
        id
    }

    /// Return from the current function.
    pub fn ret(&self) {
        let top = {
            let mut state = self.runtime.state.lock();
            state.stacks.get_mut(&self.thread).unwrap().pop().unwrap()
        };
        let _ = self
            .sink
            .function_return(FrameRef(top), CodeRef(top), None);
    }

    fn top(&self) -> u64 {
        *self.runtime.state.lock().stacks[&self.thread]
            .last()
            .expect("script has no frame")
    }

    /// Execute one line: update the frame and deliver the line event,
    /// honoring locations the tracer disabled. This call blocks while the
    /// debugger has the world stopped.
    pub fn line(&self, line: u32) -> TraceAction {
        let top = self.top();
        {
            let mut state = self.runtime.state.lock();
            state.frames.get_mut(&top).unwrap().line = line;
            if state.disabled_lines.contains(&(top, line)) {
                return TraceAction::Disable;
            }
        }
        let action = self.sink.line(FrameRef(top), CodeRef(top), line);
        if action == TraceAction::Disable {
            self.runtime
                .state
                .lock()
                .disabled_lines
                .insert((top, line));
        }
        action
    }

    pub fn local(&self, name: &str) -> Option<String> {
        let top = self.top();
        self.runtime.state.lock().frames[&top].locals.get(name).cloned()
    }

    pub fn set_local(&self, name: &str, value: &str) {
        let top = self.top();
        let mut state = self.runtime.state.lock();
        state
            .frames
            .get_mut(&top)
            .unwrap()
            .locals
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_global(&self, name: &str, value: &str) {
        let top = self.top();
        let mut state = self.runtime.state.lock();
        state
            .frames
            .get_mut(&top)
            .unwrap()
            .globals
            .insert(name.to_string(), value.to_string());
    }

    /// A local whose value has one level of children.
    pub fn set_compound(&self, name: &str, rendered: &str, children: &[(&str, &str)]) {
        let value_id = self.runtime.fresh_id();
        let top = self.top();
        let mut state = self.runtime.state.lock();
        state.children.insert(
            value_id,
            children
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        );
        let frame = state.frames.get_mut(&top).unwrap();
        frame.locals.insert(name.to_string(), rendered.to_string());
        frame.compound.insert(name.to_string(), value_id);
    }

    /// Raise an exception in the current frame, capturing its traceback.
    pub fn raise(&self, type_name: &str, message: &str) -> u64 {
        let id = self.runtime.fresh_id();
        let top = self.top();
        {
            let mut state = self.runtime.state.lock();
            let mut traceback = Vec::new();
            let mut current = Some(top);
            while let Some(frame) = current {
                traceback.push(frame);
                current = state.frames[&frame].parent;
            }
            state.exceptions.insert(
                id,
                ExceptionState {
                    type_name: type_name.to_string(),
                    message: message.to_string(),
                    traceback,
                },
            );
        }
        self.sink.raised(FrameRef(top), ExceptionRef(id));
        id
    }

    /// Deliver the unhandled-exception hook for a previously raised
    /// exception, after the stack has unwound.
    pub fn unhandled(&self, exception: u64) {
        self.sink.unhandled(ExceptionRef(exception));
    }
}

// ---- polling helpers ----

/// Wait until a thread has actually parked (its stack becomes readable).
/// `stopped` is emitted before the owner finishes parking, so tests poll.
pub fn wait_suspended(tracer: &Arc<Tracer>, thread_id: i32) {
    let deadline = Instant::now() + WAIT_LIMIT;
    loop {
        match tracer.stack_trace(thread_id, None, None) {
            Ok(_) => return,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(2)),
            Err(err) => panic!("thread {} never suspended: {}", thread_id, err),
        }
    }
}

// ---- in-memory duplex pipe for wire-level tests ----

#[derive(Default)]
struct PipeState {
    buffer: VecDeque<u8>,
    closed: bool,
}

struct PipeShared {
    state: Mutex<PipeState>,
    readable: Condvar,
}

pub struct PipeWriter(Arc<PipeShared>);
pub struct PipeReader(Arc<PipeShared>);

/// A unidirectional in-memory byte pipe.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let shared = Arc::new(PipeShared {
        state: Mutex::new(PipeState::default()),
        readable: Condvar::new(),
    });
    (PipeWriter(shared.clone()), PipeReader(shared))
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.0.state.lock();
        state.buffer.extend(buf);
        self.0.readable.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.0.state.lock().closed = true;
        self.0.readable.notify_all();
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.0.state.lock();
        while state.buffer.is_empty() {
            if state.closed {
                return Ok(0);
            }
            self.0.readable.wait(&mut state);
        }
        let mut read = 0;
        while read < buf.len() {
            match state.buffer.pop_front() {
                Some(byte) => {
                    buf[read] = byte;
                    read += 1;
                }
                None => break,
            }
        }
        Ok(read)
    }
}
