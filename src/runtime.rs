//! The seam between the debugger core and the language runtime.
//!
//! The core never touches interpreter internals directly. A per-runtime shim
//! implements [`RuntimeFacade`] and forwards execution events to the
//! [`TraceSink`] it was given (the tracer). All handle types are opaque
//! tokens minted by the shim; the core only stores, compares and passes them
//! back.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Opaque reference to a runtime thread. The inner value is the runtime's
/// native thread id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadRef(pub u64);

/// Opaque reference to a live stack frame. Only valid while the owning
/// thread is suspended or inside the tracing callback that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRef(pub u64);

/// Opaque reference to a code object (the unit the runtime can disable
/// tracing callbacks for).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRef(pub u64);

/// Opaque reference to a runtime value with children of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueRef(pub u64);

/// Opaque reference to an in-flight exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionRef(pub u64);

/// Hint returned from hot tracing callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceAction {
    /// Keep delivering this event.
    Continue,
    /// Stop delivering this event kind for the current code location until
    /// [`RuntimeFacade::restart_events`] is called.
    Disable,
}

/// How [`RuntimeFacade::evaluate`] should treat the given text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Evaluate an expression and produce its value.
    Expression,
    /// Execute one or more statements; the produced value may be empty.
    Statement,
    /// Like `Expression`, but the runtime should suppress side effects if it
    /// can. Shims that cannot tell the difference may treat this as
    /// `Expression`.
    Hover,
}

/// Which scope of a frame to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Local,
    Global,
}

/// A failure reported by the runtime for an evaluate/read operation.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct Diagnostic {
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
        }
    }
}

/// One variable as enumerated from a scope or a compound value.
#[derive(Debug, Clone)]
pub struct VariableDescriptor {
    pub name: String,
    /// Display rendering of the value.
    pub value: String,
    pub type_name: Option<String>,
    /// Present when the value is compound; pass it to
    /// [`RuntimeFacade::read_children`] to enumerate one more level.
    pub children: Option<ValueRef>,
}

impl fmt::Display for VariableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// Receiver of runtime execution events. Implemented by the tracer; invoked
/// by the shim from whichever debuggee thread the event occurred on.
///
/// Hot callbacks return a [`TraceAction`] so the shim can stop delivering an
/// event kind for a code location the debugger has no interest in.
pub trait TraceSink: Send + Sync {
    /// A new line was reached. The hot path.
    fn line(&self, frame: FrameRef, code: CodeRef, line: u32) -> TraceAction;
    /// A function was entered.
    fn function_start(&self, frame: FrameRef, code: CodeRef) -> TraceAction;
    /// A generator or coroutine resumed.
    fn function_resume(&self, frame: FrameRef, code: CodeRef) -> TraceAction;
    /// A function returned.
    fn function_return(&self, frame: FrameRef, code: CodeRef, value: Option<ValueRef>)
        -> TraceAction;
    /// A generator or coroutine yielded.
    fn function_yield(&self, frame: FrameRef, code: CodeRef, value: Option<ValueRef>)
        -> TraceAction;
    /// An exception was raised.
    fn raised(&self, frame: FrameRef, exception: ExceptionRef);
    /// An exception was re-raised while unwinding.
    fn reraised(&self, frame: FrameRef, exception: ExceptionRef);
    /// An exception is unwinding out of a frame.
    fn unwound(&self, frame: FrameRef, exception: ExceptionRef);
    /// An exception was caught by a handler.
    fn exception_handled(&self, frame: FrameRef, exception: ExceptionRef);
    /// An exception is about to propagate out of the top frame.
    fn unhandled(&self, exception: ExceptionRef);
    /// A runtime thread ended.
    fn thread_exited(&self, thread: ThreadRef);
}

/// Abstract interface to the language runtime.
///
/// Everything the core needs from the interpreter: event registration,
/// thread and frame inspection, expression evaluation and path rules.
/// Implementations must be callable from any debuggee thread and must
/// release interpreter-internal locks before delivering events, so that a
/// thread parked inside a callback cannot deadlock the dispatcher.
pub trait RuntimeFacade: Send + Sync {
    /// Register the receiver for tracing callbacks.
    fn install(&self, sink: Arc<dyn TraceSink>);

    /// The thread the caller is running on. `None` during interpreter
    /// shutdown, when thread identity is no longer meaningful.
    fn current_thread(&self) -> Option<ThreadRef>;

    /// The designated main thread, if the runtime has one.
    fn main_thread(&self) -> Option<ThreadRef>;

    fn thread_name(&self, thread: ThreadRef) -> String;

    /// Whether the thread belongs to the debugger itself. Such threads are
    /// never traced and never surfaced to the client.
    fn is_debugger_thread(&self, thread: ThreadRef) -> bool;

    /// The stack starting at `frame` and walking toward callers.
    fn walk_stack(&self, frame: FrameRef) -> Vec<FrameRef>;

    /// The raw, unnormalized path of the frame's code.
    fn frame_path(&self, frame: FrameRef) -> String;

    fn frame_line(&self, frame: FrameRef) -> u32;

    fn frame_function(&self, frame: FrameRef) -> String;

    /// Whether the frame executes debugger or runtime-internal code that
    /// must stay hidden from the client.
    fn is_internal_frame(&self, frame: FrameRef) -> bool;

    /// Evaluate `text` in the context of `frame`.
    fn evaluate(
        &self,
        frame: FrameRef,
        text: &str,
        mode: EvalMode,
    ) -> Result<VariableDescriptor, Diagnostic>;

    /// Check that `text` is a compilable expression without running it.
    fn check_expression(&self, text: &str) -> Result<(), Diagnostic>;

    fn read_scope(
        &self,
        frame: FrameRef,
        kind: ScopeKind,
    ) -> Result<Vec<VariableDescriptor>, Diagnostic>;

    fn read_children(&self, value: ValueRef) -> Result<Vec<VariableDescriptor>, Diagnostic>;

    fn exception_type_name(&self, exception: ExceptionRef) -> String;

    fn exception_message(&self, exception: ExceptionRef) -> String;

    /// The frames the exception travelled through, raise site first. Used to
    /// rebuild a stack trace at the unhandled hook, where the real stack has
    /// already unwound.
    fn exception_traceback(&self, exception: ExceptionRef) -> Vec<FrameRef>;

    /// Exception types the runtime uses for normal control flow (iterator
    /// end, generator exit). Never reported as user-visible raises.
    fn control_flow_exception_types(&self) -> HashSet<String>;

    /// Resolve a path to the canonical form used for source comparison.
    fn normalize_source_path(&self, raw: &str) -> String;

    /// Re-arm event kinds previously turned off with [`TraceAction::Disable`].
    /// Called whenever breakpoints change or a step begins.
    fn restart_events(&self);
}
