//! Typed arguments for the requests this adapter handles, as specified by
//! the DAP standard. The documentation in this module is adapted from the
//! DAP specification, available
//! [here](https://microsoft.github.io/debug-adapter-protocol/specification).

use serde::Deserialize;
use serde_json::Value;

use crate::dap_type::{ExceptionOptions, SourceArgument, SourceBreakpoint};
use crate::Error;

/// A request command with its parsed arguments.
///
/// Commands this adapter does not implement are kept as `Unknown` so the
/// dispatcher can reject them with a proper error response instead of
/// dropping them on the floor.
#[derive(Debug, Clone)]
pub enum Command {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    Attach(AttachArguments),
    ConfigurationDone,
    Disconnect(Option<DisconnectArguments>),
    SetBreakpoints(SetBreakpointsArguments),
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    SetVariable(SetVariableArguments),
    Evaluate(EvaluateArguments),
    Pause(PauseArguments),
    Continue(ContinueArguments),
    Next(NextArguments),
    StepIn(StepInArguments),
    StepOut(StepOutArguments),
    ExceptionInfo(ExceptionInfoArguments),
    Source(SourceRequestArguments),
    Modules(ModulesArguments),
    Unknown { command: String },
}

fn parse<T: serde::de::DeserializeOwned>(arguments: Option<Value>) -> Result<T, Error> {
    let arguments = arguments.ok_or(Error::BadMessage)?;
    Ok(serde_json::from_value(arguments)?)
}

impl Command {
    /// Specialize a raw command name plus arguments value.
    pub fn parse(command: &str, arguments: Option<Value>) -> Result<Self, Error> {
        let command = match command {
            "initialize" => Command::Initialize(parse(arguments)?),
            "launch" => Command::Launch(parse(arguments)?),
            "attach" => Command::Attach(parse(arguments)?),
            "configurationDone" => Command::ConfigurationDone,
            "disconnect" => Command::Disconnect(match arguments {
                Some(value) => Some(serde_json::from_value(value)?),
                None => None,
            }),
            "setBreakpoints" => Command::SetBreakpoints(parse(arguments)?),
            "setExceptionBreakpoints" => Command::SetExceptionBreakpoints(parse(arguments)?),
            "threads" => Command::Threads,
            "stackTrace" => Command::StackTrace(parse(arguments)?),
            "scopes" => Command::Scopes(parse(arguments)?),
            "variables" => Command::Variables(parse(arguments)?),
            "setVariable" => Command::SetVariable(parse(arguments)?),
            "evaluate" => Command::Evaluate(parse(arguments)?),
            "pause" => Command::Pause(parse(arguments)?),
            "continue" => Command::Continue(parse(arguments)?),
            "next" => Command::Next(parse(arguments)?),
            "stepIn" => Command::StepIn(parse(arguments)?),
            "stepOut" => Command::StepOut(parse(arguments)?),
            "exceptionInfo" => Command::ExceptionInfo(parse(arguments)?),
            "source" => Command::Source(parse(arguments)?),
            "modules" => Command::Modules(match arguments {
                Some(value) => serde_json::from_value(value)?,
                None => ModulesArguments::default(),
            }),
            other => Command::Unknown {
                command: other.to_string(),
            },
        };
        Ok(command)
    }
}

/// Arguments for the 'initialize' request, sent as the first request from
/// the client in order to configure the adapter and exchange capabilities.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeArguments {
    /// The ID of the (frontend) client using this adapter.
    #[serde(rename = "clientID")]
    pub client_id: Option<String>,

    /// The human readable name of the (frontend) client using this adapter.
    #[serde(rename = "clientName")]
    pub client_name: Option<String>,

    /// The ID of the debug adapter.
    #[serde(rename = "adapterID")]
    pub adapter_id: String,

    /// If true all line numbers are 1-based (default).
    #[serde(rename = "linesStartAt1")]
    pub lines_start_at1: Option<bool>,

    /// If true all column numbers are 1-based (default).
    #[serde(rename = "columnsStartAt1")]
    pub columns_start_at1: Option<bool>,
}

/// This launch request is sent from the client to the debug adapter to start
/// the debuggee with or without debugging (if 'noDebug' is true).
///
/// Since launching is debugger/runtime specific, the arguments for this
/// request are not part of this specification.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchArguments {
    /// If noDebug is true the launch request should launch the program
    /// without enabling debugging.
    #[serde(rename = "noDebug")]
    pub no_debug: Option<bool>,
}

/// The attach request is sent from the client to the debug adapter to attach
/// to a debuggee that is already running.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AttachArguments {}

/// Arguments for the 'disconnect' request, sent in order to stop debugging.
#[derive(Debug, Clone, Deserialize)]
pub struct DisconnectArguments {
    /// A value of true indicates that this 'disconnect' request is part of a
    /// restart sequence.
    pub restart: Option<bool>,

    /// Indicates whether the debuggee should be terminated when the debugger
    /// is disconnected. If unspecified, the debug adapter is free to do
    /// whatever it thinks is best.
    #[serde(rename = "terminateDebuggee")]
    pub terminate_debuggee: Option<bool>,
}

/// Sets multiple breakpoints for a single source and clears all previous
/// breakpoints in that source. To clear all breakpoints for a source,
/// specify an empty array. When a breakpoint is hit, a 'stopped' event (with
/// reason 'breakpoint') is generated.
#[derive(Debug, Clone, Deserialize)]
pub struct SetBreakpointsArguments {
    /// The source location of the breakpoints; 'source.path' must be
    /// specified.
    pub source: SourceArgument,

    /// The code locations of the breakpoints.
    pub breakpoints: Option<Vec<SourceBreakpoint>>,

    /// Deprecated: The code locations of the breakpoints.
    pub lines: Option<Vec<u32>>,
}

/// The request configures the debugger's response to thrown exceptions.
/// If an exception is configured to break, a 'stopped' event is fired (with
/// reason 'exception').
#[derive(Debug, Clone, Deserialize)]
pub struct SetExceptionBreakpointsArguments {
    /// Set of exception filters specified by their ID. The set of all
    /// possible exception filters is defined by the
    /// 'exceptionBreakpointFilters' capability.
    pub filters: Vec<String>,

    /// Configuration options for selected exceptions. The attribute is only
    /// honored by a debug adapter if the capability 'supportsExceptionOptions'
    /// is true.
    #[serde(rename = "exceptionOptions")]
    pub exception_options: Option<Vec<ExceptionOptions>>,
}

/// The request returns a stacktrace from the current execution state of a
/// given thread.
#[derive(Debug, Clone, Deserialize)]
pub struct StackTraceArguments {
    /// Retrieve the stacktrace for this thread.
    #[serde(rename = "threadId")]
    pub thread_id: i32,

    /// The index of the first frame to return; if omitted frames start at 0.
    #[serde(rename = "startFrame")]
    pub start_frame: Option<usize>,

    /// The maximum number of frames to return. If levels is not specified or
    /// 0, all frames are returned.
    pub levels: Option<usize>,
}

/// The request returns the variable scopes for a given stackframe ID.
#[derive(Debug, Clone, Deserialize)]
pub struct ScopesArguments {
    /// Retrieve the scopes for this stackframe.
    #[serde(rename = "frameId")]
    pub frame_id: i32,
}

/// Retrieves all child variables for the given variable reference.
#[derive(Debug, Clone, Deserialize)]
pub struct VariablesArguments {
    /// The Variable reference.
    #[serde(rename = "variablesReference")]
    pub variables_reference: i32,
}

/// Set the variable with the given name in the variable container to a new
/// value. Clients should only call this request if the capability
/// 'supportsSetVariable' is true.
#[derive(Debug, Clone, Deserialize)]
pub struct SetVariableArguments {
    /// The reference of the variable container.
    #[serde(rename = "variablesReference")]
    pub variables_reference: i32,

    /// The name of the variable in the container.
    pub name: String,

    /// The value of the variable.
    pub value: String,
}

/// Evaluates the given expression in the context of the top most stack
/// frame. The expression has access to any variables and arguments that are
/// in scope.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateArguments {
    /// The expression to evaluate.
    pub expression: String,

    /// Evaluate the expression in the scope of this stack frame. If not
    /// specified, the expression is evaluated in the global scope.
    #[serde(rename = "frameId")]
    pub frame_id: Option<i32>,

    /// The context in which the evaluate request is run.
    /// Values: 'watch', 'repl', 'hover', etc.
    pub context: Option<String>,
}

/// The request suspends the debuggee. The debug adapter first sends the
/// response and then a 'stopped' event (with reason 'pause') after the
/// thread has been paused successfully.
#[derive(Debug, Clone, Deserialize)]
pub struct PauseArguments {
    /// Pause execution for this thread.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
}

/// The request starts the debuggee to run again.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinueArguments {
    /// Continue execution for the specified thread (if possible). If the
    /// backend cannot continue on a single thread but will continue on all
    /// threads, it should set the 'allThreadsContinued' attribute in the
    /// response to true.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
}

/// The request starts the debuggee to run again for one step. The debug
/// adapter first sends the response and then a 'stopped' event (with reason
/// 'step') after the step has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct NextArguments {
    /// Execute 'next' for this thread.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
}

/// The request starts the debuggee to step into a function/method if
/// possible. If it cannot step into a target, 'stepIn' behaves like 'next'.
#[derive(Debug, Clone, Deserialize)]
pub struct StepInArguments {
    /// Execute 'stepIn' for this thread.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
}

/// The request starts the debuggee to run again for one step, out of the
/// current function.
#[derive(Debug, Clone, Deserialize)]
pub struct StepOutArguments {
    /// Execute 'stepOut' for this thread.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
}

/// Retrieves the details of the exception that caused this event to be
/// raised. Clients should only call this request if the capability
/// 'supportsExceptionInfoRequest' is true.
#[derive(Debug, Clone, Deserialize)]
pub struct ExceptionInfoArguments {
    /// Thread for which exception information should be retrieved.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
}

/// The request retrieves the source code for a given source reference.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRequestArguments {
    /// Specifies the source content to load.
    pub source: Option<SourceArgument>,

    /// The reference to the source. This is the same as source.sourceReference.
    /// This is provided for backward compatibility since old backends do not
    /// understand the 'source' attribute.
    #[serde(rename = "sourceReference")]
    pub source_reference: Option<i32>,
}

/// Modules can be retrieved from the debug adapter with this request which
/// can either return all modules or a range of modules to support paging.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModulesArguments {
    /// The index of the first module to return; if omitted modules start at
    /// 0.
    #[serde(rename = "startModule")]
    pub start_module: Option<usize>,

    /// The number of modules to return. If moduleCount is not specified or
    /// 0, all modules are returned.
    #[serde(rename = "moduleCount")]
    pub module_count: Option<usize>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_set_breakpoints() {
        let arguments = serde_json::json!({
            "source": {"path": "/work/a.nt"},
            "breakpoints": [
                {"line": 10},
                {"line": 12, "condition": "i == 1"},
            ],
        });
        let command = Command::parse("setBreakpoints", Some(arguments)).unwrap();
        match command {
            Command::SetBreakpoints(arguments) => {
                assert_eq!(arguments.source.path.as_deref(), Some("/work/a.nt"));
                let breakpoints = arguments.breakpoints.unwrap();
                assert_eq!(breakpoints.len(), 2);
                assert_eq!(breakpoints[1].condition.as_deref(), Some("i == 1"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parse_requests_without_arguments() {
        match Command::parse("threads", None).unwrap() {
            Command::Threads => (),
            other => panic!("unexpected command: {:?}", other),
        }
        match Command::parse("disconnect", None).unwrap() {
            Command::Disconnect(None) => (),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parse_stack_trace_with_paging() {
        let arguments = serde_json::json!({"threadId": 1, "startFrame": 2, "levels": 3});
        match Command::parse("stackTrace", Some(arguments)).unwrap() {
            Command::StackTrace(arguments) => {
                assert_eq!(arguments.thread_id, 1);
                assert_eq!(arguments.start_frame, Some(2));
                assert_eq!(arguments.levels, Some(3));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_commands_are_kept() {
        match Command::parse("readMemory", None).unwrap() {
            Command::Unknown { command } => assert_eq!(command, "readMemory"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn missing_arguments_are_an_error() {
        assert!(Command::parse("stackTrace", None).is_err());
    }
}
