//! Types shared by request arguments, response bodies and events, as
//! specified by the DAP standard. The documentation in this module is adapted
//! from the DAP specification, available
//! [here](https://microsoft.github.io/debug-adapter-protocol/specification).

use serde::{Deserialize, Serialize};

use crate::source::Source;

#[derive(Debug, Clone, Serialize, Default)]
/// Information about the capabilities of a debug adapter.
///
/// Only the capabilities this adapter can actually honor are listed; the
/// standard treats every omitted capability as false.
pub struct Capabilities {
    /// The debug adapter supports the 'configurationDone' request.
    #[serde(rename = "supportsConfigurationDoneRequest")]
    pub supports_configuration_done_request: bool,

    /// The debug adapter supports conditional breakpoints.
    #[serde(rename = "supportsConditionalBreakpoints")]
    pub supports_conditional_breakpoints: bool,

    /// The debug adapter supports breakpoints that break execution after a
    /// specified number of hits.
    #[serde(rename = "supportsHitConditionalBreakpoints")]
    pub supports_hit_conditional_breakpoints: bool,

    /// The debug adapter supports logpoints by interpreting the 'logMessage'
    /// attribute of the SourceBreakpoint.
    #[serde(rename = "supportsLogPoints")]
    pub supports_log_points: bool,

    /// The debug adapter supports a (side effect free) evaluate request for
    /// data hovers.
    #[serde(rename = "supportsEvaluateForHovers")]
    pub supports_evaluate_for_hovers: bool,

    /// The debug adapter supports setting a variable to a value.
    #[serde(rename = "supportsSetVariable")]
    pub supports_set_variable: bool,

    /// The debug adapter supports the 'exceptionInfo' request.
    #[serde(rename = "supportsExceptionInfoRequest")]
    pub supports_exception_info_request: bool,

    /// The debug adapter supports 'exceptionOptions' on the
    /// setExceptionBreakpoints request.
    #[serde(rename = "supportsExceptionOptions")]
    pub supports_exception_options: bool,

    /// Available exception filter options for the 'setExceptionBreakpoints'
    /// request.
    #[serde(rename = "exceptionBreakpointFilters")]
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointsFilter>,

    /// The debug adapter supports the delayed loading of parts of the stack,
    /// which requires that both the 'startFrame' and 'levels' arguments and
    /// an optional 'totalFrames' result of the 'StackTrace' request are
    /// supported.
    #[serde(rename = "supportsDelayedStackTraceLoading")]
    pub supports_delayed_stack_trace_loading: bool,

    /// The debug adapter supports the 'modules' request.
    #[serde(rename = "supportsModulesRequest")]
    pub supports_modules_request: bool,
}

#[derive(Debug, Clone, Serialize)]
/// An ExceptionBreakpointsFilter is shown in the UI as a filter option for
/// configuring how exceptions are dealt with.
pub struct ExceptionBreakpointsFilter {
    /// The internal ID of the filter option. This value is passed to the
    /// 'setExceptionBreakpoints' request.
    pub filter: String,
    /// The name of the filter option. This will be shown in the UI.
    pub label: String,
    /// Initial value of the filter option. If not specified a value 'false'
    /// is assumed.
    pub default: bool,
}

/// A Thread.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Thread {
    /// Unique identifier for the thread.
    pub id: i32,
    /// A name of the thread.
    pub name: String,
}

/// A Stackframe contains the source location.
#[derive(Debug, Clone, Serialize)]
pub struct StackFrame {
    /// An identifier for the stack frame. It must be unique across all
    /// threads. This id can be used to retrieve the scopes of the frame with
    /// the 'scopes' request or to restart the execution of a stackframe.
    pub id: i32,
    /// The name of the stack frame, typically a method name.
    pub name: String,
    /// The optional source of the frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// The line within the file of the frame. If source is null or doesn't
    /// exist, line is 0 and must be ignored.
    pub line: u32,
    /// The column within the line. If source is null or doesn't exist,
    /// column is 0 and must be ignored.
    pub column: u32,
}

/// A Scope is a named container for variables. Optionally a scope can map to
/// a source or a range within a source.
#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    /// Name of the scope such as 'Arguments', 'Locals', or 'Registers'.
    /// This string is shown in the UI as is and can be translated.
    pub name: String,
    /// An optional hint for how to present this scope in the UI. If this
    /// attribute is missing, the scope is shown with a generic UI.
    /// Values: 'arguments', 'locals', 'registers', etc.
    #[serde(rename = "presentationHint")]
    pub presentation_hint: String,
    /// The variables of this scope can be retrieved by passing the value of
    /// variablesReference to the VariablesRequest.
    #[serde(rename = "variablesReference")]
    pub variables_reference: i32,
    /// If true, the number of variables in this scope is large or expensive
    /// to retrieve.
    pub expensive: bool,
}

/// A Variable is a name/value pair.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Variable {
    /// The variable's name.
    pub name: String,
    /// The variable's value. This can be a multi-line text, e.g. for a
    /// function the body of a function.
    pub value: String,
    /// The type of the variable's value. Typically shown in the UI when
    /// hovering over the value.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// If variablesReference is > 0, the variable is structured and its
    /// children can be retrieved by passing variablesReference to the
    /// VariablesRequest.
    #[serde(rename = "variablesReference")]
    pub variables_reference: i32,
}

/// Information about a Breakpoint created in setBreakpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Breakpoint {
    /// An optional identifier for the breakpoint. It is needed if breakpoint
    /// events are used to update or remove breakpoints.
    pub id: i32,
    /// If true breakpoint could be set (but not necessarily at the desired
    /// location).
    pub verified: bool,
    /// An optional message about the state of the breakpoint.
    /// This is shown to the user and can be used to explain why a breakpoint
    /// could not be verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The source where the breakpoint is located.
    pub source: Source,
    /// The start line of the actual range covered by the breakpoint.
    pub line: u32,
}

/// A Module object represents a row in the modules view.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    /// Unique identifier for the module.
    pub id: i32,
    /// A name of the module.
    pub name: String,
    /// Logical full path to the module.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Detailed information about an exception that has occurred.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionDetails {
    /// Message contained in the exception.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Short type name of the exception object.
    #[serde(rename = "typeName", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Stack trace at the time the exception was thrown.
    #[serde(rename = "stackTrace", skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// Properties of a breakpoint passed to the setBreakpoints request.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceBreakpoint {
    /// The source line of the breakpoint.
    pub line: u32,
    /// An optional expression for conditional breakpoints.
    /// It is only honored by a debug adapter if the capability
    /// 'supportsConditionalBreakpoints' is true.
    pub condition: Option<String>,
    /// An optional expression that controls how many hits of the breakpoint
    /// are ignored. The backend is expected to interpret the expression as
    /// needed. The attribute is only honored by a debug adapter if the
    /// capability 'supportsHitConditionalBreakpoints' is true.
    #[serde(rename = "hitCondition")]
    pub hit_condition: Option<String>,
    /// If this attribute exists and is non-empty, the backend must not
    /// 'break' (stop) but log the message instead. Expressions within {} are
    /// interpolated. The attribute is only honored by a debug adapter if the
    /// capability 'supportsLogPoints' is true.
    #[serde(rename = "logMessage")]
    pub log_message: Option<String>,
}

/// A Source descriptor as it appears in request arguments. The path has not
/// been normalized yet; see [`Source`] for the resolved form the core uses.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceArgument {
    /// The short name of the source.
    pub name: Option<String>,
    /// The path of the source to be shown in the UI. It is only used to
    /// locate and load the content of the source if no sourceReference is
    /// specified.
    pub path: Option<String>,
}

/// An ExceptionOptions assigns configuration options to a set of exceptions.
#[derive(Debug, Clone, Deserialize)]
pub struct ExceptionOptions {
    /// A path that selects a single or multiple exceptions in a tree. If
    /// 'path' is missing, the whole tree is selected. By convention the
    /// first segment of the path is a category that is used to group
    /// exceptions in the UI.
    pub path: Option<Vec<ExceptionPathSegment>>,
    /// Condition when a thrown exception should result in a break.
    #[serde(rename = "breakMode")]
    pub break_mode: String,
}

/// An ExceptionPathSegment represents a segment in a path that is used to
/// match leafs or nodes in a tree of exceptions.
#[derive(Debug, Clone, Deserialize)]
pub struct ExceptionPathSegment {
    /// If false or missing this segment matches the names provided,
    /// otherwise it matches anything except the names provided.
    pub negate: Option<bool>,
    /// Depending on the value of 'negate' the names that make up this
    /// segment.
    pub names: Vec<String>,
}
