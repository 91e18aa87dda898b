//! Exception break policy and captured exception details.

use std::collections::HashMap;

use crate::source::Source;

/// When the debuggee should stop for a raised exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionBreakMode {
    /// Never stop.
    Never,
    /// Stop at the raise site of every exception.
    Always,
    /// Stop only when the exception is about to leave the top frame.
    Unhandled,
    /// Like `Unhandled`, but only for exceptions originating in user code.
    UserUnhandled,
}

impl ExceptionBreakMode {
    /// The spelling used in DAP bodies.
    pub fn as_dap(self) -> &'static str {
        match self {
            ExceptionBreakMode::Never => "never",
            ExceptionBreakMode::Always => "always",
            ExceptionBreakMode::Unhandled => "unhandled",
            ExceptionBreakMode::UserUnhandled => "userUnhandled",
        }
    }

    /// Parse the DAP spelling. Unknown modes map to `Never`.
    pub fn from_dap(text: &str) -> Self {
        match text {
            "always" => ExceptionBreakMode::Always,
            "unhandled" => ExceptionBreakMode::Unhandled,
            "userUnhandled" => ExceptionBreakMode::UserUnhandled,
            _ => ExceptionBreakMode::Never,
        }
    }
}

/// The per-session exception configuration: a global default break mode and
/// optional per-exception-type overrides, consulted by the tracer on every
/// raise and at the unhandled hook.
#[derive(Debug)]
pub struct ExceptionPolicy {
    default_mode: ExceptionBreakMode,
    overrides: HashMap<String, ExceptionBreakMode>,
}

impl ExceptionPolicy {
    pub fn new() -> Self {
        ExceptionPolicy {
            default_mode: ExceptionBreakMode::Never,
            overrides: HashMap::new(),
        }
    }

    /// Configure from the plain `filters` list of setExceptionBreakpoints.
    /// `raised` maps to `Always`, `uncaught` to `Unhandled`; `raised`
    /// subsumes `uncaught` when both are present, because stopping at every
    /// raise already covers the uncaught ones.
    pub fn set_filters(&mut self, filters: &[String]) {
        let raised = filters.iter().any(|f| f == "raised");
        let uncaught = filters.iter().any(|f| f == "uncaught");
        self.default_mode = if raised {
            ExceptionBreakMode::Always
        } else if uncaught {
            ExceptionBreakMode::Unhandled
        } else {
            ExceptionBreakMode::Never
        };
        self.overrides.clear();
    }

    /// Configure from `exceptionOptions`. When present, the options replace
    /// whatever `filters` would have configured.
    pub fn set_overrides(&mut self, entries: Vec<(Option<Vec<String>>, ExceptionBreakMode)>) {
        self.default_mode = ExceptionBreakMode::Never;
        self.overrides.clear();
        for (names, mode) in entries {
            match names {
                // An option without a path configures the whole tree.
                None => self.default_mode = mode,
                Some(names) => {
                    for name in names {
                        self.overrides.insert(name, mode);
                    }
                }
            }
        }
    }

    /// The break mode in effect for an exception of the given type.
    pub fn effective_mode(&self, type_name: &str) -> ExceptionBreakMode {
        self.overrides
            .get(type_name)
            .copied()
            .unwrap_or(self.default_mode)
    }

    pub fn reset(&mut self) {
        self.default_mode = ExceptionBreakMode::Never;
        self.overrides.clear();
    }
}

impl Default for ExceptionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Details of the exception a thread is currently stopped on. Set by the
/// tracer when it decides to stop, cleared when the thread resumes.
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub description: String,
    /// Rendered stack trace, raise site first.
    pub stack_trace: String,
    /// Where the exception originated, if the raise site had a source.
    pub source: Option<Source>,
    /// The break mode that was in effect when the stop was decided.
    pub break_mode: ExceptionBreakMode,
}
