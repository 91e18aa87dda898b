//! The events this adapter emits, as specified by the DAP standard.
//! The documentation in this module is adapted from the DAP specification,
//! available [here](https://microsoft.github.io/debug-adapter-protocol/specification).

use serde::Serialize;
use serde_json::Value;

use crate::source::Source;

/// An event sent from the adapter to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The adapter is ready to accept configuration requests.
    Initialized,
    Stopped(StoppedEvent),
    Continued(ContinuedEvent),
    Thread(ThreadEvent),
    Output(OutputEvent),
    Exited(ExitedEvent),
    /// Debugging of the debuggee has terminated.
    Terminated,
}

impl Event {
    /// The event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initialized => "initialized",
            Event::Stopped(_) => "stopped",
            Event::Continued(_) => "continued",
            Event::Thread(_) => "thread",
            Event::Output(_) => "output",
            Event::Exited(_) => "exited",
            Event::Terminated => "terminated",
        }
    }

    /// The event body, if the event carries one.
    pub fn body(&self) -> Result<Option<Value>, serde_json::Error> {
        let body = match self {
            Event::Initialized | Event::Terminated => None,
            Event::Stopped(body) => Some(serde_json::to_value(body)?),
            Event::Continued(body) => Some(serde_json::to_value(body)?),
            Event::Thread(body) => Some(serde_json::to_value(body)?),
            Event::Output(body) => Some(serde_json::to_value(body)?),
            Event::Exited(body) => Some(serde_json::to_value(body)?),
        };
        Ok(body)
    }

    pub fn stopped(reason: StoppedReason, thread_id: i32, hit_breakpoint_ids: Vec<i32>) -> Self {
        Event::Stopped(StoppedEvent {
            reason,
            thread_id,
            all_threads_stopped: true,
            hit_breakpoint_ids,
            text: None,
        })
    }

    pub fn stopped_on_exception(thread_id: i32, exception_name: String) -> Self {
        Event::Stopped(StoppedEvent {
            reason: StoppedReason::Exception,
            thread_id,
            all_threads_stopped: true,
            hit_breakpoint_ids: Vec::new(),
            text: Some(exception_name),
        })
    }

    pub fn continued(thread_id: i32) -> Self {
        Event::Continued(ContinuedEvent {
            thread_id,
            all_threads_continued: true,
        })
    }

    pub fn thread_started(thread_id: i32) -> Self {
        Event::Thread(ThreadEvent {
            reason: ThreadReason::Started,
            thread_id,
        })
    }

    pub fn thread_exited(thread_id: i32) -> Self {
        Event::Thread(ThreadEvent {
            reason: ThreadReason::Exited,
            thread_id,
        })
    }

    pub fn console_output(output: String, source: Option<Source>, line: Option<u32>) -> Self {
        Event::Output(OutputEvent {
            category: "console",
            output,
            source,
            line,
        })
    }
}

/// The event indicates that the execution of the debuggee has stopped due to
/// some condition. This can be caused by a break point previously set, a
/// stepping request has completed, by executing a debugger statement etc.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoppedEvent {
    /// The reason for the event.
    pub reason: StoppedReason,
    /// The thread which was stopped.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
    /// A debug adapter can announce that all threads have stopped.
    /// The client should use this information to enable that all threads can
    /// be expanded to access their stacktraces.
    #[serde(rename = "allThreadsStopped")]
    pub all_threads_stopped: bool,
    /// Ids of the breakpoints that triggered the event.
    #[serde(rename = "hitBreakpointIds", skip_serializing_if = "Vec::is_empty")]
    pub hit_breakpoint_ids: Vec<i32>,
    /// Additional information. E.g. if reason is 'exception', text contains
    /// the exception name. This string is shown in the UI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoppedReason {
    Step,
    Breakpoint,
    Exception,
    Pause,
    Entry,
    Goto,
}

/// The event indicates that the execution of the debuggee has continued.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContinuedEvent {
    /// The thread which was continued.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
    /// A debug adapter can announce that all threads have continued.
    #[serde(rename = "allThreadsContinued")]
    pub all_threads_continued: bool,
}

/// The event indicates that a thread has started or exited.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThreadEvent {
    /// The reason for the event.
    pub reason: ThreadReason,
    /// The identifier of the thread.
    #[serde(rename = "threadId")]
    pub thread_id: i32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThreadReason {
    Started,
    Exited,
}

/// The event indicates that the target has produced some output.
/// Emitted for log-message breakpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutputEvent {
    /// The output category.
    pub category: &'static str,
    /// The output to report.
    pub output: String,
    /// An optional source location where the output was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// An optional source location line where the output was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// The event indicates that the debuggee has exited and returns its exit
/// code.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExitedEvent {
    /// The exit code returned from the debuggee.
    #[serde(rename = "exitCode")]
    pub exit_code: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stopped_event_body() {
        let event = Event::stopped(StoppedReason::Breakpoint, 1, vec![3]);
        assert_eq!(event.name(), "stopped");
        let body = event.body().unwrap().unwrap();
        assert_eq!(body["reason"], "breakpoint");
        assert_eq!(body["threadId"], 1);
        assert_eq!(body["allThreadsStopped"], true);
        assert_eq!(body["hitBreakpointIds"][0], 3);
    }

    #[test]
    fn stopped_event_without_breakpoints_omits_the_ids() {
        let event = Event::stopped(StoppedReason::Pause, 1, Vec::new());
        let body = event.body().unwrap().unwrap();
        assert!(body.get("hitBreakpointIds").is_none());
    }

    #[test]
    fn bodyless_events() {
        assert_eq!(Event::Initialized.body().unwrap(), None);
        assert_eq!(Event::Terminated.body().unwrap(), None);
    }

    #[test]
    fn thread_event_reasons() {
        let body = Event::thread_started(7).body().unwrap().unwrap();
        assert_eq!(body["reason"], "started");
        let body = Event::thread_exited(7).body().unwrap().unwrap();
        assert_eq!(body["reason"], "exited");
    }

    #[test]
    fn output_event_is_console() {
        let event = Event::console_output(
            "i=0".to_string(),
            Some(Source::from_resolved("/work/a.nt")),
            Some(10),
        );
        let body = event.body().unwrap().unwrap();
        assert_eq!(body["category"], "console");
        assert_eq!(body["output"], "i=0");
        assert_eq!(body["line"], 10);
    }
}
