//! The DAP request dispatcher: a single-threaded loop that maps incoming
//! requests onto core operations and writes the responses.
//!
//! Failures inside a handler become `success:false` responses; they never
//! tear down the loop. Only `disconnect` (or the input stream going away)
//! ends it.

use std::fs;
use std::sync::Arc;

use log::{debug, error, info};
use serde_json::{json, Value};

use crate::channel::{ClientChannel, EventSink, MessageReader};
use crate::dap_type::{
    Capabilities, ExceptionBreakpointsFilter, ExceptionDetails, Module, SourceBreakpoint,
};
use crate::event::Event;
use crate::message::{Message, Request, Response};
use crate::request::Command;
use crate::step::StepKind;
use crate::tracer::Tracer;
use crate::Error;

/// What the loop should do after a request has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Dispatcher {
    tracer: Arc<Tracer>,
    channel: Arc<ClientChannel>,
}

impl Dispatcher {
    pub fn new(tracer: Arc<Tracer>, channel: Arc<ClientChannel>) -> Self {
        Dispatcher { tracer, channel }
    }

    /// Process messages until the client disconnects or the stream ends.
    pub fn run(&self, messages: MessageReader) {
        for message in messages {
            match message {
                Ok(Message::Request(request)) => {
                    if self.handle(&request) == Flow::Exit {
                        break;
                    }
                }
                Ok(Message::Other(message)) => {
                    debug!("ignoring {} message (seq {})", message.message_type(), message.seq());
                }
                Err(err) => {
                    error!("client connection failed: {}", err);
                    break;
                }
            }
        }
        info!("dispatcher loop finished");
    }

    /// Answer one request. Public behavior is fully determined by the
    /// command; the sequence bookkeeping lives in the channel.
    fn handle(&self, request: &Request) -> Flow {
        let command = match Command::parse(&request.command, request.arguments.clone()) {
            Ok(command) => command,
            Err(err) => {
                debug!("malformed {:?} request: {}", request.command, err);
                self.respond(Response::failure(
                    request,
                    format!("invalid arguments: {}", err),
                ));
                return Flow::Continue;
            }
        };

        let mut flow = Flow::Continue;
        let mut follow_up = None;
        match &command {
            Command::Initialize(_) => follow_up = Some(Event::Initialized),
            Command::Disconnect(_) => {
                // Tear the core down before answering so that no further
                // stop can sneak in between the response and the event.
                self.tracer.detach();
                follow_up = Some(Event::Terminated);
                flow = Flow::Exit;
            }
            _ => {}
        }

        match self.dispatch(command) {
            Ok(body) => self.respond(Response::success(request, body)),
            Err(err) => self.respond(Response::failure(request, err.to_string())),
        }
        if let Some(event) = follow_up {
            self.channel.send_event(event);
        }
        flow
    }

    fn respond(&self, response: Response) {
        if let Err(err) = self.channel.send_response(response) {
            error!("failed to send response: {}", err);
        }
    }

    /// Perform the core call for one command and build the response body.
    fn dispatch(&self, command: Command) -> Result<Option<Value>, Error> {
        match command {
            Command::Initialize(arguments) => {
                info!(
                    "initialize from {}",
                    arguments.client_name.as_deref().unwrap_or("unknown client")
                );
                Ok(Some(serde_json::to_value(capabilities())?))
            }

            // Process bootstrap is handled by the embedder; the core only
            // acknowledges the lifecycle requests.
            Command::Launch(_) | Command::Attach(_) | Command::ConfigurationDone => Ok(None),

            Command::Disconnect(_) => Ok(None),

            Command::SetBreakpoints(arguments) => {
                let path = arguments
                    .source
                    .path
                    .as_deref()
                    .ok_or_else(|| Error::request("source.path is required"))?;
                // The deprecated `lines` form still appears in the wild.
                let specs = match arguments.breakpoints {
                    Some(specs) => specs,
                    None => arguments
                        .lines
                        .unwrap_or_default()
                        .into_iter()
                        .map(|line| SourceBreakpoint {
                            line,
                            condition: None,
                            hit_condition: None,
                            log_message: None,
                        })
                        .collect(),
                };
                let breakpoints = self.tracer.set_breakpoints(path, &specs);
                Ok(Some(json!({ "breakpoints": breakpoints })))
            }

            Command::SetExceptionBreakpoints(arguments) => {
                self.tracer
                    .set_exception_breakpoints(&arguments.filters, arguments.exception_options);
                Ok(None)
            }

            Command::Threads => {
                let threads = self.tracer.threads();
                Ok(Some(json!({ "threads": threads })))
            }

            Command::StackTrace(arguments) => {
                let (frames, total) = self.tracer.stack_trace(
                    arguments.thread_id,
                    arguments.start_frame,
                    arguments.levels,
                )?;
                Ok(Some(json!({ "stackFrames": frames, "totalFrames": total })))
            }

            Command::Scopes(arguments) => {
                let scopes = self.tracer.scopes(arguments.frame_id)?;
                Ok(Some(json!({ "scopes": scopes })))
            }

            Command::Variables(arguments) => {
                let variables = self.tracer.variables(arguments.variables_reference)?;
                Ok(Some(json!({ "variables": variables })))
            }

            Command::SetVariable(arguments) => {
                let variable = self.tracer.set_variable(
                    arguments.variables_reference,
                    &arguments.name,
                    &arguments.value,
                )?;
                Ok(Some(json!({
                    "value": variable.value,
                    "type": variable.type_name,
                    "variablesReference": variable.variables_reference,
                })))
            }

            Command::Evaluate(arguments) => {
                let result = self.tracer.evaluate(
                    arguments.frame_id,
                    &arguments.expression,
                    arguments.context.as_deref(),
                )?;
                Ok(Some(json!({
                    "result": result.value,
                    "type": result.type_name,
                    "variablesReference": result.variables_reference,
                })))
            }

            Command::Pause(_) => {
                self.tracer.pause()?;
                Ok(None)
            }

            Command::Continue(_) => {
                self.tracer.continue_all()?;
                Ok(Some(json!({ "allThreadsContinued": true })))
            }

            Command::Next(arguments) => {
                self.tracer.step(arguments.thread_id, StepKind::Over)?;
                Ok(None)
            }

            Command::StepIn(arguments) => {
                self.tracer.step(arguments.thread_id, StepKind::In)?;
                Ok(None)
            }

            Command::StepOut(arguments) => {
                self.tracer.step(arguments.thread_id, StepKind::Out)?;
                Ok(None)
            }

            Command::ExceptionInfo(arguments) => {
                let info = self.tracer.exception_info(arguments.thread_id)?;
                let details = ExceptionDetails {
                    message: Some(info.description.clone()),
                    type_name: Some(info.type_name.clone()),
                    stack_trace: Some(info.stack_trace),
                };
                Ok(Some(json!({
                    "exceptionId": info.type_name,
                    "description": info.description,
                    "breakMode": info.break_mode.as_dap(),
                    "details": details,
                })))
            }

            Command::Source(arguments) => {
                let path = arguments
                    .source
                    .as_ref()
                    .and_then(|source| source.path.as_deref())
                    .ok_or_else(|| Error::request("source.path is required"))?;
                if path.starts_with('<') {
                    return Err(Error::request(format!(
                        "source is not available for {}",
                        path
                    )));
                }
                let content = fs::read_to_string(path).map_err(|err| {
                    Error::request(format!("could not read {}: {}", path, err))
                })?;
                Ok(Some(json!({ "content": content })))
            }

            Command::Modules(_) => {
                // The core keeps no module registry; report an empty view.
                let modules: Vec<Module> = Vec::new();
                Ok(Some(json!({ "modules": modules, "totalModules": 0 })))
            }

            Command::Unknown { command } => Err(Error::request(format!(
                "unrecognized request {:?}",
                command
            ))),
        }
    }
}

fn capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: true,
        supports_conditional_breakpoints: true,
        supports_hit_conditional_breakpoints: true,
        supports_log_points: true,
        supports_evaluate_for_hovers: true,
        supports_set_variable: true,
        supports_exception_info_request: true,
        supports_exception_options: true,
        exception_breakpoint_filters: vec![
            ExceptionBreakpointsFilter {
                filter: "raised".to_string(),
                label: "Raised Exceptions".to_string(),
                default: false,
            },
            ExceptionBreakpointsFilter {
                filter: "uncaught".to_string(),
                label: "Uncaught Exceptions".to_string(),
                default: true,
            },
        ],
        supports_delayed_stack_trace_loading: true,
        supports_modules_request: true,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn capabilities_advertise_the_supported_surface() {
        let caps = capabilities();
        assert!(caps.supports_conditional_breakpoints);
        assert!(caps.supports_hit_conditional_breakpoints);
        assert!(caps.supports_log_points);
        assert!(caps.supports_exception_info_request);
        let filters: Vec<_> = caps
            .exception_breakpoint_filters
            .iter()
            .map(|filter| filter.filter.as_str())
            .collect();
        assert_eq!(filters, vec!["raised", "uncaught"]);
    }
}
