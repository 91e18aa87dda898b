//! The DAP message envelope: reading incoming messages from the wire and
//! shaping outgoing responses and events.

use std::convert::TryFrom;
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::Event;
use crate::header::Header;
use crate::Error;

/// A dap message received from the client.
#[derive(Debug, Clone)]
pub enum Message {
    Request(Request),
    /// A well formed message that is not a request (e.g. a response to a
    /// reverse request). The core does not issue reverse requests, so these
    /// are only logged.
    Other(GenericMessage),
}

impl Message {
    /// Read a `Message` from the wire.
    pub fn read_from<R: BufRead>(input: &mut R) -> Result<Self, Error> {
        let header = Header::read_from(input)?;

        let mut buffer = vec![0; header.len];
        input.read_exact(buffer.as_mut_slice())?;

        let generic = GenericMessage::parse(buffer.as_slice())?;
        generic.into_specialized()
    }

    /// Sequence number (also known as message ID).
    pub fn seq(&self) -> usize {
        match self {
            Message::Request(request) => request.seq,
            Message::Other(message) => message.seq(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenericMessage {
    serde: MessageSerde,
    value: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct MessageSerde {
    /// Sequence number (also known as message ID). For protocol messages of
    /// type 'request' this ID can be used to cancel the request.
    seq: usize,
    #[serde(rename = "type")]
    message_type: String,
}

impl GenericMessage {
    pub fn seq(&self) -> usize {
        self.serde.seq
    }

    pub fn message_type(&self) -> &str {
        self.serde.message_type.as_str()
    }

    fn parse(input: &[u8]) -> Result<Self, Error> {
        let value = serde_json::from_slice(input)?;
        let serde = serde_json::from_slice(input)?;

        Ok(Self { value, serde })
    }

    fn into_specialized(self) -> Result<Message, Error> {
        if self.message_type() == "request" {
            Ok(Message::Request(Request::try_from(self)?))
        } else {
            Ok(Message::Other(self))
        }
    }
}

impl TryFrom<Value> for GenericMessage {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Error> {
        let serde = serde_json::from_value(value.clone())?;
        Ok(Self { value, serde })
    }
}

/// A request as received, with its arguments still raw. Argument parsing is
/// left to the dispatcher so that a malformed request can be answered with a
/// failure response instead of tearing down the connection.
#[derive(Debug, Clone)]
pub struct Request {
    pub seq: usize,
    /// The command to execute.
    pub command: String,
    /// Object containing arguments for the command.
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RequestSerde {
    command: String,
    arguments: Option<Value>,
}

impl TryFrom<GenericMessage> for Request {
    type Error = Error;

    fn try_from(message: GenericMessage) -> Result<Self, Error> {
        let serde: RequestSerde = serde_json::from_value(message.value)?;
        Ok(Request {
            seq: message.serde.seq,
            command: serde.command,
            arguments: serde.arguments,
        })
    }
}

/// The outcome of a request, ready to be put on the wire.
#[derive(Debug, Clone)]
pub struct Response {
    /// Sequence number of the corresponding request.
    pub request_seq: usize,
    /// The command requested.
    pub command: String,
    /// The request result: a body on success, a short error message
    /// otherwise.
    pub result: Result<Option<Value>, String>,
}

impl Response {
    pub fn success(request: &Request, body: Option<Value>) -> Self {
        Response {
            request_seq: request.seq,
            command: request.command.clone(),
            result: Ok(body),
        }
    }

    pub fn failure(request: &Request, message: String) -> Self {
        Response {
            request_seq: request.seq,
            command: request.command.clone(),
            result: Err(message),
        }
    }

    /// The full wire value, given the outgoing sequence number.
    pub fn into_value(self, seq: usize) -> Value {
        let (success, message, body) = match self.result {
            Ok(body) => (true, None, body),
            Err(message) => (false, Some(message), None),
        };
        let serde = ResponseSerde {
            message_serde: MessageSerde {
                seq,
                message_type: "response".to_string(),
            },
            request_seq: self.request_seq,
            success,
            command: self.command,
            message,
            body,
        };
        serde_json::to_value(serde).expect("bug: response serialization cannot fail")
    }
}

/// Response for a request.
#[derive(Debug, Clone, Serialize)]
struct ResponseSerde {
    #[serde(flatten)]
    message_serde: MessageSerde,

    /// Sequence number of the corresponding request.
    request_seq: usize,

    /// Outcome of the request. If true, the request was successful and the
    /// 'body' attribute may contain the result of the request. If the value
    /// is false, the attribute 'message' contains the error in short form.
    success: bool,

    /// The command requested.
    command: String,

    /// Contains the raw error in short form if 'success' is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,

    /// Contains request result if success is true and optional error details
    /// if success is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}

/// The full wire value of an event, given the outgoing sequence number.
pub fn event_to_value(seq: usize, event: &Event) -> Result<Value, Error> {
    let serde = EventSerde {
        message_serde: MessageSerde {
            seq,
            message_type: "event".to_string(),
        },
        event: event.name(),
        body: event.body()?,
    };
    Ok(serde_json::to_value(serde)?)
}

#[derive(Debug, Clone, Serialize)]
struct EventSerde {
    #[serde(flatten)]
    message_serde: MessageSerde,

    /// Type of event.
    event: &'static str,

    /// Event-specific information.
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
}
