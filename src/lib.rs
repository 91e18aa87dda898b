//! Core of a Debug Adapter Protocol server for a dynamic language runtime.
//!
//! The crate sits between a DAP client (a development tool speaking JSON over
//! a `Content-Length` framed stream) and a language runtime that reports
//! execution events through the [`RuntimeFacade`] trait. It translates the
//! client's stateful debugging model (threads, frames, scopes, breakpoints,
//! steps, exceptions) into decisions over the runtime's low level event
//! stream, and mediates thread suspension so the client always sees a
//! consistent all-threads-stopped snapshot.
//!
//! [`Session`] ties everything together: give it a facade and an i/o pair and
//! call [`Session::run`].

use std::io;

use thiserror::Error;

pub mod breakpoint;
pub mod channel;
pub mod dap_type;
pub mod dispatch;
pub mod event;
pub mod exception;
pub mod frame;
pub mod header;
pub mod ids;
pub mod message;
pub mod request;
pub mod runtime;
pub mod session;
pub mod source;
pub mod step;
pub mod thread;
pub mod tracer;

pub use crate::channel::{ClientChannel, EventSink, MessageReader};
pub use crate::runtime::{RuntimeFacade, TraceAction, TraceSink};
pub use crate::session::Session;
pub use crate::tracer::Tracer;

#[derive(Error, Debug)]
pub enum Error {
    /// The input is not a well formed DAP message.
    #[error("invalid message")]
    BadMessage,
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    InvalidJson(#[from] serde_json::error::Error),
    /// A request could not be carried out. The message is sent back to the
    /// client in a `success:false` response; the session keeps running.
    #[error("{0}")]
    Request(String),
}

impl Error {
    /// Shorthand for a failed-request error.
    pub fn request(message: impl Into<String>) -> Self {
        Error::Request(message.into())
    }
}
