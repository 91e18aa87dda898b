//! One debug session: the tracer, the client channel and the dispatcher,
//! owned together and torn down together. There are no process-wide
//! singletons; everything hangs off this value.

use std::io;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;

use crate::channel::{ClientChannel, MessageReader};
use crate::dispatch::Dispatcher;
use crate::ids::IdSource;
use crate::runtime::RuntimeFacade;
use crate::tracer::Tracer;

pub struct Session {
    tracer: Arc<Tracer>,
    channel: Arc<ClientChannel>,
    messages: MessageReader,
}

impl Session {
    /// Wire a runtime facade to a client connection. Tracing callbacks are
    /// installed immediately; the message loop starts with [`Session::run`].
    pub fn new(
        runtime: Arc<dyn RuntimeFacade>,
        input: impl BufRead + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        let ids = IdSource::new();
        let channel = Arc::new(ClientChannel::new(output));
        let tracer = Tracer::new(runtime.clone(), channel.clone(), ids);
        runtime.install(tracer.clone());

        Session {
            tracer,
            channel,
            messages: MessageReader::spawn(input),
        }
    }

    /// Start a session in single session mode, communicating with the
    /// client over stdin and stdout. Nothing else should write to stdout
    /// for the lifetime of the session.
    pub fn stdio(runtime: Arc<dyn RuntimeFacade>) -> Self {
        Session::new(runtime, BufReader::new(io::stdin()), io::stdout())
    }

    pub fn tracer(&self) -> Arc<Tracer> {
        self.tracer.clone()
    }

    /// Serve requests until the client disconnects or the stream ends.
    pub fn run(self) {
        Dispatcher::new(self.tracer, self.channel).run(self.messages);
    }
}
