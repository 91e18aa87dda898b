//! The message channel between the adapter and the client.
//!
//! Incoming bytes are parsed on a dedicated reader thread and handed to the
//! dispatcher through an mpsc channel. Outgoing traffic goes through a
//! [`ClientChannel`], which owns the writer and the outgoing sequence
//! counter; it is shared between the dispatcher (responses) and the tracer
//! (events emitted from debuggee threads).

use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::thread;

use log::{error, info};
use parking_lot::Mutex;
use serde_json::Value;

use crate::event::Event;
use crate::header::Header;
use crate::message::{event_to_value, Message, Response};
use crate::Error;

/// Receiver of events emitted by the core. The production implementation is
/// [`ClientChannel`]; tests substitute an in-memory recorder.
pub trait EventSink: Send + Sync {
    fn send_event(&self, event: Event);
}

/// Parsed messages arriving from the client, fed by a reader thread.
pub struct MessageReader {
    receiver: mpsc::Receiver<Result<Message, Error>>,
}

impl MessageReader {
    /// Spawn the reader thread over the given input.
    pub fn spawn<R: BufRead + Send + 'static>(input: R) -> Self {
        let (sender, receiver) = mpsc::channel();

        thread::Builder::new()
            .name("dap-reader".to_string())
            .spawn(move || {
                let listener = Listener { input, sender };
                listener.run();
            })
            .expect("failed to spawn the reader thread");

        MessageReader { receiver }
    }
}

impl Iterator for MessageReader {
    type Item = Result<Message, Error>;

    fn next(&mut self) -> Option<Result<Message, Error>> {
        self.receiver.recv().ok()
    }
}

struct Listener<R: BufRead> {
    input: R,
    sender: mpsc::Sender<Result<Message, Error>>,
}

impl<R: BufRead> Listener<R> {
    fn run(mut self) {
        loop {
            let message = Message::read_from(&mut self.input);
            // Once the stream has failed there is nothing more to read;
            // forward the error and let the dispatcher decide.
            let failed = message.is_err();
            if self.sender.send(message).is_err() || failed {
                info!("reader thread exiting");
                return;
            }
        }
    }
}

/// The outgoing half of the connection.
pub struct ClientChannel {
    inner: Mutex<Outgoing>,
}

struct Outgoing {
    writer: Box<dyn Write + Send>,
    /// Outgoing sequence number; the sequence counter is distinct from the
    /// client's.
    seq: usize,
}

impl ClientChannel {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        ClientChannel {
            inner: Mutex::new(Outgoing {
                writer: Box::new(writer),
                seq: 0,
            }),
        }
    }

    pub fn send_response(&self, response: Response) -> Result<(), Error> {
        self.send_with(|seq| Ok(response.into_value(seq)))
    }

    /// Serialize and write one message while holding the writer lock, so
    /// that messages from different threads cannot interleave and sequence
    /// numbers stay monotonic on the wire.
    fn send_with(
        &self,
        build: impl FnOnce(usize) -> Result<Value, Error>,
    ) -> Result<(), Error> {
        let mut outgoing = self.inner.lock();
        outgoing.seq += 1;
        let body = build(outgoing.seq)?.to_string();

        Header::new(body.len()).write_to(&mut outgoing.writer)?;
        outgoing.writer.write_all(body.as_bytes())?;
        outgoing.writer.flush()?;
        Ok(())
    }
}

impl EventSink for ClientChannel {
    fn send_event(&self, event: Event) {
        // Events are emitted from debuggee threads inside tracing callbacks;
        // there is no one to propagate a broken pipe to there.
        if let Err(err) = self.send_with(|seq| event_to_value(seq, &event)) {
            error!("failed to send {} event: {}", event.name(), err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    /// Writer that appends to a shared buffer.
    #[derive(Clone)]
    struct SharedBuffer(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn decode_messages(raw: &[u8]) -> Vec<Value> {
        let mut input = raw;
        let mut messages = Vec::new();
        while !input.is_empty() {
            let header = Header::read_from(&mut input).unwrap();
            let (body, rest) = input.split_at(header.len);
            messages.push(serde_json::from_slice(body).unwrap());
            input = rest;
        }
        messages
    }

    #[test]
    fn reader_yields_messages_then_stops_on_eof() {
        let body = r#"{"seq": 1, "type": "request", "command": "threads"}"#;
        let mut raw = Header::new(body.len()).into_string().into_bytes();
        raw.extend_from_slice(body.as_bytes());

        let mut reader = MessageReader::spawn(std::io::Cursor::new(raw));
        match reader.next() {
            Some(Ok(Message::Request(request))) => assert_eq!(request.command, "threads"),
            other => panic!("unexpected message: {:?}", other.is_some()),
        }
        // EOF surfaces as one error, then the channel closes.
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn events_are_framed_with_monotonic_seq() {
        let buffer = SharedBuffer(Arc::new(StdMutex::new(Vec::new())));
        let channel = ClientChannel::new(buffer.clone());

        channel.send_event(Event::Initialized);
        channel.send_event(Event::continued(1));

        let raw = buffer.0.lock().unwrap();
        let messages = decode_messages(&raw);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["seq"], 1);
        assert_eq!(messages[0]["event"], "initialized");
        assert_eq!(messages[1]["seq"], 2);
        assert_eq!(messages[1]["event"], "continued");
    }
}
