//! The transport seam: how the transmitter talks to one remote.
//!
//! [`Transport`] opens connections; each connection is a [`WireConnection`]
//! that queues requests, flushes them without blocking, and decodes events
//! read from the socket into a queue the transmitter drains on its own
//! schedule.  Keeping read and dispatch separate lets the I/O handler finish
//! all socket work before any event handler runs.

use std::os::fd::RawFd;
use std::time::Duration;

use thiserror::Error;
use transmitter_core::{Endpoint, ObjectId, ProtocolError, WireMessage};

/// Outcome of a non-blocking flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    /// Every queued byte was written.
    Complete,
    /// The socket stopped accepting data; the rest stays queued.
    Pending,
}

/// One decoded event together with the object that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub object: ObjectId,
    pub message: WireMessage,
}

impl Incoming {
    pub fn new(object: ObjectId, message: WireMessage) -> Self {
        Self { object, message }
    }
}

/// Errors raised by a transport or one of its connections.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("connection closed by remote")]
    Closed,
    #[error("no reply to sync within {0:?}")]
    RoundtripTimeout(Duration),
}

/// An open protocol connection to one remote.
pub trait WireConnection {
    /// Descriptor the host loop should watch.
    fn raw_fd(&self) -> RawFd;

    /// Allocates a fresh client-side object id.
    fn new_id(&mut self) -> ObjectId;

    /// Queues a request addressed to `object`.  Nothing is written until
    /// [`flush`](Self::flush).
    fn send(&mut self, object: ObjectId, message: WireMessage) -> Result<(), TransportError>;

    fn flush(&mut self) -> Result<Flush, TransportError>;

    /// Reads everything currently available without blocking and decodes it
    /// into the event queue.  Returns the number of bytes read.
    fn read(&mut self) -> Result<usize, TransportError>;

    /// Drains the event queue.
    fn dispatch(&mut self) -> Vec<Incoming>;

    /// Sends a sync request and blocks until the server answers it,
    /// returning every event received up to and including that point.
    fn roundtrip(&mut self) -> Result<Vec<Incoming>, TransportError>;
}

/// Opens connections to remote endpoints.
pub trait Transport {
    type Wire: WireConnection;

    fn connect(&mut self, endpoint: &Endpoint) -> Result<Self::Wire, TransportError>;
}
