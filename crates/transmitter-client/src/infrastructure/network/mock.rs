//! In-memory transport for tests.
//!
//! # Why a mock transport?
//!
//! The connection manager reacts to refused connections, incomplete
//! capability sets, hang-ups, and write back-pressure.  Producing each of
//! those against a real server is slow and racy.  [`MockTransport`] hands out
//! [`MockWire`]s that talk to a scriptable [`MockServer`] instead: tests
//! decide what the server advertises and which operations fail, then inspect
//! exactly which requests were flushed, in order.
//!
//! # Usage in tests
//!
//! ```ignore
//! let transport = MockTransport::new(MockServer::full());
//! let server = transport.server();
//! let mut transmitter = Transmitter::new(ManualEventLoop::default(), transport, frames);
//!
//! // ... drive the transmitter ...
//!
//! assert_eq!(server.borrow().received_of(MessageType::Commit).len(), 1);
//! ```
//!
//! The server is shared through `Rc<RefCell<_>>` because the transmitter owns
//! the transport while the test keeps a handle for scripting and assertions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

use transmitter_core::protocol::messages::{
    MessageType, DISPLAY_OBJECT, FIRST_CLIENT_OBJECT, HEADER_SIZE,
};
use transmitter_core::{CapabilityKind, Endpoint, ObjectId, WireMessage};

use crate::application::transport::{Flush, Incoming, Transport, TransportError, WireConnection};

/// First descriptor number handed out by the mock; never a real open fd.
const FIRST_FAKE_FD: RawFd = 1000;

/// Scriptable state of the fake remote.
#[derive(Debug, Default)]
pub struct MockServer {
    /// `(name, interface)` advertised on the registry during negotiation.
    pub globals: Vec<(u32, String)>,
    /// Extra events delivered by the negotiation roundtrip, after the globals.
    pub handshake_events: Vec<Incoming>,
    /// Every connection attempt, refused or not.
    pub connect_attempts: Vec<Endpoint>,
    /// Number of upcoming connection attempts to refuse.
    pub refuse_connections: usize,
    /// Refuse every connection attempt.
    pub refuse_all: bool,
    /// Requests flushed by the client, across all connections.
    pub received: Vec<(ObjectId, WireMessage)>,
    /// Events the next `read` on the current connection picks up.
    pub inbound: VecDeque<Incoming>,
    pub fail_read: bool,
    /// Reject every request at queue time.
    pub fail_send: bool,
    pub fail_flush: bool,
    pub fail_roundtrip: bool,
    /// Number of upcoming flushes that report back-pressure.
    pub pending_flushes: usize,
    /// Registry id requested on the latest connection.
    pub registry: Option<ObjectId>,
    /// Wires currently alive.
    pub open_wires: usize,
}

impl MockServer {
    /// A server advertising exactly `kinds`, under registry names 1, 2, ...
    pub fn with_capabilities(kinds: &[CapabilityKind]) -> Self {
        Self {
            globals: kinds
                .iter()
                .zip(1u32..)
                .map(|(kind, name)| (name, kind.interface().to_string()))
                .collect(),
            ..Self::default()
        }
    }

    /// A server advertising all four capabilities.
    pub fn full() -> Self {
        Self::with_capabilities(&CapabilityKind::ALL)
    }

    /// Flushed requests of one type, in order.
    pub fn received_of(&self, ty: MessageType) -> Vec<(ObjectId, WireMessage)> {
        self.received
            .iter()
            .filter(|(_, msg)| msg.message_type() == ty)
            .cloned()
            .collect()
    }

    pub fn received_types(&self) -> Vec<MessageType> {
        self.received.iter().map(|(_, msg)| msg.message_type()).collect()
    }

    /// Object the client bound `interface` to most recently.
    pub fn bound_id(&self, interface: &str) -> Option<ObjectId> {
        self.received.iter().rev().find_map(|(_, msg)| match msg {
            WireMessage::Bind { interface: bound, id, .. } if bound == interface => Some(*id),
            _ => None,
        })
    }

    /// Queues an event for the client's next read.
    pub fn push_event(&mut self, object: ObjectId, message: WireMessage) {
        self.inbound.push_back(Incoming::new(object, message));
    }

    fn accept(&mut self, wire: &mut Vec<(ObjectId, WireMessage)>) {
        for (object, message) in wire.drain(..) {
            if let WireMessage::GetRegistry { registry } = message {
                self.registry = Some(registry);
            }
            self.received.push((object, message));
        }
    }
}

/// Hands out [`MockWire`]s connected to one shared [`MockServer`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    server: Rc<RefCell<MockServer>>,
}

impl MockTransport {
    pub fn new(server: MockServer) -> Self {
        Self { server: Rc::new(RefCell::new(server)) }
    }

    /// Shared handle for scripting and assertions.
    pub fn server(&self) -> Rc<RefCell<MockServer>> {
        Rc::clone(&self.server)
    }
}

impl Transport for MockTransport {
    type Wire = MockWire;

    fn connect(&mut self, endpoint: &Endpoint) -> Result<MockWire, TransportError> {
        let mut server = self.server.borrow_mut();
        server.connect_attempts.push(endpoint.clone());
        if server.refuse_all || server.refuse_connections > 0 {
            server.refuse_connections = server.refuse_connections.saturating_sub(1);
            return Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused by mock server"),
            });
        }
        let fd = FIRST_FAKE_FD + server.connect_attempts.len() as RawFd;
        server.open_wires += 1;
        server.inbound.clear();
        Ok(MockWire::attached(Rc::clone(&self.server), fd))
    }
}

/// One fake connection.
#[derive(Debug)]
pub struct MockWire {
    server: Rc<RefCell<MockServer>>,
    fd: RawFd,
    next_id: u32,
    outbox: Vec<(ObjectId, WireMessage)>,
    decoded: VecDeque<Incoming>,
}

impl MockWire {
    fn attached(server: Rc<RefCell<MockServer>>, fd: RawFd) -> Self {
        Self {
            server,
            fd,
            next_id: FIRST_CLIENT_OBJECT,
            outbox: Vec::new(),
            decoded: VecDeque::new(),
        }
    }

    /// A wire with its own private server, for unit tests that only need
    /// to look at queued requests.
    pub fn detached(mut server: MockServer) -> Self {
        server.open_wires += 1;
        Self::attached(Rc::new(RefCell::new(server)), FIRST_FAKE_FD)
    }

    /// Requests queued but not yet flushed.
    pub fn queued(&self) -> Vec<(ObjectId, WireMessage)> {
        self.outbox.clone()
    }

    pub fn clear_queue(&mut self) {
        self.outbox.clear();
    }
}

impl Drop for MockWire {
    fn drop(&mut self) {
        let mut server = self.server.borrow_mut();
        server.open_wires = server.open_wires.saturating_sub(1);
    }
}

impl WireConnection for MockWire {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn new_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    fn send(&mut self, object: ObjectId, message: WireMessage) -> Result<(), TransportError> {
        if self.server.borrow().fail_send {
            return Err(TransportError::Closed);
        }
        self.outbox.push((object, message));
        Ok(())
    }

    fn flush(&mut self) -> Result<Flush, TransportError> {
        let mut server = self.server.borrow_mut();
        if server.fail_flush {
            return Err(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        if server.pending_flushes > 0 {
            server.pending_flushes -= 1;
            return Ok(Flush::Pending);
        }
        server.accept(&mut self.outbox);
        Ok(Flush::Complete)
    }

    /// Moves the server's inbound events into the decode queue; the count
    /// returned is nominal (one header per event).
    fn read(&mut self) -> Result<usize, TransportError> {
        let mut server = self.server.borrow_mut();
        if server.fail_read {
            return Err(TransportError::Closed);
        }
        let count = server.inbound.len();
        self.decoded.extend(server.inbound.drain(..));
        Ok(count * HEADER_SIZE)
    }

    fn dispatch(&mut self) -> Vec<Incoming> {
        self.decoded.drain(..).collect()
    }

    fn roundtrip(&mut self) -> Result<Vec<Incoming>, TransportError> {
        let callback = self.new_id();
        let mut server = self.server.borrow_mut();
        if server.fail_roundtrip {
            return Err(TransportError::Closed);
        }
        self.outbox.push((DISPLAY_OBJECT, WireMessage::Sync { callback }));
        server.accept(&mut self.outbox);

        let mut events: Vec<Incoming> = self.decoded.drain(..).collect();
        if let Some(registry) = server.registry {
            events.extend(server.globals.iter().map(|(name, interface)| {
                Incoming::new(
                    registry,
                    WireMessage::Global { name: *name, interface: interface.clone(), version: 1 },
                )
            }));
        }
        events.extend(server.handshake_events.iter().cloned());
        Ok(events)
    }
}
