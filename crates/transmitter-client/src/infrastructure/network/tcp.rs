//! TCP transport.
//!
//! Connections use a non-blocking `std::net::TcpStream` so the host loop can
//! watch the descriptor.  Outgoing requests are encoded into a byte queue
//! that `flush` drains as far as the socket allows; incoming bytes are
//! reassembled into frames with [`frame_length`] and decoded eagerly on
//! `read`.
//!
//! The only blocking operation is the negotiation roundtrip, which polls the
//! socket itself and gives up after the configured timeout.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use tracing::{debug, trace};
use transmitter_core::protocol::messages::{DISPLAY_OBJECT, FIRST_CLIENT_OBJECT, HEADER_SIZE};
use transmitter_core::{
    decode_message, encode_message, frame_length, Endpoint, ObjectId, ProtocolError, WireMessage,
};

use crate::application::transport::{Flush, Incoming, Transport, TransportError, WireConnection};
use crate::infrastructure::event_loop::poll_timeout;

const READ_CHUNK: usize = 16 * 1024;

/// Opens TCP connections with bounded connect and roundtrip times.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    roundtrip_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, roundtrip_timeout: Duration) -> Self {
        Self { connect_timeout, roundtrip_timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(3000))
    }
}

impl Transport for TcpTransport {
    type Wire = TcpWire;

    fn connect(&mut self, endpoint: &Endpoint) -> Result<TcpWire, TransportError> {
        let connect_failed = |source| TransportError::ConnectFailed {
            endpoint: endpoint.to_string(),
            source,
        };
        let addrs = (endpoint.address.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(connect_failed)?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    debug!(%addr, "tcp connection established");
                    return TcpWire::new(stream, self.roundtrip_timeout);
                }
                Err(e) => {
                    trace!(%addr, error = %e, "address unreachable");
                    last_error = Some(e);
                }
            }
        }
        Err(connect_failed(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
        })))
    }
}

/// One non-blocking protocol connection over TCP.
#[derive(Debug)]
pub struct TcpWire {
    stream: TcpStream,
    next_id: u32,
    outbound: Vec<u8>,
    inbound: Vec<u8>,
    decoded: VecDeque<Incoming>,
    roundtrip_timeout: Duration,
}

impl TcpWire {
    pub fn new(stream: TcpStream, roundtrip_timeout: Duration) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            next_id: FIRST_CLIENT_OBJECT,
            outbound: Vec::new(),
            inbound: Vec::new(),
            decoded: VecDeque::new(),
            roundtrip_timeout,
        })
    }

    /// Splits complete frames off the inbound buffer.
    fn decode_buffered(&mut self) -> Result<(), TransportError> {
        let mut consumed = 0;
        loop {
            let rest = &self.inbound[consumed..];
            match frame_length(rest) {
                Some(len) => {
                    let (object, message, used) = decode_message(&rest[..len])?;
                    self.decoded.push_back(Incoming::new(object, message));
                    consumed += used;
                }
                None => {
                    // Catch bad headers before waiting for a payload that
                    // will never be valid.
                    if rest.len() >= HEADER_SIZE {
                        match decode_message(rest) {
                            Err(ProtocolError::PayloadLengthMismatch { .. }) | Ok(_) => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    break;
                }
            }
        }
        self.inbound.drain(..consumed);
        Ok(())
    }

    /// Blocks until the socket is readable (or writable, if requested) or
    /// `timeout` elapses.
    fn wait_ready(&self, writable: bool, timeout: Duration) -> Result<(), TransportError> {
        let mut flags = PollFlags::POLLIN;
        if writable {
            flags |= PollFlags::POLLOUT;
        }
        let mut fds = [PollFd::new(self.stream.as_fd(), flags)];
        match poll(&mut fds, poll_timeout(timeout)) {
            Ok(_) | Err(Errno::EINTR) => Ok(()),
            Err(e) => Err(TransportError::Io(e.into())),
        }
    }
}

impl WireConnection for TcpWire {
    fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn new_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    fn send(&mut self, object: ObjectId, message: WireMessage) -> Result<(), TransportError> {
        let bytes = encode_message(object, &message)?;
        self.outbound.extend_from_slice(&bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<Flush, TransportError> {
        let mut written = 0;
        let result = loop {
            if written == self.outbound.len() {
                break Ok(Flush::Complete);
            }
            match self.stream.write(&self.outbound[written..]) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(Flush::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e.into()),
            }
        };
        self.outbound.drain(..written);
        result
    }

    fn read(&mut self) -> Result<usize, TransportError> {
        let mut total = 0;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    // Frames that arrived ahead of the close are still delivered.
                    self.decode_buffered()?;
                    return Err(TransportError::Closed);
                }
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.decode_buffered()?;
        Ok(total)
    }

    fn dispatch(&mut self) -> Vec<Incoming> {
        self.decoded.drain(..).collect()
    }

    fn roundtrip(&mut self) -> Result<Vec<Incoming>, TransportError> {
        let callback = self.new_id();
        self.send(DISPLAY_OBJECT, WireMessage::Sync { callback })?;
        let deadline = Instant::now() + self.roundtrip_timeout;

        let mut events = Vec::new();
        loop {
            while let Some(event) = self.decoded.pop_front() {
                let done = event.object == callback
                    && matches!(event.message, WireMessage::Done { .. });
                if done {
                    return Ok(events);
                }
                events.push(event);
            }

            let backlog = self.flush()? == Flush::Pending;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::RoundtripTimeout(self.roundtrip_timeout));
            }
            self.wait_ready(backlog, remaining)?;
            if let Err(e) = self.read() {
                if self.decoded.is_empty() {
                    return Err(e);
                }
            }
        }
    }
}
