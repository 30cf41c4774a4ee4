//! TCP server: accept loop and per-connection session tasks.
//!
//! Each accepted connection gets its own Tokio task that reads frames with
//! `read_exact` (header first, then the declared payload), feeds them to a
//! [`Session`], and writes the answering events back in order.  Serials are
//! drawn from one [`SerialCounter`] shared by every task.
//!
//! Shutdown is cooperative: the accept loop polls a shared `AtomicBool`
//! between short accept timeouts, the same way the session tasks stop when
//! their peer goes away.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use transmitter_core::protocol::codec::MAX_PAYLOAD_SIZE;
use transmitter_core::protocol::messages::HEADER_SIZE;
use transmitter_core::protocol::SerialCounter;
use transmitter_core::{decode_message, encode_message, ProtocolError};

use crate::application::session::{Session, SessionConfig, SessionStats};

const ACCEPT_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("frame of {0} bytes exceeds the payload limit")]
    FrameTooLarge(usize),
}

/// Settings shared by every connection of one server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub session: SessionConfig,
}

/// Binds the listening socket.
///
/// # Errors
///
/// Returns [`NetworkError::BindFailed`] if the address is in use or not
/// permitted.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source })
}

/// Accepts connections until `running` is cleared.
///
/// Connection tasks that are already running finish on their own when the
/// client disconnects.
pub async fn run_server(listener: TcpListener, config: ServerConfig, running: Arc<AtomicBool>) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "receiver listening");
    }
    let config = Arc::new(config);
    let serials = Arc::new(SerialCounter::new());

    while running.load(Ordering::Relaxed) {
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                info!(%peer, "transmitter connected");
                let config = Arc::clone(&config);
                let serials = Arc::clone(&serials);
                tokio::spawn(async move {
                    handle_connection(stream, peer, config, serials).await;
                });
            }
            Ok(Err(e)) => error!(error = %e, "accept failed"),
            Err(_) => {}
        }
    }
    info!("accept loop stopped");
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    serials: Arc<SerialCounter>,
) {
    match run_session(stream, &config, serials).await {
        Ok(stats) => info!(
            %peer,
            surfaces = stats.surfaces,
            buffers = stats.buffers,
            commits = stats.commits,
            "transmitter disconnected"
        ),
        Err(e) => warn!(%peer, error = %e, "session ended with error"),
    }
}

/// Serves one connection until the peer closes it or the session fails.
async fn run_session(
    mut stream: TcpStream,
    config: &ServerConfig,
    serials: Arc<SerialCounter>,
) -> Result<SessionStats, NetworkError> {
    stream.set_nodelay(true)?;
    let mut session = Session::new(config.session.clone(), serials);

    loop {
        let Some(frame) = read_frame(&mut stream).await? else {
            return Ok(session.stats());
        };
        let (object, message, _) = decode_message(&frame)?;
        debug!(%object, ty = ?message.message_type(), "request");

        let mut out = Vec::new();
        for (target, event) in session.handle(object, message) {
            out.extend_from_slice(&encode_message(target, &event)?);
        }
        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
        if session.is_terminated() {
            stream.shutdown().await?;
            return Ok(session.stats());
        }
    }
}

/// Reads one complete frame; `None` on a clean close between frames.
async fn read_frame(stream: &mut TcpStream) -> Result<Option<Vec<u8>>, NetworkError> {
    let mut frame = vec![0u8; HEADER_SIZE];
    match stream.read_exact(&mut frame).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let payload_len = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(NetworkError::FrameTooLarge(payload_len));
    }
    frame.resize(HEADER_SIZE + payload_len, 0);
    stream.read_exact(&mut frame[HEADER_SIZE..]).await?;
    Ok(Some(frame))
}
