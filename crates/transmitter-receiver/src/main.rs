//! transmitter-receiver entry point.
//!
//! Binds the listening socket and serves transmitter connections until
//! Ctrl-C.
//!
//! ```text
//! main()
//!  └─ parse CLI, init logging
//!  └─ bind(--bind:--port)
//!  └─ run_server            -- one Tokio task per transmitter
//!  └─ Ctrl-C                -- clears the running flag
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use transmitter_core::protocol::messages::seat_capabilities;
use transmitter_receiver::application::session::SessionConfig;
use transmitter_receiver::infrastructure::network::{self, ServerConfig};

/// Minimal remote display server for the transmitter.
#[derive(Debug, Parser)]
#[command(name = "transmitter-receiver", version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0", env = "RECEIVER_BIND")]
    bind: IpAddr,

    /// TCP port to listen on.
    #[arg(long, short, default_value_t = 34400, env = "RECEIVER_PORT")]
    port: u16,

    /// Announce a pointer on every seat.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pointer: bool,

    /// Announce a keyboard on every seat.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    keyboard: bool,

    /// Announce a touch device on every seat.
    #[arg(long)]
    touch: bool,

    /// Width requested from each new ivi surface (needs --configure-height).
    #[arg(long, requires = "configure_height")]
    configure_width: Option<i32>,

    /// Height requested from each new ivi surface (needs --configure-width).
    #[arg(long, requires = "configure_width")]
    configure_height: Option<i32>,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        let mut capabilities = 0;
        if self.pointer {
            capabilities |= seat_capabilities::POINTER;
        }
        if self.keyboard {
            capabilities |= seat_capabilities::KEYBOARD;
        }
        if self.touch {
            capabilities |= seat_capabilities::TOUCH;
        }
        SessionConfig {
            seat_capabilities: capabilities,
            ivi_configure: self.configure_width.zip(self.configure_height),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = SocketAddr::new(cli.bind, cli.port);
    let listener = network::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    let config = ServerConfig { session: cli.session_config() };
    network::run_server(listener, config, running).await;

    info!("receiver stopped");
    Ok(())
}
