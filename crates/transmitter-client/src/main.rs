//! Transmitter client entry point.
//!
//! Loads the remote list from a TOML file, connects to every remote in the
//! background, and, with `--demo-ivi-id`, streams one placeholder surface to
//! each remote that becomes ready.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()               -- remotes + timing
//!  └─ Transmitter::with_options() -- poll loop + TCP transport
//!  └─ connect_remotes()           -- arms the first establish timers
//!  └─ loop
//!       ├─ run_once(frame interval)  -> timers, socket readiness
//!       ├─ observer events           -> log, push demo surfaces on READY
//!       └─ gather_surface_state()    -> one frame per demo surface
//! ```
//!
//! The loop itself is synchronous.  A small Tokio runtime on a helper thread
//! only waits for Ctrl-C and flips the shutdown flag.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use transmitter_core::ConnectionStatus;

use transmitter_client::application::transmitter::{Transmitter, TransmitterEvent};
use transmitter_client::infrastructure::event_loop::PollEventLoop;
use transmitter_client::infrastructure::frames::PlaceholderFrames;
use transmitter_client::infrastructure::network::TcpTransport;
use transmitter_client::infrastructure::storage::config::{load_config, save_config, AppConfig};
use transmitter_client::{HostSurface, HostSurfaceId, RemoteId, SurfaceHandle};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "transmitter", about = "Stream compositor surfaces to remote displays")]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, short, default_value = "transmitter.toml", env = "TRANSMITTER_CONFIG")]
    config: PathBuf,

    /// Write a default configuration to `--config` and exit.
    #[arg(long)]
    write_default_config: bool,

    /// Push a placeholder surface with this ivi id to every ready remote.
    #[arg(long, env = "TRANSMITTER_DEMO_IVI_ID")]
    demo_ivi_id: Option<u32>,

    /// Size of the placeholder surface.
    #[arg(long, default_value_t = 640)]
    demo_width: i32,
    #[arg(long, default_value_t = 480)]
    demo_height: i32,

    /// Milliseconds between gathered frames.
    #[arg(long, default_value_t = 16)]
    frame_interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.write_default_config {
        save_config(&cli.config, &AppConfig::default())
            .with_context(|| format!("writing {}", cli.config.display()))?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.transmitter.log_level)),
        )
        .init();

    let descriptors = config.descriptors().context("invalid remote configuration")?;
    if descriptors.is_empty() {
        warn!(config = %cli.config.display(), "no remotes configured; nothing to do");
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    spawn_ctrl_c_watcher(Arc::clone(&running))?;

    let section = &config.transmitter;
    let mut transmitter = Transmitter::with_options(
        PollEventLoop::new(),
        TcpTransport::new(section.connect_timeout(), section.roundtrip_timeout()),
        Box::new(PlaceholderFrames::new(cli.demo_width, cli.demo_height)),
        section.options(),
    );
    let (events_tx, events_rx) = mpsc::channel();
    transmitter.register_connection_observer(events_tx);

    for descriptor in descriptors {
        transmitter.add_remote(descriptor);
    }
    transmitter.connect_remotes();

    let frame_interval = Duration::from_millis(cli.frame_interval_ms);
    let mut demo_surfaces: BTreeMap<RemoteId, SurfaceHandle> = BTreeMap::new();

    info!("transmitter running; press Ctrl-C to stop");
    while running.load(Ordering::Relaxed) {
        transmitter
            .run_once(Some(frame_interval))
            .context("event loop failed")?;

        for event in events_rx.try_iter() {
            match event {
                TransmitterEvent::StatusChanged { remote, status } => {
                    info!(%remote, %status, "remote status");
                    if status == ConnectionStatus::Ready {
                        if let Some(ivi_id) = cli.demo_ivi_id {
                            let surface = HostSurface {
                                id: HostSurfaceId(u64::from(remote.0)),
                                ivi_id: Some(ivi_id),
                            };
                            match transmitter.push_to_remote(surface, remote, None) {
                                Ok(handle) => {
                                    demo_surfaces.insert(remote, handle);
                                }
                                Err(e) => error!(%remote, error = %e, "demo surface push failed"),
                            }
                        }
                    }
                }
                TransmitterEvent::OutputCreated { remote, output } => {
                    info!(
                        %remote,
                        model = %output.model,
                        width = output.mode.width,
                        height = output.mode.height,
                        "remote output available"
                    );
                }
                TransmitterEvent::SeatCreated { remote, seat } => {
                    info!(%remote, seat = %seat.name, "remote seat available");
                }
                TransmitterEvent::OutputDestroyed { remote, output } => {
                    info!(%remote, model = %output.model, "remote output released");
                }
                TransmitterEvent::SeatDestroyed { remote, seat } => {
                    info!(%remote, seat = %seat.name, "remote seat released");
                }
                TransmitterEvent::SeatCapabilitiesChanged { remote, capabilities } => {
                    info!(%remote, ?capabilities, "remote seat capabilities");
                }
                TransmitterEvent::EstablishRequested { .. } => {}
            }
        }

        for handle in demo_surfaces.values() {
            transmitter.gather_surface_state(*handle);
        }
    }

    info!("shutting down");
    for handle in demo_surfaces.into_values() {
        transmitter.destroy_surface(handle);
    }
    transmitter.shutdown();
    Ok(())
}

/// Waits for Ctrl-C on a helper thread running a single-threaded Tokio
/// runtime and clears `running` when it arrives.
fn spawn_ctrl_c_watcher(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                }
            });
            running.store(false, Ordering::Relaxed);
        })
        .context("spawning signal thread")?;
    Ok(())
}
