//! Integration tests for the connection manager state machine.
//!
//! # Purpose
//!
//! These tests drive a [`Transmitter`] through its public API exactly the way
//! a host would: configure remotes, call `connect_remotes`, then feed it loop
//! events with `run_once`.  The loop is a [`ManualEventLoop`] whose virtual
//! clock jumps straight to the next timer deadline, and the network is a
//! [`MockTransport`] whose server the tests script.  They verify:
//!
//! - The happy path: `Establishing` then `Ready`, with all four capabilities
//!   bound and the socket watched for reads.
//! - Recovery: a hang-up yields `Disconnected`, the retry timer fires after
//!   about a millisecond, and the next establish attempt follows the 2 s
//!   establish period.
//! - Failure pacing: refused connections re-arm the establish timer every 2 s
//!   without repeating the `Establishing` notification.
//! - Negotiation failures (missing capability, failed roundtrip, server
//!   error) take the disconnect path.
//! - Teardown: `destroy_remote`, `shutdown`, and drop release timers,
//!   watches, and connections.
//!
//! # Timeline of a reconnection
//!
//! ```text
//! t=0     connect_remotes        establish armed (1 ms)
//! t=1     establish fires        Establishing → Ready
//! t=1     HANGUP                 Ready → Disconnected, retry armed (1 ms)
//! t=2     retry fires            Disconnected → Establishing, establish armed (2000 ms)
//! t=2002  establish fires        Establishing → Ready
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use transmitter_client::application::transport::Incoming;
use transmitter_client::infrastructure::event_loop::ManualEventLoop;
use transmitter_client::infrastructure::frames::PlaceholderFrames;
use transmitter_client::infrastructure::network::{MockServer, MockTransport};
use transmitter_client::{
    EventLoop, Readiness, RemoteDescriptor, RemoteId, TimerToken, Transmitter, TransmitterError,
    TransmitterEvent,
};
use transmitter_core::protocol::messages::{
    seat_capabilities, ErrorMessage, MessageType, DISPLAY_OBJECT,
};
use transmitter_core::{CapabilityKind, ConnectionStatus, Endpoint, ObjectId, WireMessage};

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    transmitter: Transmitter<ManualEventLoop, MockTransport>,
    server: Rc<RefCell<MockServer>>,
    events: Receiver<TransmitterEvent>,
    remote: RemoteId,
}

fn descriptor(model: &str) -> RemoteDescriptor {
    RemoteDescriptor {
        model: model.to_string(),
        endpoint: Endpoint::new("10.0.0.2", 34400),
        width: 1920,
        height: 720,
    }
}

fn harness(server: MockServer) -> Harness {
    let transport = MockTransport::new(server);
    let server = transport.server();
    let mut transmitter = Transmitter::new(
        ManualEventLoop::new(),
        transport,
        Box::new(PlaceholderFrames::new(64, 48)),
    );
    let (tx, events) = mpsc::channel();
    transmitter.register_connection_observer(tx);
    let remote = transmitter.add_remote(descriptor("rear"));
    Harness { transmitter, server, events, remote }
}

/// A harness whose remote has completed its first establish attempt.
fn ready_harness() -> Harness {
    let mut h = harness(MockServer::full());
    h.transmitter.connect_remotes();
    h.transmitter.run_once(None).unwrap();
    assert_eq!(h.transmitter.status(h.remote), Some(ConnectionStatus::Ready));
    drain_statuses(&h.events);
    h
}

fn drain_statuses(events: &Receiver<TransmitterEvent>) -> Vec<ConnectionStatus> {
    events
        .try_iter()
        .filter_map(|event| match event {
            TransmitterEvent::StatusChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect()
}

fn registry(h: &Harness) -> ObjectId {
    h.server.borrow().registry.expect("registry requested")
}

// ── Happy path ────────────────────────────────────────────────────────────────

/// Connect, negotiate all four capabilities, and report `Ready` exactly once.
#[test]
fn test_first_connection_reaches_ready() {
    // Arrange
    let mut h = harness(MockServer::full());

    // Act
    let started = h.transmitter.connect_remotes();
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert_eq!(started, 1);
    assert_eq!(
        drain_statuses(&h.events),
        vec![ConnectionStatus::Establishing, ConnectionStatus::Ready]
    );
    let server = h.server.borrow();
    assert_eq!(server.received_of(MessageType::Bind).len(), 4);
    for kind in CapabilityKind::ALL {
        assert!(server.bound_id(kind.interface()).is_some(), "{kind} not bound");
    }
    let (_, interest) = h.transmitter.event_loop().watch(h.remote).expect("watch registered");
    assert_eq!(interest, Readiness::READABLE);
}

/// `connect_remotes` announces the remote's output and seat and only starts
/// each remote once.
#[test]
fn test_connect_remotes_announces_output_and_seat_once() {
    let mut h = harness(MockServer::full());

    let first = h.transmitter.connect_remotes();
    let second = h.transmitter.connect_remotes();

    assert_eq!((first, second), (1, 0));
    let events: Vec<TransmitterEvent> = h.events.try_iter().collect();
    assert!(events.contains(&TransmitterEvent::EstablishRequested { remote: h.remote }));
    let output = events
        .iter()
        .find_map(|event| match event {
            TransmitterEvent::OutputCreated { output, .. } => Some(output.clone()),
            _ => None,
        })
        .expect("output announced");
    assert_eq!(output.model, "rear");
    assert_eq!((output.mode.width, output.mode.height, output.mode.refresh), (1920, 720, 60));
    assert_eq!(h.transmitter.seats(h.remote)[0].name, "rear-seat");
    assert_eq!(
        h.transmitter.event_loop().remaining(TimerToken::establish(h.remote)),
        Some(Duration::from_millis(1))
    );
}

// ── Recovery ──────────────────────────────────────────────────────────────────

/// Hang-up, retry, and reconnect with the expected pacing and notifications.
#[test]
fn test_hangup_disconnects_and_reconnects_after_establish_period() {
    // Arrange
    let mut h = ready_harness();
    let retry = TimerToken::retry(h.remote);
    let establish = TimerToken::establish(h.remote);

    // Act: remote hangs up.
    h.transmitter.event_loop_mut().inject(h.remote, Readiness::HANGUP);
    h.transmitter.run_once(None).unwrap();

    // Assert: disconnected, connection closed, retry imminent.
    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Disconnected]);
    assert_eq!(h.server.borrow().open_wires, 0);
    assert!(h.transmitter.event_loop().watch(h.remote).is_none());
    assert_eq!(
        h.transmitter.event_loop().remaining(retry),
        Some(Duration::from_millis(1))
    );

    // Act: retry fires.
    h.transmitter.run_once(None).unwrap();

    // Assert: back to establishing, next attempt after the establish period.
    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Establishing]);
    assert_eq!(
        h.transmitter.event_loop().remaining(establish),
        Some(Duration::from_millis(2000))
    );

    // Act: establish fires.
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Ready]);
    assert_eq!(h.transmitter.event_loop().now(), Duration::from_millis(2002));
    assert_eq!(h.server.borrow().connect_attempts.len(), 2);
    assert_eq!(h.server.borrow().open_wires, 1);
}

#[test]
fn test_socket_error_disconnects() {
    let mut h = ready_harness();

    h.transmitter.event_loop_mut().inject(h.remote, Readiness::ERROR | Readiness::READABLE);
    h.transmitter.run_once(None).unwrap();

    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Disconnected]);
}

#[test]
fn test_read_failure_disconnects() {
    let mut h = ready_harness();
    h.server.borrow_mut().fail_read = true;

    h.transmitter.event_loop_mut().inject(h.remote, Readiness::READABLE);
    h.transmitter.run_once(None).unwrap();

    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Disconnected]);
}

/// A readiness notification that raced the connection's teardown is dropped.
#[test]
fn test_readiness_after_teardown_is_ignored() {
    // Arrange
    let mut h = ready_harness();
    h.transmitter.event_loop_mut().inject(h.remote, Readiness::HANGUP);
    h.transmitter.run_once(None).unwrap();
    drain_statuses(&h.events);

    // Act
    h.transmitter.event_loop_mut().inject(h.remote, Readiness::READABLE);
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert!(drain_statuses(&h.events).is_empty());
    assert_eq!(h.transmitter.status(h.remote), Some(ConnectionStatus::Disconnected));
}

/// While connected, the retry timer only re-arms itself at the retry period.
#[test]
fn test_retry_timer_on_healthy_connection_rearms() {
    let mut h = ready_harness();
    let retry = TimerToken::retry(h.remote);
    h.transmitter
        .event_loop_mut()
        .arm_timer(retry, Duration::from_millis(1));

    h.transmitter.run_once(None).unwrap();

    assert!(drain_statuses(&h.events).is_empty());
    assert_eq!(
        h.transmitter.event_loop().remaining(retry),
        Some(Duration::from_millis(5000))
    );
    assert_eq!(h.server.borrow().connect_attempts.len(), 1);
}

/// A stale establish expiry on a ready remote makes no new attempt.
#[test]
fn test_establish_timer_on_ready_remote_is_ignored() {
    let mut h = ready_harness();
    h.transmitter
        .event_loop_mut()
        .arm_timer(TimerToken::establish(h.remote), Duration::from_millis(1));

    h.transmitter.run_once(None).unwrap();

    assert!(drain_statuses(&h.events).is_empty());
    assert_eq!(h.server.borrow().connect_attempts.len(), 1);
    assert_eq!(h.server.borrow().open_wires, 1);
}

// ── Failure pacing ────────────────────────────────────────────────────────────

#[test]
fn test_refused_connection_retries_every_establish_period() {
    // Arrange
    let mut h = harness(MockServer { refuse_all: true, ..MockServer::full() });
    let establish = TimerToken::establish(h.remote);
    h.transmitter.connect_remotes();

    // Act: first attempt at t=1 ms.
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Establishing]);
    assert_eq!(
        h.transmitter.event_loop().remaining(establish),
        Some(Duration::from_millis(2000))
    );

    // Act: second attempt at t=2001 ms.
    h.transmitter.run_once(None).unwrap();

    // Assert: no repeated notification, same pacing.
    assert!(drain_statuses(&h.events).is_empty());
    assert_eq!(h.server.borrow().connect_attempts.len(), 2);
    assert_eq!(h.transmitter.event_loop().now(), Duration::from_millis(2001));
    assert!(h.transmitter.event_loop().is_armed(establish));
}

/// Two refused attempts, then success: one `Establishing`, one `Ready`,
/// and never `Disconnected`.
#[test]
fn test_two_refusals_then_success_reports_ready_once() {
    // Arrange
    let mut h = harness(MockServer { refuse_connections: 2, ..MockServer::full() });
    h.transmitter.connect_remotes();

    // Act: attempts at t=1, t=2001 and t=4001 ms.
    for _ in 0..3 {
        h.transmitter.run_once(None).unwrap();
    }

    // Assert
    assert_eq!(
        drain_statuses(&h.events),
        vec![ConnectionStatus::Establishing, ConnectionStatus::Ready]
    );
    assert_eq!(h.server.borrow().connect_attempts.len(), 3);
    assert_eq!(h.transmitter.event_loop().now(), Duration::from_millis(4001));
    assert_eq!(h.transmitter.status(h.remote), Some(ConnectionStatus::Ready));
}

#[test]
fn test_missing_capability_fails_negotiation() {
    // Arrange: no ivi application.
    let mut h = harness(MockServer::with_capabilities(&[
        CapabilityKind::Compositor,
        CapabilityKind::BlobFactory,
        CapabilityKind::Seat,
    ]));
    h.transmitter.connect_remotes();

    // Act
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert_eq!(
        drain_statuses(&h.events),
        vec![ConnectionStatus::Establishing, ConnectionStatus::Disconnected]
    );
    assert_eq!(h.server.borrow().open_wires, 0);
    assert_eq!(
        h.transmitter.event_loop().remaining(TimerToken::retry(h.remote)),
        Some(Duration::from_millis(1))
    );
}

#[test]
fn test_failed_roundtrip_fails_negotiation() {
    let mut h = harness(MockServer { fail_roundtrip: true, ..MockServer::full() });
    h.transmitter.connect_remotes();

    h.transmitter.run_once(None).unwrap();

    assert_eq!(
        drain_statuses(&h.events),
        vec![ConnectionStatus::Establishing, ConnectionStatus::Disconnected]
    );
    assert!(h.transmitter.event_loop().watch(h.remote).is_none());
}

#[test]
fn test_server_error_during_negotiation_fails_it() {
    let error = WireMessage::Error(ErrorMessage {
        object: DISPLAY_OBJECT,
        code: 1,
        message: "no memory".to_string(),
    });
    let mut h = harness(MockServer {
        handshake_events: vec![Incoming::new(DISPLAY_OBJECT, error)],
        ..MockServer::full()
    });
    h.transmitter.connect_remotes();

    h.transmitter.run_once(None).unwrap();

    assert_eq!(h.transmitter.status(h.remote), Some(ConnectionStatus::Disconnected));
}

#[test]
fn test_watch_registration_failure_fails_negotiation() {
    let mut h = harness(MockServer::full());
    h.transmitter.event_loop_mut().refuse_watch = true;
    h.transmitter.connect_remotes();

    h.transmitter.run_once(None).unwrap();

    assert_eq!(h.transmitter.status(h.remote), Some(ConnectionStatus::Disconnected));
    assert_eq!(h.server.borrow().open_wires, 0);
}

/// After a failed negotiation the normal retry path leads to a new attempt.
#[test]
fn test_negotiation_failure_recovers_when_server_completes() {
    // Arrange
    let mut h = harness(MockServer { fail_roundtrip: true, ..MockServer::full() });
    h.transmitter.connect_remotes();
    h.transmitter.run_once(None).unwrap();
    h.server.borrow_mut().fail_roundtrip = false;

    // Act: retry, then establish.
    h.transmitter.run_once(None).unwrap();
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert_eq!(
        drain_statuses(&h.events),
        vec![
            ConnectionStatus::Establishing,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Establishing,
            ConnectionStatus::Ready,
        ]
    );
}

// ── Events on a live connection ───────────────────────────────────────────────

#[test]
fn test_removal_of_bound_capability_resets_connection() {
    // Arrange
    let mut h = ready_harness();
    let registry = registry(&h);
    h.server
        .borrow_mut()
        .push_event(registry, WireMessage::GlobalRemove { name: 3 });

    // Act
    h.transmitter.event_loop_mut().inject(h.remote, Readiness::READABLE);
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Disconnected]);
}

#[test]
fn test_removal_of_unknown_global_is_ignored() {
    let mut h = ready_harness();
    let registry = registry(&h);
    h.server
        .borrow_mut()
        .push_event(registry, WireMessage::GlobalRemove { name: 99 });

    h.transmitter.event_loop_mut().inject(h.remote, Readiness::READABLE);
    h.transmitter.run_once(None).unwrap();

    assert!(drain_statuses(&h.events).is_empty());
    assert_eq!(h.transmitter.status(h.remote), Some(ConnectionStatus::Ready));
}

#[test]
fn test_server_error_on_live_connection_disconnects() {
    let mut h = ready_harness();
    h.server.borrow_mut().push_event(
        DISPLAY_OBJECT,
        WireMessage::Error(ErrorMessage {
            object: ObjectId(9),
            code: 2,
            message: "invalid object".to_string(),
        }),
    );

    h.transmitter.event_loop_mut().inject(h.remote, Readiness::READABLE);
    h.transmitter.run_once(None).unwrap();

    assert_eq!(drain_statuses(&h.events), vec![ConnectionStatus::Disconnected]);
}

/// Seat capabilities request input devices; back-pressure on the resulting
/// flush adds writable interest until the queue drains.
#[test]
fn test_seat_capabilities_and_write_backpressure() {
    // Arrange
    let mut h = ready_harness();
    let seat = h.server.borrow().bound_id("wthp_seat").unwrap();
    {
        let mut server = h.server.borrow_mut();
        server.pending_flushes = 1;
        server.push_event(
            seat,
            WireMessage::SeatCapabilities {
                capabilities: seat_capabilities::POINTER | seat_capabilities::KEYBOARD,
            },
        );
    }

    // Act: readable; the reply cannot be flushed yet.
    h.transmitter.event_loop_mut().inject(h.remote, Readiness::READABLE);
    h.transmitter.run_once(None).unwrap();

    // Assert
    let (_, interest) = h.transmitter.event_loop().watch(h.remote).unwrap();
    assert!(interest.contains(Readiness::WRITABLE));
    assert!(h.server.borrow().received_of(MessageType::GetPointer).is_empty());
    let seats = h.transmitter.seats(h.remote);
    assert!(seats[0].capabilities.pointer && seats[0].capabilities.keyboard);
    assert!(h
        .events
        .try_iter()
        .any(|event| matches!(event, TransmitterEvent::SeatCapabilitiesChanged { .. })));

    // Act: writable.
    h.transmitter.event_loop_mut().inject(h.remote, Readiness::WRITABLE);
    h.transmitter.run_once(None).unwrap();

    // Assert
    let (_, interest) = h.transmitter.event_loop().watch(h.remote).unwrap();
    assert_eq!(interest, Readiness::READABLE);
    let server = h.server.borrow();
    assert_eq!(server.received_of(MessageType::GetPointer).len(), 1);
    assert_eq!(server.received_of(MessageType::GetKeyboard).len(), 1);
}

#[test]
fn test_remotes_fail_independently() {
    // Arrange
    let mut h = harness(MockServer::full());
    let front = h.transmitter.add_remote(descriptor("front"));
    h.transmitter.connect_remotes();
    h.transmitter.run_once(None).unwrap();
    assert_eq!(h.transmitter.status(front), Some(ConnectionStatus::Ready));

    // Act
    h.transmitter.event_loop_mut().inject(h.remote, Readiness::HANGUP);
    h.transmitter.run_once(None).unwrap();

    // Assert
    assert_eq!(h.transmitter.status(h.remote), Some(ConnectionStatus::Disconnected));
    assert_eq!(h.transmitter.status(front), Some(ConnectionStatus::Ready));
    assert_eq!(h.server.borrow().open_wires, 1);
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[test]
fn test_destroy_remote_releases_seat_and_output_without_status_change() {
    // Arrange
    let mut h = ready_harness();
    let remote = h.remote;

    // Act
    h.transmitter.destroy_remote(remote).unwrap();

    // Assert: the host is told to release the seat and output, nothing else.
    let events: Vec<TransmitterEvent> = h.events.try_iter().collect();
    assert_eq!(events.len(), 2, "got {events:?}");
    assert!(matches!(
        &events[0],
        TransmitterEvent::SeatDestroyed { remote: r, seat } if *r == remote && seat.name == "rear-seat"
    ));
    assert!(matches!(
        &events[1],
        TransmitterEvent::OutputDestroyed { remote: r, output } if *r == remote && output.model == "rear"
    ));
    assert_eq!(h.transmitter.status(remote), None);
    assert_eq!(h.server.borrow().open_wires, 0);
    let event_loop = h.transmitter.event_loop();
    assert!(event_loop.removed_watches.contains(&remote));
    assert!(!event_loop.is_armed(TimerToken::establish(remote)));
    assert!(!event_loop.is_armed(TimerToken::retry(remote)));
    assert_eq!(
        h.transmitter.destroy_remote(remote),
        Err(TransmitterError::UnknownRemote(remote))
    );
}

#[test]
fn test_destroy_remote_disarms_pending_establish() {
    let mut h = harness(MockServer::full());
    h.transmitter.connect_remotes();

    h.transmitter.destroy_remote(h.remote).unwrap();
    let events = h.transmitter.run_once(Some(Duration::from_secs(10))).unwrap();

    assert_eq!(events, 0);
    assert!(h.server.borrow().connect_attempts.is_empty());
}

#[test]
fn test_drop_closes_connections() {
    let h = ready_harness();
    let server = Rc::clone(&h.server);

    drop(h);

    assert_eq!(server.borrow().open_wires, 0);
}

#[test]
fn test_shutdown_is_idempotent() {
    let mut h = ready_harness();

    h.transmitter.shutdown();
    h.transmitter.shutdown();

    assert!(h.transmitter.remote_ids().is_empty());
    assert_eq!(h.server.borrow().open_wires, 0);
}
