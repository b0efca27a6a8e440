//! End-to-end session scenarios over injected link channels: the session and
//! dispatcher run for real, with the test standing in for the transport.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use swiott::protocol::dispatcher::{start_dispatcher, DispatcherConfig};
use swiott::protocol::session::{Session, SessionCommand, SessionHandle, SessionTimings};
use swiott::protocol::state::{ConnectionState, DeviceState, LogBuffer, SharedState};
use swiott::transport::{Link, LinkCommand, LinkEvent};

struct Harness {
    handle: SessionHandle,
    state: SharedState,
    /// Feed inbound bytes as the device would.
    device_tx: mpsc::UnboundedSender<LinkEvent>,
    /// Observe everything the engine pushes at the transport.
    link_rx: mpsc::UnboundedReceiver<LinkCommand>,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

/// Timings with bootstrap and polling pushed out of the way so a scenario
/// only sees the traffic it provokes.
fn quiet_timings() -> SessionTimings {
    SessionTimings {
        settle_delay: Duration::from_secs(60),
        radio_query_delay: Duration::from_secs(60),
        poll_interval: Duration::from_secs(60),
        calibrate_timeout: Duration::from_secs(5),
        reboot_timeout: Duration::from_secs(5),
        set_requery_delay: Duration::from_millis(50),
        demo: false,
    }
}

fn start(timings: SessionTimings) -> Harness {
    let (cmd_tx, link_rx) = mpsc::unbounded_channel();
    let (device_tx, event_rx) = mpsc::unbounded_channel();
    let link = Link { commands: cmd_tx, events: event_rx };
    let state = DeviceState::shared();
    let log = LogBuffer::shared();
    let dispatcher = start_dispatcher(
        DispatcherConfig::default(),
        link.commands.clone(),
        log.clone(),
    );
    let (session, handle) = Session::new(timings, dispatcher, link, state.clone(), log);
    let task = tokio::spawn(session.run());
    Harness { handle, state, device_tx, link_rx, task }
}

impl Harness {
    fn feed(&self, bytes: &[u8]) {
        self.device_tx
            .send(LinkEvent::Data(bytes.to_vec()))
            .expect("session gone");
    }

    async fn expect_send(&mut self, wanted: &str) -> Instant {
        loop {
            let cmd = timeout(Duration::from_secs(3), self.link_rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for '{}'", wanted))
                .expect("link channel closed");
            match cmd {
                LinkCommand::Send(bytes) => {
                    let line = String::from_utf8(bytes).expect("utf8");
                    if line.trim_end() == wanted {
                        return Instant::now();
                    }
                }
                LinkCommand::Disconnect => panic!("unexpected disconnect while waiting for '{}'", wanted),
            }
        }
    }

    async fn expect_disconnect(&mut self) -> Instant {
        loop {
            let cmd = timeout(Duration::from_secs(3), self.link_rx.recv())
                .await
                .expect("timed out waiting for disconnect")
                .expect("link channel closed");
            if cmd == LinkCommand::Disconnect {
                return Instant::now();
            }
        }
    }

    fn operation_message(&self) -> Option<String> {
        self.state.lock().unwrap().operation_message.clone()
    }

    async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn calibrate_progress_ok_success_without_disconnect() {
    let mut h = start(quiet_timings());

    h.handle.send(SessionCommand::Calibrate);
    h.expect_send("AT+SWRDCALI").await;
    assert_eq!(h.operation_message().as_deref(), Some("Initializing Calibration..."));

    h.feed(b"+SWRDCALI:1,7\r\n");
    h.settle().await;
    assert_eq!(h.operation_message().as_deref(), Some("Calibrating: 7s left..."));

    h.feed(b"OK\r\n");
    h.settle().await;
    assert_eq!(h.operation_message().as_deref(), Some("Calibration Successful!"));

    // Success clears after ~2s and never touches the link.
    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert_eq!(h.operation_message(), None);
    loop {
        match h.link_rx.try_recv() {
            Ok(LinkCommand::Send(_)) => continue,
            Ok(LinkCommand::Disconnect) => panic!("calibration must not disconnect"),
            Err(_) => break,
        }
    }

    h.handle.disconnect();
    h.task.await.expect("join").expect("session result");
}

#[tokio::test]
async fn reboot_ok_disconnects_and_resets() {
    let mut h = start(quiet_timings());

    // Put something into telemetry so the reset is observable.
    h.feed(b"+SWQUERY:1E3202060A1400500032006400\r\n");
    h.settle().await;
    assert_eq!(h.state.lock().unwrap().telemetry.battery, 50);

    h.handle.send(SessionCommand::Reboot);
    h.expect_send("AT+SWREBOOT").await;
    assert_eq!(h.operation_message().as_deref(), Some("Rebooting..."));

    let acked = Instant::now();
    h.feed(b"OK\r\n");
    let disconnected = h.expect_disconnect().await;
    let elapsed = disconnected - acked;
    assert!(
        elapsed >= Duration::from_millis(500) && elapsed <= Duration::from_millis(650),
        "disconnect after {:?}, expected 500-600ms",
        elapsed
    );

    // Full session reset: telemetry wiped, operation cleared, state marked
    // disconnected, session task finished.
    h.task.await.expect("join").expect("session result");
    let st = h.state.lock().unwrap();
    assert_eq!(st.connection, ConnectionState::Disconnected);
    assert_eq!(st.telemetry.battery, 0);
    assert_eq!(st.operation_message, None);
}

#[tokio::test]
async fn error_line_fails_the_operation() {
    let mut h = start(quiet_timings());

    h.handle.send(SessionCommand::Calibrate);
    h.expect_send("AT+SWRDCALI").await;
    h.feed(b"ERROR\r\n");
    h.settle().await;
    assert_eq!(h.operation_message().as_deref(), Some("Operation Failed"));

    h.handle.disconnect();
    h.task.await.expect("join").expect("session result");
}

#[tokio::test]
async fn second_activation_is_refused_while_in_flight() {
    let mut h = start(quiet_timings());

    h.handle.send(SessionCommand::Calibrate);
    h.expect_send("AT+SWRDCALI").await;
    h.handle.send(SessionCommand::Reboot);
    h.settle().await;
    // Still calibrating; no reboot command may have been queued.
    assert_eq!(h.operation_message().as_deref(), Some("Initializing Calibration..."));
    tokio::time::sleep(Duration::from_millis(400)).await;
    loop {
        match h.link_rx.try_recv() {
            Ok(LinkCommand::Send(bytes)) => {
                assert_ne!(String::from_utf8(bytes).unwrap().trim_end(), "AT+SWREBOOT");
            }
            Ok(LinkCommand::Disconnect) => panic!("unexpected disconnect"),
            Err(_) => break,
        }
    }

    h.handle.disconnect();
    h.task.await.expect("join").expect("session result");
}

#[tokio::test]
async fn bootstrap_issues_telemetry_then_config_queries() {
    let timings = SessionTimings {
        settle_delay: Duration::from_millis(20),
        radio_query_delay: Duration::from_secs(60),
        poll_interval: Duration::from_secs(60),
        ..quiet_timings()
    };
    let mut h = start(timings);

    h.expect_send("AT+SWQUERY?").await;
    h.expect_send("AT+SWRDTARTH?").await;
    h.expect_send("AT+SWRDPARKTYPE?").await;
    h.expect_send("AT+SWRDENABLE?").await;

    h.handle.disconnect();
    h.task.await.expect("join").expect("session result");
}

#[tokio::test]
async fn poll_is_suspended_while_an_operation_is_active() {
    let timings = SessionTimings {
        poll_interval: Duration::from_millis(400),
        ..quiet_timings()
    };
    let mut h = start(timings);

    // First idle poll arrives.
    h.expect_send("AT+SWQUERY?").await;

    h.handle.send(SessionCommand::Calibrate);
    h.expect_send("AT+SWRDCALI").await;

    // Two poll intervals pass with the operation active: no telemetry query
    // may be auto-issued.
    tokio::time::sleep(Duration::from_millis(900)).await;
    loop {
        match h.link_rx.try_recv() {
            Ok(LinkCommand::Send(bytes)) => {
                let line = String::from_utf8(bytes).unwrap();
                assert_ne!(line.trim_end(), "AT+SWQUERY?", "poll fired during an operation");
            }
            Ok(LinkCommand::Disconnect) => panic!("unexpected disconnect"),
            Err(_) => break,
        }
    }

    h.handle.disconnect();
    h.task.await.expect("join").expect("session result");
}

#[tokio::test]
async fn transport_disconnect_takes_the_same_teardown_path() {
    let h = start(quiet_timings());

    h.feed(b"+SWQUERY:1E3202060A1400500032006400\r\n");
    h.settle().await;
    h.device_tx.send(LinkEvent::Disconnected).expect("session gone");

    h.task.await.expect("join").expect("session result");
    let st = h.state.lock().unwrap();
    assert_eq!(st.connection, ConnectionState::Disconnected);
    assert_eq!(st.telemetry.battery, 0);
    assert_eq!(st.operation_message, None);
}

#[tokio::test]
async fn set_command_triggers_config_requery() {
    let mut h = start(quiet_timings());

    h.handle.send(SessionCommand::SetThreshold(45));
    h.expect_send("AT+SWRDTARTH=45").await;
    // After the requery delay the config batch goes back out.
    h.expect_send("AT+SWRDTARTH?").await;
    h.expect_send("AT+SWRDPARKTYPE?").await;
    h.expect_send("AT+SWRDENABLE?").await;

    h.handle.disconnect();
    h.task.await.expect("join").expect("session result");
}
