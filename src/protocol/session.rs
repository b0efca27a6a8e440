//! Session controller.
//!
//! One task owns everything: inbound line framing and decoding, the state
//! store, the operation tracker, and a small queue of scheduled work
//! (bootstrap query batches, the idle telemetry poll, operation deadlines,
//! delayed message clears, the post-reboot disconnect). Serializing all of it
//! through one `select!` loop keeps decoders and state mutations strictly
//! ordered - no two frames ever race against the store.
//!
//! Scheduled work is keyed by a session generation number; teardown bumps the
//! generation and drops the queue, so a timer armed before a disconnect can
//! never fire into a later session.

use anyhow::Result;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::SessionSettings;
use crate::metrics;
use crate::transport::{Link, LinkCommand, LinkCommandTx, LinkEvent, LinkEventRx};

use super::commands;
use super::decoder::{self, Response};
use super::dispatcher::DispatcherHandle;
use super::framer::LineFramer;
use super::operation::{OkOutcome, OperationKind, OperationTracker};
use super::state::{
    log_event, ConnectionState, LogDirection, LoraField, MqttSettings, Orientation, SharedLog,
    SharedState,
};

/// Timing knobs, normally taken from config. Tests shrink these.
#[derive(Debug, Clone)]
pub struct SessionTimings {
    pub settle_delay: Duration,
    pub radio_query_delay: Duration,
    pub poll_interval: Duration,
    pub calibrate_timeout: Duration,
    pub reboot_timeout: Duration,
    /// Delay between a device-config set command and the follow-up query
    /// batch that confirms it.
    pub set_requery_delay: Duration,
    /// Demo mode: no transmission, no polling.
    pub demo: bool,
}

impl Default for SessionTimings {
    fn default() -> Self {
        SessionTimings {
            settle_delay: Duration::from_millis(500),
            radio_query_delay: Duration::from_millis(2000),
            poll_interval: Duration::from_secs(10),
            calibrate_timeout: Duration::from_secs(30),
            reboot_timeout: Duration::from_secs(15),
            set_requery_delay: Duration::from_millis(500),
            demo: false,
        }
    }
}

impl SessionTimings {
    pub fn from_config(settings: &SessionSettings, demo: bool) -> Self {
        SessionTimings {
            settle_delay: settings.settle_delay(),
            radio_query_delay: settings.radio_query_delay(),
            poll_interval: settings.poll_interval(),
            calibrate_timeout: settings.calibrate_timeout(),
            reboot_timeout: settings.reboot_timeout(),
            set_requery_delay: settings.settle_delay(),
            demo,
        }
    }
}

/// Requests the presentation layer can make of a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Calibrate,
    Reboot,
    QueryTelemetry,
    /// The configuration view opened (or asked for a refresh).
    QueryConfig,
    QueryLora,
    QueryNbiot,
    SetThreshold(u16),
    SetOrientation(Orientation),
    SetRadarEnabled(bool),
    SetLora(LoraField, String),
    SetApn(String),
    SetMqtt(MqttSettings),
    NbConnect(bool),
    /// Arbitrary AT command passthrough; still paced by the dispatcher.
    Raw(String),
    Disconnect,
}

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) {
        let _ = self.tx.send(command);
    }

    pub fn disconnect(&self) {
        self.send(SessionCommand::Disconnect);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// First telemetry query + core config batch, after the settle delay.
    BootstrapQueries,
    /// LoRa and NB-IoT query batches, after the longer connect delay.
    RadioQueries,
    PollTelemetry,
    /// Clear the operation slot and its display message.
    ClearOperation,
    /// Post-reboot-ack transport disconnect.
    LinkDisconnect,
    /// Re-query the core config batch after a set command.
    ConfigRequery,
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    generation: u64,
    task: Pending,
}

pub struct Session {
    timings: SessionTimings,
    state: SharedState,
    log: SharedLog,
    dispatcher: DispatcherHandle,
    link_commands: LinkCommandTx,
    link_events: LinkEventRx,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
    framer: LineFramer,
    operation: OperationTracker,
    tasks: Vec<Scheduled>,
    generation: u64,
}

impl Session {
    pub fn new(
        timings: SessionTimings,
        dispatcher: DispatcherHandle,
        link: Link,
        state: SharedState,
        log: SharedLog,
    ) -> (Self, SessionHandle) {
        let (tx, commands_rx) = mpsc::unbounded_channel();
        let session = Session {
            timings,
            state,
            log,
            dispatcher,
            link_commands: link.commands,
            link_events: link.events,
            commands_rx,
            framer: LineFramer::new(),
            operation: OperationTracker::new(),
            tasks: Vec::new(),
            generation: 0,
        };
        (session, SessionHandle { tx })
    }

    /// Run until the link drops or a disconnect is requested.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "session started{}",
            if self.timings.demo { " (demo mode)" } else { "" }
        );
        if let Ok(mut st) = self.state.lock() {
            st.connection = ConnectionState::Connected;
        }
        log_event(&self.log, LogDirection::Info, "Connected");

        self.schedule(self.timings.settle_delay, Pending::BootstrapQueries);
        self.schedule(self.timings.radio_query_delay, Pending::RadioQueries);
        self.arm_poll();

        loop {
            let next_due = self.next_due();
            tokio::select! {
                ev = self.link_events.recv() => {
                    match ev {
                        Some(LinkEvent::Data(chunk)) => self.on_data(&chunk),
                        // Transport-initiated loss takes the exact same
                        // teardown path as a requested disconnect.
                        Some(LinkEvent::Disconnected) | None => {
                            self.teardown("link lost");
                            break;
                        }
                    }
                }
                cmd = self.commands_rx.recv() => {
                    match cmd {
                        Some(command) => {
                            if self.on_command(command) {
                                break;
                            }
                        }
                        None => {
                            let _ = self.link_commands.send(LinkCommand::Disconnect);
                            self.teardown("controller handle dropped");
                            break;
                        }
                    }
                }
                _ = sleep_until_opt(next_due) => {
                    if self.run_due_tasks() {
                        break;
                    }
                }
            }
        }

        self.dispatcher.shutdown().await;
        info!("session ended");
        Ok(())
    }

    // ---- inbound ----------------------------------------------------------

    fn on_data(&mut self, chunk: &[u8]) {
        for line in self.framer.push(chunk) {
            log_event(&self.log, LogDirection::Rx, line.clone());
            debug!("RX {}", line);
            self.on_line(&line);
        }
    }

    fn on_line(&mut self, line: &str) {
        match decoder::decode(line) {
            Ok(Some(response)) => {
                metrics::inc_lines_decoded();
                self.on_response(response);
            }
            Ok(None) => {
                metrics::inc_lines_unmatched();
                debug!("unhandled line: {}", line);
            }
            Err(e) => {
                metrics::inc_frame_parse_errors();
                log_event(&self.log, LogDirection::Error, e.to_string());
                warn!("frame discarded: {}", e);
            }
        }
    }

    fn on_response(&mut self, response: Response) {
        match response {
            Response::CaliProgress { remaining } => {
                let was_active = self.operation.is_active();
                self.operation
                    .on_progress(remaining.as_deref(), self.timings.calibrate_timeout);
                if !was_active {
                    // Device-initiated calibration: adopt it and suspend the
                    // idle poll for its duration.
                    self.cancel_poll();
                }
                self.sync_operation_message();
            }
            Response::Ok => match self.operation.on_ok() {
                OkOutcome::CalibrationSuccess => {
                    info!("calibration successful");
                    self.sync_operation_message();
                    self.schedule(Duration::from_secs(2), Pending::ClearOperation);
                }
                OkOutcome::RebootAcknowledged => {
                    info!("reboot acknowledged; disconnecting shortly");
                    self.sync_operation_message();
                    self.schedule(Duration::from_millis(500), Pending::LinkDisconnect);
                }
                OkOutcome::Generic => {
                    // No tracked operation. Harmless: just make sure any
                    // stale message goes away soon.
                    self.schedule(Duration::from_secs(1), Pending::ClearOperation);
                }
            },
            Response::Error => {
                self.operation.on_error();
                if let Ok(mut st) = self.state.lock() {
                    st.operation_message = Some("Operation Failed".to_string());
                }
                self.schedule(Duration::from_secs(3), Pending::ClearOperation);
            }
            data => {
                if let Ok(mut st) = self.state.lock() {
                    st.apply(&data);
                }
            }
        }
    }

    // ---- presentation commands --------------------------------------------

    /// Returns true when the session should exit.
    fn on_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Calibrate => {
                if self.operation.is_active() {
                    warn!("ignoring calibrate: an operation is already in flight");
                    return false;
                }
                self.operation.begin(
                    OperationKind::Calibrating,
                    "Initializing Calibration...",
                    self.timings.calibrate_timeout,
                );
                self.sync_operation_message();
                self.cancel_poll();
                self.dispatcher.send(commands::CALIBRATE);
            }
            SessionCommand::Reboot => {
                if self.operation.is_active() {
                    warn!("ignoring reboot: an operation is already in flight");
                    return false;
                }
                self.operation.begin(
                    OperationKind::Rebooting,
                    "Rebooting...",
                    self.timings.reboot_timeout,
                );
                self.sync_operation_message();
                self.cancel_poll();
                self.dispatcher.send(commands::REBOOT);
            }
            SessionCommand::QueryTelemetry => self.dispatcher.send(commands::QUERY_TELEMETRY),
            SessionCommand::QueryConfig => self.dispatcher.send_batch(commands::config_query_batch()),
            SessionCommand::QueryLora => self.dispatcher.send_batch(commands::lora_query_batch()),
            SessionCommand::QueryNbiot => self.dispatcher.send_batch(commands::nbiot_query_batch()),
            SessionCommand::SetThreshold(cm) => {
                self.dispatcher.send(commands::set_threshold(cm));
                self.schedule(self.timings.set_requery_delay, Pending::ConfigRequery);
            }
            SessionCommand::SetOrientation(orientation) => {
                self.dispatcher.send(commands::set_orientation(orientation));
                self.schedule(self.timings.set_requery_delay, Pending::ConfigRequery);
            }
            SessionCommand::SetRadarEnabled(enabled) => {
                self.dispatcher.send(commands::set_radar_enabled(enabled));
                self.schedule(self.timings.set_requery_delay, Pending::ConfigRequery);
            }
            SessionCommand::SetLora(field, value) => {
                self.dispatcher.send(commands::set_lora_field(field, &value));
            }
            SessionCommand::SetApn(apn) => self.dispatcher.send(commands::set_apn(&apn)),
            SessionCommand::SetMqtt(mqtt) => self.dispatcher.send(commands::set_mqtt(&mqtt)),
            SessionCommand::NbConnect(up) => self.dispatcher.send(commands::nb_connect(up)),
            SessionCommand::Raw(raw) => self.dispatcher.send(raw),
            SessionCommand::Disconnect => {
                let _ = self.link_commands.send(LinkCommand::Disconnect);
                self.teardown("disconnect requested");
                return true;
            }
        }
        false
    }

    // ---- scheduled work ----------------------------------------------------

    fn schedule(&mut self, delay: Duration, task: Pending) {
        self.tasks.push(Scheduled {
            due: Instant::now() + delay,
            generation: self.generation,
            task,
        });
    }

    fn next_due(&self) -> Option<Instant> {
        let task_due = self.tasks.iter().map(|t| t.due).min();
        match (task_due, self.operation.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Returns true when the session should exit (post-reboot disconnect).
    fn run_due_tasks(&mut self) -> bool {
        let now = Instant::now();

        if let Some(kind) = self.operation.poll_timeout(now) {
            warn!("{} timed out", kind.as_str());
            log_event(
                &self.log,
                LogDirection::Error,
                format!("{} timed out", kind.as_str()),
            );
            self.sync_operation_message();
            self.schedule(Duration::from_secs(3), Pending::ClearOperation);
        }

        let mut due = Vec::new();
        self.tasks.retain(|t| {
            if t.due <= now {
                due.push((t.generation, t.task));
                false
            } else {
                true
            }
        });

        let mut exit = false;
        for (generation, task) in due {
            if generation != self.generation {
                continue;
            }
            match task {
                Pending::BootstrapQueries => {
                    self.dispatcher.send(commands::QUERY_TELEMETRY);
                    self.dispatcher.send_batch(commands::config_query_batch());
                }
                Pending::RadioQueries => {
                    self.dispatcher.send_batch(commands::lora_query_batch());
                    self.dispatcher.send_batch(commands::nbiot_query_batch());
                }
                Pending::PollTelemetry => {
                    if !self.operation.is_active() {
                        self.dispatcher.send(commands::QUERY_TELEMETRY);
                        self.schedule(self.timings.poll_interval, Pending::PollTelemetry);
                    }
                }
                Pending::ClearOperation => {
                    self.operation.clear();
                    if let Ok(mut st) = self.state.lock() {
                        st.operation_message = None;
                    }
                    // Re-arm the idle poll unless one is already counting down.
                    if !self.tasks.iter().any(|t| t.task == Pending::PollTelemetry) {
                        self.arm_poll();
                    }
                }
                Pending::ConfigRequery => {
                    self.dispatcher.send_batch(commands::config_query_batch());
                }
                Pending::LinkDisconnect => {
                    let _ = self.link_commands.send(LinkCommand::Disconnect);
                    self.teardown("device rebooting");
                    exit = true;
                }
            }
        }
        exit
    }

    fn arm_poll(&mut self) {
        if self.timings.demo {
            return;
        }
        self.cancel_poll();
        self.schedule(self.timings.poll_interval, Pending::PollTelemetry);
    }

    fn cancel_poll(&mut self) {
        self.tasks.retain(|t| t.task != Pending::PollTelemetry);
    }

    fn sync_operation_message(&mut self) {
        let message = self.operation.message().map(str::to_string);
        if let Ok(mut st) = self.state.lock() {
            st.operation_message = message;
        }
    }

    /// The one teardown path, shared by every way a session can end.
    fn teardown(&mut self, reason: &str) {
        info!("session teardown: {}", reason);
        self.generation = self.generation.wrapping_add(1);
        self.tasks.clear();
        self.framer.clear();
        self.operation.clear();
        self.dispatcher.clear_pending();
        if let Ok(mut st) = self.state.lock() {
            st.reset_for_disconnect();
        }
        log_event(
            &self.log,
            LogDirection::Info,
            format!("Disconnected ({})", reason),
        );
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
