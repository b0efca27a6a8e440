//! Latest-known-value store for everything the sensor reports.
//!
//! Decoded frames merge into these records field-by-field: a frame only ever
//! writes the fields it carries, so a CSV status frame and a binary telemetry
//! frame can interleave without clobbering each other. Telemetry is reset to
//! defaults exactly once, at disconnect; the config views keep their
//! last-known values so a reconnect starts from something useful.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::decoder::{Response, StatusFrame, TelemetryFrame};

/// Bounded protocol log capacity.
pub const LOG_CAPACITY: usize = 100;

pub type SharedState = Arc<Mutex<DeviceState>>;
pub type SharedLog = Arc<Mutex<LogBuffer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    None,
    Entry,
    Exit,
    Move,
}

impl EventType {
    /// Wire codes: 0 no event, 1 entry, 2 exit, 3 movement. Unknown codes
    /// read as no event.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => EventType::Entry,
            2 => EventType::Exit,
            3 => EventType::Move,
            _ => EventType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::None => "None",
            EventType::Entry => "Entry",
            EventType::Exit => "Exit",
            EventType::Move => "Move",
        }
    }
}

impl Default for EventType {
    fn default() -> Self {
        EventType::None
    }
}

/// Condition flags packed into the status byte of the binary telemetry frame.
/// Bits 1, 2, 3 and 6; everything else is reserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusFlags {
    pub high_mag: bool,
    pub low_battery: bool,
    pub water_cover: bool,
    pub low_rssi: bool,
}

impl StatusFlags {
    pub fn from_byte(status: u8) -> Self {
        StatusFlags {
            high_mag: status & (1 << 1) != 0,
            low_battery: status & (1 << 2) != 0,
            water_cover: status & (1 << 3) != 0,
            low_rssi: status & (1 << 6) != 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorTelemetry {
    pub occupied: bool,
    pub battery: u8,
    pub temperature: i16,
    pub rssi: i32,
    pub cover_value: u16,
    pub distance: u16,
    pub mag_value: i32,
    pub mag_x: i32,
    pub mag_y: i32,
    pub mag_z: i32,
    pub event: EventType,
    pub is_valid: bool,
    pub err_code: u16,
    pub park_count_24h: u8,
    pub park_count_hour: u8,
    pub status_byte: u8,
    pub flags: StatusFlags,
}

impl SensorTelemetry {
    /// Merge a binary telemetry frame: only the fields that frame carries.
    pub fn apply_telemetry(&mut self, frame: &TelemetryFrame) {
        self.temperature = frame.temperature;
        self.battery = frame.battery;
        self.status_byte = frame.status;
        self.flags = StatusFlags::from_byte(frame.status);
        self.park_count_24h = frame.park_count_24h;
        self.park_count_hour = frame.park_count_hour;
        self.mag_value = i32::from(frame.mag_value);
        self.rssi = i32::from(frame.rssi);
        self.cover_value = frame.cover_value;
        self.distance = frame.distance;
    }

    /// Merge a CSV status frame: only the fields that frame carries.
    pub fn apply_status(&mut self, frame: &StatusFrame) {
        self.event = frame.event;
        self.occupied = frame.occupied;
        self.mag_x = frame.mag_x;
        self.mag_y = frame.mag_y;
        self.mag_z = frame.mag_z;
        self.mag_value = frame.mag_value;
        self.rssi = frame.rssi;
        self.cover_value = frame.cover_value;
        self.distance = frame.distance;
        self.is_valid = frame.is_valid;
        self.err_code = frame.err_code;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceConfig {
    pub orientation: Option<Orientation>,
    /// Detection threshold in centimeters.
    pub threshold_cm: Option<u16>,
    pub radar_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoraField {
    DevEui,
    AppEui,
    DevAddr,
    AppSKey,
    NwkSKey,
    Region,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoraConfig {
    pub dev_eui: String,
    pub app_eui: String,
    pub dev_addr: String,
    pub app_s_key: String,
    pub nwk_s_key: String,
    pub region: String,
}

impl LoraConfig {
    pub fn set(&mut self, field: LoraField, value: String) {
        match field {
            LoraField::DevEui => self.dev_eui = value,
            LoraField::AppEui => self.app_eui = value,
            LoraField::DevAddr => self.dev_addr = value,
            LoraField::AppSKey => self.app_s_key = value,
            LoraField::NwkSKey => self.nwk_s_key = value,
            LoraField::Region => self.region = value,
        }
    }
}

/// NB-IoT modem registration state, from the first `+NBCONNECT:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NbStatus {
    Unknown,
    NotRegistered,
    RegisteredNoMqtt,
    Connected,
    Error,
}

impl NbStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NbStatus::Unknown => "Unknown",
            NbStatus::NotRegistered => "Not registered",
            NbStatus::RegisteredNoMqtt => "Registered (No MQTT)",
            NbStatus::Connected => "Connected",
            NbStatus::Error => "Error",
        }
    }
}

/// MQTT broker parameters as reported (and sent) over the wire. Everything is
/// kept as strings: the firmware echoes these fields verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MqttSettings {
    pub host: String,
    pub port: String,
    pub user: String,
    pub pass: String,
    pub clean_session: String,
    pub keepalive: String,
    pub ssl: String,
}

/// Modem identity and signal report from `+NBCONNECT:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NbLinkReport {
    pub status: NbStatus,
    pub imei: String,
    pub imsi: String,
    pub ccid: String,
    pub band: String,
    pub operator: String,
    pub rssi: String,
    pub snr: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NbiotConfig {
    pub apn: String,
    pub mqtt: MqttSettings,
    pub status: NbStatus,
    pub imei: String,
    pub imsi: String,
    pub ccid: String,
    pub band: String,
    pub operator: String,
    pub rssi: String,
    pub snr: String,
}

impl Default for NbiotConfig {
    fn default() -> Self {
        NbiotConfig {
            apn: String::new(),
            mqtt: MqttSettings { ssl: "0".to_string(), ..Default::default() },
            status: NbStatus::Unknown,
            imei: String::new(),
            imsi: String::new(),
            ccid: String::new(),
            band: String::new(),
            operator: String::new(),
            rssi: String::new(),
            snr: String::new(),
        }
    }
}

/// The whole session-visible state. Mutated only by the session loop; read by
/// the presentation layer through the shared handle.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    pub connection: ConnectionState,
    pub telemetry: SensorTelemetry,
    pub device: DeviceConfig,
    pub lora: LoraConfig,
    pub nbiot: NbiotConfig,
    /// Human-readable status of the in-flight operation, if any.
    pub operation_message: Option<String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            connection: ConnectionState::Disconnected,
            telemetry: SensorTelemetry::default(),
            device: DeviceConfig::default(),
            lora: LoraConfig::default(),
            nbiot: NbiotConfig::default(),
            operation_message: None,
        }
    }
}

impl DeviceState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(DeviceState::default()))
    }

    /// Merge one decoded data frame. Operation signals (`OK`/`ERROR`/progress)
    /// are protocol control flow and are handled by the session, not here.
    pub fn apply(&mut self, response: &Response) {
        match response {
            Response::Telemetry(frame) => self.telemetry.apply_telemetry(frame),
            Response::RadarStatus(frame) => self.telemetry.apply_status(frame),
            Response::Threshold(cm) => self.device.threshold_cm = Some(*cm),
            Response::Orientation(o) => self.device.orientation = Some(*o),
            Response::RadarEnabled(on) => self.device.radar_enabled = Some(*on),
            Response::Lora(field, value) => self.lora.set(*field, value.clone()),
            Response::NbApn(apn) => self.nbiot.apn = apn.clone(),
            Response::NbMqtt(mqtt) => self.nbiot.mqtt = mqtt.clone(),
            Response::NbConnect(report) => {
                self.nbiot.status = report.status;
                self.nbiot.imei = report.imei.clone();
                self.nbiot.imsi = report.imsi.clone();
                self.nbiot.ccid = report.ccid.clone();
                self.nbiot.band = report.band.clone();
                self.nbiot.operator = report.operator.clone();
                self.nbiot.rssi = report.rssi.clone();
                self.nbiot.snr = report.snr.clone();
            }
            Response::CaliProgress { .. } | Response::Ok | Response::Error => {}
        }
    }

    /// Disconnect teardown: telemetry and operation state go back to defaults,
    /// config views keep their last-known values.
    pub fn reset_for_disconnect(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.telemetry = SensorTelemetry::default();
        self.operation_message = None;
    }
}

// ---------------------------------------------------------------------------
// Protocol log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogDirection {
    Info,
    Error,
    Tx,
    Rx,
}

impl LogDirection {
    /// Single-character marker used by the log dump (`>` out, `<` in, `!` other).
    pub fn marker(&self) -> char {
        match self {
            LogDirection::Tx => '>',
            LogDirection::Rx => '<',
            LogDirection::Info | LogDirection::Error => '!',
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub direction: LogDirection,
    pub message: String,
}

/// Append-only bounded log of protocol traffic; oldest entries evicted.
/// Observability only: nothing in the engine reads it back.
#[derive(Debug)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        LogBuffer { entries: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn shared() -> SharedLog {
        Arc::new(Mutex::new(LogBuffer::new()))
    }

    pub fn push(&mut self, direction: LogDirection, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            direction,
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        LogBuffer::new()
    }
}

/// Push a log entry through the shared handle, tolerating a poisoned lock.
pub fn log_event(log: &SharedLog, direction: LogDirection, message: impl Into<String>) {
    if let Ok(mut buf) = log.lock() {
        buf.push(direction, message);
    }
}
