//! The AT verb vocabulary the sensor console understands.
//!
//! `?`-suffixed forms are queries, `=value` forms are sets. Builders return
//! owned strings ready for the dispatcher, which appends the CR/LF terminator.

use std::fmt;
use std::str::FromStr;

use super::state::{LoraField, MqttSettings, Orientation};

pub const QUERY_TELEMETRY: &str = "AT+SWQUERY?";
pub const CALIBRATE: &str = "AT+SWRDCALI";
pub const REBOOT: &str = "AT+SWREBOOT";

/// The three core radar parameters, queried together on connect and whenever
/// the configuration view opens.
pub fn config_query_batch() -> Vec<String> {
    vec![
        "AT+SWRDTARTH?".to_string(),
        "AT+SWRDPARKTYPE?".to_string(),
        "AT+SWRDENABLE?".to_string(),
    ]
}

pub fn lora_query_batch() -> Vec<String> {
    vec![
        "AT+CDEVEUI?".to_string(),
        "AT+CAPPEUI?".to_string(),
        "AT+CDEVADDR?".to_string(),
        "AT+CAPPSKEY?".to_string(),
        "AT+CNWKSKEY?".to_string(),
        "AT+CREGION?".to_string(),
    ]
}

pub fn nbiot_query_batch() -> Vec<String> {
    vec![
        "AT+NBAPN?".to_string(),
        "AT+NBMQTT?".to_string(),
        "AT+NBCONNECT?".to_string(),
    ]
}

pub fn set_threshold(cm: u16) -> String {
    format!("AT+SWRDTARTH={}", cm)
}

pub fn set_orientation(orientation: Orientation) -> String {
    let code = match orientation {
        Orientation::Horizontal => 0,
        Orientation::Vertical => 1,
    };
    format!("AT+SWRDPARKTYPE={}", code)
}

pub fn set_radar_enabled(enabled: bool) -> String {
    format!("AT+SWRDENABLE={}", if enabled { 1 } else { 0 })
}

pub fn set_lora_field(field: LoraField, value: &str) -> String {
    let verb = match field {
        LoraField::DevEui => "CDEVEUI",
        LoraField::AppEui => "CAPPEUI",
        LoraField::DevAddr => "CDEVADDR",
        LoraField::AppSKey => "CAPPSKEY",
        LoraField::NwkSKey => "CNWKSKEY",
        LoraField::Region => "CREGION",
    };
    format!("AT+{}={}", verb, value)
}

pub fn set_apn(apn: &str) -> String {
    format!("AT+NBAPN={}", apn)
}

/// Full broker update. Empty clean/keepalive/ssl fields fall back to the
/// firmware defaults (0 / 120 / 0).
pub fn set_mqtt(mqtt: &MqttSettings) -> String {
    let or = |s: &str, default: &str| if s.is_empty() { default.to_string() } else { s.to_string() };
    format!(
        "AT+NBMQTT={},{},{},{},{},{},{}",
        mqtt.host,
        mqtt.port,
        mqtt.user,
        mqtt.pass,
        or(&mqtt.clean_session, "0"),
        or(&mqtt.keepalive, "120"),
        or(&mqtt.ssl, "0"),
    )
}

pub fn nb_connect(up: bool) -> String {
    format!("AT+NBCONNECT={}", if up { 1 } else { 0 })
}

/// LoRaWAN regional plans the firmware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    As923,
    Au915,
    Cn470,
    Cn779,
    Eu433,
    Eu868,
    Kr920,
    In865,
    Us915,
    Ru864,
}

pub const REGIONS: &[Region] = &[
    Region::As923,
    Region::Au915,
    Region::Cn470,
    Region::Cn779,
    Region::Eu433,
    Region::Eu868,
    Region::Kr920,
    Region::In865,
    Region::Us915,
    Region::Ru864,
];

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::As923 => "AS923",
            Region::Au915 => "AU915",
            Region::Cn470 => "CN470",
            Region::Cn779 => "CN779",
            Region::Eu433 => "EU433",
            Region::Eu868 => "EU868",
            Region::Kr920 => "KR920",
            Region::In865 => "IN865",
            Region::Us915 => "US915",
            Region::Ru864 => "RU864",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = crate::validation::FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        REGIONS
            .iter()
            .copied()
            .find(|r| r.as_str() == upper)
            .ok_or(crate::validation::FieldError::Region(upper))
    }
}
