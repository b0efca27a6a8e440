//! Response decoders: one line of console output to one typed [`Response`].
//!
//! The protocol carries no request/response correlation id, so a line is
//! classified purely by shape. [`decode`] is the single dispatch table for
//! every known prefix, tried in a fixed priority order; getting that order
//! wrong (for example matching `OK` inside a longer line) silently misroutes
//! responses, so all classification lives here and nowhere else.
//!
//! `Ok(None)` means the line matched nothing we know; callers log it and move
//! on. `Err(_)` means a line matched a known prefix but its payload is
//! malformed; the whole frame is discarded, never partially merged.

use super::state::{
    EventType, LoraField, MqttSettings, NbLinkReport, NbStatus, Orientation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `+SWRDCALI:` calibration progress. `remaining` is the countdown field
    /// as reported; `None` when the field is missing or empty.
    CaliProgress { remaining: Option<String> },
    /// Bare `OK`: completion of whatever operation is currently tracked.
    Ok,
    /// Bare `ERROR`: failure of the current operation.
    Error,
    /// `+SWQUERY:` binary telemetry frame.
    Telemetry(TelemetryFrame),
    /// `+SWRDSTATUS:` / `+MRSTATUS:` CSV status frame.
    RadarStatus(StatusFrame),
    /// `+SWRDTARTH:` detection threshold, centimeters.
    Threshold(u16),
    /// `+SWRDPARKTYPE:` mounting orientation.
    Orientation(Orientation),
    /// `+SWRDENABLE:` radar module on/off.
    RadarEnabled(bool),
    /// One of the six LoRa identity/region responses.
    Lora(LoraField, String),
    /// `+NBAPN:` access point name.
    NbApn(String),
    /// `+NBMQTT:` broker settings (6 or 7 fields).
    NbMqtt(MqttSettings),
    /// `+NBCONNECT:` registration status and modem identity.
    NbConnect(NbLinkReport),
}

/// A matched frame whose payload could not be parsed. The offending frame is
/// dropped whole; state is never partially updated from a bad frame.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("SWQUERY: malformed hex payload")]
    QueryHex,
    #[error("SWQUERY: payload too short ({0} bytes, need 13)")]
    QueryShort(usize),
    #[error("status frame: too few fields ({0}, need 11)")]
    StatusShort(usize),
    #[error("status frame: non-numeric field '{0}'")]
    StatusField(String),
    #[error("SWRDTARTH: non-numeric threshold '{0}'")]
    Threshold(String),
    #[error("NBMQTT: too few fields ({0}, need 6)")]
    MqttShort(usize),
}

/// Decoded `+SWQUERY:` payload. 13 bytes: temperature, battery, status
/// bitfield, park counts, then four little-endian 16-bit readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryFrame {
    pub temperature: i16,
    pub battery: u8,
    pub status: u8,
    pub park_count_24h: u8,
    pub park_count_hour: u8,
    pub mag_value: u16,
    pub rssi: i16,
    pub cover_value: u16,
    pub distance: u16,
}

/// Decoded CSV status frame: eleven comma-separated integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFrame {
    pub event: EventType,
    pub occupied: bool,
    pub mag_x: i32,
    pub mag_y: i32,
    pub mag_z: i32,
    pub mag_value: i32,
    pub rssi: i32,
    pub cover_value: u16,
    pub distance: u16,
    pub is_valid: bool,
    pub err_code: u16,
}

/// Classify one trimmed line. The priority order below is load-bearing.
pub fn decode(line: &str) -> Result<Option<Response>, FrameError> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("+SWRDCALI:") {
        return Ok(Some(decode_cali_progress(rest)));
    }
    if line == "OK" {
        return Ok(Some(Response::Ok));
    }
    if line == "ERROR" {
        return Ok(Some(Response::Error));
    }
    if let Some(rest) = line.strip_prefix("+SWQUERY:") {
        return decode_query(rest.trim()).map(|f| Some(Response::Telemetry(f)));
    }
    if let Some(rest) = line
        .strip_prefix("+SWRDSTATUS:")
        .or_else(|| line.strip_prefix("+MRSTATUS:"))
    {
        return decode_status(rest).map(|f| Some(Response::RadarStatus(f)));
    }
    if let Some(rest) = line.strip_prefix("+SWRDTARTH:") {
        let value = rest
            .trim()
            .parse::<u16>()
            .map_err(|_| FrameError::Threshold(rest.trim().to_string()))?;
        return Ok(Some(Response::Threshold(value)));
    }
    if let Some(rest) = line.strip_prefix("+SWRDPARKTYPE:") {
        let orientation = if rest.trim() == "0" {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        };
        return Ok(Some(Response::Orientation(orientation)));
    }
    if let Some(rest) = line.strip_prefix("+SWRDENABLE:") {
        return Ok(Some(Response::RadarEnabled(rest.trim() == "1")));
    }
    for (prefix, field) in LORA_PREFIXES {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Ok(Some(Response::Lora(*field, rest.trim().to_string())));
        }
    }
    if let Some(rest) = line.strip_prefix("+NBAPN:") {
        return Ok(Some(Response::NbApn(rest.trim().to_string())));
    }
    if let Some(rest) = line.strip_prefix("+NBMQTT:") {
        return decode_mqtt(rest).map(|m| Some(Response::NbMqtt(m)));
    }
    if let Some(rest) = line.strip_prefix("+NBCONNECT:") {
        return Ok(Some(Response::NbConnect(decode_nb_connect(rest))));
    }

    Ok(None)
}

const LORA_PREFIXES: &[(&str, LoraField)] = &[
    ("+CDEVEUI:", LoraField::DevEui),
    ("+CAPPEUI:", LoraField::AppEui),
    ("+CDEVADDR:", LoraField::DevAddr),
    ("+CAPPSKEY:", LoraField::AppSKey),
    ("+CNWKSKEY:", LoraField::NwkSKey),
    ("+CREGION:", LoraField::Region),
];

fn decode_cali_progress(rest: &str) -> Response {
    let remaining = rest
        .split(',')
        .nth(1)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    Response::CaliProgress { remaining }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, FrameError> {
    if !s.is_ascii() || s.len() % 2 != 0 {
        return Err(FrameError::QueryHex);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| FrameError::QueryHex))
        .collect()
}

fn decode_query(payload: &str) -> Result<TelemetryFrame, FrameError> {
    let bytes = decode_hex(payload)?;
    if bytes.len() < 13 {
        return Err(FrameError::QueryShort(bytes.len()));
    }
    let le16 = |lo: usize| u16::from_le_bytes([bytes[lo], bytes[lo + 1]]);
    Ok(TelemetryFrame {
        temperature: i16::from(bytes[0] as i8),
        battery: bytes[1],
        status: bytes[2],
        park_count_24h: bytes[3],
        park_count_hour: bytes[4],
        mag_value: le16(5),
        rssi: le16(7) as i16,
        cover_value: le16(9),
        distance: le16(11),
    })
}

fn int_field<T: std::str::FromStr>(raw: &str) -> Result<T, FrameError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| FrameError::StatusField(raw.trim().to_string()))
}

fn decode_status(rest: &str) -> Result<StatusFrame, FrameError> {
    let fields: Vec<&str> = rest.split(',').collect();
    if fields.len() < 11 {
        return Err(FrameError::StatusShort(fields.len()));
    }
    Ok(StatusFrame {
        event: EventType::from_code(int_field::<i32>(fields[0])?),
        occupied: int_field::<i32>(fields[1])? == 1,
        mag_x: int_field(fields[2])?,
        mag_y: int_field(fields[3])?,
        mag_z: int_field(fields[4])?,
        mag_value: int_field(fields[5])?,
        rssi: int_field(fields[6])?,
        cover_value: int_field(fields[7])?,
        distance: int_field(fields[8])?,
        is_valid: int_field::<i32>(fields[9])? == 1,
        err_code: int_field(fields[10])?,
    })
}

fn decode_mqtt(rest: &str) -> Result<MqttSettings, FrameError> {
    let fields: Vec<&str> = rest.split(',').collect();
    if fields.len() < 6 {
        return Err(FrameError::MqttShort(fields.len()));
    }
    Ok(MqttSettings {
        host: fields[0].trim().to_string(),
        port: fields[1].trim().to_string(),
        user: fields[2].trim().to_string(),
        pass: fields[3].trim().to_string(),
        clean_session: fields[4].trim().to_string(),
        keepalive: fields[5].trim().to_string(),
        ssl: fields.get(6).map(|s| s.trim()).unwrap_or("0").to_string(),
    })
}

fn decode_nb_connect(rest: &str) -> NbLinkReport {
    let fields: Vec<&str> = rest.split(',').collect();
    let status = match fields.first().map(|s| s.trim().parse::<u8>()) {
        Some(Ok(0)) => NbStatus::NotRegistered,
        Some(Ok(1)) => NbStatus::RegisteredNoMqtt,
        Some(Ok(2)) => NbStatus::Connected,
        _ => NbStatus::Error,
    };
    let text = |i: usize| fields.get(i).map(|s| s.trim()).unwrap_or("").to_string();
    NbLinkReport {
        status,
        imei: text(1),
        imsi: text(2),
        ccid: text(3),
        band: text(4),
        operator: text(5),
        rssi: text(6),
        snr: text(7),
    }
}
