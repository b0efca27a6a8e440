//! Field validation for device identity and radio configuration values.
//!
//! Sensors advertise a 16-hex-digit serial as their BLE name; LoRaWAN keys and
//! identifiers have fixed hex widths. Everything here is checked before a set
//! command is built so that malformed input never reaches the device.

/// Validation errors with user-facing messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("device name must be exactly 16 hex digits")]
    DeviceName,

    #[error("{field} must be exactly {expected} hex digits")]
    HexWidth { field: &'static str, expected: usize },

    #[error("unknown LoRa region code: {0}")]
    Region(String),

    #[error("threshold out of range (1-500 cm): {0}")]
    Threshold(u32),
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Check a BLE advertised name: sensors use their 16-hex-digit serial.
pub fn is_valid_device_name(name: &str) -> bool {
    name.len() == 16 && is_hex(name)
}

fn check_hex_width(field: &'static str, value: &str, expected: usize) -> Result<(), FieldError> {
    if value.len() == expected && is_hex(value) {
        Ok(())
    } else {
        Err(FieldError::HexWidth { field, expected })
    }
}

/// DevEUI / AppEUI: 16 hex digits.
pub fn check_eui(field: &'static str, value: &str) -> Result<(), FieldError> {
    check_hex_width(field, value, 16)
}

/// DevAddr: 8 hex digits.
pub fn check_dev_addr(value: &str) -> Result<(), FieldError> {
    check_hex_width("DevAddr", value, 8)
}

/// AppSKey / NwkSKey: 32 hex digits.
pub fn check_session_key(field: &'static str, value: &str) -> Result<(), FieldError> {
    check_hex_width(field, value, 32)
}

/// Detection threshold in centimeters.
pub fn check_threshold(cm: u32) -> Result<u16, FieldError> {
    if (1..=500).contains(&cm) {
        Ok(cm as u16)
    } else {
        Err(FieldError::Threshold(cm))
    }
}
