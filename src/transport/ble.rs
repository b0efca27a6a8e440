//! BLE GATT transport.
//!
//! The sensor exposes one service (0xFFF0) with a notify characteristic
//! (0xFFF1) carrying console output and a write characteristic (0xFFF2)
//! accepting commands. Sensors advertise their 16-hex-digit serial as the
//! local name; after subscribing we write the `SWIOTT` activation handshake,
//! which switches the firmware's console onto the GATT link.

use anyhow::{anyhow, Result};
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Manager, Peripheral};
use futures::stream::StreamExt;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use crate::protocol::state::{log_event, LogDirection, SharedLog};
use crate::validation::is_valid_device_name;

use super::{Link, LinkCommand, LinkEvent};

/// 16-bit GATT ids expanded onto the Bluetooth base UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb);

/// Written to the write characteristic right after subscribing; routes the
/// firmware console onto the GATT link.
const ACTIVATE_HANDSHAKE: &[u8] = b"SWIOTT";

/// Scan for a sensor, connect, and return the channel pair for the session.
///
/// `name` narrows the scan to one specific serial; otherwise the first
/// peripheral advertising a plausible sensor name wins.
pub async fn connect(name: Option<&str>, scan_timeout: Duration, log: SharedLog) -> Result<Link> {
    let manager = Manager::new().await?;
    let central = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no Bluetooth adapter found"))?;

    info!("Scanning for sensors...");
    let mut events = central.events().await?;
    central
        .start_scan(ScanFilter { services: vec![SERVICE_UUID] })
        .await?;

    let peripheral = discover(&central, &mut events, name, scan_timeout).await;
    let _ = central.stop_scan().await;
    let peripheral = peripheral?;

    let props = peripheral.properties().await?;
    let label = props
        .and_then(|p| p.local_name)
        .unwrap_or_else(|| "sensor".to_string());
    info!("Connecting to {}...", label);

    peripheral.connect().await?;
    let result = bind(&peripheral, &label, log).await;
    if result.is_err() {
        let _ = peripheral.disconnect().await;
    }
    result
}

async fn discover(
    central: &impl Central<Peripheral = Peripheral>,
    events: &mut (impl futures::Stream<Item = CentralEvent> + Unpin),
    name: Option<&str>,
    scan_timeout: Duration,
) -> Result<Peripheral> {
    let deadline = Instant::now() + scan_timeout;

    // Sweep anything the adapter already knows before waiting on new
    // discovery events.
    for p in central.peripherals().await? {
        if peripheral_matches(&p, name).await {
            return Ok(p);
        }
    }

    loop {
        let now = Instant::now();
        if now >= deadline {
            return Err(anyhow!("no matching sensor found within {:?}", scan_timeout));
        }
        match timeout(deadline - now, events.next()).await {
            Ok(Some(CentralEvent::DeviceDiscovered(id))) => {
                let p = central.peripheral(&id).await?;
                if peripheral_matches(&p, name).await {
                    return Ok(p);
                }
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                return Err(anyhow!("no matching sensor found within {:?}", scan_timeout));
            }
        }
    }
}

async fn peripheral_matches(peripheral: &Peripheral, wanted: Option<&str>) -> bool {
    let name = match peripheral.properties().await {
        Ok(Some(props)) => match props.local_name {
            Some(name) => name,
            None => return false,
        },
        _ => return false,
    };
    match wanted {
        Some(wanted) => name.eq_ignore_ascii_case(wanted),
        None => {
            if is_valid_device_name(&name) {
                true
            } else {
                debug!("skipping '{}': not a sensor serial", name);
                false
            }
        }
    }
}

fn find_characteristic(peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or_else(|| anyhow!("characteristic {} not found", uuid))
}

/// Discover characteristics, subscribe, send the activation handshake, and
/// spawn the forwarder tasks.
async fn bind(peripheral: &Peripheral, label: &str, log: SharedLog) -> Result<Link> {
    peripheral.discover_services().await?;
    let notify_char = find_characteristic(peripheral, NOTIFY_CHAR_UUID)?;
    let write_char = find_characteristic(peripheral, WRITE_CHAR_UUID)?;

    peripheral.subscribe(&notify_char).await?;
    peripheral
        .write(&write_char, ACTIVATE_HANDSHAKE, WriteType::WithoutResponse)
        .await?;
    info!("Connected to {}", label);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();

    // Notify forwarder. The stream ends when the peripheral drops off, which
    // is how transport-initiated disconnects reach the session.
    let mut notifications = peripheral.notifications().await?;
    let notify_events = event_tx.clone();
    tokio::spawn(async move {
        while let Some(n) = notifications.next().await {
            if n.uuid == NOTIFY_CHAR_UUID && notify_events.send(LinkEvent::Data(n.value)).is_err() {
                break;
            }
        }
        let _ = notify_events.send(LinkEvent::Disconnected);
    });

    // Write side.
    let writer = peripheral.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                LinkCommand::Send(bytes) => {
                    if let Err(e) = writer
                        .write(&write_char, &bytes, WriteType::WithoutResponse)
                        .await
                    {
                        log_event(&log, LogDirection::Error, format!("BLE write failed: {}", e));
                        warn!("BLE write failed: {}", e);
                    }
                }
                LinkCommand::Disconnect => {
                    let _ = writer.disconnect().await;
                    break;
                }
            }
        }
    });

    Ok(Link { commands: cmd_tx, events: event_rx })
}
