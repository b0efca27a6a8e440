//! Serial console transport for bench use.
//!
//! The same AT console the sensor exposes over GATT is reachable through a
//! USB-serial adapter on the programming header. Reads run on a dedicated
//! thread with a short timeout so the port can be torn down promptly.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::mpsc;

use crate::protocol::state::{log_event, LogDirection, SharedLog};

use super::{Link, LinkCommand, LinkEvent, LinkEventTx};

pub async fn connect(port_name: &str, baud_rate: u32, log: SharedLog) -> Result<Link> {
    info!("Opening serial console on {} at {} baud", port_name, baud_rate);

    let mut builder = serialport::new(port_name, baud_rate).timeout(Duration::from_millis(500));
    // Some USB serial adapters need explicit settings
    #[cfg(unix)]
    {
        builder = builder
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);
    }
    let mut port = builder
        .open()
        .map_err(|e| anyhow!("Failed to open serial port {}: {}", port_name, e))?;

    // Toggle DTR/RTS to wake the board, give it a moment, then drop any
    // buffered boot chatter.
    let _ = port.write_data_terminal_ready(true);
    let _ = port.write_request_to_send(true);
    tokio::time::sleep(Duration::from_millis(150)).await;
    let mut purge_buf = [0u8; 512];
    if let Ok(available) = port.bytes_to_read() {
        if available > 0 {
            let _ = port.read(&mut purge_buf);
        }
    }
    debug!("Serial port initialized");

    let reader = port
        .try_clone()
        .map_err(|e| anyhow!("Failed to clone serial port handle: {}", e))?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));

    let read_stop = stop.clone();
    std::thread::spawn(move || read_loop(reader, event_tx, read_stop));
    tokio::task::spawn_blocking(move || write_loop(port, cmd_rx, stop, log));

    Ok(Link { commands: cmd_tx, events: event_rx })
}

fn read_loop(mut port: Box<dyn SerialPort>, events: LinkEventTx, stop: Arc<AtomicBool>) {
    let mut buffer = [0u8; 1024];
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match port.read(&mut buffer) {
            Ok(n) if n > 0 => {
                if events.send(LinkEvent::Data(buffer[..n].to_vec())).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            // Timeout is normal; it is what makes the stop flag responsive.
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                error!("Serial read error: {}", e);
                break;
            }
        }
    }
    let _ = events.send(LinkEvent::Disconnected);
}

fn write_loop(
    mut port: Box<dyn SerialPort>,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    stop: Arc<AtomicBool>,
    log: SharedLog,
) {
    while let Some(cmd) = commands.blocking_recv() {
        match cmd {
            LinkCommand::Send(bytes) => {
                if let Err(e) = port.write_all(&bytes).and_then(|_| port.flush()) {
                    log_event(&log, LogDirection::Error, format!("serial write failed: {}", e));
                    warn!("Serial write failed: {}", e);
                }
            }
            LinkCommand::Disconnect => break,
        }
    }
    stop.store(true, Ordering::Relaxed);
}
