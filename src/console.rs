//! Interactive console: the thin presentation layer over a running session.
//!
//! Reads commands from stdin, forwards protocol actions through the session
//! handle, and prints snapshots of the shared state store. All protocol
//! behavior lives in the engine; this file only formats and forwards.

use anyhow::Result;
use log::{error, warn};
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use swiott::protocol::commands::{Region, REGIONS};
use swiott::protocol::session::{SessionCommand, SessionHandle};
use swiott::protocol::state::{
    LoraField, MqttSettings, Orientation, SharedLog, SharedState,
};
use swiott::validation;

pub async fn run(
    handle: SessionHandle,
    state: SharedState,
    log: SharedLog,
    mut session_task: JoinHandle<Result<()>>,
) -> Result<()> {
    println!("Type 'help' for commands, 'quit' to disconnect.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            res = &mut session_task => {
                match res {
                    Ok(outcome) => outcome?,
                    Err(e) => error!("session task failed: {}", e),
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                handle.disconnect();
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(input)) => {
                        if handle_input(input.trim(), &handle, &state, &log) {
                            handle.disconnect();
                        }
                    }
                    Ok(None) => handle.disconnect(),
                    Err(e) => {
                        warn!("stdin error: {}", e);
                        handle.disconnect();
                    }
                }
            }
        }
    }
    println!("Session closed.");
    Ok(())
}

/// Returns true when the user asked to quit.
fn handle_input(input: &str, handle: &SessionHandle, state: &SharedState, log: &SharedLog) -> bool {
    if input.is_empty() {
        return false;
    }
    // Raw AT passthrough; still paced by the dispatcher.
    if input.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("AT")) {
        handle.send(SessionCommand::Raw(input.to_string()));
        return false;
    }

    let mut parts = input.split_whitespace();
    let verb = parts.next().unwrap_or("").to_ascii_lowercase();
    let rest: Vec<&str> = parts.collect();

    match verb.as_str() {
        "help" | "?" => print_help(),
        "status" => {
            handle.send(SessionCommand::QueryTelemetry);
            print_status(state);
        }
        "config" => {
            handle.send(SessionCommand::QueryConfig);
            print_config(state);
        }
        "lora" => {
            handle.send(SessionCommand::QueryLora);
            print_lora(state);
        }
        "nbiot" => {
            handle.send(SessionCommand::QueryNbiot);
            print_nbiot(state);
        }
        "json" => {
            if let Ok(st) = state.lock() {
                match serde_json::to_string_pretty(&*st) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("snapshot serialization failed: {}", e),
                }
            }
        }
        "calibrate" => {
            if operation_in_progress(state) {
                println!("An operation is already in progress.");
            } else {
                handle.send(SessionCommand::Calibrate);
            }
        }
        "reboot" => {
            if operation_in_progress(state) {
                println!("An operation is already in progress.");
            } else {
                handle.send(SessionCommand::Reboot);
            }
        }
        "nb" => match rest.first().copied() {
            Some("up") => handle.send(SessionCommand::NbConnect(true)),
            Some("down") => handle.send(SessionCommand::NbConnect(false)),
            _ => println!("Usage: nb up|down"),
        },
        "set" => handle_set(&rest, handle),
        "stats" => {
            let snap = swiott::metrics::snapshot();
            println!(
                "decoded {} | unmatched {} | parse errors {} | sent {} | send failures {}",
                snap.lines_decoded,
                snap.lines_unmatched,
                snap.frame_parse_errors,
                snap.commands_sent,
                snap.send_failures,
            );
        }
        "log" => print_log(log),
        "clear" => {
            if let Ok(mut buf) = log.lock() {
                buf.clear();
            }
        }
        "quit" | "exit" => return true,
        _ => println!("Unknown command '{}'. Type 'help'.", verb),
    }
    false
}

fn handle_set(args: &[&str], handle: &SessionHandle) {
    let usage = || {
        println!(
            "Usage: set th <cm> | set type horizontal|vertical | set radar on|off\n       \
             set region <code> | set apn <apn> | set deveui|appeui|devaddr|appskey|nwkskey <hex>\n       \
             set mqtt <host,port,user,pass[,clean,keepalive,ssl]>"
        )
    };
    let (field, value) = match (args.first(), args.get(1)) {
        (Some(f), Some(v)) => (*f, *v),
        _ => return usage(),
    };
    match field {
        "th" | "threshold" => match value.parse::<u32>() {
            Ok(v) => match validation::check_threshold(v) {
                Ok(cm) => handle.send(SessionCommand::SetThreshold(cm)),
                Err(e) => println!("{}", e),
            },
            Err(_) => usage(),
        },
        "type" => match value.to_ascii_lowercase().as_str() {
            "horizontal" | "h" => handle.send(SessionCommand::SetOrientation(Orientation::Horizontal)),
            "vertical" | "v" => handle.send(SessionCommand::SetOrientation(Orientation::Vertical)),
            _ => usage(),
        },
        "radar" => match value.to_ascii_lowercase().as_str() {
            "on" => handle.send(SessionCommand::SetRadarEnabled(true)),
            "off" => handle.send(SessionCommand::SetRadarEnabled(false)),
            _ => usage(),
        },
        "region" => match Region::from_str(value) {
            Ok(region) => handle.send(SessionCommand::SetLora(
                LoraField::Region,
                region.as_str().to_string(),
            )),
            Err(e) => {
                println!("{}", e);
                let codes: Vec<&str> = REGIONS.iter().map(|r| r.as_str()).collect();
                println!("Valid regions: {}", codes.join(", "));
            }
        },
        "apn" => handle.send(SessionCommand::SetApn(value.to_string())),
        "deveui" | "appeui" => {
            let (field_name, lora_field) = if field == "deveui" {
                ("DevEUI", LoraField::DevEui)
            } else {
                ("AppEUI", LoraField::AppEui)
            };
            match validation::check_eui(field_name, value) {
                Ok(()) => handle.send(SessionCommand::SetLora(lora_field, value.to_string())),
                Err(e) => println!("{}", e),
            }
        }
        "devaddr" => match validation::check_dev_addr(value) {
            Ok(()) => handle.send(SessionCommand::SetLora(LoraField::DevAddr, value.to_string())),
            Err(e) => println!("{}", e),
        },
        "appskey" | "nwkskey" => {
            let (field_name, lora_field) = if field == "appskey" {
                ("AppSKey", LoraField::AppSKey)
            } else {
                ("NwkSKey", LoraField::NwkSKey)
            };
            match validation::check_session_key(field_name, value) {
                Ok(()) => handle.send(SessionCommand::SetLora(lora_field, value.to_string())),
                Err(e) => println!("{}", e),
            }
        }
        "mqtt" => {
            let fields: Vec<&str> = value.split(',').collect();
            if fields.len() < 4 {
                return usage();
            }
            let get = |i: usize| fields.get(i).copied().unwrap_or("").to_string();
            handle.send(SessionCommand::SetMqtt(MqttSettings {
                host: get(0),
                port: get(1),
                user: get(2),
                pass: get(3),
                clean_session: get(4),
                keepalive: get(5),
                ssl: get(6),
            }));
        }
        _ => usage(),
    }
}

fn operation_in_progress(state: &SharedState) -> bool {
    state
        .lock()
        .map(|st| st.operation_message.is_some())
        .unwrap_or(false)
}

fn print_help() {
    println!(
        "Commands:\n  \
         status | config | lora | nbiot | json  - show state (and refresh it)\n  \
         calibrate | reboot                     - long-running device operations\n  \
         set ...                                - write configuration (see 'set' usage)\n  \
         nb up|down                             - NB-IoT connect / disconnect\n  \
         AT+...                                 - raw command passthrough\n  \
         log | clear | stats                    - protocol log and counters\n  \
         quit                                   - disconnect and exit"
    );
}

fn print_status(state: &SharedState) {
    let st = match state.lock() {
        Ok(st) => st,
        Err(_) => return,
    };
    let t = &st.telemetry;
    println!(
        "{} | battery {}% | temp {}C | rssi {} | event {}",
        if t.occupied { "OCCUPIED" } else { "VACANT" },
        t.battery,
        t.temperature,
        t.rssi,
        t.event.as_str(),
    );
    println!(
        "distance {}cm | mag {} ({},{},{}) | cover {} | valid {} | err {}",
        t.distance, t.mag_value, t.mag_x, t.mag_y, t.mag_z, t.cover_value, t.is_valid, t.err_code,
    );
    println!(
        "parks 24h {} / this hour {} | flags: mag={} lowbat={} water={} lowrssi={}",
        t.park_count_24h,
        t.park_count_hour,
        t.flags.high_mag,
        t.flags.low_battery,
        t.flags.water_cover,
        t.flags.low_rssi,
    );
    if let Some(op) = &st.operation_message {
        println!("operation: {}", op);
    }
}

fn print_config(state: &SharedState) {
    let st = match state.lock() {
        Ok(st) => st,
        Err(_) => return,
    };
    let orientation = match st.device.orientation {
        Some(Orientation::Horizontal) => "horizontal",
        Some(Orientation::Vertical) => "vertical",
        None => "?",
    };
    let threshold = st
        .device
        .threshold_cm
        .map(|v| format!("{}cm", v))
        .unwrap_or_else(|| "?".to_string());
    let radar = match st.device.radar_enabled {
        Some(true) => "enabled",
        Some(false) => "sleep",
        None => "?",
    };
    println!("mounting {} | threshold {} | radar {}", orientation, threshold, radar);
}

fn print_lora(state: &SharedState) {
    let st = match state.lock() {
        Ok(st) => st,
        Err(_) => return,
    };
    let l = &st.lora;
    println!(
        "DevEUI {} | AppEUI {} | DevAddr {}\nAppSKey {} | NwkSKey {}\nRegion {}",
        l.dev_eui, l.app_eui, l.dev_addr, l.app_s_key, l.nwk_s_key, l.region,
    );
}

fn print_nbiot(state: &SharedState) {
    let st = match state.lock() {
        Ok(st) => st,
        Err(_) => return,
    };
    let n = &st.nbiot;
    println!(
        "status {} | operator {} | band {} | rssi {} dBm | snr {} dB",
        n.status.as_str(),
        n.operator,
        n.band,
        n.rssi,
        n.snr,
    );
    println!("imei {} | imsi {} | ccid {}", n.imei, n.imsi, n.ccid);
    println!(
        "apn {} | mqtt {}:{} user {} ssl {}",
        n.apn, n.mqtt.host, n.mqtt.port, n.mqtt.user, n.mqtt.ssl,
    );
}

fn print_log(log: &SharedLog) {
    let buf = match log.lock() {
        Ok(buf) => buf,
        Err(_) => return,
    };
    if buf.is_empty() {
        println!("No activity yet.");
        return;
    }
    for entry in buf.iter() {
        println!(
            "{} {} {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.direction.marker(),
            entry.message,
        );
    }
}
