use swiott::protocol::decoder::{decode, FrameError, Response};
use swiott::protocol::state::{EventType, LoraField, NbStatus, Orientation};

fn decode_ok(line: &str) -> Response {
    match decode(line) {
        Ok(Some(resp)) => resp,
        other => panic!("expected a response for '{}', got {:?}", line, other),
    }
}

#[test]
fn telemetry_frame_end_to_end() {
    // 13 bytes: temp 30, battery 50, status 0x02 (high-magnetic only),
    // parks 6/10, then mag/rssi/cover/distance as little-endian pairs.
    let resp = decode_ok("+SWQUERY:1E3202060A1400500032006400");
    let frame = match resp {
        Response::Telemetry(f) => f,
        other => panic!("expected Telemetry, got {:?}", other),
    };
    assert_eq!(frame.temperature, 30);
    assert_eq!(frame.battery, 50);
    assert_eq!(frame.status, 0x02);
    assert_eq!(frame.park_count_24h, 6);
    assert_eq!(frame.park_count_hour, 10);
    assert_eq!(frame.mag_value, 0x0014);
    assert_eq!(frame.rssi, 0x0050);
    assert_eq!(frame.cover_value, 0x0032);
    assert_eq!(frame.distance, 0x0064);

    let mut telemetry = swiott::protocol::state::SensorTelemetry::default();
    telemetry.apply_telemetry(&frame);
    assert!(telemetry.flags.high_mag);
    assert!(!telemetry.flags.low_battery);
    assert!(!telemetry.flags.water_cover);
    assert!(!telemetry.flags.low_rssi);
    assert_eq!(telemetry.status_byte, 0x02);
}

#[test]
fn telemetry_status_bits() {
    // Bits 1, 2, 3 and 6 set; the rest of the byte is reserved.
    let resp = decode_ok("+SWQUERY:00004E000000000000000000FF");
    let frame = match resp {
        Response::Telemetry(f) => f,
        other => panic!("expected Telemetry, got {:?}", other),
    };
    assert_eq!(frame.status, 0x4E);
    let flags = swiott::protocol::state::StatusFlags::from_byte(frame.status);
    assert!(flags.high_mag);
    assert!(flags.low_battery);
    assert!(flags.water_cover);
    assert!(flags.low_rssi);
}

#[test]
fn telemetry_negative_temperature() {
    // 0xF6 as a signed byte is -10.
    let resp = decode_ok("+SWQUERY:F6320000000000000000000000");
    match resp {
        Response::Telemetry(f) => assert_eq!(f.temperature, -10),
        other => panic!("expected Telemetry, got {:?}", other),
    }
}

#[test]
fn telemetry_rejects_short_payload() {
    // 12 bytes only: discarded whole.
    assert_eq!(
        decode("+SWQUERY:1E320600020A001400500032"),
        Err(FrameError::QueryShort(12))
    );
}

#[test]
fn telemetry_rejects_bad_hex() {
    assert_eq!(decode("+SWQUERY:ABC"), Err(FrameError::QueryHex));
    assert_eq!(decode("+SWQUERY:ZZ112233445566778899AABBCC"), Err(FrameError::QueryHex));
}

#[test]
fn status_frame_all_fields() {
    let resp = decode_ok("+SWRDSTATUS:1,1,10,-20,30,400,-70,123,55,1,0");
    let frame = match resp {
        Response::RadarStatus(f) => f,
        other => panic!("expected RadarStatus, got {:?}", other),
    };
    assert_eq!(frame.event, EventType::Entry);
    assert!(frame.occupied);
    assert_eq!((frame.mag_x, frame.mag_y, frame.mag_z), (10, -20, 30));
    assert_eq!(frame.mag_value, 400);
    assert_eq!(frame.rssi, -70);
    assert_eq!(frame.cover_value, 123);
    assert_eq!(frame.distance, 55);
    assert!(frame.is_valid);
    assert_eq!(frame.err_code, 0);
}

#[test]
fn status_frame_alternate_prefix() {
    let resp = decode_ok("+MRSTATUS:2,0,0,0,0,0,-80,0,0,0,5");
    match resp {
        Response::RadarStatus(f) => {
            assert_eq!(f.event, EventType::Exit);
            assert!(!f.occupied);
            assert_eq!(f.err_code, 5);
        }
        other => panic!("expected RadarStatus, got {:?}", other),
    }
}

#[test]
fn status_frame_rejects_short_and_non_numeric() {
    assert_eq!(
        decode("+SWRDSTATUS:1,1,10,-20,30,400,-70,123,55,1"),
        Err(FrameError::StatusShort(10))
    );
    assert!(matches!(
        decode("+SWRDSTATUS:1,1,x,-20,30,400,-70,123,55,1,0"),
        Err(FrameError::StatusField(_))
    ));
}

#[test]
fn unknown_event_code_reads_as_none() {
    let resp = decode_ok("+SWRDSTATUS:9,0,0,0,0,0,0,0,0,0,0");
    match resp {
        Response::RadarStatus(f) => assert_eq!(f.event, EventType::None),
        other => panic!("expected RadarStatus, got {:?}", other),
    }
}

#[test]
fn operation_signals() {
    assert_eq!(decode_ok("OK"), Response::Ok);
    assert_eq!(decode_ok("ERROR"), Response::Error);
    // Exact match only: near-misses are unmatched, not operation signals.
    assert_eq!(decode("OKAY"), Ok(None));
    assert_eq!(decode("ERRORS"), Ok(None));
}

#[test]
fn calibration_progress() {
    assert_eq!(
        decode_ok("+SWRDCALI:1,7"),
        Response::CaliProgress { remaining: Some("7".to_string()) }
    );
    // Missing or empty countdown field.
    assert_eq!(decode_ok("+SWRDCALI:1"), Response::CaliProgress { remaining: None });
    assert_eq!(decode_ok("+SWRDCALI:1,"), Response::CaliProgress { remaining: None });
}

#[test]
fn device_config_responses() {
    assert_eq!(decode_ok("+SWRDTARTH:30"), Response::Threshold(30));
    assert!(matches!(decode("+SWRDTARTH:abc"), Err(FrameError::Threshold(_))));
    assert_eq!(decode_ok("+SWRDPARKTYPE:0"), Response::Orientation(Orientation::Horizontal));
    assert_eq!(decode_ok("+SWRDPARKTYPE:1"), Response::Orientation(Orientation::Vertical));
    // Anything non-zero reads as vertical.
    assert_eq!(decode_ok("+SWRDPARKTYPE:5"), Response::Orientation(Orientation::Vertical));
    assert_eq!(decode_ok("+SWRDENABLE:1"), Response::RadarEnabled(true));
    assert_eq!(decode_ok("+SWRDENABLE:0"), Response::RadarEnabled(false));
}

#[test]
fn lora_responses() {
    assert_eq!(
        decode_ok("+CDEVEUI:0011223344556677"),
        Response::Lora(LoraField::DevEui, "0011223344556677".to_string())
    );
    assert_eq!(
        decode_ok("+CREGION:EU868"),
        Response::Lora(LoraField::Region, "EU868".to_string())
    );
}

#[test]
fn nb_mqtt_field_counts() {
    let resp = decode_ok("+NBMQTT:broker.example,1883,user,pass,1,120");
    match resp {
        Response::NbMqtt(m) => {
            assert_eq!(m.host, "broker.example");
            assert_eq!(m.keepalive, "120");
            // Seventh field absent: ssl defaults off.
            assert_eq!(m.ssl, "0");
        }
        other => panic!("expected NbMqtt, got {:?}", other),
    }
    match decode_ok("+NBMQTT:broker.example,8883,user,pass,1,120,1") {
        Response::NbMqtt(m) => assert_eq!(m.ssl, "1"),
        other => panic!("expected NbMqtt, got {:?}", other),
    }
    assert_eq!(
        decode("+NBMQTT:broker.example,1883,user,pass,1"),
        Err(FrameError::MqttShort(5))
    );
}

#[test]
fn nb_connect_status_mapping() {
    let resp = decode_ok("+NBCONNECT:2,860000000000001,460000000000001,8986001,B8,CMCC,-85,12");
    match resp {
        Response::NbConnect(r) => {
            assert_eq!(r.status, NbStatus::Connected);
            assert_eq!(r.imei, "860000000000001");
            assert_eq!(r.operator, "CMCC");
            assert_eq!(r.snr, "12");
        }
        other => panic!("expected NbConnect, got {:?}", other),
    }

    match decode_ok("+NBCONNECT:0") {
        Response::NbConnect(r) => {
            assert_eq!(r.status, NbStatus::NotRegistered);
            // Missing trailing fields default to empty strings.
            assert_eq!(r.imei, "");
            assert_eq!(r.snr, "");
        }
        other => panic!("expected NbConnect, got {:?}", other),
    }

    // Out-of-range or non-numeric status codes read as Error.
    match decode_ok("+NBCONNECT:9,imei") {
        Response::NbConnect(r) => assert_eq!(r.status, NbStatus::Error),
        other => panic!("expected NbConnect, got {:?}", other),
    }
    match decode_ok("+NBCONNECT:abc") {
        Response::NbConnect(r) => assert_eq!(r.status, NbStatus::Error),
        other => panic!("expected NbConnect, got {:?}", other),
    }
}

#[test]
fn unmatched_lines_are_not_errors() {
    assert_eq!(decode("+SOMETHINGELSE:1,2,3"), Ok(None));
    assert_eq!(decode("boot v1.2.3"), Ok(None));
    assert_eq!(decode(""), Ok(None));
}

#[test]
fn decoding_is_idempotent() {
    use swiott::protocol::state::DeviceState;
    let line = "+SWQUERY:1E3202060A1400500032006400";
    let resp = decode_ok(line);

    let mut once = DeviceState::default();
    once.apply(&resp);
    let mut twice = DeviceState::default();
    twice.apply(&resp);
    twice.apply(&decode_ok(line));

    assert_eq!(once.telemetry.temperature, twice.telemetry.temperature);
    assert_eq!(once.telemetry.battery, twice.telemetry.battery);
    assert_eq!(once.telemetry.status_byte, twice.telemetry.status_byte);
    assert_eq!(once.telemetry.mag_value, twice.telemetry.mag_value);
    assert_eq!(once.telemetry.distance, twice.telemetry.distance);
}
