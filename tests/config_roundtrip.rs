use std::time::Duration;

use swiott::config::{Config, MIN_COMMAND_GAP_MS};

#[tokio::test]
async fn default_config_round_trips_through_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    let path = path.to_str().expect("utf8 path");

    Config::create_default(path).await.expect("create default");
    let config = Config::load(path).await.expect("load");

    assert_eq!(config.device.baud_rate, 115200);
    assert_eq!(config.session.poll_interval_secs, 10);
    assert_eq!(config.session.command_gap_ms, MIN_COMMAND_GAP_MS);
    assert_eq!(config.session.calibrate_timeout_secs, 30);
    assert_eq!(config.session.reboot_timeout_secs, 15);
    assert_eq!(config.logging.level, "info");
}

#[tokio::test]
async fn command_gap_cannot_go_below_the_firmware_floor() {
    let config = Config::default();
    assert_eq!(config.session.command_gap(), Duration::from_millis(350));

    let mut tight = Config::default();
    tight.session.command_gap_ms = 100;
    assert_eq!(tight.session.command_gap(), Duration::from_millis(350));

    let mut relaxed = Config::default();
    relaxed.session.command_gap_ms = 500;
    assert_eq!(relaxed.session.command_gap(), Duration::from_millis(500));
}

#[tokio::test]
async fn invalid_device_name_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    let path = path.to_str().expect("utf8 path");

    let mut config = Config::default();
    config.device.name = "not-a-serial".to_string();
    let content = toml::to_string_pretty(&config).expect("serialize");
    tokio::fs::write(path, content).await.expect("write");

    assert!(Config::load(path).await.is_err());
}

#[tokio::test]
async fn valid_device_name_is_accepted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    let path = path.to_str().expect("utf8 path");

    let mut config = Config::default();
    config.device.name = "0011AABBCCDDEEFF".to_string();
    let content = toml::to_string_pretty(&config).expect("serialize");
    tokio::fs::write(path, content).await.expect("write");

    let loaded = Config::load(path).await.expect("load");
    assert_eq!(loaded.device.name, "0011AABBCCDDEEFF");
}
