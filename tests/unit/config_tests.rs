//! Configuration loading tests
//!
//! Files are written to a temp dir and layered through `AppConfig::load_from`.

use geyser_sentinel::config::{AppConfig, DetectionMode, ObserverKind};
use geyser_sentinel::constants::programs;
use geyser_sentinel::stream::Commitment;
use std::io::Write;
use tempfile::NamedTempFile;

const WALLET_A: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
const WALLET_B: &str = "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2";

fn write_toml(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_minimal_file_fills_defaults() {
    let file = write_toml(
        r#"
[stream]
endpoint = "https://grpc.example.com"
"#,
    );

    let config = AppConfig::load_from(file.path()).unwrap();
    assert_eq!(config.stream.endpoint, "https://grpc.example.com");
    assert_eq!(config.stream.commitment, Commitment::Processed);
    assert_eq!(config.stream.connect_timeout_secs, 10);
    assert_eq!(config.detection.mode, DetectionMode::Program);
    assert_eq!(config.detection.active_keys(), vec![programs::PUMP_FUN.to_string()]);
    assert_eq!(config.position.precedence_window_ms, 1_000);
    assert_eq!(config.position.sol_price_usd, 218.0);
    assert_eq!(config.position.reconnect.cap_delay_ms, 60_000);
    assert_eq!(config.detection.reconnect.cap_delay_ms, 300_000);
    assert!(config.fallback.enabled);
    assert_eq!(config.fallback.stale_after_ms, 10_000);
    assert_eq!(config.hooks.observer, ObserverKind::Noop);
    assert!(config.validate().is_ok());
}

#[test]
fn test_wallet_mode_file() {
    let file = write_toml(&format!(
        r#"
[stream]
endpoint = "https://grpc.example.com"
x_token = "secret"
commitment = "confirmed"

[detection]
mode = "wallet"

[[detection.wallets]]
key = "{WALLET_A}"
name = "alpha"

[[detection.wallets]]
key = "{WALLET_B}"
enabled = false

[position]
precedence_window_ms = 1500

[position.reconnect]
max_attempts = 3

[fallback]
enabled = false

[hooks]
observer = "tracing"
"#
    ));

    let config = AppConfig::load_from(file.path()).unwrap();
    assert_eq!(config.stream.x_token.as_deref(), Some("secret"));
    assert_eq!(config.stream.commitment, Commitment::Confirmed);
    assert_eq!(config.detection.mode, DetectionMode::Wallet);
    assert_eq!(config.detection.wallets.len(), 2);
    assert_eq!(config.detection.wallets[0].name.as_deref(), Some("alpha"));
    assert_eq!(config.detection.active_keys(), vec![WALLET_A.to_string()]);
    assert_eq!(config.position.precedence_window_ms, 1_500);
    assert_eq!(config.position.reconnect.max_attempts, 3);
    assert_eq!(config.position.reconnect.base_delay_ms, 5_000);
    assert!(!config.fallback.enabled);
    assert_eq!(config.hooks.observer, ObserverKind::Tracing);
    assert!(config.validate().is_ok());
}

#[test]
fn test_all_wallets_disabled_fails_validation() {
    let file = write_toml(&format!(
        r#"
[stream]
endpoint = "https://grpc.example.com"

[detection]
mode = "wallet"

[[detection.wallets]]
key = "{WALLET_A}"
enabled = false
"#
    ));

    let config = AppConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("wallet"));
}

#[test]
fn test_unknown_mode_rejected() {
    let file = write_toml(
        r#"
[stream]
endpoint = "https://grpc.example.com"

[detection]
mode = "mempool"
"#,
    );

    assert!(AppConfig::load_from(file.path()).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(AppConfig::load_from(&dir.path().join("absent.toml")).is_err());
}
