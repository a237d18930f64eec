//! Integration tests for configuration loading

use bmi_agent::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[listener]
port = 9090
path = "/callbacks/face"

[scale]
device = "/dev/ttyS1"
baud = 19200
read_timeout_ms = 500

[api]
base_url = "http://api.test.local"
username = "agent"
password = "secret"
timeout_secs = 10
device_id = "kiosk-1"

[session]
save_grace_ms = 1500

[metrics]
interval_secs = 30
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.listener_port(), 9090);
    assert_eq!(config.listener_path(), "/callbacks/face");
    assert_eq!(config.scale_device(), "/dev/ttyS1");
    assert_eq!(config.scale_baud(), 19200);
    assert_eq!(config.scale_read_timeout_ms(), 500);
    assert_eq!(config.api_base_url(), "http://api.test.local");
    assert_eq!(config.api_username(), Some("agent"));
    assert_eq!(config.api_password(), Some("secret"));
    assert_eq!(config.api_timeout_secs(), 10);
    assert_eq!(config.api_device_id(), "kiosk-1");
    assert_eq!(config.save_grace_ms(), 1500);
    assert_eq!(config.metrics_interval_secs(), 30);
}

#[test]
fn test_missing_sections_use_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[scale]
device = "/dev/ttyUSB3"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.scale_device(), "/dev/ttyUSB3");
    assert_eq!(config.scale_baud(), 9600);
    assert_eq!(config.listener_port(), 8080);
    assert_eq!(config.listener_path(), "/hikvision/listen");
    assert_eq!(config.save_grace_ms(), 2000);
    assert_eq!(config.api_access_token(), None);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"not valid toml [[[").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_falls_back_to_defaults() {
    let config = Config::load_from_path("/nonexistent/path/config.toml");
    assert_eq!(config.listener_port(), 8080);
    assert_eq!(config.scale_baud(), 9600);
}
