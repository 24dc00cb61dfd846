//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.

use std::io::Write;
use std::path::Path;
use telemetry_link::config::{ConfigError, DeviceConfig};
use telemetry_link::transport::DeliveryGuarantee;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[device]
hostname = "myhub.azure-devices.net"
device_id = "weather-01"
key = "VCykuAaTiZdmGcRh+HTZXGCjbuy6TWUDSkWZFCzpdDY="

[credential]
lifetime_secs = 3600
renewal_margin_secs = 300

[mqtt]
qos = 2
reconnect_interval_ms = 2000
keep_alive_secs = 30
max_packet_size = 1024

[telemetry]
interval_ms = 1000
"#,
    );

    let config = DeviceConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.device.hostname, "myhub.azure-devices.net");
    assert_eq!(config.device.device_id, "weather-01");
    assert_eq!(config.credential.lifetime_secs, 3600);
    assert_eq!(config.credential.renewal_margin_secs, 300);
    assert_eq!(config.mqtt.qos, DeliveryGuarantee::ExactlyOnce);
    assert_eq!(config.mqtt.reconnect_interval_ms, 2000);
    assert_eq!(config.mqtt.keep_alive_secs, 30);
    assert_eq!(config.mqtt.max_packet_size, 1024);
    assert_eq!(config.telemetry.interval_ms, 1000);
}

#[test]
fn test_minimal_config_gets_defaults() {
    let temp_file = write_config(
        r#"
[device]
hostname = "myhub.azure-devices.net"
device_id = "weather-01"
key_env = "TELEMETRY_LINK_IT_KEY_UNUSED"
"#,
    );

    let config = DeviceConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.credential.lifetime_secs, 86_400);
    assert_eq!(config.credential.renewal_margin_secs, 0);
    assert_eq!(config.mqtt.qos, DeliveryGuarantee::AtLeastOnce);
    assert_eq!(config.mqtt.reconnect_interval_ms, 5000);
    assert_eq!(config.mqtt.max_packet_size, 512);
    assert_eq!(config.telemetry.interval_ms, 5000);
}

#[test]
fn test_missing_file_is_read_error() {
    let result = DeviceConfig::load_from_file(Path::new("/nonexistent/device.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[device\nhostname = ");
    let result = DeviceConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_out_of_range_qos_rejected() {
    let temp_file = write_config(
        r#"
[device]
hostname = "h"
device_id = "d"
key = "AAAA"

[mqtt]
qos = 3
"#,
    );
    assert!(matches!(
        DeviceConfig::load_from_file(temp_file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_invalid_device_id_rejected() {
    let temp_file = write_config(
        r#"
[device]
hostname = "h"
device_id = "bad id/with slash"
key = "AAAA"
"#,
    );
    assert!(matches!(
        DeviceConfig::load_from_file(temp_file.path()),
        Err(ConfigError::InvalidDeviceId(_))
    ));
}

#[test]
fn test_zero_intervals_rejected() {
    for section in [
        "[mqtt]\nreconnect_interval_ms = 0",
        "[telemetry]\ninterval_ms = 0",
        "[credential]\nlifetime_secs = 0",
    ] {
        let temp_file = write_config(&format!(
            "[device]\nhostname = \"h\"\ndevice_id = \"d\"\nkey = \"AAAA\"\n\n{section}\n"
        ));
        assert!(
            matches!(
                DeviceConfig::load_from_file(temp_file.path()),
                Err(ConfigError::InvalidConfig(_))
            ),
            "{section}"
        );
    }
}

#[test]
fn test_key_env_resolution() {
    std::env::set_var("TELEMETRY_LINK_IT_DEVICE_KEY", "a2V5");
    let temp_file = write_config(
        r#"
[device]
hostname = "h"
device_id = "d"
key = "ignored"
key_env = "TELEMETRY_LINK_IT_DEVICE_KEY"
"#,
    );

    let config = DeviceConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(config.device_key().unwrap(), "a2V5");
}
