//! Device configuration
//!
//! Loaded once at startup from a TOML file and passed by reference into the
//! credential manager and session controller. The device key may be given
//! inline or, preferably, through an environment variable named by `key_env`.

use crate::credential::DEFAULT_LIFETIME_SECS;
use crate::transport::DeliveryGuarantee;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Complete device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub credential: CredentialSection,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// Hub endpoint and device identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Hub hostname, e.g. `myhub.azure-devices.net`
    pub hostname: String,
    /// Device identity registered with the hub
    pub device_id: String,
    /// Inline base64 device key (prefer `key_env`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Environment variable containing the base64 device key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_env: Option<String>,
}

/// Credential lifetime and renewal policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialSection {
    /// Lifetime of each generated token in seconds (default: 86400)
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,
    /// Renew this many seconds before expiry (default: 0, renew at expiry)
    #[serde(default)]
    pub renewal_margin_secs: u64,
}

impl Default for CredentialSection {
    fn default() -> Self {
        Self {
            lifetime_secs: default_lifetime_secs(),
            renewal_margin_secs: 0,
        }
    }
}

fn default_lifetime_secs() -> u64 {
    DEFAULT_LIFETIME_SECS
}

/// MQTT session settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Delivery guarantee for telemetry: 0, 1 or 2 (default: 1)
    #[serde(default = "default_qos")]
    pub qos: DeliveryGuarantee,
    /// Minimum spacing between connect attempts (default: 5000)
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u32,
    /// MQTT keep-alive interval (default: 60)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// How long to wait for CONNACK/SUBACK (default: 10000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long to wait for PUBACK/PUBCOMP (default: 5000)
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// How long a service pass waits for more inbound traffic (default: 10)
    #[serde(default = "default_service_window_ms")]
    pub service_window_ms: u64,
    /// Maximum MQTT packet size in bytes (default: 512)
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            qos: default_qos(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            service_window_ms: default_service_window_ms(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

fn default_qos() -> DeliveryGuarantee {
    DeliveryGuarantee::AtLeastOnce
}

fn default_reconnect_interval_ms() -> u32 {
    5000
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

fn default_service_window_ms() -> u64 {
    10
}

fn default_max_packet_size() -> usize {
    512
}

/// Telemetry cadence of the runner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    /// Publish interval in milliseconds (default: 5000)
    #[serde(default = "default_telemetry_interval_ms")]
    pub interval_ms: u64,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            interval_ms: default_telemetry_interval_ms(),
        }
    }
}

fn default_telemetry_interval_ms() -> u64 {
    5000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeviceConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.hostname.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.hostname must not be empty".to_string(),
            ));
        }

        validate_device_id(&self.device.device_id)?;

        if self.device.key.is_none() && self.device.key_env.is_none() {
            return Err(ConfigError::InvalidConfig(
                "one of device.key or device.key_env is required".to_string(),
            ));
        }

        if self.credential.lifetime_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "credential.lifetime_secs must be greater than 0".to_string(),
            ));
        }

        if self.credential.renewal_margin_secs >= self.credential.lifetime_secs {
            return Err(ConfigError::InvalidConfig(format!(
                "credential.renewal_margin_secs ({}) must be less than lifetime_secs ({})",
                self.credential.renewal_margin_secs, self.credential.lifetime_secs
            )));
        }

        if self.mqtt.reconnect_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.reconnect_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.mqtt.keep_alive_secs != 0 && self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(format!(
                "mqtt.keep_alive_secs must be 0 or at least 5, got {}",
                self.mqtt.keep_alive_secs
            )));
        }

        if self.telemetry.interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "telemetry.interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the base64 device key; `key_env` takes precedence over `key`
    pub fn device_key(&self) -> Result<String, ConfigError> {
        if let Some(env_name) = &self.device.key_env {
            return std::env::var(env_name)
                .map_err(|_| ConfigError::EnvVarNotFound(env_name.clone()));
        }

        self.device.key.clone().ok_or_else(|| {
            ConfigError::InvalidConfig("no device key configured".to_string())
        })
    }

    /// Copy of this configuration safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.device.key.is_some() {
            copy.device.key = Some("***".to_string());
        }
        copy
    }

    /// Redacted configuration rendered as TOML
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&self.redacted())?)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
hostname = "test-hub.azure-devices.net"
device_id = "test-device"
key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

/// Validate a device id: ASCII alphanumerics plus `.`, `_`, `-` and `:`
fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':'));

    if device_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device ID '{device_id}' must match pattern [a-zA-Z0-9._:-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[device]
hostname = "myhub.azure-devices.net"
device_id = "weather-01"
key_env = "WEATHER_DEVICE_KEY"

[credential]
lifetime_secs = 3600
renewal_margin_secs = 300

[mqtt]
qos = 2
reconnect_interval_ms = 2500
keep_alive_secs = 30
connect_timeout_ms = 8000
ack_timeout_ms = 4000
service_window_ms = 25
max_packet_size = 1024

[telemetry]
interval_ms = 10000
"#;

        let config = DeviceConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.device.hostname, "myhub.azure-devices.net");
        assert_eq!(config.device.device_id, "weather-01");
        assert_eq!(config.device.key_env.as_deref(), Some("WEATHER_DEVICE_KEY"));
        assert_eq!(config.credential.lifetime_secs, 3600);
        assert_eq!(config.credential.renewal_margin_secs, 300);
        assert_eq!(config.mqtt.qos, DeliveryGuarantee::ExactlyOnce);
        assert_eq!(config.mqtt.reconnect_interval_ms, 2500);
        assert_eq!(config.mqtt.max_packet_size, 1024);
        assert_eq!(config.telemetry.interval_ms, 10_000);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = DeviceConfig::test_config();
        assert_eq!(config.credential.lifetime_secs, 86_400);
        assert_eq!(config.credential.renewal_margin_secs, 0);
        assert_eq!(config.mqtt.qos, DeliveryGuarantee::AtLeastOnce);
        assert_eq!(config.mqtt.reconnect_interval_ms, 5000);
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.mqtt.max_packet_size, 512);
        assert_eq!(config.telemetry.interval_ms, 5000);
    }

    #[test]
    fn test_invalid_qos_rejected() {
        let toml_content = r#"
[device]
hostname = "h"
device_id = "d"
key = "AAAA"

[mqtt]
qos = 3
"#;
        let result = DeviceConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_margin_must_be_below_lifetime() {
        let toml_content = r#"
[device]
hostname = "h"
device_id = "d"
key = "AAAA"

[credential]
lifetime_secs = 60
renewal_margin_secs = 60
"#;
        let result = DeviceConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_key_source_rejected() {
        let toml_content = r#"
[device]
hostname = "h"
device_id = "d"
"#;
        let result = DeviceConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_device_id() {
        assert!(validate_device_id("bad/device").is_err());
        assert!(validate_device_id("bad#device").is_err());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("good-device_01.a:b").is_ok());
    }

    #[test]
    fn test_device_key_from_env() {
        let mut config = DeviceConfig::test_config();
        config.device.key_env = Some("TELEMETRY_LINK_TEST_KEY_PRESENT".to_string());
        std::env::set_var("TELEMETRY_LINK_TEST_KEY_PRESENT", "ZW52LWtleQ==");
        assert_eq!(config.device_key().unwrap(), "ZW52LWtleQ==");
    }

    #[test]
    fn test_device_key_env_missing() {
        let mut config = DeviceConfig::test_config();
        config.device.key_env = Some("TELEMETRY_LINK_TEST_KEY_ABSENT".to_string());
        assert!(matches!(
            config.device_key(),
            Err(ConfigError::EnvVarNotFound(name)) if name == "TELEMETRY_LINK_TEST_KEY_ABSENT"
        ));
    }

    #[test]
    fn test_redacted_hides_inline_key() {
        let config = DeviceConfig::test_config();
        let redacted = config.redacted();
        assert_eq!(redacted.device.key.as_deref(), Some("***"));
        assert_eq!(redacted.device.device_id, config.device.device_id);

        let rendered = config.to_redacted_toml().unwrap();
        assert!(rendered.contains("key = \"***\""));
        assert!(!rendered.contains("AAAA"));
    }

    #[test]
    fn test_short_keep_alive_rejected() {
        let mut config = DeviceConfig::test_config();
        config.mqtt.keep_alive_secs = 3;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));

        config.mqtt.keep_alive_secs = 0;
        assert!(config.validate().is_ok());
    }
}
