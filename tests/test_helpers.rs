//! Test helpers and utilities for integration tests

use std::sync::{Arc, Mutex};
use telemetry_link::config::DeviceConfig;
use telemetry_link::session::InboundDispatcher;

/// 2023-11-14T22:13:20Z
#[allow(dead_code)]
pub const START_EPOCH: u64 = 1_700_000_000;

#[allow(dead_code)]
pub const REALISTIC_KEY: &str = "VCykuAaTiZdmGcRh+HTZXGCjbuy6TWUDSkWZFCzpdDY=";

/// Create a test configuration for integration tests
#[allow(dead_code)]
pub fn test_config() -> DeviceConfig {
    DeviceConfig::from_toml_str(&format!(
        r#"
[device]
hostname = "myhub.azure-devices.net"
device_id = "dev-01"
key = "{REALISTIC_KEY}"

[mqtt]
reconnect_interval_ms = 5000
"#
    ))
    .expect("test config should parse")
}

/// Dispatcher that records every actuator call
#[allow(dead_code)]
pub fn recording_dispatcher() -> (InboundDispatcher, Arc<Mutex<Vec<bool>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let dispatcher = InboundDispatcher::new(move |on| sink.lock().unwrap().push(on));
    (dispatcher, calls)
}

/// A concrete topic the hub delivers cloud-to-device messages on
#[allow(dead_code)]
pub fn command_topic(device_id: &str) -> String {
    format!("devices/{device_id}/messages/devicebound/%24.to=%2Fdevices%2F{device_id}%2Fmessages%2FdeviceBound")
}
