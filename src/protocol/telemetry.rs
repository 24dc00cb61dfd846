//! Outbound telemetry schema

use serde::{Deserialize, Serialize};

/// Snapshot handed over by the sensor side; the core never mutates it
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity in percent
    pub humidity: f32,
    /// hPa
    pub pressure: f32,
    /// g
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    /// Degrees per second
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
    /// Device uptime in milliseconds when the sample was taken
    #[serde(default)]
    pub sampled_at_ms: u64,
    /// Temperature/humidity/pressure sensor produced a reading
    #[serde(default = "default_valid")]
    pub environment_valid: bool,
    /// Accelerometer/gyroscope produced a reading
    #[serde(default = "default_valid")]
    pub motion_valid: bool,
}

fn default_valid() -> bool {
    true
}

impl TelemetryRecord {
    /// Sensor groups whose readings in this record are placeholders.
    /// Their fields are still published as-is.
    pub fn unavailable_sensors(&self) -> Vec<&'static str> {
        let mut sensors = Vec::new();
        if !self.environment_valid {
            sensors.push("environment");
        }
        if !self.motion_valid {
            sensors.push("motion");
        }
        sensors
    }
}

/// Wire form of a telemetry message; every field is present on every publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    /// Epoch seconds at publish time
    pub timestamp: u64,
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub gyro_x: f32,
    pub gyro_y: f32,
    pub gyro_z: f32,
}

impl TelemetryPayload {
    pub fn from_record(record: &TelemetryRecord, now_epoch: u64) -> Self {
        Self {
            timestamp: now_epoch,
            temperature: record.temperature,
            humidity: record.humidity,
            pressure: record.pressure,
            accel_x: record.accel_x,
            accel_y: record.accel_y,
            accel_z: record.accel_z,
            gyro_x: record.gyro_x,
            gyro_y: record.gyro_y,
            gyro_z: record.gyro_z,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
