//! Topic and identity string construction for the hub's MQTT surface

/// API version advertised in the MQTT username
pub const API_VERSION: &str = "2021-04-12";

/// TLS port of the hub's MQTT endpoint
pub const MQTT_TLS_PORT: u16 = 8883;

/// Hub topic construction functions
pub struct TopicBuilder;

impl TopicBuilder {
    /// Device-to-cloud telemetry topic: `devices/{device_id}/messages/events/`
    pub fn telemetry_topic(device_id: &str) -> String {
        format!("devices/{device_id}/messages/events/")
    }

    /// Cloud-to-device subscription filter: `devices/{device_id}/messages/devicebound/#`
    pub fn command_subscription(device_id: &str) -> String {
        format!("devices/{device_id}/messages/devicebound/#")
    }

    /// Whether `topic` is a cloud-to-device message for this device
    pub fn is_command_topic(topic: &str, device_id: &str) -> bool {
        topic.starts_with(&format!("devices/{device_id}/messages/devicebound/"))
    }

    /// MQTT username: `{hostname}/{device_id}/?api-version=2021-04-12`
    pub fn username(hostname: &str, device_id: &str) -> String {
        format!("{hostname}/{device_id}/?api-version={API_VERSION}")
    }
}
