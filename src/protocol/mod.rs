//! Hub wire protocol: topics, telemetry schema and control messages

pub mod command;
pub mod telemetry;
pub mod topics;

pub use command::{led_command, InboundCommand, LED_KEY};
pub use telemetry::{TelemetryPayload, TelemetryRecord};
pub use topics::{TopicBuilder, API_VERSION, MQTT_TLS_PORT};
