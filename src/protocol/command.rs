//! Inbound cloud-to-device control messages

use serde_json::Value;

/// A message delivered on the subscribed control topic, alive for one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundCommand {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Key carrying the LED actuator state
pub const LED_KEY: &str = "led";

/// Extract the LED command from a parsed control document.
///
/// Only the exact strings `"on"` and `"off"` are recognized; anything else
/// (missing key, other strings, non-string values) yields `None`.
pub fn led_command(document: &Value) -> Option<bool> {
    match document.get(LED_KEY)?.as_str()? {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}
