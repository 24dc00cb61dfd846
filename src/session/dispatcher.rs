//! Cloud-to-device control message dispatch

use super::DispatchError;
use crate::protocol::{led_command, InboundCommand};
use crate::transport::InboundHandler;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Sink for actuator commands (`true` = LED on)
pub type ActuatorCallback = Box<dyn FnMut(bool) + Send>;

/// Parses control messages and drives the actuator.
///
/// Unknown fields and unrecognized values are ignored so newer cloud-side
/// senders never break older devices.
pub struct InboundDispatcher {
    actuator: ActuatorCallback,
}

impl InboundDispatcher {
    pub fn new(actuator: impl FnMut(bool) + Send + 'static) -> Self {
        Self {
            actuator: Box::new(actuator),
        }
    }

    /// Dispatch one message, returning the actuator value applied, if any
    pub fn on_message(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<Option<bool>, DispatchError> {
        debug!(
            topic,
            bytes = payload.len(),
            payload = %String::from_utf8_lossy(payload),
            "Cloud-to-device message received"
        );

        let document: Value =
            serde_json::from_slice(payload).map_err(DispatchError::MalformedPayload)?;

        match led_command(&document) {
            Some(on) => {
                info!(led = if on { "on" } else { "off" }, "LED command");
                (self.actuator)(on);
                Ok(Some(on))
            }
            None => {
                debug!("No recognized command in control message");
                Ok(None)
            }
        }
    }

    /// Dispatch a command, logging and discarding malformed payloads
    pub fn handle(&mut self, command: InboundCommand) {
        if let Err(e) = self.on_message(&command.topic, &command.payload) {
            warn!(topic = %command.topic, "Discarding control message: {}", e);
        }
    }

    /// Wrap this dispatcher in a transport message handler that owns it
    pub fn into_handler(mut self) -> InboundHandler {
        Box::new(move |command| self.handle(command))
    }
}

impl std::fmt::Debug for InboundDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundDispatcher").finish_non_exhaustive()
    }
}
