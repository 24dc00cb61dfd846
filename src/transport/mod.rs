//! Transport layer for the device session
//!
//! The session controller drives an already-secured publish/subscribe
//! transport through the [`Transport`] trait. [`mqtt::MqttTransport`] is the
//! production implementation; `testing::MockTransport` stands in for tests.

use crate::protocol::InboundCommand;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod mqtt;

/// Callback invoked for every message arriving on a subscribed topic
pub type InboundHandler = Box<dyn FnMut(InboundCommand) + Send>;

/// Acknowledgment strength requested for a single publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeliveryGuarantee {
    /// Level 0: fire-and-forget
    AtMostOnce,
    /// Level 1: wait for the broker's PUBACK
    AtLeastOnce,
    /// Level 2: wait for the full PUBREC/PUBREL/PUBCOMP handshake
    ExactlyOnce,
}

impl DeliveryGuarantee {
    pub fn level(self) -> u8 {
        match self {
            DeliveryGuarantee::AtMostOnce => 0,
            DeliveryGuarantee::AtLeastOnce => 1,
            DeliveryGuarantee::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for DeliveryGuarantee {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(DeliveryGuarantee::AtMostOnce),
            1 => Ok(DeliveryGuarantee::AtLeastOnce),
            2 => Ok(DeliveryGuarantee::ExactlyOnce),
            other => Err(format!("delivery guarantee must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<DeliveryGuarantee> for u8 {
    fn from(qos: DeliveryGuarantee) -> Self {
        qos.level()
    }
}

impl fmt::Display for DeliveryGuarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS {}", self.level())
    }
}

/// Credentials for a single connect attempt
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Secured publish/subscribe transport
///
/// Every call completes its network round trip before returning; the
/// session controller never has two calls in flight.
#[async_trait::async_trait]
pub trait Transport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a session with the given credentials, returning once the broker accepted it
    async fn connect(&mut self, params: &ConnectParams) -> Result<(), Self::Error>;

    /// Subscribe to a topic filter, returning once the broker acknowledged it
    async fn subscribe(&mut self, topic: &str, qos: DeliveryGuarantee)
        -> Result<(), Self::Error>;

    /// Publish a payload, waiting for the acknowledgment `qos` requires
    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: DeliveryGuarantee,
    ) -> Result<(), Self::Error>;

    /// Drain pending inbound traffic and keep the session alive.
    ///
    /// Returns the number of inbound messages handed to the handler.
    async fn service(&mut self) -> Result<usize, Self::Error>;

    /// Close the session
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Liveness check used to detect dropped sessions lazily
    fn is_connected(&self) -> bool;

    /// Register the callback for inbound messages
    fn set_message_handler(&mut self, handler: InboundHandler);
}

/// Type alias for the production transport
pub type DefaultTransport = mqtt::MqttTransport;
