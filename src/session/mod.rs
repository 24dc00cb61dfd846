//! Device session: connection lifecycle, telemetry publishing and control
//! message dispatch
//!
//! [`SessionController`] is the single owner of the transport, the clock and
//! the credential manager. The host drives it by calling
//! [`SessionController::tick`] repeatedly from one task; nothing in here
//! spawns or blocks beyond the transport's own bounded waits.

pub mod controller;
pub mod dispatcher;
pub mod publisher;
pub mod state;

pub use controller::{SessionController, COMMAND_SUBSCRIPTION_QOS};
pub use dispatcher::{ActuatorCallback, InboundDispatcher};
pub use publisher::MessagePublisher;
pub use state::{
    next_state, ConnectionEvent, ConnectionState, ReconnectPolicy, SessionMetrics, TickOutcome,
};

use crate::credential::CredentialError;
use thiserror::Error;

/// Failures while establishing or closing a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Credential unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error("Connect failed: {0}")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Subscribe to {topic} failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Disconnect failed: {0}")]
    Disconnect(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Telemetry publish failures; the record is dropped in every case
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Control message failures; the message is discarded
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Malformed control payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
}
