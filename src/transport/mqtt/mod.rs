//! MQTT 3.1.1 over TLS transport
//!
//! This module separates pure functions from I/O operations for better
//! testability:
//!
//! - [`connection`] - Pure option building and the transport error type
//! - [`message_handler`] - Pure event routing decisions
//! - [`client`] - Impure I/O: drives the rumqttc event loop inline
//!
//! # Usage
//!
//! ```rust,no_run
//! use telemetry_link::config::MqttSection;
//! use telemetry_link::transport::mqtt::MqttTransport;
//! use telemetry_link::transport::{ConnectParams, DeliveryGuarantee, Transport};
//!
//! # tokio_test::block_on(async {
//! let mut transport = MqttTransport::new("myhub.azure-devices.net", MqttSection::default());
//! let params = ConnectParams {
//!     client_id: "dev-01".to_string(),
//!     username: "myhub.azure-devices.net/dev-01/?api-version=2021-04-12".to_string(),
//!     password: "SharedAccessSignature sr=...".to_string(),
//! };
//! transport.connect(&params).await?;
//! transport
//!     .publish("devices/dev-01/messages/events/", b"{}".to_vec(), DeliveryGuarantee::AtLeastOnce)
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttTransport;
pub use connection::{configure_mqtt_options, to_qos, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
