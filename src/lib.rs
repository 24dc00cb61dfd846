//! telemetry-link - self-signing MQTT telemetry link
//!
//! A device-side session for IoT Hub style brokers. The device signs its own
//! time-bounded shared access signature from a symmetric key, keeps one TLS
//! MQTT session alive with fixed-interval reconnects, publishes telemetry
//! documents and turns cloud-to-device control messages into actuator calls.
//!
//! # Overview
//!
//! - [`credential`] - SAS token signing and credential lifetime management
//! - [`session`] - Connection state machine, publisher and inbound dispatcher
//! - [`transport`] - Transport trait and the rumqttc-backed MQTT implementation
//! - [`protocol`] - Topics, telemetry schema and control message parsing
//! - [`clock`] - Epoch and monotonic time sources
//! - [`config`] - TOML device configuration
//!
//! # Quick Start
//!
//! ```rust
//! use telemetry_link::credential::build_token;
//!
//! let token = build_token(
//!     "h",
//!     "d",
//!     "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
//!     1000,
//! )
//! .unwrap();
//! assert_eq!(
//!     token,
//!     "SharedAccessSignature sr=h/devices/d&sig=D0Vxj%2FjzQ1jYTaRxNdJEqO9Dp1sbAuO1LQ4sQfTdu40%3D&se=1000"
//! );
//! ```
//!
//! Driving a session against a mock transport:
//!
//! ```rust
//! use telemetry_link::config::DeviceConfig;
//! use telemetry_link::session::{InboundDispatcher, SessionController, TickOutcome};
//! use telemetry_link::testing::{MockTimeSource, MockTransport};
//!
//! # tokio_test::block_on(async {
//! let config = DeviceConfig::from_toml_str(
//!     r#"
//! [device]
//! hostname = "myhub.azure-devices.net"
//! device_id = "dev-01"
//! key = "VCykuAaTiZdmGcRh+HTZXGCjbuy6TWUDSkWZFCzpdDY="
//! "#,
//! )?;
//!
//! let dispatcher = InboundDispatcher::new(|on| println!("LED {}", if on { "on" } else { "off" }));
//! let mut session = SessionController::new(
//!     &config,
//!     MockTransport::new(),
//!     MockTimeSource::new(1_700_000_000),
//!     dispatcher,
//! )?;
//!
//! assert_eq!(session.begin().await, TickOutcome::Connected { generation: 1 });
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use clock::{SystemTimeSource, TimeSource};
pub use config::{ConfigError, DeviceConfig};
pub use credential::{build_token, Credential, CredentialError, CredentialManager};
pub use error::{DeviceError, DeviceResult};
pub use protocol::{InboundCommand, TelemetryPayload, TelemetryRecord};
pub use session::{
    ConnectionState, InboundDispatcher, MessagePublisher, SessionController, TickOutcome,
};
pub use transport::{DeliveryGuarantee, Transport};
