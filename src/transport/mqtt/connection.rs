//! Pure connection configuration for the MQTT transport
//!
//! This module contains pure functions that turn device configuration and
//! per-attempt credentials into broker options, plus the transport's error
//! type.

use crate::config::MqttSection;
use crate::protocol::MQTT_TLS_PORT;
use crate::transport::{ConnectParams, DeliveryGuarantee};
use rumqttc::{MqttOptions, QoS, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;

/// Largest inbound packet accepted (cloud-to-device messages are capped at 256KB)
pub const MAX_INCOMING_PACKET_SIZE: usize = 256 * 1024;

/// Smallest non-zero keep-alive the client library accepts
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker options: {0}")]
    InvalidOptions(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] rumqttc::ConnectionError),
    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),
    #[error("Client request failed: {0}")]
    ClientRequest(#[from] rumqttc::ClientError),
    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),
    #[error("Timed out after {timeout_ms} ms waiting for {waiting_for}")]
    Timeout {
        waiting_for: &'static str,
        timeout_ms: u64,
    },
    #[error("Broker closed the connection")]
    ConnectionClosed,
    #[error("Not connected")]
    NotConnected,
}

impl MqttError {
    /// Whether the session is unusable after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MqttError::ClientRequest(_) | MqttError::Timeout { .. }
        )
    }
}

/// Map a delivery guarantee onto the wire QoS
pub fn to_qos(guarantee: DeliveryGuarantee) -> QoS {
    match guarantee {
        DeliveryGuarantee::AtMostOnce => QoS::AtMostOnce,
        DeliveryGuarantee::AtLeastOnce => QoS::AtLeastOnce,
        DeliveryGuarantee::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Build broker options for one connect attempt (pure function)
///
/// Always TLS on port 8883 with a clean session; the device re-subscribes
/// after every connect.
pub fn configure_mqtt_options(
    hostname: &str,
    params: &ConnectParams,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    if hostname.trim().is_empty() {
        return Err(MqttError::InvalidOptions("hostname is empty".to_string()));
    }
    if params.client_id.is_empty() {
        return Err(MqttError::InvalidOptions("client id is empty".to_string()));
    }
    if config.keep_alive_secs != 0 && config.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
        return Err(MqttError::InvalidOptions(format!(
            "keep_alive_secs must be 0 or at least {MIN_KEEP_ALIVE_SECS}, got {}",
            config.keep_alive_secs
        )));
    }

    let mut mqtt_options = MqttOptions::new(params.client_id.clone(), hostname, MQTT_TLS_PORT);
    mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    mqtt_options.set_credentials(params.username.clone(), params.password.clone());
    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    mqtt_options.set_clean_session(true);

    // Outgoing limit bounds telemetry documents; inbound stays at the hub maximum
    mqtt_options.set_max_packet_size(MAX_INCOMING_PACKET_SIZE, config.max_packet_size);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> ConnectParams {
        ConnectParams {
            client_id: "dev-01".to_string(),
            username: "myhub.azure-devices.net/dev-01/?api-version=2021-04-12".to_string(),
            password: "SharedAccessSignature sr=x&sig=y&se=1".to_string(),
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(
            "myhub.azure-devices.net",
            &test_params(),
            &MqttSection::default(),
        )
        .unwrap();

        assert_eq!(
            options.broker_address(),
            ("myhub.azure-devices.net".to_string(), 8883)
        );
        assert_eq!(options.client_id(), "dev-01");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }

    #[test]
    fn test_empty_hostname_rejected() {
        let result = configure_mqtt_options(" ", &test_params(), &MqttSection::default());
        assert!(matches!(result, Err(MqttError::InvalidOptions(_))));
    }

    #[test]
    fn test_short_keep_alive_rejected() {
        let config = MqttSection {
            keep_alive_secs: 2,
            ..Default::default()
        };
        let result = configure_mqtt_options("hub", &test_params(), &config);
        assert!(matches!(result, Err(MqttError::InvalidOptions(_))));
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_qos(DeliveryGuarantee::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(to_qos(DeliveryGuarantee::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(to_qos(DeliveryGuarantee::ExactlyOnce), QoS::ExactlyOnce);
    }

    #[test]
    fn test_error_fatality() {
        assert!(MqttError::ConnectionClosed.is_fatal());
        assert!(MqttError::NotConnected.is_fatal());
        assert!(!MqttError::Timeout {
            waiting_for: "PUBACK",
            timeout_ms: 10
        }
        .is_fatal());
    }
}
