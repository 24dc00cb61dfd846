//! Telemetry serialization and hand-off to the transport

use super::state::ConnectionState;
use super::PublishError;
use crate::error::sanitize_error_message;
use crate::protocol::{TelemetryPayload, TelemetryRecord, TopicBuilder};
use crate::transport::{DeliveryGuarantee, Transport};
use tracing::{debug, info, warn};

/// Publishes telemetry on the device's event topic.
///
/// Nothing is buffered or retried here: a record that cannot be delivered
/// now is dropped and the caller's next sample replaces it.
#[derive(Debug, Clone)]
pub struct MessagePublisher {
    topic: String,
    default_qos: DeliveryGuarantee,
}

impl MessagePublisher {
    pub fn new(device_id: &str, default_qos: DeliveryGuarantee) -> Self {
        Self {
            topic: TopicBuilder::telemetry_topic(device_id),
            default_qos,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn default_qos(&self) -> DeliveryGuarantee {
        self.default_qos
    }

    /// Serialize `record` stamped with `now_epoch` and publish it at `qos`
    pub async fn publish<T: Transport>(
        &self,
        transport: &mut T,
        state: ConnectionState,
        record: &TelemetryRecord,
        now_epoch: u64,
        qos: DeliveryGuarantee,
    ) -> Result<(), PublishError> {
        ensure_connected(state)?;

        let unavailable = record.unavailable_sensors();
        if !unavailable.is_empty() {
            debug!(
                sensors = ?unavailable,
                sampled_at_ms = record.sampled_at_ms,
                "Publishing record with unavailable sensors"
            );
        }

        let payload = TelemetryPayload::from_record(record, now_epoch)
            .to_json()
            .map_err(PublishError::Serialization)?;

        self.send(transport, payload, qos).await
    }

    /// Publish a caller-formatted JSON document on the telemetry topic
    pub async fn publish_json<T: Transport>(
        &self,
        transport: &mut T,
        state: ConnectionState,
        json: &str,
        qos: DeliveryGuarantee,
    ) -> Result<(), PublishError> {
        ensure_connected(state)?;
        self.send(transport, json.as_bytes().to_vec(), qos).await
    }

    async fn send<T: Transport>(
        &self,
        transport: &mut T,
        payload: Vec<u8>,
        qos: DeliveryGuarantee,
    ) -> Result<(), PublishError> {
        let size = payload.len();
        match transport.publish(&self.topic, payload, qos).await {
            Ok(()) => {
                info!(topic = %self.topic, bytes = size, %qos, "Telemetry sent");
                Ok(())
            }
            Err(e) => {
                warn!(
                    topic = %self.topic,
                    %qos,
                    "Telemetry publish failed: {}",
                    sanitize_error_message(&e.to_string())
                );
                Err(PublishError::Transport(Box::new(e)))
            }
        }
    }
}

fn ensure_connected(state: ConnectionState) -> Result<(), PublishError> {
    if state == ConnectionState::Connected {
        Ok(())
    } else {
        debug!("Dropping publish while {:?}", state);
        Err(PublishError::NotConnected { state })
    }
}
