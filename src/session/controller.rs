//! Session controller: owns the connection lifecycle
//!
//! Each [`SessionController::tick`] does at most one of: service the live
//! session, detect that it dropped, or (when the reconnect interval allows)
//! make one connect attempt with a freshly validated credential.

use super::dispatcher::InboundDispatcher;
use super::publisher::MessagePublisher;
use super::state::{
    log_state_transition, next_state, ConnectionEvent, ConnectionState, ReconnectPolicy,
    SessionMetrics, TickOutcome,
};
use super::{PublishError, SessionError};
use crate::clock::TimeSource;
use crate::config::{ConfigError, DeviceConfig};
use crate::credential::{CredentialError, CredentialManager};
use crate::error::sanitize_error_message;
use crate::protocol::{TelemetryRecord, TopicBuilder};
use crate::transport::{ConnectParams, DeliveryGuarantee, Transport};
use tracing::{debug, error, info, warn, Instrument};

/// QoS requested for the cloud-to-device subscription
pub const COMMAND_SUBSCRIPTION_QOS: DeliveryGuarantee = DeliveryGuarantee::AtLeastOnce;

/// Drives one device session over transport `T` using clock `C`
pub struct SessionController<T: Transport, C: TimeSource> {
    hostname: String,
    device_id: String,
    device_key: String,
    transport: T,
    clock: C,
    credentials: CredentialManager,
    publisher: MessagePublisher,
    state: ConnectionState,
    reconnect: ReconnectPolicy,
    metrics: SessionMetrics,
}

impl<T: Transport, C: TimeSource> SessionController<T, C> {
    /// Build a controller and register the dispatcher as the transport's
    /// inbound handler. Fails only if the device key cannot be resolved.
    pub fn new(
        config: &DeviceConfig,
        mut transport: T,
        clock: C,
        dispatcher: InboundDispatcher,
    ) -> Result<Self, ConfigError> {
        let device_key = config.device_key()?;
        transport.set_message_handler(dispatcher.into_handler());

        Ok(Self {
            hostname: config.device.hostname.clone(),
            device_id: config.device.device_id.clone(),
            device_key,
            transport,
            clock,
            credentials: CredentialManager::from_config(&config.credential),
            publisher: MessagePublisher::new(&config.device.device_id, config.mqtt.qos),
            state: ConnectionState::Disconnected,
            reconnect: ReconnectPolicy::new(config.mqtt.reconnect_interval_ms),
            metrics: SessionMetrics::default(),
        })
    }

    /// Log the session identity and make the first connect attempt
    pub async fn begin(&mut self) -> TickOutcome {
        info!(
            hostname = %self.hostname,
            device_id = %self.device_id,
            reconnect_interval_ms = self.reconnect.interval_ms,
            "Starting telemetry session"
        );
        self.tick().await
    }

    /// Advance the session by one step. Never blocks beyond the transport's
    /// bounded waits.
    pub async fn tick(&mut self) -> TickOutcome {
        let now_ms = self.clock.uptime_ms();

        if self.state == ConnectionState::Connected {
            if self.transport.is_connected() {
                return self.service(now_ms).await;
            }
            warn!(device_id = %self.device_id, "Transport no longer connected");
            self.mark_lost();
        }

        if !self.reconnect.is_due(now_ms) {
            return TickOutcome::Waiting {
                retry_in_ms: self.reconnect.remaining_ms(now_ms),
            };
        }

        let span = crate::session_span!(
            device_id = %self.device_id,
            attempt = self.metrics.connect_attempts + 1
        );
        self.attempt_connect(now_ms).instrument(span).await
    }

    /// Publish a telemetry record at the configured QoS
    pub async fn publish(&mut self, record: &TelemetryRecord) -> Result<(), PublishError> {
        let qos = self.publisher.default_qos();
        self.publish_with_qos(record, qos).await
    }

    /// Publish a telemetry record stamped with the current epoch at `qos`
    pub async fn publish_with_qos(
        &mut self,
        record: &TelemetryRecord,
        qos: DeliveryGuarantee,
    ) -> Result<(), PublishError> {
        let now_epoch = self.clock.epoch_seconds();
        let result = self
            .publisher
            .publish(&mut self.transport, self.state, record, now_epoch, qos)
            .await;
        self.record_publish(&result);
        result
    }

    /// Publish a caller-formatted JSON document at the configured QoS
    pub async fn publish_json(&mut self, json: &str) -> Result<(), PublishError> {
        let qos = self.publisher.default_qos();
        let result = self
            .publisher
            .publish_json(&mut self.transport, self.state, json, qos)
            .await;
        self.record_publish(&result);
        result
    }

    /// Close the session. A no-op when already disconnected.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Disconnected {
            debug!("Disconnect requested while already disconnected");
            return Ok(());
        }

        let result = self
            .transport
            .disconnect()
            .await
            .map_err(|e| SessionError::Disconnect(Box::new(e)));
        self.apply(ConnectionEvent::Closed);
        self.metrics.connected_since_ms = None;
        info!(device_id = %self.device_id, "Session closed");
        result
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Number of credentials generated so far
    pub fn credential_generation(&self) -> u64 {
        self.credentials.generation()
    }

    /// Expiry of the current credential, if one was generated
    pub fn credential_expiry(&self) -> Option<u64> {
        self.credentials.current().map(|c| c.expiry_epoch)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn service(&mut self, now_ms: u64) -> TickOutcome {
        match self.transport.service().await {
            Ok(inbound) => {
                self.metrics.commands_received += inbound as u64;
                TickOutcome::Serviced { inbound }
            }
            Err(e) => {
                warn!(
                    device_id = %self.device_id,
                    uptime_ms = now_ms,
                    "Session service failed: {}",
                    sanitize_error_message(&e.to_string())
                );
                self.mark_lost();
                TickOutcome::ConnectionLost
            }
        }
    }

    async fn attempt_connect(&mut self, now_ms: u64) -> TickOutcome {
        // A deferred attempt still waits out the interval before the next one
        self.reconnect.record_attempt(now_ms);

        let now_epoch = self.clock.epoch_seconds();
        if now_epoch == 0 {
            warn!(
                retry_in_ms = self.reconnect.interval_ms,
                "Deferring connect: epoch clock not synchronized"
            );
            return TickOutcome::ClockUnavailable;
        }

        self.metrics.connect_attempts += 1;
        self.apply(ConnectionEvent::AttemptStarted);

        match self.establish(now_epoch).await {
            Ok(generation) => {
                self.apply(ConnectionEvent::Established);
                self.metrics.connections_established += 1;
                self.metrics.connected_since_ms = Some(now_ms);
                TickOutcome::Connected { generation }
            }
            Err(SessionError::Credential(CredentialError::NoTimeSource)) => {
                self.apply(ConnectionEvent::AttemptFailed);
                self.metrics.connect_failures += 1;
                TickOutcome::ClockUnavailable
            }
            Err(e) => {
                error!(
                    device_id = %self.device_id,
                    retry_in_ms = self.reconnect.interval_ms,
                    "Connect attempt failed: {}",
                    sanitize_error_message(&e.to_string())
                );
                self.apply(ConnectionEvent::AttemptFailed);
                self.metrics.connect_failures += 1;
                TickOutcome::ConnectFailed
            }
        }
    }

    async fn establish(&mut self, now_epoch: u64) -> Result<u64, SessionError> {
        let credential = self.credentials.ensure_valid(
            now_epoch,
            &self.hostname,
            &self.device_id,
            &self.device_key,
        )?;
        let params = ConnectParams {
            client_id: self.device_id.clone(),
            username: TopicBuilder::username(&self.hostname, &self.device_id),
            password: credential.token.clone(),
        };
        debug!(
            expiry_epoch = credential.expiry_epoch,
            username = %params.username,
            "Connecting"
        );

        self.transport
            .connect(&params)
            .await
            .map_err(|e| SessionError::Connect(Box::new(e)))?;

        let topic = TopicBuilder::command_subscription(&self.device_id);
        if let Err(e) = self.transport.subscribe(&topic, COMMAND_SUBSCRIPTION_QOS).await {
            if let Err(close_err) = self.transport.disconnect().await {
                debug!("Disconnect after failed subscribe: {}", close_err);
            }
            return Err(SessionError::Subscribe {
                topic,
                source: Box::new(e),
            });
        }
        info!(topic = %topic, "Subscribed to cloud-to-device messages");

        Ok(self.credentials.generation())
    }

    fn mark_lost(&mut self) {
        self.apply(ConnectionEvent::TransportLost);
        self.metrics.connections_lost += 1;
        self.metrics.connected_since_ms = None;
    }

    fn apply(&mut self, event: ConnectionEvent) {
        let next = next_state(self.state, &event);
        log_state_transition(self.state, next);
        self.state = next;
    }

    fn record_publish(&mut self, result: &Result<(), PublishError>) {
        match result {
            Ok(()) => self.metrics.publishes_sent += 1,
            Err(PublishError::NotConnected { .. }) => self.metrics.publishes_rejected += 1,
            Err(_) => self.metrics.publishes_failed += 1,
        }
    }
}
