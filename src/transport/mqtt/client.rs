//! Impure I/O operations for the MQTT transport
//!
//! This module drives the rumqttc event loop inline: every trait call polls
//! the loop itself until the packet it is waiting for arrives or its timeout
//! elapses. No background task is spawned, so the session controller stays
//! the single owner of all connection state.

use super::connection::{configure_mqtt_options, to_qos, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::protocol::{InboundCommand, TopicBuilder};
use crate::transport::{ConnectParams, DeliveryGuarantee, InboundHandler, Transport};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the request channel between client and event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Bound on the final poll that flushes DISCONNECT
const DISCONNECT_FLUSH_MS: u64 = 500;

/// TLS MQTT 3.1.1 transport backed by rumqttc
pub struct MqttTransport {
    hostname: String,
    config: MqttSection,
    client_id: Option<String>,
    client: Option<AsyncClient>,
    event_loop: Option<EventLoop>,
    connected: bool,
    handler: Option<InboundHandler>,
}

impl MqttTransport {
    pub fn new(hostname: &str, config: MqttSection) -> Self {
        Self {
            hostname: hostname.to_string(),
            config,
            client_id: None,
            client: None,
            event_loop: None,
            connected: false,
            handler: None,
        }
    }

    fn client(&self) -> Result<&AsyncClient, MqttError> {
        match (&self.client, self.connected) {
            (Some(client), true) => Ok(client),
            _ => Err(MqttError::NotConnected),
        }
    }

    /// Drop the client and event loop; the next connect starts fresh
    fn teardown(&mut self) {
        if self.connected {
            debug!("Tearing down MQTT session");
        }
        self.connected = false;
        self.client = None;
        self.event_loop = None;
    }

    /// Poll the event loop until `done` accepts an event or the timeout elapses.
    ///
    /// Inbound publishes seen while waiting are delivered, not dropped. A
    /// fatal error tears the session down.
    async fn wait_for<F>(
        &mut self,
        waiting_for: &'static str,
        timeout_ms: u64,
        mut done: F,
    ) -> Result<usize, MqttError>
    where
        F: FnMut(&EventRoute) -> Result<bool, MqttError> + Send,
    {
        let result = {
            let event_loop = self.event_loop.as_mut().ok_or(MqttError::NotConnected)?;
            let handler = &mut self.handler;
            let client_id = self.client_id.as_deref().unwrap_or_default();
            let mut delivered = 0usize;

            let wait = async {
                loop {
                    let event = event_loop.poll().await.map_err(connection_error)?;
                    let route = MessageHandler::route_event(&event);
                    match route {
                        EventRoute::MessageReceived {
                            topic,
                            payload,
                            retain,
                        } => {
                            delivered += deliver(handler, client_id, topic, payload, retain);
                        }
                        EventRoute::Disconnected => return Err(MqttError::ConnectionClosed),
                        route => {
                            if done(&route)? {
                                return Ok(());
                            }
                        }
                    }
                }
            };

            match tokio::time::timeout(Duration::from_millis(timeout_ms), wait).await {
                Ok(Ok(())) => Ok(delivered),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(MqttError::Timeout {
                    waiting_for,
                    timeout_ms,
                }),
            }
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                self.teardown();
            }
        }
        result
    }
}

/// Hand an inbound message to the handler; returns 1 if delivered
fn deliver(
    handler: &mut Option<InboundHandler>,
    device_id: &str,
    topic: String,
    payload: Vec<u8>,
    retain: bool,
) -> usize {
    let is_command = TopicBuilder::is_command_topic(&topic, device_id);
    if !MessageHandler::should_deliver(&topic, retain, is_command) {
        return 0;
    }
    match handler.as_mut() {
        Some(handler) => {
            handler(InboundCommand::new(topic, payload));
            1
        }
        None => {
            warn!(topic = %topic, "Inbound message but no handler registered - dropped");
            0
        }
    }
}

fn connection_error(error: rumqttc::ConnectionError) -> MqttError {
    match error {
        rumqttc::ConnectionError::ConnectionRefused(code) => {
            MqttError::ConnectionRefused(format!("{code:?}"))
        }
        other => MqttError::ConnectionFailed(other),
    }
}

#[async_trait]
impl Transport for MqttTransport {
    type Error = MqttError;

    async fn connect(&mut self, params: &ConnectParams) -> Result<(), Self::Error> {
        self.teardown();

        let options = configure_mqtt_options(&self.hostname, params, &self.config)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        self.client = Some(client);
        self.event_loop = Some(event_loop);
        self.client_id = Some(params.client_id.clone());

        let timeout_ms = self.config.connect_timeout_ms;
        let connack = self
            .wait_for("CONNACK", timeout_ms, |route| match route {
                EventRoute::ConnectionAcknowledged { .. } => Ok(true),
                EventRoute::ConnectionRefused(code) => {
                    Err(MqttError::ConnectionRefused(code.clone()))
                }
                _ => Ok(false),
            })
            .await;

        if let Err(e) = connack {
            // A timed-out connect leaves nothing worth keeping
            self.teardown();
            return Err(e);
        }

        self.connected = true;
        info!(
            host = %self.hostname,
            client_id = %params.client_id,
            "Connected to MQTT broker"
        );
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: DeliveryGuarantee) -> Result<(), Self::Error> {
        self.client()?.subscribe(topic, to_qos(qos)).await?;

        let timeout_ms = self.config.ack_timeout_ms;
        self.wait_for("SUBACK", timeout_ms, |route| match route {
            EventRoute::SubscriptionConfirmed { return_codes, .. } => {
                MessageHandler::validate_subscription_success(return_codes)
                    .map(|()| true)
                    .map_err(MqttError::SubscriptionRejected)
            }
            _ => Ok(false),
        })
        .await?;

        debug!(topic, %qos, "Subscription acknowledged");
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: DeliveryGuarantee,
    ) -> Result<(), Self::Error> {
        let wire_qos = to_qos(qos);
        self.client()?.publish(topic, wire_qos, false, payload).await?;

        let timeout_ms = self.config.ack_timeout_ms;
        let mut sent_pkid: Option<u16> = None;
        let waiting_for = match wire_qos {
            QoS::AtMostOnce => "publish flush",
            QoS::AtLeastOnce => "PUBACK",
            QoS::ExactlyOnce => "PUBCOMP",
        };

        self.wait_for(waiting_for, timeout_ms, |route| {
            if let EventRoute::PublishSent(pkid) = route {
                if sent_pkid.is_none() {
                    sent_pkid = Some(*pkid);
                }
            }
            Ok(MessageHandler::completes_publish(route, wire_qos, sent_pkid))
        })
        .await?;

        Ok(())
    }

    async fn service(&mut self) -> Result<usize, Self::Error> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }

        let result = {
            let event_loop = self.event_loop.as_mut().ok_or(MqttError::NotConnected)?;
            let handler = &mut self.handler;
            let client_id = self.client_id.as_deref().unwrap_or_default();
            let deadline = Instant::now() + Duration::from_millis(self.config.service_window_ms);
            let mut delivered = 0usize;

            loop {
                match tokio::time::timeout_at(deadline, event_loop.poll()).await {
                    // Window elapsed with nothing more pending
                    Err(_) => break Ok(delivered),
                    Ok(Err(e)) => break Err(connection_error(e)),
                    Ok(Ok(event)) => match MessageHandler::route_event(&event) {
                        EventRoute::MessageReceived {
                            topic,
                            payload,
                            retain,
                        } => {
                            delivered += deliver(handler, client_id, topic, payload, retain);
                        }
                        EventRoute::Disconnected => break Err(MqttError::ConnectionClosed),
                        route => debug!("MQTT event during service: {:?}", route),
                    },
                }
            }
        };

        if result.is_err() {
            self.teardown();
        }
        result
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        let Some(client) = self.client.take() else {
            self.teardown();
            return Ok(());
        };

        let request = client.disconnect().await;
        if request.is_ok() {
            if let Some(event_loop) = self.event_loop.as_mut() {
                // Flush the DISCONNECT packet; the loop errors once it is sent
                let _ = tokio::time::timeout(
                    Duration::from_millis(DISCONNECT_FLUSH_MS),
                    event_loop.poll(),
                )
                .await;
            }
        }
        self.teardown();
        info!(host = %self.hostname, "Disconnected from MQTT broker");
        request.map_err(MqttError::from)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_message_handler(&mut self, handler: InboundHandler) {
        self.handler = Some(handler);
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("hostname", &self.hostname)
            .field("client_id", &self.client_id)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}
