//! Mock implementations for testing
//!
//! Provides a mock Transport and a manually driven TimeSource so the session
//! controller can be exercised without a broker or a real clock. Both are
//! cheap handles over shared state: clone one, give it to the controller and
//! keep the other to inspect and steer it.

use crate::clock::TimeSource;
use crate::protocol::InboundCommand;
use crate::transport::{ConnectParams, DeliveryGuarantee, InboundHandler, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// A publish accepted by the mock transport
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: DeliveryGuarantee,
}

/// Failure injected into the mock transport
#[derive(Debug, Clone, Error)]
#[error("Mock transport failure: {0}")]
pub struct MockTransportError(pub String);

#[derive(Default)]
struct MockTransportState {
    connected: bool,
    total_calls: usize,
    connect_calls: Vec<ConnectParams>,
    subscriptions: Vec<(String, DeliveryGuarantee)>,
    publish_attempts: usize,
    published: Vec<PublishedMessage>,
    service_calls: usize,
    disconnect_calls: usize,
    fail_connect: bool,
    fail_subscribe: bool,
    publish_error: Option<String>,
    fail_service: bool,
    inbound: VecDeque<InboundCommand>,
}

/// Mock transport for testing
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
    handler: Arc<Mutex<Option<InboundHandler>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that already holds an open session
    pub fn connected() -> Self {
        let transport = Self::new();
        transport.lock().connected = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.lock().publish_error = fail.then(|| "Mock publish failure".to_string());
    }

    /// Fail every publish with `message` as the transport error text
    pub fn set_publish_error(&self, message: impl Into<String>) {
        self.lock().publish_error = Some(message.into());
    }

    /// Make `service` fail and drop the session, like a broken socket
    pub fn set_fail_service(&self, fail: bool) {
        self.lock().fail_service = fail;
    }

    /// Simulate the broker closing the session
    pub fn drop_connection(&self) {
        self.lock().connected = false;
    }

    /// Queue a message to be delivered on the next `service` call
    pub fn queue_inbound(&self, topic: &str, payload: &[u8]) {
        self.lock()
            .inbound
            .push_back(InboundCommand::new(topic, payload.to_vec()));
    }

    /// Number of trait calls of any kind
    pub fn total_calls(&self) -> usize {
        self.lock().total_calls
    }

    pub fn connect_calls(&self) -> Vec<ConnectParams> {
        self.lock().connect_calls.clone()
    }

    pub fn subscriptions(&self) -> Vec<(String, DeliveryGuarantee)> {
        self.lock().subscriptions.clone()
    }

    pub fn publish_attempts(&self) -> usize {
        self.lock().publish_attempts
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    pub fn service_count(&self) -> usize {
        self.lock().service_calls
    }

    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnect_calls
    }

    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.total_calls = 0;
        state.connect_calls.clear();
        state.subscriptions.clear();
        state.publish_attempts = 0;
        state.published.clear();
        state.service_calls = 0;
        state.disconnect_calls = 0;
    }

    fn not_connected() -> MockTransportError {
        MockTransportError("not connected".to_string())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockTransport")
            .field("connected", &state.connected)
            .field("total_calls", &state.total_calls)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self, params: &ConnectParams) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.connect_calls.push(params.clone());
        if state.fail_connect {
            return Err(MockTransportError("Mock connection failure".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: DeliveryGuarantee) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.total_calls += 1;
        if !state.connected {
            return Err(Self::not_connected());
        }
        if state.fail_subscribe {
            return Err(MockTransportError("Mock subscription failure".to_string()));
        }
        state.subscriptions.push((topic.to_string(), qos));
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: DeliveryGuarantee,
    ) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.publish_attempts += 1;
        if !state.connected {
            return Err(Self::not_connected());
        }
        if let Some(message) = &state.publish_error {
            return Err(MockTransportError(message.clone()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    async fn service(&mut self) -> Result<usize, Self::Error> {
        let pending: Vec<InboundCommand> = {
            let mut state = self.lock();
            state.total_calls += 1;
            state.service_calls += 1;
            if state.fail_service {
                state.connected = false;
                return Err(MockTransportError("Mock connection reset".to_string()));
            }
            if !state.connected {
                return Err(Self::not_connected());
            }
            state.inbound.drain(..).collect()
        };

        let count = pending.len();
        let mut handler = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = handler.as_mut() {
            for command in pending {
                handler(command);
            }
        }
        Ok(count)
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.total_calls += 1;
        state.disconnect_calls += 1;
        state.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn set_message_handler(&mut self, handler: InboundHandler) {
        *self.handler.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }
}

/// Manually advanced clock
#[derive(Debug, Clone, Default)]
pub struct MockTimeSource {
    epoch: Arc<AtomicU64>,
    uptime_ms: Arc<AtomicU64>,
}

impl MockTimeSource {
    /// Clock reading `epoch` seconds (0 = unsynchronized) at uptime 0
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch: Arc::new(AtomicU64::new(epoch)),
            uptime_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    /// Advance uptime only
    pub fn advance_ms(&self, ms: u64) {
        self.uptime_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Advance uptime and, once synchronized, the epoch clock
    pub fn advance_secs(&self, secs: u64) {
        self.uptime_ms.fetch_add(secs * 1000, Ordering::SeqCst);
        let _ = self
            .epoch
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |epoch| {
                (epoch != 0).then(|| epoch + secs)
            });
    }
}

impl TimeSource for MockTimeSource {
    fn epoch_seconds(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_records_calls() {
        let mut transport = MockTransport::new();
        let params = ConnectParams {
            client_id: "dev".to_string(),
            username: "hub/dev/?api-version=2021-04-12".to_string(),
            password: "token".to_string(),
        };

        transport.connect(&params).await.unwrap();
        transport
            .subscribe("devices/dev/messages/devicebound/#", DeliveryGuarantee::AtLeastOnce)
            .await
            .unwrap();
        transport
            .publish("t", b"{}".to_vec(), DeliveryGuarantee::AtMostOnce)
            .await
            .unwrap();

        assert!(transport.is_connected());
        assert_eq!(transport.total_calls(), 3);
        assert_eq!(transport.connect_calls(), vec![params]);
        assert_eq!(transport.published()[0].topic, "t");
    }

    #[tokio::test]
    async fn test_mock_transport_delivers_queued_inbound() {
        let mut transport = MockTransport::connected();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        transport.set_message_handler(Box::new(move |command| {
            sink.lock().unwrap().push(command.topic);
        }));

        transport.queue_inbound("a", b"1");
        transport.queue_inbound("b", b"2");

        assert_eq!(transport.service().await.unwrap(), 2);
        assert_eq!(transport.service().await.unwrap(), 0);
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_transport_service_failure_drops_session() {
        let mut transport = MockTransport::connected();
        transport.set_fail_service(true);
        assert!(transport.service().await.is_err());
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_mock_time_source() {
        let clock = MockTimeSource::new(0);
        clock.advance_secs(10);
        assert_eq!(clock.epoch_seconds(), 0);
        assert_eq!(clock.uptime_ms(), 10_000);

        clock.set_epoch(100);
        clock.advance_secs(5);
        assert_eq!(clock.epoch_seconds(), 105);

        let shared = clock.clone();
        shared.advance_ms(1);
        assert_eq!(clock.uptime_ms(), 15_001);
    }
}
