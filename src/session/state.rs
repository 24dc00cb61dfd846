//! Pure connection state machine, reconnect pacing and session metrics

use tracing::{debug, info, warn};

/// Connection state owned by the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; the next due tick attempts a connect
    Disconnected,
    /// Connect in progress; only observable inside a single tick
    Connecting,
    /// Session established and control topic subscribed
    Connected,
}

/// Events that drive state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connect attempt passed the clock check and is starting
    AttemptStarted,
    /// Connect and subscribe both succeeded
    Established,
    /// Credential or transport failure during the attempt
    AttemptFailed,
    /// Liveness check or service pass found the session gone
    TransportLost,
    /// The device closed the session itself
    Closed,
}

/// Next state after `event` (pure function).
///
/// Events that make no sense in the current state leave it unchanged, so an
/// illegal combination such as "connected while connecting" cannot arise.
pub fn next_state(current: ConnectionState, event: &ConnectionEvent) -> ConnectionState {
    use ConnectionEvent as E;
    use ConnectionState as S;

    match (current, event) {
        (S::Disconnected, E::AttemptStarted) => S::Connecting,
        (S::Connecting, E::Established) => S::Connected,
        (S::Connecting, E::AttemptFailed) => S::Disconnected,
        (S::Connected, E::TransportLost) => S::Disconnected,
        (S::Connecting | S::Connected, E::Closed) => S::Disconnected,
        (state, event) => {
            debug!("Ignoring {:?} in state {:?}", event, state);
            state
        }
    }
}

/// Log a state transition (pure logging function)
pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
    match (from, to) {
        (ConnectionState::Connecting, ConnectionState::Connected) => {
            info!("MQTT session established");
        }
        (ConnectionState::Connected, ConnectionState::Disconnected) => {
            warn!("MQTT session lost");
        }
        (ConnectionState::Connecting, ConnectionState::Disconnected) => {
            warn!("MQTT connect attempt failed");
        }
        (from, to) if from != to => {
            debug!("Session state: {:?} -> {:?}", from, to);
        }
        _ => {}
    }
}

/// Fixed-interval reconnect pacing; no backoff growth and no attempt cap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval_ms: u32,
    /// Uptime of the last attempt; `None` until the first attempt
    pub last_attempt_ms: Option<u64>,
}

impl ReconnectPolicy {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last_attempt_ms: None,
        }
    }

    /// Whether an attempt may start at `now_ms`
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.remaining_ms(now_ms) == 0
    }

    /// Milliseconds until the next attempt may start
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.last_attempt_ms {
            None => 0,
            Some(last) => {
                let elapsed = now_ms.saturating_sub(last);
                u64::from(self.interval_ms).saturating_sub(elapsed)
            }
        }
    }

    pub fn record_attempt(&mut self, now_ms: u64) {
        self.last_attempt_ms = Some(now_ms);
    }
}

/// Counters describing the session's history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub connections_established: u64,
    pub connections_lost: u64,
    pub publishes_sent: u64,
    pub publishes_failed: u64,
    pub publishes_rejected: u64,
    pub commands_received: u64,
    /// Uptime at which the current session was established
    pub connected_since_ms: Option<u64>,
}

impl SessionMetrics {
    /// Age of the current session, if connected
    pub fn session_age_ms(&self, now_ms: u64) -> Option<u64> {
        self.connected_since_ms
            .map(|since| now_ms.saturating_sub(since))
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Connected session serviced; `inbound` messages dispatched
    Serviced { inbound: usize },
    /// A new session was established with this credential generation
    Connected { generation: u64 },
    /// Disconnected, next attempt allowed in `retry_in_ms`
    Waiting { retry_in_ms: u64 },
    /// Epoch clock not yet valid, connect deferred
    ClockUnavailable,
    /// The connect attempt failed
    ConnectFailed,
    /// The session dropped during servicing
    ConnectionLost,
}
