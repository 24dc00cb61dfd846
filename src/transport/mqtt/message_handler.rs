//! Pure routing decisions for MQTT events

use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet, QoS, SubscribeReasonCode};
use tracing::debug;

/// Subscribe return code signalling failure
pub const SUBACK_FAILURE: u8 = 0x80;

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged { session_present: bool },
    /// Broker answered CONNECT with a refusal code
    ConnectionRefused(String),
    /// Message received on a subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        retain: bool,
    },
    /// PUBACK for a QoS 1 publish
    PublishAcknowledged(u16),
    /// PUBCOMP closing a QoS 2 publish
    PublishCompleted(u16),
    /// SUBACK with one return code per filter
    SubscriptionConfirmed { packet_id: u16, return_codes: Vec<u8> },
    /// A publish left the client with this packet id (0 for QoS 0)
    PublishSent(u16),
    /// Broker sent DISCONNECT
    Disconnected,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Other outgoing traffic
    OutgoingEvent,
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route an MQTT event (pure routing decision)
    pub fn route_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => {
                    if connack.code == ConnectReturnCode::Success {
                        EventRoute::ConnectionAcknowledged {
                            session_present: connack.session_present,
                        }
                    } else {
                        EventRoute::ConnectionRefused(format!("{:?}", connack.code))
                    }
                }
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retain: publish.retain,
                },
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged(puback.pkid),
                Packet::PubComp(pubcomp) => EventRoute::PublishCompleted(pubcomp.pkid),
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    return_codes: suback
                        .return_codes
                        .iter()
                        .map(Self::return_code_byte)
                        .collect(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Publish(pkid)) => EventRoute::PublishSent(*pkid),
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Whether `route` completes a publish sent with `packet_id` at `qos`
    pub fn completes_publish(route: &EventRoute, qos: QoS, packet_id: Option<u16>) -> bool {
        match (qos, route, packet_id) {
            (QoS::AtMostOnce, EventRoute::PublishSent(_), _) => true,
            (QoS::AtLeastOnce, EventRoute::PublishAcknowledged(ack), Some(sent)) => *ack == sent,
            (QoS::ExactlyOnce, EventRoute::PublishCompleted(comp), Some(sent)) => *comp == sent,
            _ => false,
        }
    }

    /// Validate subscription success from SubAck (pure function)
    pub fn validate_subscription_success(return_codes: &[u8]) -> Result<(), String> {
        if return_codes.is_empty() || return_codes.iter().any(|&code| code >= SUBACK_FAILURE) {
            Err(format!(
                "Subscription failed with return codes: {return_codes:?}"
            ))
        } else {
            Ok(())
        }
    }

    /// Whether an inbound message should reach the handler (pure function)
    pub fn should_deliver(topic: &str, retain: bool, is_command_topic: bool) -> bool {
        if !is_command_topic {
            debug!("Ignoring message on unexpected topic: {}", topic);
            return false;
        }
        if retain {
            debug!("Delivering retained message on topic: {}", topic);
        }
        true
    }

    fn return_code_byte(code: &SubscribeReasonCode) -> u8 {
        match code {
            SubscribeReasonCode::Success(QoS::AtMostOnce) => 0x00,
            SubscribeReasonCode::Success(QoS::AtLeastOnce) => 0x01,
            SubscribeReasonCode::Success(QoS::ExactlyOnce) => 0x02,
            SubscribeReasonCode::Failure => SUBACK_FAILURE,
        }
    }
}
