/// MQTT broker sessions over rumqttc
use async_trait::async_trait;
use log::{debug, warn};
use rumqttc::mqttbytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, PingReq, QoS, Request, StateError,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::BrokerAddress;
use crate::error::SessionError;
use crate::telemetry::session::{BrokerConnector, BrokerSession, InboundMessage, SessionEvent};

/// Longest wait for a single broker event before reporting a timeout
pub const EVENT_WAIT: Duration = Duration::from_secs(10);
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);
/// Largest packet accepted in either direction
pub const MAX_PACKET_SIZE: usize = 1024;

/// Opens rumqttc connections and waits for the broker's CONNACK
#[derive(Debug, Clone)]
pub struct MqttConnector {
    event_wait: Duration,
    keep_alive: Duration,
    max_packet_size: usize,
}

impl Default for MqttConnector {
    fn default() -> Self {
        MqttConnector {
            event_wait: EVENT_WAIT,
            keep_alive: KEEP_ALIVE,
            max_packet_size: MAX_PACKET_SIZE,
        }
    }
}

impl MqttConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(
        &self,
        address: &BrokerAddress,
        client_id: &str,
    ) -> Result<Box<dyn BrokerSession>, SessionError> {
        let mut options = MqttOptions::new(client_id, address.host.clone(), address.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(self.max_packet_size, self.max_packet_size);

        let (client, mut event_loop) = AsyncClient::new(options, 10);

        // rumqttc connects lazily on the first poll
        loop {
            match timeout(self.event_wait, event_loop.poll()).await {
                Err(_) => {
                    return Err(SessionError::Connect(format!(
                        "no CONNACK from {} within {:?}",
                        address, self.event_wait
                    )))
                }
                Ok(Err(e)) => return Err(SessionError::Connect(e.to_string())),
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(SessionError::Connect(format!("{:?}", ack.code)));
                    }
                    break;
                }
                Ok(Ok(_)) => continue,
            }
        }

        Ok(Box::new(MqttSession {
            client,
            event_loop,
            event_wait: self.event_wait,
            backlog: VecDeque::new(),
            open: true,
        }))
    }
}

/// A connected rumqttc client and its event loop
pub struct MqttSession {
    client: AsyncClient,
    event_loop: EventLoop,
    event_wait: Duration,
    /// Publishes that arrived while a ping was being flushed
    backlog: VecDeque<SessionEvent>,
    open: bool,
}

impl MqttSession {
    fn classify(
        &mut self,
        event: Result<Event, ConnectionError>,
    ) -> Result<SessionEvent, SessionError> {
        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                Ok(SessionEvent::Publish(InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                }))
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                self.open = false;
                Err(SessionError::ConnectionLost(
                    "broker sent DISCONNECT".to_string(),
                ))
            }
            Ok(_) => Ok(SessionEvent::Other),
            Err(ConnectionError::MqttState(StateError::Deserialization(
                mqttbytes::Error::PayloadSizeLimitExceeded { .. },
            ))) => {
                self.open = false;
                debug!("Rejected inbound packet above {} bytes", MAX_PACKET_SIZE);
                Ok(SessionEvent::TooBig)
            }
            Err(e) => {
                self.open = false;
                Err(SessionError::ConnectionLost(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| SessionError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn next_event(&mut self) -> Result<SessionEvent, SessionError> {
        if let Some(event) = self.backlog.pop_front() {
            return Ok(event);
        }
        match timeout(self.event_wait, self.event_loop.poll()).await {
            Err(_) => Ok(SessionEvent::Timeout),
            Ok(event) => self.classify(event),
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .await
            .map_err(|e| SessionError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    /// Queue a PINGREQ and drive the event loop until it is written
    async fn ping(&mut self) -> Result<(), SessionError> {
        if !self.open {
            return Err(SessionError::Ping("connection closed".to_string()));
        }

        self.event_loop.pending.push_back(Request::PingReq(PingReq));
        loop {
            let event = match timeout(self.event_wait, self.event_loop.poll()).await {
                Err(_) => {
                    return Err(SessionError::Ping(format!(
                        "PINGREQ not sent within {:?}",
                        self.event_wait
                    )))
                }
                Ok(Ok(Event::Outgoing(Outgoing::PingReq))) => return Ok(()),
                Ok(event) => event,
            };
            match self.classify(event) {
                Ok(SessionEvent::Publish(message)) => {
                    self.backlog.push_back(SessionEvent::Publish(message))
                }
                Ok(SessionEvent::TooBig) => {
                    return Err(SessionError::Ping("oversized packet from broker".to_string()))
                }
                Ok(_) => {}
                Err(e) => return Err(SessionError::Ping(e.to_string())),
            }
        }
    }

    async fn disconnect(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect failed: {}", e);
            return;
        }
        // Drive the event loop once so DISCONNECT reaches the socket
        let _ = timeout(Duration::from_secs(1), self.event_loop.poll()).await;
        self.open = false;
    }
}
