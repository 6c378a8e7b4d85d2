//! MQTT publisher for the actuator bus

use crate::transport::traits::{PublishError, Publisher};
use async_trait::async_trait;
use bytes::Bytes;
use relay_shared::topics;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before polling the event loop again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Requests the client may queue ahead of the event loop
const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Connection settings for the message bus
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    /// Site whose topics are echoed to the log when `debug_echo` is set
    pub site_id: String,
    pub debug_echo: bool,
}

/// Publishes actuator commands through a rumqttc client.
///
/// A publish is refused while the broker session is down and when the
/// request queue is full; it never waits for the connection to return.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
}

/// Handle to the task driving the MQTT event loop
pub struct MqttDriverHandle {
    task: JoinHandle<()>,
}

impl MqttPublisher {
    /// Create the client and spawn the task that drives its event loop
    pub fn connect(config: MqttConfig) -> (Self, MqttDriverHandle) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        if let Some((username, password)) = &config.credentials {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        let (connected_tx, connected) = watch::channel(false);
        info!(
            "MQTT client {} connecting to {}:{}",
            config.client_id, config.host, config.port
        );

        let driver = EventDriver {
            client: client.clone(),
            connected: connected_tx,
            echo_filter: topics::site_wildcard(&config.site_id),
            debug_echo: config.debug_echo,
        };
        let task = tokio::spawn(driver.run(eventloop));

        (Self { client, connected }, MqttDriverHandle { task })
    }

    /// Broker session is currently established
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Ask the broker connection to close gracefully
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect request failed: {}", e);
        }
    }
}

impl MqttDriverHandle {
    /// Wait for the driver to flush the disconnect, up to `grace`
    pub async fn join(self, grace: Duration) {
        let mut task = self.task;
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            debug!("MQTT driver did not stop within {:?}, aborting", grace);
            task.abort();
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::failed(topic, "broker not connected"));
        }
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e: ClientError| PublishError::failed(topic, e.to_string()))
    }
}

/// What the driver did with one event loop notification
#[derive(Debug, Clone, PartialEq)]
enum DriverStep {
    Continue,
    /// Session (re)established; `echo` is set when the site wildcard was subscribed
    Connected { echo: bool },
    /// Inbound message logged by debug echo
    Echoed { topic: String, text: String },
    /// Outgoing disconnect sent, stop polling
    Closed,
}

/// Owns the event loop side of the client
struct EventDriver {
    client: AsyncClient,
    connected: watch::Sender<bool>,
    echo_filter: String,
    debug_echo: bool,
}

impl EventDriver {
    /// Poll the event loop until the outgoing disconnect is sent.
    ///
    /// rumqttc reconnects on the next poll after an error, so errors only
    /// pause the loop briefly.
    async fn run(self, mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(event) => {
                    if self.on_event(event) == DriverStep::Closed {
                        break;
                    }
                }
                Err(ConnectionError::RequestsDone) => {
                    debug!("MQTT client dropped, stopping driver");
                    break;
                }
                Err(e) => {
                    self.connected.send_replace(false);
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
        self.connected.send_replace(false);
    }

    fn on_event(&self, event: Event) -> DriverStep {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                info!("MQTT connected ({:?})", ack.code);
                self.connected.send_replace(true);
                if !self.debug_echo {
                    return DriverStep::Connected { echo: false };
                }
                // clean sessions drop subscriptions, so resubscribe on every connack
                match self.client.try_subscribe(self.echo_filter.as_str(), QoS::AtMostOnce) {
                    Ok(()) => {
                        info!("Debug echo subscribed to {}", self.echo_filter);
                        DriverStep::Connected { echo: true }
                    }
                    Err(e) => {
                        warn!("Debug echo subscribe failed: {}", e);
                        DriverStep::Connected { echo: false }
                    }
                }
            }
            Event::Incoming(Packet::Publish(publish)) if self.debug_echo => {
                let text = String::from_utf8_lossy(&publish.payload).to_string();
                info!(topic = %publish.topic, "[ECHO] {}", text);
                DriverStep::Echoed {
                    topic: publish.topic,
                    text,
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("MQTT broker sent disconnect");
                self.connected.send_replace(false);
                DriverStep::Continue
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                info!("MQTT connection closed");
                DriverStep::Closed
            }
            _ => DriverStep::Continue,
        }
    }
}
