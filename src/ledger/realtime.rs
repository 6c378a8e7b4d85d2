//! Realtime change feed for newly inserted commands
//!
//! Speaks the ledger's Phoenix-channel websocket protocol: join a channel
//! carrying a `postgres_changes` INSERT filter for this device, keep it
//! alive with heartbeats, and forward every inserted row. Reconnection is
//! handled here with exponential backoff; the intake only sees events.

use super::client::LedgerClient;
use super::error::{LedgerError, LedgerResult};
use futures::{SinkExt, StreamExt};
use relay_shared::Command;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// `ref` used for the channel join so its reply can be recognized
const JOIN_REF: &str = "1";

/// Realtime subscription configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Device whose commands are pushed
    pub device_id: String,
    pub schema: String,
    /// Table holding command rows
    pub table: String,
    pub heartbeat_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl RealtimeConfig {
    pub fn new(device_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            schema: "public".into(),
            table: table.into(),
            heartbeat_interval: Duration::from_secs(25),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }

    /// Channel topic joined for this device
    pub fn channel_topic(&self) -> String {
        format!("realtime:{}:{}", self.table, self.device_id)
    }
}

/// Events emitted by the realtime subscription
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// Opening the websocket
    Connecting,
    /// Channel joined, inserts will be pushed
    Subscribed,
    /// Channel join or subscription rejected
    ChannelError { reason: String },
    /// Connection lost, a reconnect is scheduled
    Disconnected { reason: String },
    /// A command row was inserted for this device
    Inserted(Command),
}

/// Decoded meaning of one inbound frame
#[derive(Debug)]
enum Frame {
    Joined,
    JoinRejected(String),
    Inserted(Command),
    ChannelError(String),
    Ignored,
}

/// Websocket subscription to command inserts
pub struct RealtimeSubscription {
    config: RealtimeConfig,
    ledger: Arc<LedgerClient>,
}

impl RealtimeSubscription {
    pub fn new(config: RealtimeConfig, ledger: Arc<LedgerClient>) -> Self {
        Self { config, ledger }
    }

    /// Spawn the subscription loop and return its event stream.
    ///
    /// The loop ends once the receiver is dropped.
    pub fn spawn(self) -> mpsc::Receiver<RealtimeEvent> {
        let (event_tx, event_rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run(event_tx).await;
        });
        event_rx
    }

    async fn run(self, event_tx: mpsc::Sender<RealtimeEvent>) {
        let mut reconnect_delay = self.config.reconnect_base_delay;

        loop {
            let _ = event_tx.send(RealtimeEvent::Connecting).await;

            let mut subscribed = false;
            let reason = match self.session(&event_tx, &mut subscribed).await {
                Ok(()) => "closed".to_string(),
                Err(e) => e.to_string(),
            };

            if event_tx.is_closed() {
                debug!("Realtime receiver dropped, stopping subscription");
                break;
            }
            let _ = event_tx
                .send(RealtimeEvent::Disconnected {
                    reason: reason.clone(),
                })
                .await;

            if subscribed {
                reconnect_delay = self.config.reconnect_base_delay;
            }
            debug!("Realtime reconnect in {:?} after: {}", reconnect_delay, reason);
            tokio::time::sleep(reconnect_delay).await;

            // Exponential backoff
            reconnect_delay = std::cmp::min(reconnect_delay * 2, self.config.reconnect_max_delay);
        }
    }

    /// One websocket connection, from connect to the first failure
    async fn session(
        &self,
        event_tx: &mpsc::Sender<RealtimeEvent>,
        subscribed: &mut bool,
    ) -> LedgerResult<()> {
        let mut token = self.ledger.access_token().await?;
        let url = websocket_url(self.ledger.api_url(), self.ledger.api_key())?;
        let topic = self.config.channel_topic();

        info!(topic = %topic, "Connecting to ledger realtime");
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let join = join_message(&self.config, &token);
        write.send(Message::Text(join.to_string())).await?;
        debug!("Sent channel join");

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        let mut next_ref: u64 = 2;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    // hand the channel any token refreshed by the RPC path
                    let current = self.ledger.access_token().await?;
                    if current != token {
                        token = current;
                        let refresh = access_token_message(&topic, &token, next_ref);
                        write.send(Message::Text(refresh.to_string())).await?;
                        next_ref += 1;
                    }
                    write.send(Message::Text(heartbeat_message(next_ref).to_string())).await?;
                    next_ref += 1;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(close))) => {
                            let reason = format!("closed by server: {:?}", close);
                            return Err(LedgerError::Protocol(reason));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    };

                    match decode_frame(&text, &topic, &self.config.device_id) {
                        Frame::Joined => {
                            info!(topic = %topic, "Realtime channel joined");
                            *subscribed = true;
                            let _ = event_tx.send(RealtimeEvent::Subscribed).await;
                        }
                        Frame::JoinRejected(reason) | Frame::ChannelError(reason) => {
                            warn!(topic = %topic, "Realtime channel error: {}", reason);
                            let _ = event_tx
                                .send(RealtimeEvent::ChannelError { reason: reason.clone() })
                                .await;
                            return Err(LedgerError::Protocol(reason));
                        }
                        Frame::Inserted(command) => {
                            if event_tx.send(RealtimeEvent::Inserted(command)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Frame::Ignored => {}
                    }
                }
            }
        }
    }
}

/// Websocket endpoint derived from the ledger's HTTP base URL
fn websocket_url(api_url: &str, api_key: &str) -> LedgerResult<Url> {
    let mut url = Url::parse(api_url)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| LedgerError::Protocol(format!("cannot derive websocket URL from {api_url}")))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

fn join_message(config: &RealtimeConfig, access_token: &str) -> Value {
    json!({
        "topic": config.channel_topic(),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "INSERT",
                    "schema": config.schema,
                    "table": config.table,
                    "filter": format!("device_id=eq.{}", config.device_id),
                }],
            },
            "access_token": access_token,
        },
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
}

fn heartbeat_message(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
}

fn access_token_message(topic: &str, access_token: &str, msg_ref: u64) -> Value {
    json!({
        "topic": topic,
        "event": "access_token",
        "payload": { "access_token": access_token },
        "ref": msg_ref.to_string(),
        "join_ref": JOIN_REF,
    })
}

fn decode_frame(text: &str, topic: &str, device_id: &str) -> Frame {
    let message: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Ignoring undecodable realtime frame: {}", e);
            return Frame::Ignored;
        }
    };
    if message["topic"].as_str() != Some(topic) {
        return Frame::Ignored;
    }
    let payload = &message["payload"];

    match message["event"].as_str().unwrap_or_default() {
        "phx_reply" if message["ref"].as_str() == Some(JOIN_REF) => {
            match payload["status"].as_str() {
                Some("ok") => Frame::Joined,
                _ => Frame::JoinRejected(describe(&payload["response"])),
            }
        }
        "system" if payload["status"].as_str() == Some("error") => {
            Frame::ChannelError(describe(payload))
        }
        "phx_error" => Frame::ChannelError("channel crashed".into()),
        "phx_close" => Frame::ChannelError("channel closed".into()),
        "postgres_changes" => {
            let data = &payload["data"];
            if data["type"].as_str() != Some("INSERT") {
                return Frame::Ignored;
            }
            match serde_json::from_value::<Command>(data["record"].clone()) {
                Ok(command) if command.device_id.as_deref().map_or(true, |d| d == device_id) => {
                    Frame::Inserted(command)
                }
                Ok(command) => {
                    debug!(command_id = %command.id, "Ignoring insert for another device");
                    Frame::Ignored
                }
                Err(e) => {
                    warn!("Ignoring malformed inserted command: {}", e);
                    Frame::Ignored
                }
            }
        }
        _ => Frame::Ignored,
    }
}

fn describe(value: &Value) -> String {
    value["message"]
        .as_str()
        .or_else(|| value["reason"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
