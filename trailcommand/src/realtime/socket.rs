//! Socket.IO client over a WebSocket transport

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::TrailError;
use crate::realtime::events::{InboundEvent, OutboundEvent};
use crate::realtime::packet::{EnginePacket, OpenHandshake, SocketPacket, SocketPacketKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected realtime channel
#[async_trait]
pub trait RealtimeTransport: Send {
    /// Send one event
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), TrailError>;

    /// Wait for the next event. `Ok(None)` means the server closed the
    /// session.
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, TrailError>;

    /// Close the session
    async fn close(&mut self);
}

/// Build the Socket.IO WebSocket endpoint for a server origin
pub fn endpoint(origin: &str) -> Result<Url, TrailError> {
    let mut url = Url::parse(origin).map_err(|e| TrailError::ConfigError(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TrailError::ConfigError(format!(
                "Invalid server URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TrailError::ConfigError("Failed to set scheme".to_string()))?;

    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Socket.IO session on the root namespace
pub struct RealtimeSocket {
    stream: WsStream,
    handshake: OpenHandshake,
    deadline: Instant,
    pending: VecDeque<InboundEvent>,
}

impl RealtimeSocket {
    /// Connect and complete both the Engine.IO and Socket.IO handshakes
    /// within `handshake_timeout`. `auth` is sent in the `CONNECT` packet.
    pub async fn connect(
        origin: &str,
        auth: Option<Value>,
        handshake_timeout: Duration,
    ) -> Result<Self, TrailError> {
        let url = endpoint(origin)?;
        info!("Connecting to realtime server: {}", url);

        match tokio::time::timeout(handshake_timeout, Self::handshake(url, auth)).await {
            Ok(result) => result,
            Err(_) => Err(TrailError::RealtimeError(format!(
                "handshake timed out after {:?}",
                handshake_timeout
            ))),
        }
    }

    async fn handshake(url: Url, auth: Option<Value>) -> Result<Self, TrailError> {
        let (mut stream, _) = connect_async(url.as_str()).await?;

        let handshake = loop {
            match next_text(&mut stream).await? {
                Some(frame) => match EnginePacket::decode(&frame)? {
                    EnginePacket::Open(data) => break serde_json::from_str::<OpenHandshake>(&data)?,
                    other => debug!("Ignoring {:?} before open", other),
                },
                None => {
                    return Err(TrailError::RealtimeError(
                        "connection closed during handshake".to_string(),
                    ))
                }
            }
        };
        debug!(sid = %handshake.sid, "Engine.IO session opened");

        let mut socket = Self {
            deadline: Instant::now() + ping_window(&handshake),
            stream,
            handshake,
            pending: VecDeque::new(),
        };

        socket.send_packet(&SocketPacket::connect(auth)).await?;
        loop {
            let Some(frame) = next_text(&mut socket.stream).await? else {
                return Err(TrailError::RealtimeError(
                    "connection closed during handshake".to_string(),
                ));
            };
            match EnginePacket::decode(&frame)? {
                EnginePacket::Ping(data) => socket.pong(data).await?,
                EnginePacket::Message(data) => {
                    let packet = SocketPacket::decode(&data)?;
                    match packet.kind {
                        SocketPacketKind::Connect => break,
                        SocketPacketKind::ConnectError => {
                            let reason = packet
                                .data
                                .as_ref()
                                .and_then(|d| d.get("message"))
                                .and_then(Value::as_str)
                                .unwrap_or("connection refused")
                                .to_string();
                            return Err(TrailError::AuthError(reason));
                        }
                        _ => socket.queue(packet),
                    }
                }
                EnginePacket::Close => {
                    return Err(TrailError::RealtimeError(
                        "server closed during handshake".to_string(),
                    ))
                }
                _ => {}
            }
        }

        info!("Connected to realtime server");
        Ok(socket)
    }

    /// Engine.IO session id
    pub fn sid(&self) -> &str {
        &self.handshake.sid
    }

    async fn send_packet(&mut self, packet: &SocketPacket) -> Result<(), TrailError> {
        let frame = EnginePacket::Message(packet.encode()).encode();
        self.stream.send(Message::text(frame)).await?;
        Ok(())
    }

    async fn pong(&mut self, data: String) -> Result<(), TrailError> {
        self.deadline = Instant::now() + ping_window(&self.handshake);
        self.stream
            .send(Message::text(EnginePacket::Pong(data).encode()))
            .await?;
        Ok(())
    }

    fn queue(&mut self, packet: SocketPacket) {
        if let Some((name, payload)) = packet.event_parts() {
            match InboundEvent::from_wire(&name, payload) {
                Ok(event) => self.pending.push_back(event),
                Err(e) => warn!(event = %name, error = %e, "Dropping malformed event"),
            }
        }
    }
}

fn ping_window(handshake: &OpenHandshake) -> Duration {
    Duration::from_millis(handshake.ping_interval + handshake.ping_timeout)
}

async fn next_text(stream: &mut WsStream) -> Result<Option<String>, TrailError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_string())),
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(Message::Binary(_))) => warn!("Ignoring binary frame"),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[async_trait]
impl RealtimeTransport for RealtimeSocket {
    async fn emit(&mut self, event: OutboundEvent) -> Result<(), TrailError> {
        let packet = SocketPacket::event(event.name(), event.payload()?);
        debug!(event = event.name(), "Emitting event");
        self.send_packet(&packet).await
    }

    async fn next_event(&mut self) -> Result<Option<InboundEvent>, TrailError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let frame = match tokio::time::timeout_at(self.deadline, next_text(&mut self.stream)).await {
                Ok(frame) => frame?,
                Err(_) => return Err(TrailError::RealtimeError("ping timeout".to_string())),
            };
            let Some(frame) = frame else {
                return Ok(None);
            };

            let packet = match EnginePacket::decode(&frame) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(error = %e, "Ignoring undecodable frame");
                    continue;
                }
            };

            match packet {
                EnginePacket::Ping(data) => self.pong(data).await?,
                EnginePacket::Close => return Ok(None),
                EnginePacket::Message(data) => match SocketPacket::decode(&data) {
                    Ok(packet) => match packet.kind {
                        SocketPacketKind::Event => self.queue(packet),
                        SocketPacketKind::Disconnect => return Ok(None),
                        SocketPacketKind::ConnectError => {
                            return Err(TrailError::RealtimeError(format!(
                                "server rejected session: {}",
                                packet.data.unwrap_or(Value::Null)
                            )))
                        }
                        SocketPacketKind::Connect | SocketPacketKind::Ack => {
                            debug!(kind = ?packet.kind, "Ignoring socket.io packet")
                        }
                    },
                    Err(e) => warn!(error = %e, "Ignoring undecodable socket.io packet"),
                },
                _ => {}
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.send_packet(&SocketPacket::disconnect()).await;
        let _ = self.stream.close(None).await;
    }
}
