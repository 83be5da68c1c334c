//! Engine.IO v4 / Socket.IO v5 text framing
//!
//! An Engine.IO frame is a one-digit packet type followed by its payload.
//! Socket.IO packets ride inside Engine.IO `message` frames:
//!
//! ```text
//! 42["control-command",{"controlId":"relay_1","value":true}]
//! ││└ socket.io payload
//! │└ socket.io EVENT
//! └ engine.io MESSAGE
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::errors::TrailError;

/// Default Socket.IO namespace
pub const ROOT_NAMESPACE: &str = "/";

/// Engine.IO packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(String),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, TrailError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| TrailError::ProtocolError("empty engine.io frame".to_string()))?;
        let data = chars.as_str().to_string();

        match kind {
            '0' => Ok(EnginePacket::Open(data)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data)),
            '3' => Ok(EnginePacket::Pong(data)),
            '4' => Ok(EnginePacket::Message(data)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(TrailError::ProtocolError(format!(
                "unknown engine.io packet type {:?}",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(data) => format!("0{}", data),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Payload of the Engine.IO `open` packet
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds
    pub ping_interval: u64,
    /// Milliseconds
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Socket.IO packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

impl SocketPacketKind {
    fn digit(self) -> char {
        match self {
            SocketPacketKind::Connect => '0',
            SocketPacketKind::Disconnect => '1',
            SocketPacketKind::Event => '2',
            SocketPacketKind::Ack => '3',
            SocketPacketKind::ConnectError => '4',
        }
    }
}

/// Socket.IO packet
#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: SocketPacketKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// `CONNECT` on the root namespace, with an optional auth payload
    pub fn connect(auth: Option<Value>) -> Self {
        Self {
            kind: SocketPacketKind::Connect,
            namespace: ROOT_NAMESPACE.to_string(),
            id: None,
            data: auth,
        }
    }

    pub fn disconnect() -> Self {
        Self {
            kind: SocketPacketKind::Disconnect,
            namespace: ROOT_NAMESPACE.to_string(),
            id: None,
            data: None,
        }
    }

    /// `EVENT` carrying `[name, payload]`
    pub fn event(name: &str, payload: Value) -> Self {
        Self {
            kind: SocketPacketKind::Event,
            namespace: ROOT_NAMESPACE.to_string(),
            id: None,
            data: Some(Value::Array(vec![Value::String(name.to_string()), payload])),
        }
    }

    /// Name and first argument of an `EVENT`
    pub fn event_parts(&self) -> Option<(String, Value)> {
        if self.kind != SocketPacketKind::Event {
            return None;
        }
        let items = self.data.as_ref()?.as_array()?;
        let name = items.first()?.as_str()?.to_string();
        let payload = items.get(1).cloned().unwrap_or(Value::Null);
        Some((name, payload))
    }

    pub fn decode(data: &str) -> Result<Self, TrailError> {
        let mut rest = data;
        let kind = match rest.chars().next() {
            Some('0') => SocketPacketKind::Connect,
            Some('1') => SocketPacketKind::Disconnect,
            Some('2') => SocketPacketKind::Event,
            Some('3') => SocketPacketKind::Ack,
            Some('4') => SocketPacketKind::ConnectError,
            Some('5') | Some('6') => {
                return Err(TrailError::ProtocolError(
                    "binary socket.io packets are not supported".to_string(),
                ))
            }
            Some(other) => {
                return Err(TrailError::ProtocolError(format!(
                    "unknown socket.io packet type {:?}",
                    other
                )))
            }
            None => return Err(TrailError::ProtocolError("empty socket.io packet".to_string())),
        };
        rest = &rest[1..];

        let mut namespace = ROOT_NAMESPACE.to_string();
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(end) => {
                    namespace = rest[..end].to_string();
                    rest = &rest[end + 1..];
                }
                None => {
                    namespace = rest.to_string();
                    rest = "";
                }
            }
        }

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse()
                .map_err(|_| TrailError::ProtocolError("socket.io ack id out of range".to_string()))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest).map_err(|e| {
                TrailError::ProtocolError(format!("invalid socket.io payload: {}", e))
            })?)
        };

        Ok(Self {
            kind,
            namespace,
            id,
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.digit());
        if self.namespace != ROOT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }
}
