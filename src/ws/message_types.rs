//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the default namespace and text frames are used by the quoting
//! service; binary attachments are rejected as unsupported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{prelude::*, Error};

/// Record separator between packets in one long-polling payload.
pub(crate) const POLLING_SEPARATOR: char = '\u{1e}';

/// Handshake data carried by the Engine.IO `open` packet.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    /// Client: namespace connect with auth payload. Server: connect ack with sid.
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        payload: Value,
        ack_id: Option<u64>,
    },
    Ack {
        ack_id: u64,
        payload: Value,
    },
    ConnectError(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// A named event pushed by the server, delivered to listeners.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerEvent {
    pub name: String,
    /// First event argument (`null` when the server sent none).
    pub payload: Value,
}

impl EnginePacket {
    pub fn event(name: &str, payload: Value) -> Self {
        EnginePacket::Message(SocketPacket::Event {
            name: name.to_string(),
            payload,
            ack_id: None,
        })
    }

    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            EnginePacket::Open(handshake) => format!(
                "0{}",
                serde_json::to_string(handshake).map_err(|e| Error::json_parse(e.to_string()))?
            ),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(packet) => format!("4{}", packet.encode()?),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        })
    }

    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::packet("empty engine.io packet"))?;
        let rest = chars.as_str();
        match kind {
            '0' => serde_json::from_str(rest)
                .map(EnginePacket::Open)
                .map_err(|e| Error::json_parse(e.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => SocketPacket::decode(rest).map(EnginePacket::Message),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(Error::packet(format!("unknown engine.io packet type {other:?}"))),
        }
    }

    /// Splits a long-polling response body into packets.
    pub fn decode_payload(body: &str) -> Vec<Result<Self>> {
        body.split(POLLING_SEPARATOR)
            .filter(|part| !part.is_empty())
            .map(EnginePacket::decode)
            .collect()
    }
}

impl SocketPacket {
    pub fn encode(&self) -> Result<String> {
        let json = |value: &Value| {
            serde_json::to_string(value).map_err(|e| Error::json_parse(e.to_string()))
        };
        Ok(match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", json(auth)?),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event {
                name,
                payload,
                ack_id,
            } => {
                let args = Value::Array(vec![Value::String(name.clone()), payload.clone()]);
                let id = ack_id.map(|id| id.to_string()).unwrap_or_default();
                format!("2{id}{}", json(&args)?)
            }
            SocketPacket::Ack { ack_id, payload } => {
                format!("3{ack_id}{}", json(&Value::Array(vec![payload.clone()]))?)
            }
            SocketPacket::ConnectError(payload) => format!("4{}", json(payload)?),
        })
    }

    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::packet("empty socket.io packet"))?;
        let rest = skip_namespace(chars.as_str());
        match kind {
            '0' => Ok(SocketPacket::Connect(parse_optional_json(rest)?)),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let (ack_id, body) = split_ack_id(rest);
                let mut args = match serde_json::from_str::<Value>(body)
                    .map_err(|e| Error::json_parse(e.to_string()))?
                {
                    Value::Array(args) => args.into_iter(),
                    _ => return Err(Error::packet("event arguments are not an array")),
                };
                let name = match args.next() {
                    Some(Value::String(name)) => name,
                    _ => return Err(Error::packet("event without a name")),
                };
                Ok(SocketPacket::Event {
                    name,
                    payload: args.next().unwrap_or(Value::Null),
                    ack_id,
                })
            }
            '3' => {
                let (ack_id, body) = split_ack_id(rest);
                let ack_id = ack_id.ok_or_else(|| Error::packet("ack without an id"))?;
                let payload = match parse_optional_json(body)? {
                    Some(Value::Array(mut args)) if !args.is_empty() => args.swap_remove(0),
                    _ => Value::Null,
                };
                Ok(SocketPacket::Ack { ack_id, payload })
            }
            '4' => Ok(SocketPacket::ConnectError(
                parse_optional_json(rest)?.unwrap_or(Value::Null),
            )),
            '5' | '6' => Err(Error::packet("binary socket.io packets are not supported")),
            other => Err(Error::packet(format!("unknown socket.io packet type {other:?}"))),
        }
    }
}

/// Drops a `/namespace,` prefix; only the default namespace is used.
fn skip_namespace(rest: &str) -> &str {
    if rest.starts_with('/') {
        match rest.find(',') {
            Some(idx) => &rest[idx + 1..],
            None => "",
        }
    } else {
        rest
    }
}

fn split_ack_id(rest: &str) -> (Option<u64>, &str) {
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return (None, rest);
    }
    (rest[..digits].parse().ok(), &rest[digits..])
}

fn parse_optional_json(rest: &str) -> Result<Option<Value>> {
    if rest.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(rest)
        .map(Some)
        .map_err(|e| Error::json_parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            EnginePacket::Open(handshake) => {
                assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(handshake.ping_interval, 25_000);
                assert_eq!(handshake.upgrades, vec!["websocket".to_string()]);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn test_event_encoding() {
        let packet = EnginePacket::event("getLiveQuotes", json!({"destinationId": "X"}));
        assert_eq!(
            packet.encode().unwrap(),
            r#"42["getLiveQuotes",{"destinationId":"X"}]"#
        );
        let connect = EnginePacket::Message(SocketPacket::Connect(Some(json!({"token": "t"}))));
        assert_eq!(connect.encode().unwrap(), r#"40{"token":"t"}"#);
        assert_eq!(EnginePacket::Pong(String::new()).encode().unwrap(), "3");
    }

    #[test]
    fn test_decode_event_with_ack_and_namespace() {
        let packet = EnginePacket::decode(r#"42/quotes,17["QuickQuote",{"a":1},"extra"]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                name: "QuickQuote".to_string(),
                payload: json!({"a": 1}),
                ack_id: Some(17),
            })
        );
        let no_args = EnginePacket::decode(r#"42["QuickQuote"]"#).unwrap();
        assert_eq!(no_args, EnginePacket::event("QuickQuote", Value::Null));
    }

    #[test]
    fn test_decode_lifecycle_packets() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::decode("1").unwrap(), EnginePacket::Close);
        assert_eq!(
            EnginePacket::decode(r#"40{"sid":"abc"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect(Some(json!({"sid": "abc"}))))
        );
        assert_eq!(
            EnginePacket::decode("41").unwrap(),
            EnginePacket::Message(SocketPacket::Disconnect)
        );
        assert_eq!(
            EnginePacket::decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::ConnectError(json!({"message": "Not authorized"})))
        );
    }

    #[test]
    fn test_malformed_packets_are_errors() {
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode("42{not json").is_err());
        assert!(EnginePacket::decode(r#"42{"a":1}"#).is_err());
        assert!(EnginePacket::decode(r#"451-["x",{"_placeholder":true,"num":0}]"#).is_err());
    }

    #[test]
    fn test_decode_polling_payload() {
        let body = "2\u{1e}42[\"QuickQuote\",{}]\u{1e}6";
        let packets: Vec<EnginePacket> = EnginePacket::decode_payload(body)
            .into_iter()
            .map(|p| p.unwrap())
            .collect();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], EnginePacket::Ping(String::new()));
        assert_eq!(packets[2], EnginePacket::Noop);
    }
}
