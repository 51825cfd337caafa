//! NIP-01 relay message codec: the JSON-array dialect relays and clients
//! exchange over the WebSocket.

use nostr_core::Event;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::filter::Filter;

/// A frame sent from client to relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Event(Event),
    Req { sub_id: String, filters: Vec<Filter> },
    Close(String),
    Auth(Event),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            ClientMessage::Event(event) => {
                let event_value = serde_json::to_value(event)
                    .map_err(|e| Error::SerializationFailed(e.to_string()))?;
                Value::Array(vec![Value::String("EVENT".into()), event_value])
            }
            ClientMessage::Req { sub_id, filters } => {
                let mut arr = vec![Value::String("REQ".into()), Value::String(sub_id.clone())];
                for filter in filters {
                    arr.push(
                        serde_json::to_value(filter)
                            .map_err(|e| Error::SerializationFailed(e.to_string()))?,
                    );
                }
                Value::Array(arr)
            }
            ClientMessage::Close(sub_id) => Value::Array(vec![
                Value::String("CLOSE".into()),
                Value::String(sub_id.clone()),
            ]),
            ClientMessage::Auth(event) => {
                let event_value = serde_json::to_value(event)
                    .map_err(|e| Error::SerializationFailed(e.to_string()))?;
                Value::Array(vec![Value::String("AUTH".into()), event_value])
            }
        };
        serde_json::to_string(&value).map_err(|e| Error::SerializationFailed(e.to_string()))
    }
}

/// A frame received from a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event { sub_id: String, event: Event },
    Eose { sub_id: String },
    Notice { message: String },
    Ok { event_id: String, accepted: bool, msg: String },
    Auth { challenge: String },
    Closed { sub_id: String, msg: String },
    /// Any frame whose leading tag is not one of the above.
    Unknown { kind: String, raw: Value },
}

fn as_str(value: &Value, what: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidMessageFormat(format!("expected {what} to be a string")))
}

impl RelayMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidMessageFormat(e.to_string()))?;
        let arr = value
            .as_array()
            .ok_or_else(|| Error::InvalidMessageFormat("frame is not a JSON array".into()))?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidMessageFormat("frame has no leading tag".into()))?;

        match tag {
            "EVENT" => {
                if arr.len() != 3 {
                    return Err(Error::InvalidMessageFormat(
                        "EVENT frame must have exactly 3 elements".into(),
                    ));
                }
                let sub_id = as_str(&arr[1], "sub_id")?;
                let event: Event = serde_json::from_value(arr[2].clone())
                    .map_err(|e| Error::InvalidMessageFormat(e.to_string()))?;
                Ok(RelayMessage::Event { sub_id, event })
            }
            "EOSE" => {
                if arr.len() != 2 {
                    return Err(Error::InvalidMessageFormat(
                        "EOSE frame must have exactly 2 elements".into(),
                    ));
                }
                Ok(RelayMessage::Eose {
                    sub_id: as_str(&arr[1], "sub_id")?,
                })
            }
            "NOTICE" => {
                if arr.len() != 2 {
                    return Err(Error::InvalidMessageFormat(
                        "NOTICE frame must have exactly 2 elements".into(),
                    ));
                }
                Ok(RelayMessage::Notice {
                    message: as_str(&arr[1], "message")?,
                })
            }
            "OK" => {
                if arr.len() != 4 {
                    return Err(Error::InvalidMessageFormat(
                        "OK frame must have exactly 4 elements".into(),
                    ));
                }
                let accepted = arr[2].as_bool().ok_or_else(|| {
                    Error::InvalidMessageFormat("OK frame's accepted flag must be a bool".into())
                })?;
                Ok(RelayMessage::Ok {
                    event_id: as_str(&arr[1], "event_id")?,
                    accepted,
                    msg: as_str(&arr[3], "msg")?,
                })
            }
            "AUTH" => {
                if arr.len() != 2 {
                    return Err(Error::InvalidMessageFormat(
                        "AUTH frame must have exactly 2 elements".into(),
                    ));
                }
                Ok(RelayMessage::Auth {
                    challenge: as_str(&arr[1], "challenge")?,
                })
            }
            "CLOSED" => {
                if arr.len() != 3 {
                    return Err(Error::InvalidMessageFormat(
                        "CLOSED frame must have exactly 3 elements".into(),
                    ));
                }
                Ok(RelayMessage::Closed {
                    sub_id: as_str(&arr[1], "sub_id")?,
                    msg: as_str(&arr[2], "msg")?,
                })
            }
            other => Ok(RelayMessage::Unknown {
                kind: other.to_string(),
                raw: value,
            }),
        }
    }
}
