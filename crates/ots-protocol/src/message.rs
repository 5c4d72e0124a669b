use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, EncodeError};
use crate::event::{Event, EventData};
use crate::state::SessionSnapshot;

/// Imperative request addressed to a single handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, Value>>,
}

impl Command {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Numeric parameter, if present and a number.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.as_ref()?.get(key)?.as_f64()
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

/// First message a peer sends after the channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    #[serde(rename = "clientType")]
    pub client_type: String,
}

/// Wire envelope: `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    #[serde(rename = "state")]
    State(SessionSnapshot),
    #[serde(rename = "event")]
    Event(Event),
    #[serde(rename = "cmd")]
    Command(Command),
    #[serde(rename = "handshake")]
    Handshake(Handshake),
}

/// Parse one inbound text frame.
pub fn decode(raw: &str) -> Result<Message, DecodeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(serde_json::from_str(raw)?)
}

/// Serialize one outbound message as compact JSON.
///
/// Events are refused when the peer could not decode them back to the same
/// value: internal kinds, and payloads whose shape differs from the one
/// [`EventData::from_value`] picks for the kind.
pub fn encode(message: &Message) -> Result<String, EncodeError> {
    if let Message::Event(event) = message {
        if event.kind.wire_name().is_none() {
            return Err(EncodeError::NotRepresentable(event.kind));
        }
        if let Some(data) = &event.data {
            let value = serde_json::to_value(data)?;
            if EventData::from_value(event.kind, value).as_ref() != Some(data) {
                return Err(EncodeError::PayloadMismatch(event.kind));
            }
        }
    }
    Ok(serde_json::to_string(message)?)
}
