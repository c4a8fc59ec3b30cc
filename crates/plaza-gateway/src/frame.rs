use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use plaza_types::EventKind;

/// One inbound message from the relay bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// `{"channel": "private-chatrooms.4", "event": ".message.sent", "data": {...}}`
    Event {
        channel: String,
        event: String,
        #[serde(default)]
        data: Value,
    },

    /// `{"reconnected": true}` after the relay connection came back.
    Control { reconnected: bool },
}

impl Frame {
    pub fn parse(line: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(line).map_err(GatewayError::Frame)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed frame: {0}")]
    Frame(#[source] serde_json::Error),

    #[error("malformed {event} payload: {source}")]
    Payload {
        event: EventKind,
        #[source]
        source: serde_json::Error,
    },
}
