use serde::{Deserialize, Serialize};

use crate::RelayError;

/// Frames a client may send. Keys are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    JoinBooking {
        #[serde(rename = "bookingId")]
        booking_id: i64,
        #[serde(rename = "userId")]
        user_id: i64,
    },
    /// The rest of the payload is opaque to the relay and forwarded as received.
    NewMessage {
        #[serde(rename = "bookingId")]
        booking_id: i64,
    },
}

impl InboundFrame {
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        serde_json::from_str(raw).map_err(|e| RelayError::MalformedFrame(e.to_string()))
    }
}

/// Frames the relay itself produces. Mirrored `new_message` frames are sent raw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Joined {
        #[serde(rename = "bookingId")]
        booking_id: i64,
    },
    Error {
        message: String,
    },
}

impl OutboundFrame {
    pub fn to_text(&self) -> String {
        // Two plain variants with string/integer fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}
