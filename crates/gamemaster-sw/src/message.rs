//! Messages exchanged between the worker and its clients.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Inbound control message from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Activate the waiting worker without waiting for old pages to close.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ControlMessage {
    /// Recognize a control message in arbitrary message data.
    ///
    /// Only the `type` field is inspected; anything else is not a control
    /// message and yields `None`.
    pub fn from_value(data: &JsonValue) -> Option<Self> {
        match data.get("type").and_then(JsonValue::as_str) {
            Some("SKIP_WAITING") => Some(Self::SkipWaiting),
            _ => None,
        }
    }
}

/// Outbound message posted to pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// A new version finished activating.
    #[serde(rename = "SW_UPDATED")]
    Updated { version: String },
}

impl ClientMessage {
    pub fn updated(version: impl Into<String>) -> Self {
        Self::Updated {
            version: version.into(),
        }
    }

    pub fn to_value(&self) -> JsonValue {
        // A tagged enum of plain strings always serializes.
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}
