use bon::Builder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Direction;
use crate::types::Decimal;
use crate::ws::StreamError;

/// Tag of the only message kind the client interprets.
pub const WATCHLIST_UPDATE: &str = "watchlist_update";

/// A decoded inbound frame, discriminated by its `type` tag.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// The user's full watchlist; replaces any previous one
    WatchlistUpdate(WatchlistUpdate),
    /// Any other tag, preserved so newer servers never break older clients
    Unknown {
        /// The `type` value as sent
        tag: String,
        /// The complete frame
        raw: Value,
    },
}

impl StreamMessage {
    /// The `type` tag this message was decoded from.
    #[must_use]
    pub fn tag(&self) -> &str {
        match self {
            Self::WatchlistUpdate(_) => WATCHLIST_UPDATE,
            Self::Unknown { tag, .. } => tag,
        }
    }

    #[must_use]
    pub fn as_watchlist_update(&self) -> Option<&WatchlistUpdate> {
        match self {
            Self::WatchlistUpdate(update) => Some(update),
            Self::Unknown { .. } => None,
        }
    }
}

/// Payload of a `watchlist_update` frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct WatchlistUpdate {
    /// Entries in server order
    pub stocks: Vec<WatchlistEntry>,
}

/// One watchlist row. Identified by symbol only.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct WatchlistEntry {
    #[serde(rename = "stock__symbol")]
    #[builder(into)]
    pub symbol: String,
    #[serde(rename = "stock__name")]
    #[builder(into)]
    pub name: String,
    #[serde(rename = "stock__last_price")]
    pub last_price: Decimal,
    #[serde(rename = "stock__change_percent")]
    pub change_percent: Decimal,
}

impl WatchlistEntry {
    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::of(self.change_percent)
    }
}

/// Decode one inbound text frame.
///
/// Handles both single objects and arrays of messages.
/// Returns an empty vector for empty or whitespace-only input (server keepalive frames).
pub fn decode_frame(frame: &str) -> crate::Result<Vec<StreamMessage>> {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed).map_err(StreamError::Malformed)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(classify)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into),
        other => Ok(vec![classify(other)?]),
    }
}

fn classify(value: Value) -> Result<StreamMessage, StreamError> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(StreamError::MissingTag)?
        .to_owned();

    if tag == WATCHLIST_UPDATE {
        Ok(StreamMessage::WatchlistUpdate(deserialize_payload(value)?))
    } else {
        Ok(StreamMessage::Unknown { tag, raw: value })
    }
}

fn deserialize_payload<T: DeserializeOwned>(value: Value) -> Result<T, StreamError> {
    #[cfg(feature = "tracing")]
    let parsed = {
        let mut ignored = Vec::new();
        let de = serde_ignored::Deserializer::new(value, |path| ignored.push(path.to_string()));
        let parsed = serde_path_to_error::deserialize(de);
        for path in ignored.iter().filter(|p| p.as_str() != "type") {
            tracing::warn!(
                field = %path,
                target_type = std::any::type_name::<T>(),
                "Unknown field in stream frame"
            );
        }
        parsed
    };
    #[cfg(not(feature = "tracing"))]
    let parsed = serde_path_to_error::deserialize(value);

    parsed.map_err(StreamError::Decode)
}
