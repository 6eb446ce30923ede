#![expect(
    clippy::module_name_repetitions,
    reason = "Type names read better with their module suffix at call sites"
)]

use serde::Serialize;

/// Outbound frame asking the server to add or remove a per-stock channel.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Join the channel for one symbol
    SubscribeStock { symbol: String },
    /// Leave the channel for one symbol
    UnsubscribeStock { symbol: String },
}

impl ClientRequest {
    #[must_use]
    pub fn subscribe_stock<S: Into<String>>(symbol: S) -> Self {
        Self::SubscribeStock {
            symbol: symbol.into(),
        }
    }

    #[must_use]
    pub fn unsubscribe_stock<S: Into<String>>(symbol: S) -> Self {
        Self::UnsubscribeStock {
            symbol: symbol.into(),
        }
    }
}
