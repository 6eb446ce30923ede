use std::sync::Arc;

use bon::Builder;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Kind};
use crate::types::Decimal;

pub mod request;
pub mod response;

use response::StreamMessage;

/// Connection status owned by the stream manager.
///
/// Exactly one value holds at any instant. It is never [`Connected`](Self::Connected) while
/// the underlying session is closed.
#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionStatus {
    /// Not started, or deliberately stopped
    #[default]
    Disconnected,
    /// First connection attempt in flight
    Connecting,
    /// Session open
    Connected,
    /// Session lost; a retry is pending or in flight
    Reconnecting,
    /// A session could not even be attempted; no retry will happen
    Failed,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Which layer produced a [`ConnectionError`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorSource {
    /// Connection-level failure reported by the session
    Transport,
    /// Malformed inbound frame; the frame was dropped
    Decode,
}

/// The most recent error, kept for display. Cleared on every successful (re)connection.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionError {
    pub message: String,
    pub source: ErrorSource,
    pub occurred_at: DateTime<Utc>,
}

impl ConnectionError {
    #[must_use]
    pub fn new<S: Into<String>>(source: ErrorSource, message: S) -> Self {
        Self {
            message: message.into(),
            source,
            occurred_at: Utc::now(),
        }
    }

    /// Record a crate error, attributing decode failures to [`ErrorSource::Decode`] and
    /// everything else to the transport.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        let source = match error.kind() {
            Kind::Decode => ErrorSource::Decode,
            _ => ErrorSource::Transport,
        };
        Self::new(source, error.to_string())
    }
}

/// Update delivered to every registered consumer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The connection status changed
    Status(ConnectionStatus),
    /// The last error changed; `None` means it was cleared
    Error(Option<ConnectionError>),
    /// A frame was decoded
    Message(Arc<StreamMessage>),
}

/// Sign of a price change, as rendered by price views.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Direction {
    /// Zero or positive change
    Up,
    Down,
}

impl Direction {
    #[must_use]
    pub fn of(change_percent: Decimal) -> Self {
        if change_percent.is_sign_negative() && !change_percent.is_zero() {
            Self::Down
        } else {
            Self::Up
        }
    }
}

/// Real-time quote attached to a stock search result.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Quote {
    #[serde(default)]
    pub symbol: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub change: Option<Decimal>,
    pub change_percent: Decimal,
    pub volume: u64,
    pub latest_trading_day: NaiveDate,
}

impl Quote {
    #[must_use]
    pub fn direction(&self) -> Direction {
        Direction::of(self.change_percent)
    }
}

/// One stock search result, as consumed by stock card views.
///
/// The quote is `None` while it is still pending.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct StockMatch {
    #[builder(into)]
    pub symbol: String,
    #[builder(into)]
    pub name: String,
    #[serde(rename = "type")]
    #[builder(into)]
    pub instrument_type: String,
    #[builder(into)]
    pub region: String,
    #[builder(into)]
    pub currency: String,
    #[serde(default)]
    pub quote: Option<Quote>,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn status_display_is_snake_case() {
        assert_eq!(ConnectionStatus::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn connection_error_source_follows_kind() {
        let decode = crate::stream::decode_frame("[1]").unwrap_err();
        assert_eq!(ConnectionError::from_error(&decode).source, ErrorSource::Decode);

        let invalid = Error::validation("bad url");
        let recorded = ConnectionError::from_error(&invalid);
        assert_eq!(recorded.source, ErrorSource::Transport);
        assert_eq!(recorded.message, "Validation: invalid: bad url");
    }

    #[test]
    fn zero_change_counts_as_up() {
        assert_eq!(Direction::of(dec!(0)), Direction::Up);
        assert_eq!(Direction::of(dec!(-0.00)), Direction::Up);
        assert_eq!(Direction::of(dec!(1.2)), Direction::Up);
        assert_eq!(Direction::of(dec!(-0.01)), Direction::Down);
    }

    #[test]
    fn stock_match_with_quote() {
        let json = r#"{
            "symbol": "IBM",
            "name": "International Business Machines Corp",
            "type": "Equity",
            "region": "United States",
            "currency": "USD",
            "quote": {
                "symbol": "IBM",
                "price": "187.4200",
                "change": "-1.3100",
                "change_percent": "-0.6941",
                "volume": 3421876,
                "latest_trading_day": "2024-05-17"
            }
        }"#;

        let stock: StockMatch = serde_json::from_str(json).unwrap();
        assert_eq!(stock.instrument_type, "Equity");

        let quote = stock.quote.unwrap();
        assert_eq!(quote.price, dec!(187.42));
        assert_eq!(quote.volume, 3_421_876);
        assert_eq!(
            quote.latest_trading_day,
            NaiveDate::from_ymd_opt(2024, 5, 17).unwrap()
        );
        assert_eq!(quote.direction(), Direction::Down);
    }

    #[test]
    fn stock_match_with_pending_quote() {
        let json = r#"{
            "symbol": "TSCO.LON",
            "name": "Tesco PLC",
            "type": "Equity",
            "region": "United Kingdom",
            "currency": "GBX",
            "quote": null
        }"#;

        let stock: StockMatch = serde_json::from_str(json).unwrap();
        assert!(stock.quote.is_none());
    }
}
