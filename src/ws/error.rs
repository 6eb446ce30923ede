#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// Stream error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum StreamError {
    /// Error connecting to or communicating with the streaming server
    #[cfg(feature = "ws")]
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Transport-level failure reported by a session implementation
    Transport(String),
    /// Frame was not valid JSON
    Malformed(serde_json::Error),
    /// Frame was valid JSON but did not match the expected shape
    Decode(serde_path_to_error::Error<serde_json::Error>),
    /// Frame was valid JSON but carried no string `type` tag
    MissingTag,
    /// The session is not open, so nothing can be sent
    ConnectionClosed,
    /// The manager has been stopped and can no longer be used
    Stopped,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Transport(msg) => write!(f, "Transport error: {msg}"),
            Self::Malformed(e) => write!(f, "Stream frame is not valid JSON: {e}"),
            Self::Decode(e) => write!(f, "Failed to decode stream frame: {e}"),
            Self::MissingTag => write!(f, "Stream frame has no string `type` field"),
            Self::ConnectionClosed => write!(f, "Stream connection closed"),
            Self::Stopped => write!(f, "Stream manager has been stopped"),
        }
    }
}

impl StdError for StreamError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => Some(e),
            Self::Malformed(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<StreamError> for crate::error::Error {
    fn from(e: StreamError) -> Self {
        let kind = match e {
            StreamError::Malformed(_) | StreamError::Decode(_) | StreamError::MissingTag => {
                crate::error::Kind::Decode
            }
            StreamError::Stopped => crate::error::Kind::Validation,
            _ => crate::error::Kind::Transport,
        };
        crate::error::Error::with_source(kind, e)
    }
}

#[cfg(feature = "ws")]
impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(
            crate::error::Kind::Transport,
            StreamError::Connection(e),
        )
    }
}
