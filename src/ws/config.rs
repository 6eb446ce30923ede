use std::time::Duration;

use bon::Builder;
use secrecy::{ExposeSecret as _, SecretString};
use url::Url;

use crate::Result;
use crate::error::Error;

const DEFAULT_RETRY_DELAY_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_PORT: u16 = 8001;
const DEFAULT_PATH: &str = "/ws/stocks/";
const TOKEN_PARAM: &str = "token";

/// Configuration for the stream manager.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Where the streaming service lives
    pub endpoint: Endpoint,
    /// Fixed delay between a session closing and the next reconnect attempt
    #[builder(default = DEFAULT_RETRY_DELAY_DURATION)]
    pub retry_delay: Duration,
}

impl Config {
    /// Configuration with default retry behavior for the given endpoint.
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            retry_delay: DEFAULT_RETRY_DELAY_DURATION,
        }
    }
}

/// Location of the streaming service.
///
/// The final URL has the shape `{ws|wss}://{host}:{port}{path}?token={access_token}`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Endpoint {
    /// Use `wss` instead of `ws`
    #[builder(default)]
    pub secure: bool,
    #[builder(into)]
    pub host: String,
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,
    #[builder(into, default = DEFAULT_PATH.to_owned())]
    pub path: String,
}

impl Endpoint {
    /// Derive the endpoint from the origin of the hosting page.
    ///
    /// A page served over `https` selects `wss`; anything else selects `ws`. The port and
    /// path are the fixed service defaults.
    pub fn from_origin(origin: &Url) -> Result<Self> {
        let host = origin
            .host_str()
            .ok_or_else(|| Error::validation(format!("origin {origin} has no host")))?;

        Ok(Self {
            secure: origin.scheme() == "https",
            host: host.to_owned(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_owned(),
        })
    }

    /// Build the connection URL, appending the token as a query parameter when present.
    pub fn url(&self, token: Option<&SecretString>) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        let mut url = Url::parse(&format!("{scheme}://{}:{}{path}", self.host, self.port))?;
        if let Some(token) = token {
            url.query_pairs_mut()
                .append_pair(TOKEN_PARAM, token.expose_secret());
        }

        Ok(url)
    }
}

/// Render a connection URL for logs with the token value hidden.
#[cfg_attr(
    not(feature = "tracing"),
    expect(dead_code, reason = "Only used when logging connection attempts")
)]
pub(crate) fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == TOKEN_PARAM {
                "***".to_owned()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();

    if pairs.is_empty() {
        return shown.to_string();
    }

    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}
