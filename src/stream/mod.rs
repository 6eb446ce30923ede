//! Consumer-facing surface of the stock stream.
//!
//! # Overview
//!
//! A [`StreamManager`] owns the one live connection. It decodes every inbound frame into a
//! [`StreamMessage`](types::response::StreamMessage) and publishes status changes, errors and
//! messages through a [`SubscriberRegistry`], which fans them out to every registered consumer
//! in order.
//!
//! # Example
//!
//! ```rust, no_run
//! use futures::StreamExt as _;
//! use stockwatch_stream::auth::SharedToken;
//! use stockwatch_stream::stream::{StreamEvent, StreamManager};
//! use stockwatch_stream::types::Url;
//! use stockwatch_stream::ws::config::{Config, Endpoint};
//! use stockwatch_stream::ws::{TungsteniteTransport, VisibilityHandle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let origin = Url::parse("https://stocks.example.com")?;
//!     let config = Config::new(Endpoint::from_origin(&origin)?);
//!     let visibility = VisibilityHandle::default();
//!     let token = SharedToken::new();
//!     token.set("access-token");
//!
//!     let manager = StreamManager::new(config, TungsteniteTransport::new(), &visibility);
//!     let mut updates = Box::pin(manager.registry().updates());
//!     manager.start(token)?;
//!
//!     while let Some(event) = updates.next().await {
//!         if let StreamEvent::Message(message) = event {
//!             if let Some(update) = message.as_watchlist_update() {
//!                 println!("{} stocks on watchlist", update.stocks.len());
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod manager;
pub mod registry;
pub mod types;
pub mod watchlist;

pub use manager::StreamManager;
pub use registry::{SubscriberRegistry, SubscriptionHandle};
pub use types::response::{StreamMessage, WatchlistEntry, WatchlistUpdate, decode_frame};
pub use types::{ConnectionError, ConnectionStatus, ErrorSource, StreamEvent};
pub use watchlist::WatchlistView;
