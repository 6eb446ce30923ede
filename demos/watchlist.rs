//! Live watchlist consumer.
//!
//! Connects to the stock stream derived from `STOCKWATCH_ORIGIN` (default
//! `http://localhost:3000`), authenticates with `STOCKWATCH_TOKEN` if set, joins the channels of
//! any symbols given on the command line, and logs the watchlist every time it changes.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,stockwatch_stream=debug cargo run --example watchlist --features tracing -- AAPL MSFT
//! ```

use std::env;
use std::time::Duration;

use futures::StreamExt as _;
use stockwatch_stream::auth::SharedToken;
use stockwatch_stream::stream::{StreamEvent, StreamManager, WatchlistView};
use stockwatch_stream::types::Url;
use stockwatch_stream::ws::config::{Config, Endpoint};
use stockwatch_stream::ws::{TungsteniteTransport, Visibility, VisibilityHandle};
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RUN_FOR: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let origin = env::var("STOCKWATCH_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_owned());
    let endpoint = Endpoint::from_origin(&Url::parse(&origin)?)?;
    info!(host = %endpoint.host, port = endpoint.port, secure = endpoint.secure, "Using stream endpoint");

    let token = SharedToken::new();
    if let Ok(value) = env::var("STOCKWATCH_TOKEN") {
        token.set(value);
    } else {
        warn!("STOCKWATCH_TOKEN not set, connecting without a token");
    }

    let visibility = VisibilityHandle::new(Visibility::Visible);
    let manager = StreamManager::new(Config::new(endpoint), TungsteniteTransport::new(), &visibility);

    let (view, _view_handle) = WatchlistView::attach(manager.registry());
    let mut updates = Box::pin(manager.registry().updates());

    manager.start(token)?;
    for symbol in env::args().skip(1) {
        manager.subscribe_stock(&symbol)?;
        info!(symbol = %symbol, "Joined stock channel");
    }

    let watch = async {
        while let Some(event) = updates.next().await {
            match event {
                StreamEvent::Status(status) => info!(%status, "Connection status"),
                StreamEvent::Error(Some(error)) => {
                    warn!(source = %error.source, error = %error.message, "Stream error");
                }
                StreamEvent::Message(message) if message.as_watchlist_update().is_some() => {
                    let rendered = view
                        .read()
                        .map(|view| view.to_string())
                        .unwrap_or_default();
                    info!("Watchlist updated\n{rendered}");
                }
                StreamEvent::Message(message) => info!(tag = message.tag(), "Other message"),
                _ => {}
            }
        }
    };

    if timeout(RUN_FOR, watch).await.is_err() {
        info!(seconds = RUN_FOR.as_secs(), "Demo finished");
    }

    manager.stop().await;
    Ok(())
}
