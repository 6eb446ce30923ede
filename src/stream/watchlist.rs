#![expect(
    clippy::module_name_repetitions,
    reason = "Type names read better with their module suffix at call sites"
)]

//! Watchlist projection of the stream, the way a watchlist screen consumes it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::registry::{SubscriberRegistry, SubscriptionHandle};
use super::types::response::WatchlistEntry;
use super::types::{ConnectionError, ConnectionStatus, Direction, StreamEvent};

/// A [`WatchlistView`] shared with the consumer callback that keeps it current.
pub type SharedWatchlist = Arc<RwLock<WatchlistView>>;

/// Status, current watchlist and last error, folded from [`StreamEvent`]s.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchlistView {
    pub status: ConnectionStatus,
    /// Replaced wholesale by every `watchlist_update`
    pub entries: Vec<WatchlistEntry>,
    pub error: Option<ConnectionError>,
}

impl WatchlistView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a view to `registry`. The returned view is already caught up with the
    /// registry's snapshot.
    pub fn attach(registry: &Arc<SubscriberRegistry>) -> (SharedWatchlist, SubscriptionHandle) {
        let view: SharedWatchlist = Arc::default();
        let sink = Arc::clone(&view);
        let handle = registry.subscribe(move |event| {
            sink.write()
                .unwrap_or_else(PoisonError::into_inner)
                .apply(event);
        });
        (view, handle)
    }

    /// Fold one event into the view. Messages other than watchlist updates are ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Status(status) => self.status = *status,
            StreamEvent::Error(error) => self.error.clone_from(error),
            StreamEvent::Message(message) => {
                if let Some(update) = message.as_watchlist_update() {
                    self.entries.clone_from(&update.stocks);
                }
            }
        }
    }

    /// Whether the list reflects a live connection. Anything else renders as "connecting".
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status.is_connected()
    }

    #[must_use]
    pub fn entry(&self, symbol: &str) -> Option<&WatchlistEntry> {
        self.entries.iter().find(|e| e.symbol == symbol)
    }
}

impl fmt::Display for WatchlistView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_live() {
            writeln!(f, "Connecting to stream... ({})", self.status)?;
        } else if self.entries.is_empty() {
            writeln!(f, "Your watchlist is empty.")?;
        } else {
            for entry in &self.entries {
                let sign = match entry.direction() {
                    Direction::Up => "+",
                    Direction::Down => "",
                };
                writeln!(
                    f,
                    "{:<8} {:<32} ${:>10} {sign}{}%",
                    entry.symbol, entry.name, entry.last_price, entry.change_percent
                )?;
            }
        }

        if let Some(error) = &self.error {
            writeln!(f, "Error: {}", error.message)?;
        }

        Ok(())
    }
}
