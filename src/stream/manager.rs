#![expect(
    clippy::module_name_repetitions,
    reason = "Type names read better with their module suffix at call sites"
)]

//! Single owner of the live stream connection.
//!
//! [`StreamManager`] opens the session, keeps [`ConnectionStatus`] current, decodes inbound
//! frames and publishes everything through its [`SubscriberRegistry`]. All connection state
//! lives in one background task, so session events, retry ticks, visibility changes and
//! outbound requests are handled strictly one at a time.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::registry::{SubscriberRegistry, SubscriptionHandle};
use super::types::request::ClientRequest;
use super::types::response::{StreamMessage, decode_frame};
use super::types::{ConnectionError, ConnectionStatus, ErrorSource, StreamEvent};
use crate::Result;
use crate::auth::TokenSource;
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::reconnect::Decision;
use crate::ws::{
    ReconnectPolicy, Session, SessionEvent, SessionEvents, SessionId, StreamError, Transport,
    Visibility, VisibilityHandle,
};

enum Lifecycle {
    Idle {
        requests: mpsc::UnboundedReceiver<ClientRequest>,
    },
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// Resilient connection to the stock streaming service.
///
/// # Example
///
/// ```rust, no_run
/// use stockwatch_stream::auth::StaticToken;
/// use stockwatch_stream::stream::StreamManager;
/// use stockwatch_stream::ws::config::{Config, Endpoint};
/// use stockwatch_stream::ws::{TungsteniteTransport, VisibilityHandle};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let endpoint = Endpoint::builder().host("localhost").build();
///     let visibility = VisibilityHandle::default();
///     let manager =
///         StreamManager::new(Config::new(endpoint), TungsteniteTransport::new(), &visibility);
///
///     let _handle = manager.subscribe(|event| println!("{event:?}"));
///     manager.start(StaticToken::new("access-token"))?;
///     manager.subscribe_stock("AAPL")?;
///
///     manager.stop().await;
///     Ok(())
/// }
/// ```
pub struct StreamManager {
    config: Config,
    transport: Arc<dyn Transport>,
    visibility: watch::Receiver<Visibility>,
    registry: Arc<SubscriberRegistry>,
    /// Per-symbol channel subscriptions with reference counts
    symbols: Arc<DashMap<String, usize>>,
    requests: mpsc::UnboundedSender<ClientRequest>,
    lifecycle: Mutex<Lifecycle>,
    stopped: AtomicBool,
}

impl StreamManager {
    /// Create a manager. Nothing connects until [`start`](Self::start).
    pub fn new<T: Transport>(config: Config, transport: T, visibility: &VisibilityHandle) -> Self {
        let (requests, requests_rx) = mpsc::unbounded_channel();

        Self {
            config,
            transport: Arc::new(transport),
            visibility: visibility.receiver(),
            registry: SubscriberRegistry::new(),
            symbols: Arc::new(DashMap::new()),
            requests,
            lifecycle: Mutex::new(Lifecycle::Idle {
                requests: requests_rx,
            }),
            stopped: AtomicBool::new(false),
        }
    }

    /// Begin connecting. Status becomes [`ConnectionStatus::Connecting`] immediately.
    ///
    /// The token source is consulted before every connection attempt, including retries.
    /// Must not be called from inside a consumer callback.
    ///
    /// # Errors
    ///
    /// Fails if the manager was already started or stopped, or if called outside a tokio
    /// runtime.
    pub fn start<S: TokenSource>(&self, token_source: S) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::validation(format!("stream manager must be started inside a tokio runtime: {e}"))
        })?;

        let mut lifecycle = self.lifecycle();
        let requests = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle { requests } => requests,
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                return Err(Error::validation("stream manager is already started"));
            }
            Lifecycle::Stopped => return Err(StreamError::Stopped.into()),
        };

        self.registry.publish_status(ConnectionStatus::Connecting);

        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            token_source: Box::new(token_source),
            registry: Arc::clone(&self.registry),
            symbols: Arc::clone(&self.symbols),
            policy: ReconnectPolicy::new(self.config.retry_delay),
            visibility: self.visibility.clone(),
            events_tx,
            events_rx,
            requests,
            cancel: cancel.clone(),
            active: None,
            next_id: 0,
        };

        let task = runtime.spawn(driver.run());
        *lifecycle = Lifecycle::Running { cancel, task };

        Ok(())
    }

    /// Tear everything down: close the session, cancel any pending retry, publish
    /// [`ConnectionStatus::Disconnected`] and drop every consumer.
    ///
    /// The manager cannot be restarted. Calling `stop` again does nothing.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let previous = std::mem::replace(&mut *self.lifecycle(), Lifecycle::Stopped);

        match previous {
            Lifecycle::Stopped => return,
            Lifecycle::Idle { .. } => {}
            Lifecycle::Running { cancel, task } => {
                cancel.cancel();
                if let Err(e) = task.await {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %e, "Stream task ended abnormally");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }
        }

        self.symbols.clear();
        self.registry.publish_status(ConnectionStatus::Disconnected);
        self.registry.close();

        #[cfg(feature = "tracing")]
        tracing::info!("Stream manager stopped");
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.registry.status()
    }

    /// Most recent error, cleared on every successful connection.
    #[must_use]
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.registry.last_error()
    }

    /// Latest decoded message with the given `type` tag.
    #[must_use]
    pub fn latest(&self, tag: &str) -> Option<Arc<StreamMessage>> {
        self.registry.latest(tag)
    }

    /// The publish point, for consumers that want the stream adapter or snapshot accessors.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Register a consumer. It is immediately replayed the current snapshot.
    pub fn subscribe<F>(&self, consumer: F) -> SubscriptionHandle
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe(consumer)
    }

    /// Join the per-stock channel for `symbol`.
    ///
    /// Subscriptions are reference counted: only the first one sends a request, and the
    /// channel is rejoined automatically after every reconnect.
    ///
    /// # Errors
    ///
    /// Fails on an empty symbol or once the manager is stopped.
    pub fn subscribe_stock(&self, symbol: &str) -> Result<()> {
        let symbol = normalize(symbol)?;
        self.ensure_not_stopped()?;

        // The request is queued while the entry is held so frames follow the count.
        match self.symbols.entry(symbol) {
            Entry::Occupied(mut count) => {
                *count.get_mut() += 1;
                Ok(())
            }
            Entry::Vacant(slot) => {
                let queued = self.request(ClientRequest::subscribe_stock(slot.key().as_str()));
                slot.insert(1);
                queued
            }
        }
    }

    /// Release one subscription to `symbol`. The channel is left when the last one goes.
    ///
    /// Unsubscribing from a symbol that is not subscribed does nothing.
    ///
    /// # Errors
    ///
    /// Fails on an empty symbol or once the manager is stopped.
    pub fn unsubscribe_stock(&self, symbol: &str) -> Result<()> {
        let symbol = normalize(symbol)?;
        self.ensure_not_stopped()?;

        let Entry::Occupied(mut count) = self.symbols.entry(symbol) else {
            return Ok(());
        };

        if *count.get() > 1 {
            *count.get_mut() -= 1;
            return Ok(());
        }

        let queued = self.request(ClientRequest::unsubscribe_stock(count.key().as_str()));
        count.remove();
        queued
    }

    /// Symbols with at least one live subscription.
    #[must_use]
    pub fn subscribed_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.symbols.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    fn request(&self, request: ClientRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_closed| StreamError::Stopped.into())
    }

    // Consumers run while `start` holds the lifecycle lock, so this must not take it.
    fn ensure_not_stopped(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(StreamError::Stopped.into());
        }
        Ok(())
    }

    fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        if let Lifecycle::Running { cancel, .. } = &*self.lifecycle() {
            cancel.cancel();
        }
    }
}

fn normalize(symbol: &str) -> Result<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(Error::validation("symbol cannot be empty"));
    }
    Ok(symbol.to_owned())
}

struct ActiveSession {
    id: SessionId,
    session: Box<dyn Session>,
    silenced: Arc<AtomicBool>,
    open: bool,
    joined: HashSet<String>,
}

impl ActiveSession {
    /// Apply `request` to the channels joined on this session. False if it changes nothing.
    fn track(&mut self, request: &ClientRequest) -> bool {
        match request {
            ClientRequest::SubscribeStock { symbol } => self.joined.insert(symbol.clone()),
            ClientRequest::UnsubscribeStock { symbol } => self.joined.remove(symbol),
        }
    }
}

/// Background task owning the session and the retry cycle.
struct Driver {
    config: Config,
    transport: Arc<dyn Transport>,
    token_source: Box<dyn TokenSource>,
    registry: Arc<SubscriberRegistry>,
    symbols: Arc<DashMap<String, usize>>,
    policy: ReconnectPolicy,
    visibility: watch::Receiver<Visibility>,
    events_tx: mpsc::UnboundedSender<(SessionId, SessionEvent)>,
    events_rx: mpsc::UnboundedReceiver<(SessionId, SessionEvent)>,
    requests: mpsc::UnboundedReceiver<ClientRequest>,
    cancel: CancellationToken,
    active: Option<ActiveSession>,
    next_id: SessionId,
}

impl Driver {
    async fn run(mut self) {
        self.connect().await;

        loop {
            let deadline = self.policy.deadline();

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                Some((id, event)) = self.events_rx.recv() => {
                    self.on_session_event(id, event);
                }

                Some(request) = self.requests.recv() => {
                    self.send(&request);
                }

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let visibility = *self.visibility.borrow();
                    match self.policy.on_tick(Instant::now(), visibility) {
                        Decision::Attempt => self.connect().await,
                        Decision::Wait(_next) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(%visibility, "Reconnect skipped while hidden");
                        }
                        Decision::None => {}
                    }
                }

                Ok(()) = self.visibility.changed() => {
                    let visibility = *self.visibility.borrow_and_update();
                    if self.policy.on_visibility(visibility) == Decision::Attempt {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("Visible again, reconnecting");
                        self.connect().await;
                    }
                }
            }
        }

        self.policy.cancel();
        self.close_active();
    }

    /// Open a fresh session, closing any previous one first.
    async fn connect(&mut self) {
        self.close_active();

        let token = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            token = self.token_source.access_token() => token,
        };

        let url = match self.config.endpoint.url(token.as_ref()) {
            Ok(url) => url,
            Err(e) => return self.fail(&e),
        };

        let id = self.next_id;
        self.next_id += 1;
        let silenced = Arc::new(AtomicBool::new(false));
        let events = SessionEvents::new(id, self.events_tx.clone(), Arc::clone(&silenced));

        #[cfg(feature = "tracing")]
        tracing::info!(
            session = id,
            url = %crate::ws::config::redacted(&url),
            "Opening stream session"
        );

        match self.transport.open(&url, events) {
            Ok(session) => {
                self.active = Some(ActiveSession {
                    id,
                    session,
                    silenced,
                    open: false,
                    joined: HashSet::new(),
                });
            }
            Err(e) => self.fail(&e),
        }
    }

    fn on_session_event(&mut self, id: SessionId, event: SessionEvent) {
        let Some(active) = self.active.as_mut().filter(|active| active.id == id) else {
            #[cfg(feature = "tracing")]
            tracing::trace!(session = id, ?event, "Ignoring event from replaced session");
            return;
        };

        match event {
            SessionEvent::Opened => {
                active.open = true;
                self.policy.on_opened();
                self.registry.publish_error(None);
                self.registry.publish_status(ConnectionStatus::Connected);

                #[cfg(feature = "tracing")]
                tracing::info!(session = id, "Stream connected");

                self.resubscribe();
            }
            SessionEvent::Message(frame) => match decode_frame(&frame) {
                Ok(messages) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(
                        session = id,
                        bytes = frame.len(),
                        count = messages.len(),
                        "Frame decoded"
                    );

                    for message in messages {
                        self.registry.publish_message(message);
                    }
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(session = id, error = %e, "Dropping undecodable frame");
                    self.registry.publish_error(Some(ConnectionError::from_error(&e)));
                }
            },
            SessionEvent::Error(info) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(session = id, error = %info, "Stream transport error");
                self.registry
                    .publish_error(Some(ConnectionError::new(ErrorSource::Transport, info)));
            }
            SessionEvent::Closed(reason) => {
                self.active = None;
                self.registry.publish_status(ConnectionStatus::Reconnecting);
                let retry_at = self.policy.on_closed(Instant::now());

                #[cfg(feature = "tracing")]
                tracing::info!(
                    session = id,
                    code = ?reason.code,
                    reason = %reason.reason,
                    retry_in = ?retry_at.saturating_duration_since(Instant::now()),
                    "Stream closed, will retry"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = (&reason, retry_at);
            }
        }
    }

    /// Rejoin every channel that still has subscribers.
    fn resubscribe(&mut self) {
        let symbols: Vec<String> = self.symbols.iter().map(|e| e.key().clone()).collect();

        #[cfg(feature = "tracing")]
        if !symbols.is_empty() {
            tracing::debug!(count = symbols.len(), "Re-subscribing stock channels");
        }

        for symbol in symbols {
            self.send(&ClientRequest::subscribe_stock(symbol));
        }
    }

    /// Send on the open session. Requests made while disconnected are covered by
    /// [`resubscribe`](Self::resubscribe) once the next session opens, and requests that
    /// [`resubscribe`](Self::resubscribe) already covered are skipped.
    fn send(&mut self, request: &ClientRequest) {
        let Some(active) = self.active.as_mut().filter(|a| a.open) else {
            return;
        };

        if !active.track(request) {
            #[cfg(feature = "tracing")]
            tracing::trace!(session = active.id, ?request, "Channel already in requested state");
            return;
        }

        let result = serde_json::to_string(request)
            .map_err(Error::from)
            .and_then(|frame| active.session.send(frame));

        if let Err(e) = result {
            #[cfg(feature = "tracing")]
            tracing::warn!(session = active.id, error = %e, ?request, "Failed to send request");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    /// The session could not even be attempted; give up until stopped.
    fn fail(&mut self, error: &Error) {
        #[cfg(feature = "tracing")]
        tracing::error!(error = %error, "Could not open stream session");

        self.policy.cancel();
        self.registry.publish_error(Some(ConnectionError::from_error(error)));
        self.registry.publish_status(ConnectionStatus::Failed);
    }

    fn close_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.silenced.store(true, Ordering::Release);
            active.session.close();
        }
    }
}
