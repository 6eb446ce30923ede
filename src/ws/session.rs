#![expect(
    clippy::module_name_repetitions,
    reason = "Type names read better with their module suffix at call sites"
)]

//! Transport abstraction for a single physical streaming connection.
//!
//! A [`Transport`] opens [`Session`]s. Each session reports its lifecycle through the
//! [`SessionEvents`] sink it was opened with:
//!
//! - [`SessionEvents::opened`] at most once, after a successful handshake
//! - [`SessionEvents::message`] zero or more times
//! - [`SessionEvents::error`] zero or more times, independent of closing
//! - [`SessionEvents::closed`] exactly once, terminal for the session
//!
//! Network-level failures must be reported through the sink, never as an `Err` from
//! [`Transport::open`]. An `Err` from `open` means the session could not even be attempted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use url::Url;

use crate::Result;

/// Identifier the manager assigns to each opened session.
pub type SessionId = u64;

/// Lifecycle event raised by a session.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake completed
    Opened,
    /// One inbound text frame
    Message(String),
    /// Non-terminal error report
    Error(String),
    /// The session is finished
    Closed(CloseReason),
}

/// Why a session closed, as far as the transport can tell.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    /// Close code sent by the server, if any
    pub code: Option<u16>,
    /// Close reason text sent by the server, or a local description
    pub reason: String,
}

impl CloseReason {
    #[must_use]
    pub fn new<S: Into<String>>(code: Option<u16>, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Sink through which a session reports its lifecycle to the manager.
///
/// Once the manager closes the session, every further report is discarded.
pub struct SessionEvents {
    id: SessionId,
    tx: mpsc::UnboundedSender<(SessionId, SessionEvent)>,
    silenced: Arc<AtomicBool>,
    opened: bool,
}

impl SessionEvents {
    pub(crate) fn new(
        id: SessionId,
        tx: mpsc::UnboundedSender<(SessionId, SessionEvent)>,
        silenced: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            tx,
            silenced,
            opened: false,
        }
    }

    /// The identifier of the session this sink belongs to.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether the manager has closed this session.
    #[must_use]
    pub fn is_silenced(&self) -> bool {
        self.silenced.load(Ordering::Acquire)
    }

    /// Report a successful handshake. Repeated calls are ignored.
    pub fn opened(&mut self) {
        if self.opened {
            return;
        }
        self.opened = true;
        self.emit(SessionEvent::Opened);
    }

    /// Report one inbound text frame.
    pub fn message<S: Into<String>>(&mut self, frame: S) {
        self.emit(SessionEvent::Message(frame.into()));
    }

    /// Report a non-terminal error.
    pub fn error<S: Into<String>>(&mut self, info: S) {
        self.emit(SessionEvent::Error(info.into()));
    }

    /// Report that the session is finished. Consumes the sink.
    pub fn closed(self, reason: CloseReason) {
        self.emit(SessionEvent::Closed(reason));
    }

    fn emit(&self, event: SessionEvent) {
        if self.is_silenced() {
            return;
        }
        // The receiver only disappears once the manager is gone.
        _ = self.tx.send((self.id, event));
    }
}

/// Opens physical connections.
pub trait Transport: Send + Sync + 'static {
    /// Start opening one session to `url`.
    ///
    /// Returns immediately; the outcome is reported through `events`.
    fn open(&self, url: &Url, events: SessionEvents) -> Result<Box<dyn Session>>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(&self, url: &Url, events: SessionEvents) -> Result<Box<dyn Session>> {
        (**self).open(url, events)
    }
}

/// Handle to one open (or opening) physical connection.
pub trait Session: Send {
    /// Queue one outbound text frame.
    fn send(&mut self, frame: String) -> Result<()>;

    /// Close the connection. Idempotent and safe from any state.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> (
        SessionEvents,
        mpsc::UnboundedReceiver<(SessionId, SessionEvent)>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let silenced = Arc::new(AtomicBool::new(false));
        (SessionEvents::new(7, tx, Arc::clone(&silenced)), rx, silenced)
    }

    #[test]
    fn events_carry_session_id_in_order() {
        let (mut events, mut rx, _) = sink();

        events.opened();
        events.message("frame");
        events.closed(CloseReason::new(Some(1000), "bye"));

        assert_eq!(rx.try_recv().unwrap(), (7, SessionEvent::Opened));
        assert_eq!(
            rx.try_recv().unwrap(),
            (7, SessionEvent::Message("frame".to_owned()))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            (7, SessionEvent::Closed(CloseReason::new(Some(1000), "bye")))
        );
    }

    #[test]
    fn opened_is_reported_once() {
        let (mut events, mut rx, _) = sink();

        events.opened();
        events.opened();

        assert_eq!(rx.try_recv().unwrap(), (7, SessionEvent::Opened));
        rx.try_recv().unwrap_err();
    }

    #[test]
    fn silenced_sink_drops_everything() {
        let (mut events, mut rx, silenced) = sink();
        silenced.store(true, Ordering::Release);

        events.message("late");
        events.closed(CloseReason::default());

        rx.try_recv().unwrap_err();
    }
}
