use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error::StreamError;
use super::session::{CloseReason, Session, SessionEvents, Transport};
use crate::Result;
use crate::error::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code sent when the client closes deliberately.
const NORMAL_CLOSURE: u16 = 1000;

/// [`Transport`] backed by `tokio-tungstenite`.
///
/// Each opened session runs in its own background task which performs the handshake, forwards
/// inbound text frames, writes queued outbound frames, and reports the close. Ping/pong
/// control frames are answered by tungstenite itself.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TungsteniteTransport {
    fn open(&self, url: &Url, events: SessionEvents) -> Result<Box<dyn Session>> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "unsupported stream scheme `{}`",
                url.scheme()
            )));
        }

        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let endpoint = url.to_string();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            run_session(endpoint, events, sender_rx, task_cancel).await;
        });

        Ok(Box::new(TungsteniteSession { sender_tx, cancel }))
    }
}

struct TungsteniteSession {
    sender_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl Session for TungsteniteSession {
    fn send(&mut self, frame: String) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(StreamError::ConnectionClosed.into());
        }
        self.sender_tx
            .send(frame)
            .map_err(|_e| StreamError::ConnectionClosed)?;
        Ok(())
    }

    fn close(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for TungsteniteSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drive one session from handshake to close.
async fn run_session(
    endpoint: String,
    mut events: SessionEvents,
    mut sender_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = connect_async(endpoint.as_str()) => result,
    };

    let mut ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(session = events.id(), error = %e, "Unable to connect to stream");
            let info = e.to_string();
            events.error(info.clone());
            events.closed(CloseReason::new(None, info));
            return;
        }
    };

    // Closed by the manager mid-handshake; nobody is listening any more.
    if events.is_silenced() {
        _ = ws_stream.close(None).await;
        return;
    }

    events.opened();
    let reason = handle_connection(ws_stream, &mut events, &mut sender_rx, &cancel).await;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        session = events.id(),
        code = ?reason.code,
        reason = %reason.reason,
        "Stream session finished"
    );

    events.closed(reason);
}

/// Pump frames in both directions until the connection ends or is cancelled.
async fn handle_connection(
    ws_stream: WsStream,
    events: &mut SessionEvents,
    sender_rx: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> CloseReason {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                // Best effort; the peer may already be gone.
                _ = write.send(Message::Close(None)).await;
                return CloseReason::new(Some(NORMAL_CLOSURE), "closed by client");
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        #[cfg(feature = "tracing")]
                        tracing::trace!(%text, "Received stream text frame");
                        events.message(text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => return close_reason(frame),
                    Some(Ok(_)) => {
                        // Binary frames are not part of the protocol; ping/pong is automatic.
                    }
                    Some(Err(e)) => {
                        let info = e.to_string();
                        events.error(info.clone());
                        return CloseReason::new(None, info);
                    }
                    None => return CloseReason::new(None, "stream ended"),
                }
            }

            Some(text) = sender_rx.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    let info = e.to_string();
                    events.error(info.clone());
                    return CloseReason::new(None, info);
                }
            }
        }
    }
}

fn close_reason(frame: Option<CloseFrame>) -> CloseReason {
    frame.map_or_else(
        || CloseReason::new(None, "closed by server"),
        |f| CloseReason::new(Some(u16::from(f.code)), f.reason.as_str()),
    )
}
