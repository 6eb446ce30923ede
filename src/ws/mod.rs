//! Core streaming transport infrastructure.
//!
//! This module holds everything below the decoded-message layer: how a physical connection
//! is opened and observed, and when a dropped one is retried.
//!
//! # Architecture
//!
//! - [`Transport`] / [`Session`]: one physical connection and its lifecycle events
//! - [`TungsteniteTransport`]: the WebSocket implementation (feature `ws`)
//! - [`ReconnectPolicy`]: fixed-delay retry gated on [`Visibility`]
//! - [`config::Config`]: endpoint and retry delay

pub mod config;
#[cfg(feature = "ws")]
pub mod connection;
pub mod error;
pub mod reconnect;
pub mod session;

#[cfg(feature = "ws")]
pub use connection::TungsteniteTransport;
pub use error::StreamError;
pub use reconnect::{ReconnectPolicy, Visibility, VisibilityHandle};
pub use session::{CloseReason, Session, SessionEvent, SessionEvents, SessionId, Transport};
