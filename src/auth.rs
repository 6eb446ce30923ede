//! Bearer token supply for the stream connection.
//!
//! The stream manager never stores or refreshes credentials itself. Instead it pulls the
//! current access token from a [`TokenSource`] right before every connection attempt, so a
//! token rotated by the host between reconnects is picked up automatically.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
/// Secret string type that redacts the token in debug output.
pub use secrecy::SecretString;

/// Pull-based accessor for the current bearer token.
///
/// Returning `None` does not prevent a connection attempt; the server is responsible for
/// rejecting unauthenticated sessions.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn access_token(&self) -> Option<SecretString>;
}

#[async_trait]
impl<T: TokenSource + ?Sized> TokenSource for Arc<T> {
    async fn access_token(&self) -> Option<SecretString> {
        (**self).access_token().await
    }
}

/// A token fixed at construction time.
#[non_exhaustive]
#[derive(Clone, Debug, Default)]
pub struct StaticToken {
    token: Option<SecretString>,
}

impl StaticToken {
    #[must_use]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: Some(SecretString::from(token.into())),
        }
    }

    /// A source that never has a token.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Option<SecretString> {
        self.token.clone()
    }
}

/// A token slot shared with the host application.
///
/// The host writes a fresh token after login or refresh and clears it on logout; the stream
/// manager reads whatever is current on each connection attempt.
#[derive(Clone, Debug, Default)]
pub struct SharedToken {
    inner: Arc<RwLock<Option<SecretString>>>,
}

impl SharedToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored token.
    pub fn set<S: Into<String>>(&self, token: S) {
        // Option<SecretString> has no inconsistent intermediate state, so a poisoned lock is recoverable.
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) =
            Some(SecretString::from(token.into()));
    }

    /// Remove the stored token.
    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl TokenSource for SharedToken {
    async fn access_token(&self) -> Option<SecretString> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Adapter that turns a closure into a [`TokenSource`].
pub struct FnTokenSource<F> {
    f: F,
}

impl<F> FnTokenSource<F>
where
    F: Fn() -> Option<SecretString> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> TokenSource for FnTokenSource<F>
where
    F: Fn() -> Option<SecretString> + Send + Sync + 'static,
{
    async fn access_token(&self) -> Option<SecretString> {
        (self.f)()
    }
}
