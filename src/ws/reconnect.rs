#![expect(
    clippy::module_name_repetitions,
    reason = "Type names read better with their module suffix at call sites"
)]

//! Fixed-delay reconnection policy gated on host visibility.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Whether the hosting surface is in the foreground.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    #[must_use]
    pub const fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }
}

/// Host-side control for reporting visibility changes to a stream manager.
#[derive(Debug, Clone)]
pub struct VisibilityHandle {
    tx: watch::Sender<Visibility>,
}

impl VisibilityHandle {
    #[must_use]
    pub fn new(initial: Visibility) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Report the current visibility. Repeating the current value is not a change.
    pub fn set(&self, visibility: Visibility) {
        self.tx.send_if_modified(|current| {
            let changed = *current != visibility;
            *current = visibility;
            changed
        });
    }

    #[must_use]
    pub fn get(&self) -> Visibility {
        *self.tx.borrow()
    }

    pub(crate) fn receiver(&self) -> watch::Receiver<Visibility> {
        self.tx.subscribe()
    }
}

impl Default for VisibilityHandle {
    fn default() -> Self {
        Self::new(Visibility::Visible)
    }
}

/// Where the policy is in its retry cycle.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// No retry pending (connected, never started, or cancelled)
    Idle,
    /// A retry tick is scheduled
    Waiting {
        /// When the tick fires
        deadline: Instant,
        /// A tick already fired while hidden and was skipped
        deferred: bool,
    },
    /// A reconnect attempt is in flight
    Retrying,
}

/// What the manager should do after feeding the policy an input.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Open a new session now
    Attempt,
    /// Keep waiting until the given deadline
    Wait(Instant),
    /// Nothing to do
    None,
}

/// Retries indefinitely with a fixed delay, never while hidden.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    state: PolicyState,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: PolicyState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> PolicyState {
        self.state
    }

    /// Deadline of the pending tick, if one is scheduled.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PolicyState::Waiting { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// The active session closed; schedule a single retry tick.
    pub fn on_closed(&mut self, now: Instant) -> Instant {
        let deadline = now + self.delay;
        self.state = PolicyState::Waiting {
            deadline,
            deferred: false,
        };
        deadline
    }

    /// The retry tick fired.
    pub fn on_tick(&mut self, now: Instant, visibility: Visibility) -> Decision {
        match self.state {
            PolicyState::Waiting { .. } if visibility.is_visible() => {
                self.state = PolicyState::Retrying;
                Decision::Attempt
            }
            PolicyState::Waiting { .. } => {
                let deadline = now + self.delay;
                self.state = PolicyState::Waiting {
                    deadline,
                    deferred: true,
                };
                Decision::Wait(deadline)
            }
            PolicyState::Idle | PolicyState::Retrying => Decision::None,
        }
    }

    /// The host visibility changed.
    pub fn on_visibility(&mut self, visibility: Visibility) -> Decision {
        match self.state {
            PolicyState::Waiting { deferred: true, .. } if visibility.is_visible() => {
                self.state = PolicyState::Retrying;
                Decision::Attempt
            }
            _ => Decision::None,
        }
    }

    /// A session opened; the retry cycle is over.
    pub fn on_opened(&mut self) {
        self.state = PolicyState::Idle;
    }

    /// Drop any pending tick.
    pub fn cancel(&mut self) {
        self.state = PolicyState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(5);

    #[test]
    fn close_schedules_tick_after_fixed_delay() {
        let mut policy = ReconnectPolicy::new(DELAY);
        let now = Instant::now();

        let deadline = policy.on_closed(now);

        assert_eq!(deadline, now + DELAY);
        assert_eq!(policy.deadline(), Some(deadline));
    }

    #[test]
    fn visible_tick_attempts() {
        let mut policy = ReconnectPolicy::new(DELAY);
        let now = Instant::now();
        policy.on_closed(now);

        let decision = policy.on_tick(now + DELAY, Visibility::Visible);

        assert_eq!(decision, Decision::Attempt);
        assert_eq!(policy.state(), PolicyState::Retrying);
        assert_eq!(policy.deadline(), None);
    }

    #[test]
    fn hidden_tick_is_skipped_and_rescheduled() {
        let mut policy = ReconnectPolicy::new(DELAY);
        let now = Instant::now();
        policy.on_closed(now);

        let decision = policy.on_tick(now + DELAY, Visibility::Hidden);

        assert_eq!(decision, Decision::Wait(now + DELAY + DELAY));
        assert_eq!(
            policy.state(),
            PolicyState::Waiting {
                deadline: now + DELAY + DELAY,
                deferred: true
            }
        );
    }

    #[test]
    fn becoming_visible_resumes_only_after_a_skipped_tick() {
        let mut policy = ReconnectPolicy::new(DELAY);
        let now = Instant::now();
        policy.on_closed(now);

        assert_eq!(policy.on_visibility(Visibility::Visible), Decision::None);

        policy.on_tick(now + DELAY, Visibility::Hidden);
        assert_eq!(policy.on_visibility(Visibility::Hidden), Decision::None);
        assert_eq!(policy.on_visibility(Visibility::Visible), Decision::Attempt);
    }

    #[test]
    fn no_attempt_limit() {
        let mut policy = ReconnectPolicy::new(DELAY);
        let mut now = Instant::now();

        for _ in 0..1_000 {
            policy.on_closed(now);
            now += DELAY;
            assert_eq!(policy.on_tick(now, Visibility::Visible), Decision::Attempt);
        }
    }

    #[test]
    fn cancel_and_open_return_to_idle() {
        let mut policy = ReconnectPolicy::new(DELAY);
        let now = Instant::now();

        policy.on_closed(now);
        policy.cancel();
        assert_eq!(policy.state(), PolicyState::Idle);
        assert_eq!(policy.on_tick(now + DELAY, Visibility::Visible), Decision::None);

        policy.on_closed(now);
        policy.on_tick(now + DELAY, Visibility::Visible);
        policy.on_opened();
        assert_eq!(policy.state(), PolicyState::Idle);
    }

    #[test]
    fn visibility_handle_ignores_repeats() {
        let handle = VisibilityHandle::default();
        let mut rx = handle.receiver();

        handle.set(Visibility::Visible);
        assert!(!rx.has_changed().unwrap());

        handle.set(Visibility::Hidden);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Visibility::Hidden);
        assert_eq!(handle.get(), Visibility::Hidden);
    }
}
