//! In-flight command tracking shared by the input and inbound loops.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tokio::{sync::watch, time::Instant};

/// Completion state of the most recent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The prompt may return: a terminal message or a local wake was seen.
    pub completed: bool,
    /// The terminal message of the last command was seen.
    pub settled: bool,
    /// When the last command was handed to the transport.
    pub sent_at: Option<Instant>,
}

/// Tracks whether a command is in flight.
///
/// The input loop publishes "command sent" and the inbound loop publishes
/// "terminal message seen" through a watch channel, so every reader sees
/// the latest transition and waiters are woken on each one.
#[derive(Debug)]
pub struct CompletionTracker {
    state: watch::Sender<Completion>,
    timeout: Duration,
    expiry_reported: AtomicBool,
}

impl CompletionTracker {
    /// Create a tracker with nothing in flight.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let (state, _) = watch::channel(Completion {
            completed: true,
            settled: true,
            sent_at: None,
        });
        Self {
            state,
            timeout,
            expiry_reported: AtomicBool::new(false),
        }
    }

    /// Liveness timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Mark a command as sent now.
    pub fn begin(&self) -> Instant {
        let now = Instant::now();
        self.expiry_reported.store(false, Ordering::Relaxed);
        self.state.send_replace(Completion {
            completed: false,
            settled: false,
            sent_at: Some(now),
        });
        now
    }

    /// Release the prompt without ending the command for [`wait`](Self::wait).
    ///
    /// Returns true if a command was waiting.
    pub fn wake(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.completed {
                false
            } else {
                state.completed = true;
                true
            }
        })
    }

    /// Record the terminal message of the in-flight command.
    ///
    /// Releases the prompt like [`wake`](Self::wake). Returns true if the
    /// prompt was still suppressed.
    pub fn settle(&self) -> bool {
        let mut released = false;
        self.state.send_if_modified(|state| {
            released = !state.completed;
            let modified = released || !state.settled;
            state.completed = true;
            state.settled = true;
            modified
        });
        released
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> Completion {
        *self.state.borrow()
    }

    /// Whether a new command may be sent now.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed_at(Instant::now())
    }

    /// Whether a new command may be sent at `now`.
    ///
    /// True once a terminal message was seen, or once `timeout` has
    /// elapsed since the command was sent.
    #[must_use]
    pub fn is_completed_at(&self, now: Instant) -> bool {
        let Completion {
            completed, sent_at, ..
        } = self.snapshot();
        if completed {
            return true;
        }
        let Some(sent_at) = sent_at else {
            return true;
        };

        let expired = now.saturating_duration_since(sent_at) >= self.timeout;
        if expired && !self.expiry_reported.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                timeout = ?self.timeout,
                "No terminal message received before timeout, releasing prompt"
            );
        }
        expired
    }

    /// Subscribe to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Completion> {
        self.state.subscribe()
    }

    /// Wait for the terminal message of the in-flight command.
    ///
    /// Wakes that only release the prompt, such as a catalogue update, do not
    /// end the wait. Returns false if the timeout elapsed first.
    pub async fn wait(&self) -> bool {
        let mut rx = self.subscribe();
        let Some(sent_at) = rx.borrow().sent_at else {
            return true;
        };

        let deadline = sent_at + self.timeout;
        let woken = async move { rx.wait_for(|state| state.settled).await.is_ok() };
        tokio::time::timeout_at(deadline, woken)
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);
    const EPSILON: Duration = Duration::from_millis(1);

    #[test]
    fn test_idle_tracker_is_completed() {
        let tracker = CompletionTracker::new(TIMEOUT);
        assert!(tracker.is_completed());
        assert!(!tracker.wake());
    }

    #[test]
    fn test_timeout_boundary() {
        let tracker = CompletionTracker::new(TIMEOUT);
        let sent_at = tracker.begin();

        assert!(!tracker.is_completed_at(sent_at));
        assert!(!tracker.is_completed_at(sent_at + TIMEOUT - EPSILON));
        assert!(tracker.is_completed_at(sent_at + TIMEOUT));
        assert!(tracker.is_completed_at(sent_at + TIMEOUT + EPSILON));
    }

    #[test]
    fn test_wake_releases_immediately() {
        let tracker = CompletionTracker::new(TIMEOUT);
        let sent_at = tracker.begin();
        assert!(tracker.wake());
        assert!(tracker.is_completed_at(sent_at));

        // A new command re-arms the tracker.
        let sent_at = tracker.begin();
        assert!(!tracker.is_completed_at(sent_at));
    }

    #[test]
    fn test_settle_releases_prompt_once() {
        let tracker = CompletionTracker::new(TIMEOUT);
        let sent_at = tracker.begin();

        assert!(tracker.wake());
        assert!(!tracker.snapshot().settled);
        assert!(!tracker.settle());
        assert!(tracker.snapshot().settled);
        assert!(tracker.is_completed_at(sent_at));
    }

    #[tokio::test]
    async fn test_wait_returns_on_settle() {
        let tracker = std::sync::Arc::new(CompletionTracker::new(Duration::from_secs(30)));
        tracker.begin();

        let waker = std::sync::Arc::clone(&tracker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waker.settle();
        });

        assert!(tracker.wait().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ignores_plain_wake() {
        let tracker = std::sync::Arc::new(CompletionTracker::new(TIMEOUT));
        tracker.begin();

        let waker = std::sync::Arc::clone(&tracker);
        tokio::spawn(async move {
            waker.wake();
            tokio::time::sleep(Duration::from_millis(100)).await;
            waker.settle();
        });

        let started = Instant::now();
        assert!(tracker.wait().await);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_gives_up_after_timeout() {
        let tracker = CompletionTracker::new(TIMEOUT);
        let sent_at = tracker.begin();

        assert!(!tracker.wait().await);
        assert!(Instant::now() >= sent_at + TIMEOUT);
        assert!(tracker.is_completed());
    }
}
