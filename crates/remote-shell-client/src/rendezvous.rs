//! Hand-off of captured input lines to the inbound loop.

use std::time::Duration;

use tokio::sync::broadcast;

/// Capacity of the line broadcast; one pending waiter needs one slot.
const CAPACITY: usize = 16;

/// Publishes every line the input loop captures.
///
/// The inbound loop subscribes when it needs the operator's next line (an
/// interrupt confirmation) and waits for it with a bound. Publishing with no
/// subscriber is a no-op.
#[derive(Debug)]
pub struct LineRendezvous {
    tx: broadcast::Sender<String>,
}

impl Default for LineRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl LineRendezvous {
    /// Create a rendezvous with no waiters.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    /// Publish a captured line to every waiter.
    pub fn notify(&self, line: &str) {
        let _ = self.tx.send(line.to_string());
    }

    /// Register interest in the next captured line.
    ///
    /// Subscribe before prompting the operator so an immediate answer is
    /// not missed.
    #[must_use]
    pub fn subscribe(&self) -> NextLine {
        NextLine {
            rx: self.tx.subscribe(),
        }
    }
}

/// Pending wait for the next captured line.
#[derive(Debug)]
pub struct NextLine {
    rx: broadcast::Receiver<String>,
}

impl NextLine {
    /// Wait up to `timeout` for the next line.
    pub async fn wait(mut self, timeout: Duration) -> Option<String> {
        let next = async {
            loop {
                match self.rx.recv().await {
                    Ok(line) => return Some(line),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        tokio::time::timeout(timeout, next).await.ok().flatten()
    }
}

/// Interpret an operator answer as yes/no; no answer means no.
#[must_use]
pub fn parse_confirmation(answer: Option<&str>) -> bool {
    answer.is_some_and(|answer| {
        matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes" | "true" | "on" | "1"
        )
    })
}
