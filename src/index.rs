//! Replication index watermark and the index-wait gate
//!
//! The replication index is a per-node, monotonically non-decreasing
//! counter marking how much replicated write history has been applied. The
//! write path is its only writer; query and wait paths read it without
//! blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Poll cadence of the wait gate.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Process-wide applied-replication watermark.
///
/// Single logical writer (the write path), any number of readers; neither
/// side blocks the other.
#[derive(Debug, Default)]
pub struct ReplicationIndex {
    current: AtomicU64,
}

impl ReplicationIndex {
    pub fn new(initial: u64) -> Self {
        Self {
            current: AtomicU64::new(initial),
        }
    }

    /// Current applied index.
    pub fn load(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Advance the watermark to `index`. The index never moves backward;
    /// an older value is a no-op.
    pub fn advance_to(&self, index: u64) {
        self.current.fetch_max(index, Ordering::AcqRel);
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The index reached the target; carries the observed value.
    Reached(u64),
    /// The timeout elapsed first.
    TimedOut,
    /// The client went away; stop silently.
    Cancelled,
}

/// Blocks a caller until the node's replication index reaches a target.
pub struct IndexWaitGate<'a> {
    index: &'a ReplicationIndex,
    poll_interval: Duration,
}

impl<'a> IndexWaitGate<'a> {
    pub fn new(index: &'a ReplicationIndex) -> Self {
        Self {
            index,
            poll_interval: WAIT_POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait until the index is >= `target`.
    ///
    /// A `None` or non-positive timeout waits indefinitely. Each poll
    /// checks, in priority order: target reached, timeout elapsed, client
    /// cancelled. Target zero is not a valid watermark and must be
    /// rejected by the caller before the gate runs.
    pub async fn wait(
        &self,
        target: u64,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> WaitOutcome {
        let deadline = timeout
            .filter(|t| !t.is_zero())
            .map(|t| tokio::time::Instant::now() + t);

        loop {
            let current = self.index.load();
            if current >= target {
                return WaitOutcome::Reached(current);
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return WaitOutcome::TimedOut;
                }
            }
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
