use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Shared resolution latch for the concurrent identification paths.
///
/// The first `try_resolve` wins and cancels the token; every other path observes the
/// cancellation and stops its in-flight work.
#[derive(Clone, Default)]
pub struct IdentificationRace {
    token: CancellationToken,
    resolved: Arc<AtomicBool>,
}

impl IdentificationRace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the win. Returns false if another path already resolved or the race was cancelled.
    pub fn try_resolve(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let won = self
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.token.cancel();
        }
        won
    }

    /// Abandon the race without a winner
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Token for tasks that only need to observe cancellation
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
