//! Waiting on an asynchronously rendering page.
//!
//! A fixed [`pause`] is the baseline settle delay. [`wait_until`] has the
//! same worst-case latency but returns as soon as the page shows what the
//! caller is waiting for.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_satisfied(self) -> bool {
        self == WaitOutcome::Satisfied
    }
}

pub async fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration).await;
    }
}

pub async fn pause_ms(millis: u64) {
    pause(Duration::from_millis(millis)).await;
}

/// Polls `predicate` every `poll` until it returns true or `timeout` has
/// elapsed. The predicate is always evaluated at least once.
pub async fn wait_until<F, Fut>(timeout: Duration, poll: Duration, mut predicate: F) -> WaitOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await {
            return WaitOutcome::Satisfied;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut;
        }
        // Never sleep past the deadline; a zero poll still yields.
        let step = poll.min(deadline - now).max(Duration::from_millis(1));
        sleep(step).await;
    }
}
