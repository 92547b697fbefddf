use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Time source for the bootstrap loop, in epoch milliseconds.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;

    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when told to.
///
/// `sleep` moves the clock to the sleeper's deadline (never backwards) and
/// returns right away, so concurrent sleeps started at the same instant end
/// at the same instant. This makes retry and timeout timing deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    slept: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> ManualClock {
        ManualClock {
            now: AtomicU64::new(start_millis),
            slept: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sum of all requested sleeps.
    pub fn slept(&self) -> Duration {
        Duration::from_millis(self.slept.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        let millis = duration.as_millis() as u64;
        self.slept.fetch_add(millis, Ordering::SeqCst);
        let deadline = self.now_millis().saturating_add(millis);
        // let every sleeper started at this instant fix its deadline first
        tokio::task::yield_now().await;
        self.now.fetch_max(deadline, Ordering::SeqCst);
    }
}
