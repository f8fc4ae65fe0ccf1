//! Monotonic run clock.
//!
//! Every timestamp in a run (last-action times, event stamps, monitor
//! scans) is milliseconds since a single epoch captured when the run
//! starts. The clock is built on [`tokio::time::Instant`], so tests running
//! on a paused runtime see time advance only when the runtime auto-advances
//! it.

use tokio::time::Instant;

/// Monotonic clock returning elapsed milliseconds since its epoch.
///
/// The clock is `Copy`; every agent and the monitor hold their own copy of
/// the same epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunClock {
    /// The instant that reads as 0 ms.
    epoch: Instant,
}

impl RunClock {
    /// Start a clock whose epoch is now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the epoch.
    ///
    /// Saturates at `u64::MAX`, which is unreachable in practice.
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn clock_starts_at_zero() {
        let clock = RunClock::start();
        assert_eq!(clock.now_ms(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_follows_runtime_time() {
        let clock = RunClock::start();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), 250);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(clock.now_ms(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn copies_share_an_epoch() {
        let clock = RunClock::start();
        let copy = clock;
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(clock.now_ms(), copy.now_ms());
    }
}
