//! Per-agent progress: last-action timestamp and completed-action count.
//!
//! Each agent is the only writer of its own progress; the liveness monitor
//! is the only other reader. The two scheduling models need different
//! storage for that single-writer/single-reader pair:
//!
//! - [`AtomicProgress`] for the preemptive model. Writes are `Release`
//!   stores and reads are `Acquire` loads, so the monitor on another
//!   thread always sees a whole, current value.
//! - [`LocalProgress`] for the cooperative model. Everything runs on one
//!   thread, so plain [`Cell`]s are enough. The type is `!Sync`, which
//!   keeps it out of the preemptive model at compile time.
//!
//! Both implement [`ProgressCell`], which is what the agent and the
//! monitor are written against.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Single-writer progress record for one agent.
pub trait ProgressCell {
    /// Set the baseline timestamp at run start. Does not touch the count.
    fn reset(&self, baseline_ms: u64);

    /// Timestamp of the agent's last action (or the baseline).
    fn last_action_ms(&self) -> u64;

    /// Completed actions so far.
    fn actions(&self) -> u64;

    /// Record an action at `now_ms` and return the new action count.
    ///
    /// The timestamp never moves backwards and the count saturates rather
    /// than wrapping.
    fn record_action(&self, now_ms: u64) -> u64;
}

/// Atomic progress record for the preemptive scheduling model.
#[derive(Debug, Default)]
pub struct AtomicProgress {
    /// Milliseconds since run start of the last action.
    last_action_ms: AtomicU64,

    /// Completed actions.
    actions: AtomicU64,
}

impl AtomicProgress {
    /// Create a record with a zero baseline and no actions.
    pub const fn new() -> Self {
        Self {
            last_action_ms: AtomicU64::new(0),
            actions: AtomicU64::new(0),
        }
    }
}

impl ProgressCell for AtomicProgress {
    fn reset(&self, baseline_ms: u64) {
        self.last_action_ms.store(baseline_ms, Ordering::Release);
    }

    fn last_action_ms(&self) -> u64 {
        self.last_action_ms.load(Ordering::Acquire)
    }

    fn actions(&self) -> u64 {
        self.actions.load(Ordering::Acquire)
    }

    fn record_action(&self, now_ms: u64) -> u64 {
        // Single writer: load-then-store cannot race with another store.
        let last = self.last_action_ms.load(Ordering::Relaxed);
        self.last_action_ms
            .store(last.max(now_ms), Ordering::Release);
        let count = self.actions.load(Ordering::Relaxed).saturating_add(1);
        self.actions.store(count, Ordering::Release);
        count
    }
}

/// Single-thread progress record for the cooperative scheduling model.
#[derive(Debug, Default)]
pub struct LocalProgress {
    /// Milliseconds since run start of the last action.
    last_action_ms: Cell<u64>,

    /// Completed actions.
    actions: Cell<u64>,
}

impl LocalProgress {
    /// Create a record with a zero baseline and no actions.
    pub const fn new() -> Self {
        Self {
            last_action_ms: Cell::new(0),
            actions: Cell::new(0),
        }
    }
}

impl ProgressCell for LocalProgress {
    fn reset(&self, baseline_ms: u64) {
        self.last_action_ms.set(baseline_ms);
    }

    fn last_action_ms(&self) -> u64 {
        self.last_action_ms.get()
    }

    fn actions(&self) -> u64 {
        self.actions.get()
    }

    fn record_action(&self, now_ms: u64) -> u64 {
        self.last_action_ms.set(self.last_action_ms.get().max(now_ms));
        let count = self.actions.get().saturating_add(1);
        self.actions.set(count);
        count
    }
}

/// Shared handles delegate to the record they point at.
macro_rules! delegate_progress {
    ($handle:ident) => {
        impl<T: ProgressCell + ?Sized> ProgressCell for $handle<T> {
            fn reset(&self, baseline_ms: u64) {
                (**self).reset(baseline_ms);
            }

            fn last_action_ms(&self) -> u64 {
                (**self).last_action_ms()
            }

            fn actions(&self) -> u64 {
                (**self).actions()
            }

            fn record_action(&self, now_ms: u64) -> u64 {
                (**self).record_action(now_ms)
            }
        }
    };
}

delegate_progress!(Arc);
delegate_progress!(Rc);

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<P: ProgressCell>(cell: &P) {
        cell.reset(100);
        assert_eq!(cell.last_action_ms(), 100);
        assert_eq!(cell.actions(), 0);

        assert_eq!(cell.record_action(350), 1);
        assert_eq!(cell.last_action_ms(), 350);

        // A stale clock reading never moves the timestamp backwards.
        assert_eq!(cell.record_action(300), 2);
        assert_eq!(cell.last_action_ms(), 350);
        assert_eq!(cell.actions(), 2);
    }

    #[test]
    fn atomic_progress_records_actions() {
        exercise(&AtomicProgress::new());
    }

    #[test]
    fn local_progress_records_actions() {
        exercise(&LocalProgress::new());
    }

    #[test]
    fn shared_handles_delegate() {
        let shared = Arc::new(AtomicProgress::new());
        let reader = Arc::clone(&shared);
        shared.record_action(40);
        assert_eq!(reader.actions(), 1);
        assert_eq!(reader.last_action_ms(), 40);

        let local = Rc::new(LocalProgress::new());
        exercise(&local);
    }

    #[test]
    fn atomic_progress_visible_across_threads() {
        let shared = Arc::new(AtomicProgress::new());
        let writer = Arc::clone(&shared);
        let handle = std::thread::spawn(move || {
            for ms in 1..=100 {
                writer.record_action(ms);
            }
        });
        assert!(handle.join().is_ok());
        assert_eq!(shared.actions(), 100);
        assert_eq!(shared.last_action_ms(), 100);
    }
}
