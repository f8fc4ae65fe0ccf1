//! The agent life-cycle.
//!
//! An [`Agent`] loops through
//!
//! ```text
//! Thinking -> AcquiringFirst -> AcquiringSecond -> Acting -> Releasing -> Resting -> Thinking
//! ```
//!
//! until its die timeout runs out while it is waiting for a resource
//! (terminal `Dead`) or the run's cancellation token fires (terminal
//! `Cancelled`). An agent that reaches the target action count stops
//! competing and idles until cancellation, so it never acts past the
//! target.
//!
//! # Ordering
//!
//! An agent always requests the lower-numbered of its two resources first.
//! Both agents sharing a resource agree on that order, so the whole ring
//! acquires along one global order and no cycle of waiters can form. No
//! back-off or retry is needed.
//!
//! # Deadlines
//!
//! Every wait is bounded by what is left of the die timeout, re-derived
//! from the agent's last-action timestamp right before the wait. The
//! remaining time is checked three times per cycle: before the first
//! resource, before the second, and once more before the action is
//! recorded, since both waits consumed real time.
//!
//! # Cancellation
//!
//! Every suspension point (both resource waits, the act delay, the rest
//! delay) races the cancellation token. Held resources live in
//! [`ResourceGuard`]s, so leaving the loop by any path releases them.

use std::sync::Arc;
use std::time::Duration;

use symposium_types::{AgentExit, AgentId, AgentPhase, EventKind, SimEvent};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::RunClock;
use crate::config::RingConfig;
use crate::events::EventSink;
use crate::progress::ProgressCell;
use crate::resource::{Acquisition, Resource, ResourceGuard, ResourcePair};

/// The fixed durations an agent works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTiming {
    /// Longest the agent may go without acting.
    pub die_timeout: Duration,

    /// How long both resources are held per action.
    pub act_duration: Duration,

    /// How long the agent rests between cycles.
    pub rest_duration: Duration,

    /// Action count after which the agent stops competing.
    pub target_action_count: Option<u64>,
}

impl AgentTiming {
    /// Extract the agent timings from a ring configuration.
    pub const fn from_ring(ring: &RingConfig) -> Self {
        Self {
            die_timeout: ring.die_timeout(),
            act_duration: ring.act_duration(),
            rest_duration: ring.rest_duration(),
            target_action_count: ring.target_action_count,
        }
    }
}

/// Outcome of one bounded resource wait.
enum Step {
    /// Resource held.
    Held(ResourceGuard),
    /// Deadline exhausted before or during the wait.
    Dead,
    /// Cancellation observed.
    Cancelled,
}

/// Both resources of one cycle.
///
/// `second` is `None` only in a ring of one, where both ends are the same
/// resource.
struct Held {
    first: ResourceGuard,
    second: Option<ResourceGuard>,
}

impl Held {
    fn release(self) {
        self.first.release();
        if let Some(second) = self.second {
            second.release();
        }
    }
}

/// Time left before `die_timeout` for an agent that last acted at
/// `last_action_ms`, or `None` once it is used up.
fn time_left(die_timeout: Duration, last_action_ms: u64, now_ms: u64) -> Option<Duration> {
    let elapsed = now_ms.saturating_sub(last_action_ms);
    let die_ms = u64::try_from(die_timeout.as_millis()).unwrap_or(u64::MAX);
    match die_ms.checked_sub(elapsed) {
        Some(0) | None => None,
        Some(left) => Some(Duration::from_millis(left)),
    }
}

/// One agent of the ring, ready to run.
///
/// `P` is the agent's progress record: an `Arc<AtomicProgress>` under
/// preemptive scheduling or an `Rc<LocalProgress>` under cooperative
/// scheduling. The monitor holds a clone of the same handle.
pub struct Agent<P> {
    /// Ring position.
    id: AgentId,

    /// The agent's two resources in acquisition order.
    resources: ResourcePair,

    /// Last-action timestamp and action count, written only by this agent.
    progress: P,

    /// Die timeout and act/rest durations.
    timing: AgentTiming,

    /// Shared run clock.
    clock: RunClock,

    /// Event stream.
    sink: Arc<dyn EventSink>,

    /// Run-wide shutdown signal.
    cancel: CancellationToken,
}

impl<P: ProgressCell> Agent<P> {
    /// Create an agent bound to its resource pair.
    pub fn new(
        id: AgentId,
        resources: ResourcePair,
        progress: P,
        timing: AgentTiming,
        clock: RunClock,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            resources,
            progress,
            timing,
            clock,
            sink,
            cancel,
        }
    }

    /// Run the life-cycle until the agent dies or the run is cancelled.
    pub async fn run(self) -> AgentExit {
        loop {
            if self.cancel.is_cancelled() {
                return self.exit_cancelled();
            }
            if self.finished() {
                return self.idle().await;
            }

            // Thinking -> AcquiringFirst
            self.enter(AgentPhase::AcquiringFirst);
            let first = match self.acquire(&self.resources.first).await {
                Step::Held(guard) => guard,
                Step::Dead => return self.exit_dead(AgentPhase::AcquiringFirst),
                Step::Cancelled => return self.exit_cancelled(),
            };

            let second = match &self.resources.second {
                Some(resource) => {
                    self.enter(AgentPhase::AcquiringSecond);
                    match self.acquire(resource).await {
                        Step::Held(guard) => Some(guard),
                        Step::Dead => {
                            first.release();
                            return self.exit_dead(AgentPhase::AcquiringSecond);
                        }
                        Step::Cancelled => {
                            first.release();
                            return self.exit_cancelled();
                        }
                    }
                }
                None => None,
            };
            let held = Held { first, second };

            if self.remaining().is_none() {
                held.release();
                return self.exit_dead(AgentPhase::AcquiringSecond);
            }

            // Acting
            self.enter(AgentPhase::Acting);
            let action_count = self.progress.record_action(self.clock.now_ms());
            self.emit(EventKind::Acting { action_count });
            if !self.pause(self.timing.act_duration).await {
                held.release();
                return self.exit_cancelled();
            }

            // Releasing
            self.enter(AgentPhase::Releasing);
            held.release();
            if self.finished() {
                return self.idle().await;
            }

            // Resting
            self.enter(AgentPhase::Resting);
            self.emit(EventKind::Resting);
            if !self.pause(self.timing.rest_duration).await {
                return self.exit_cancelled();
            }

            self.enter(AgentPhase::Thinking);
            self.emit(EventKind::Thinking);
        }
    }

    /// Time left before the die timeout, or `None` if it has run out.
    fn remaining(&self) -> Option<Duration> {
        time_left(
            self.timing.die_timeout,
            self.progress.last_action_ms(),
            self.clock.now_ms(),
        )
    }

    /// Whether the agent has reached its target action count.
    fn finished(&self) -> bool {
        self.timing
            .target_action_count
            .is_some_and(|target| self.progress.actions() >= target)
    }

    /// Hold nothing and wait for the run to end.
    async fn idle(&self) -> AgentExit {
        debug!(
            agent = %self.id,
            actions = self.progress.actions(),
            at_ms = self.clock.now_ms(),
            "agent reached target"
        );
        self.cancel.cancelled().await;
        self.exit_cancelled()
    }

    /// Wait for one resource within the remaining deadline.
    async fn acquire(&self, resource: &Arc<Resource>) -> Step {
        let Some(deadline) = self.remaining() else {
            return Step::Dead;
        };
        match resource.try_acquire(self.id, deadline, &self.cancel).await {
            Acquisition::Acquired(guard) => {
                self.emit(EventKind::ResourceTaken {
                    resource: guard.resource_id(),
                });
                Step::Held(guard)
            }
            Acquisition::TimedOut => Step::Dead,
            Acquisition::Cancelled => Step::Cancelled,
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if the run was cancelled.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    fn emit(&self, kind: EventKind) {
        self.sink
            .emit(&SimEvent::for_agent(self.clock.now_ms(), self.id, kind));
    }

    fn enter(&self, phase: AgentPhase) {
        debug!(agent = %self.id, %phase, at_ms = self.clock.now_ms(), "phase");
    }

    fn exit_dead(&self, phase: AgentPhase) -> AgentExit {
        debug!(
            agent = %self.id,
            %phase,
            last_action_ms = self.progress.last_action_ms(),
            actions = self.progress.actions(),
            "agent ran out of time"
        );
        AgentExit::Dead { phase }
    }

    fn exit_cancelled(&self) -> AgentExit {
        self.enter(AgentPhase::Cancelled);
        AgentExit::Cancelled
    }
}

impl<P> core::fmt::Debug for Agent<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}
