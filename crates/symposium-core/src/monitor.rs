//! Liveness monitor: the authority on how a run ends.
//!
//! The monitor wakes every poll interval and scans every agent's progress.
//! An agent whose last action is more than the die timeout in the past is
//! starved, unless it already reached the target and is only waiting for
//! the others; otherwise, if a target is configured and every agent has
//! reached it, the run succeeded. Either verdict is emitted as an event,
//! fires the shared cancellation token, and ends the monitor.
//!
//! Agents that run out of time while waiting also stop on their own, but
//! they do not report anything. Starvation is only ever declared here.

use std::sync::Arc;
use std::time::Duration;

use symposium_types::{AgentId, EventKind, RunOutcome, SimEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::RunClock;
use crate::events::EventSink;
use crate::progress::ProgressCell;

/// Result of one scan over all agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// The first agent found past its die timeout.
    Starved {
        /// The starved agent.
        agent: AgentId,
        /// Milliseconds since its last action.
        since_last_action_ms: u64,
    },
    /// Every agent reached the target.
    Complete {
        /// The target that was reached.
        target: u64,
    },
    /// Nothing to report yet.
    Running,
}

/// Periodic starvation and completion check over every agent.
pub struct LivenessMonitor<P> {
    /// One progress handle per agent, indexed by agent id.
    progress: Vec<P>,

    /// Starvation threshold in milliseconds.
    die_timeout_ms: u64,

    /// Actions every agent must reach for success.
    target: Option<u64>,

    /// Time between scans.
    poll_interval: Duration,

    /// Shared run clock.
    clock: RunClock,

    /// Event stream.
    sink: Arc<dyn EventSink>,

    /// Run-wide shutdown signal, fired on a verdict.
    cancel: CancellationToken,
}

impl<P: ProgressCell> LivenessMonitor<P> {
    /// Create a monitor over the given progress handles.
    pub fn new(
        progress: Vec<P>,
        die_timeout: Duration,
        target: Option<u64>,
        poll_interval: Duration,
        clock: RunClock,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            progress,
            die_timeout_ms: u64::try_from(die_timeout.as_millis()).unwrap_or(u64::MAX),
            target,
            poll_interval,
            clock,
            sink,
            cancel,
        }
    }

    /// Check every agent once, starvation first.
    pub fn scan(&self) -> Scan {
        for (index, progress) in self.progress.iter().enumerate() {
            if self.reached_target(progress) {
                continue;
            }
            let last = progress.last_action_ms();
            let elapsed = self.clock.now_ms().saturating_sub(last);
            if elapsed > self.die_timeout_ms {
                return Scan::Starved {
                    agent: AgentId::new(index),
                    since_last_action_ms: elapsed,
                };
            }
        }

        match self.target {
            Some(target) if self.progress.iter().all(|p| self.reached_target(p)) => {
                Scan::Complete { target }
            }
            _ => Scan::Running,
        }
    }

    /// Whether an agent has reached the target. Always false without one.
    fn reached_target(&self, progress: &P) -> bool {
        self.target.is_some_and(|target| progress.actions() >= target)
    }

    /// Scan on every poll interval until a verdict or external cancellation.
    ///
    /// Returns `None` if the token was cancelled by someone else first.
    pub async fn watch(self) -> Option<RunOutcome> {
        debug!(
            agents = self.progress.len(),
            die_timeout_ms = self.die_timeout_ms,
            target = self.target,
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "liveness monitor started"
        );

        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            match self.scan() {
                Scan::Starved {
                    agent,
                    since_last_action_ms,
                } => {
                    info!(%agent, since_last_action_ms, "agent starved");
                    self.emit(Some(agent), EventKind::Starved { since_last_action_ms });
                    return Some(self.conclude(RunOutcome::Starvation { agent }));
                }
                Scan::Complete { target } => {
                    info!(target, "every agent reached the target");
                    return Some(self.conclude(RunOutcome::Success { target }));
                }
                Scan::Running => {}
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Emit the summary and fire cancellation.
    fn conclude(&self, outcome: RunOutcome) -> RunOutcome {
        self.emit(None, EventKind::RunSummary { outcome });
        self.cancel.cancel();
        outcome
    }

    fn emit(&self, agent: Option<AgentId>, kind: EventKind) {
        let event = SimEvent {
            elapsed_ms: self.clock.now_ms(),
            agent,
            kind,
        };
        self.sink.emit(&event);
    }
}

impl<P> core::fmt::Debug for LivenessMonitor<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("agents", &self.progress.len())
            .field("die_timeout_ms", &self.die_timeout_ms)
            .field("target", &self.target)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::events::MemorySink;
    use crate::progress::{AtomicProgress, LocalProgress};

    fn local_monitor(
        agents: usize,
        target: Option<u64>,
        sink: &Arc<MemorySink>,
        cancel: &CancellationToken,
    ) -> (LivenessMonitor<Rc<LocalProgress>>, Vec<Rc<LocalProgress>>) {
        let progress: Vec<_> = (0..agents).map(|_| Rc::new(LocalProgress::new())).collect();
        let monitor = LivenessMonitor::new(
            progress.clone(),
            Duration::from_millis(1000),
            target,
            Duration::from_millis(10),
            RunClock::start(),
            Arc::clone(sink) as Arc<dyn EventSink>,
            cancel.clone(),
        );
        (monitor, progress)
    }

    #[tokio::test(start_paused = true)]
    async fn starvation_only_strictly_past_timeout() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, _progress) = local_monitor(3, None, &sink, &cancel);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(monitor.scan(), Scan::Running);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(
            monitor.scan(),
            Scan::Starved {
                agent: AgentId::new(0),
                since_last_action_ms: 1001,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recent_action_keeps_agent_alive() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, progress) = local_monitor(2, None, &sink, &cancel);

        tokio::time::advance(Duration::from_millis(900)).await;
        progress.first().unwrap().record_action(900);
        tokio::time::advance(Duration::from_millis(200)).await;

        // Agent 0 acted 200 ms ago; agent 1 never acted and is at 1100 ms.
        assert_eq!(
            monitor.scan(),
            Scan::Starved {
                agent: AgentId::new(1),
                since_last_action_ms: 1100,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completion_requires_every_agent() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, progress) = local_monitor(2, Some(2), &sink, &cancel);

        for cell in &progress {
            cell.record_action(0);
        }
        assert_eq!(monitor.scan(), Scan::Running);

        progress.first().unwrap().record_action(0);
        assert_eq!(monitor.scan(), Scan::Running);

        progress.get(1).unwrap().record_action(0);
        assert_eq!(monitor.scan(), Scan::Complete { target: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn starvation_wins_over_completion() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, progress) = local_monitor(2, Some(1), &sink, &cancel);

        // Agent 0 is done, agent 1 never acted.
        progress.first().unwrap().record_action(0);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(
            monitor.scan(),
            Scan::Starved {
                agent: AgentId::new(1),
                since_last_action_ms: 1500,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn agent_at_target_is_never_starved() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, progress) = local_monitor(2, Some(2), &sink, &cancel);

        let done = progress.first().unwrap();
        done.record_action(0);
        done.record_action(0);
        tokio::time::advance(Duration::from_millis(900)).await;
        progress.get(1).unwrap().record_action(900);

        // Agent 0 is 1900 ms past its last action, agent 1 exactly at the limit.
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(monitor.scan(), Scan::Running);

        progress.get(1).unwrap().record_action(1900);
        assert_eq!(monitor.scan(), Scan::Complete { target: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn finished_agent_idles_past_timeout_while_others_catch_up() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, progress) = local_monitor(2, Some(4), &sink, &cancel);

        let done = progress.first().unwrap();
        for _ in 0..4 {
            done.record_action(0);
        }
        let behind = Rc::clone(progress.get(1).unwrap());
        let catch_up = async move {
            for at_ms in [500, 1000, 1500, 2000] {
                tokio::time::sleep(Duration::from_millis(500)).await;
                behind.record_action(at_ms);
            }
        };

        let (outcome, ()) = tokio::join!(monitor.watch(), catch_up);
        assert_eq!(outcome, Some(RunOutcome::Success { target: 4 }));
        assert!(cancel.is_cancelled());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events.first().unwrap().elapsed_ms >= 2000);
        assert!(
            events
                .iter()
                .all(|e| !matches!(e.kind, EventKind::Starved { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_target_never_completes() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, progress) = local_monitor(1, None, &sink, &cancel);
        for _ in 0..100 {
            progress.first().unwrap().record_action(0);
        }
        assert_eq!(monitor.scan(), Scan::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_declares_starvation_and_cancels() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, _progress) = local_monitor(2, Some(5), &sink, &cancel);

        let outcome = monitor.watch().await;
        assert_eq!(
            outcome,
            Some(RunOutcome::Starvation {
                agent: AgentId::new(0)
            })
        );
        assert!(cancel.is_cancelled());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        let starved = events.first().unwrap();
        assert_eq!(starved.agent, Some(AgentId::new(0)));
        assert!(matches!(starved.kind, EventKind::Starved { .. }));
        // Polled every 10 ms, so detection lands on the first scan past 1000.
        assert_eq!(starved.elapsed_ms, 1010);
        assert_eq!(
            events.get(1).unwrap().kind,
            EventKind::RunSummary {
                outcome: RunOutcome::Starvation {
                    agent: AgentId::new(0)
                }
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn watch_declares_success() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, progress) = local_monitor(2, Some(1), &sink, &cancel);
        for cell in &progress {
            cell.record_action(0);
        }

        assert_eq!(monitor.watch().await, Some(RunOutcome::Success { target: 1 }));
        assert!(cancel.is_cancelled());
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_stops_on_external_cancel() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let (monitor, _progress) = local_monitor(2, None, &sink, &cancel);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        assert_eq!(monitor.watch().await, None);
        assert!(sink.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn atomic_progress_is_read_across_threads() {
        let sink = Arc::new(MemorySink::new());
        let cancel = CancellationToken::new();
        let progress = Arc::new(AtomicProgress::new());
        let monitor = LivenessMonitor::new(
            vec![Arc::clone(&progress)],
            Duration::from_secs(5),
            Some(50),
            Duration::from_millis(1),
            RunClock::start(),
            Arc::clone(&sink) as Arc<dyn EventSink>,
            cancel.clone(),
        );

        let watcher = tokio::spawn(monitor.watch());
        let writer = tokio::spawn(async move {
            for _ in 0..50 {
                progress.record_action(0);
                tokio::task::yield_now().await;
            }
        });

        writer.await.unwrap();
        assert_eq!(
            watcher.await.unwrap(),
            Some(RunOutcome::Success { target: 50 })
        );
    }
}
