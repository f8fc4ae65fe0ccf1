//! Run orchestration: build the ring, start every unit, collect the result.
//!
//! The [`Coordinator`] owns the resource topology. A run creates one
//! progress record per agent, baselines it to the run clock, spawns the
//! agents and the liveness monitor, and then waits for every one of them
//! to exit before it reports. Two scheduling models share that flow:
//!
//! - [`Coordinator::run_preemptive`] spawns each unit with `tokio::spawn`,
//!   so on a multi-thread runtime agents run in parallel. Progress is kept
//!   in [`AtomicProgress`].
//! - [`Coordinator::run_cooperative`] spawns each unit with `spawn_local`
//!   on a [`LocalSet`]. Units interleave only at their await points and
//!   progress is kept in [`LocalProgress`].
//!
//! Every unit gets a child of the caller's cancellation token, so the
//! monitor's verdict stops the run without touching the caller's token,
//! while cancelling the caller's token stops the run early.

use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use symposium_types::{AgentExit, AgentId, EventKind, RunOutcome, Scheduling, SimEvent};
use tokio::task::{JoinHandle, LocalSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{Agent, AgentTiming};
use crate::clock::RunClock;
use crate::config::{MonitorConfig, RingConfig};
use crate::events::EventSink;
use crate::monitor::LivenessMonitor;
use crate::progress::{AtomicProgress, LocalProgress, ProgressCell};
use crate::resource::ResourcePool;

/// Errors that end a run without a verdict.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The ring has no agents.
    #[error("ring must contain at least one agent")]
    EmptyRing,

    /// The ring or monitor settings are unusable.
    #[error("invalid run configuration: {reason}")]
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },

    /// The caller cancelled the run before the monitor reached a verdict.
    #[error("run cancelled before a verdict was reached")]
    Cancelled,

    /// An agent or the monitor panicked or was aborted.
    #[error("simulation task failed: {reason}")]
    TaskFailed {
        /// The join error reported by the runtime.
        reason: String,
    },
}

/// Everything known about a run once every unit has exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The monitor's verdict.
    pub outcome: RunOutcome,

    /// The scheduling model the run used.
    pub scheduling: Scheduling,

    /// Wall-clock time the run started.
    pub started_at: DateTime<Utc>,

    /// Run duration in milliseconds, up to the last unit exiting.
    pub elapsed_ms: u64,

    /// Final action count of each agent, indexed by agent id.
    pub action_counts: Vec<u64>,

    /// How each agent exited, indexed by agent id.
    pub agent_exits: Vec<AgentExit>,
}

impl RunReport {
    /// Sum of every agent's actions.
    pub fn total_actions(&self) -> u64 {
        self.action_counts
            .iter()
            .fold(0_u64, |acc, n| acc.saturating_add(*n))
    }

    /// The smallest action count in the ring.
    pub fn min_actions(&self) -> u64 {
        self.action_counts.iter().copied().min().unwrap_or(0)
    }
}

/// Units built for one run, not yet spawned.
struct Launch<P> {
    agents: Vec<Agent<P>>,
    monitor: LivenessMonitor<P>,
    progress: Vec<P>,
}

/// What the spawned units returned.
struct Joined {
    verdict: Option<RunOutcome>,
    exits: Vec<AgentExit>,
    failure: Option<String>,
}

/// Builds the ring and runs it under either scheduling model.
pub struct Coordinator {
    /// Ring size and durations.
    ring: RingConfig,

    /// Monitor settings.
    monitor: MonitorConfig,

    /// The ring's resources, shared by every run of this coordinator.
    pool: ResourcePool,

    /// Event stream.
    sink: Arc<dyn EventSink>,
}

impl Coordinator {
    /// Validate the settings and build the resource ring.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::EmptyRing`] for zero agents and
    /// [`CoordinatorError::InvalidConfig`] for any other invalid setting.
    pub fn new(
        ring: RingConfig,
        monitor: MonitorConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, CoordinatorError> {
        if ring.agent_count == 0 {
            return Err(CoordinatorError::EmptyRing);
        }
        ring.validate()
            .and_then(|()| monitor.validate())
            .map_err(|e| CoordinatorError::InvalidConfig {
                reason: e.to_string(),
            })?;

        let pool = ResourcePool::ring(ring.agent_count);
        Ok(Self {
            ring,
            monitor,
            pool,
            sink,
        })
    }

    /// The ring's resources, for inspection after a run.
    pub const fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Ring settings in use.
    pub const fn ring(&self) -> &RingConfig {
        &self.ring
    }

    /// Run under the given scheduling model.
    ///
    /// # Errors
    ///
    /// See [`Coordinator::run_preemptive`].
    pub async fn run(
        &self,
        scheduling: Scheduling,
        cancel: &CancellationToken,
    ) -> Result<RunReport, CoordinatorError> {
        match scheduling {
            Scheduling::Preemptive => self.run_preemptive(cancel).await,
            Scheduling::Cooperative => self.run_cooperative(cancel).await,
        }
    }

    /// Run every unit as its own tokio task.
    ///
    /// Must be called inside a tokio runtime; a multi-thread runtime gives
    /// true parallelism.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Cancelled`] if `cancel` fired before a
    /// verdict, or [`CoordinatorError::TaskFailed`] if a unit panicked.
    pub async fn run_preemptive(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RunReport, CoordinatorError> {
        let token = cancel.child_token();
        let started_at = Utc::now();
        let clock = RunClock::start();
        let progress: Vec<_> = (0..self.ring.agent_count)
            .map(|_| Arc::new(AtomicProgress::new()))
            .collect();
        let Launch {
            agents,
            monitor,
            progress,
        } = self.prepare(progress, clock, &token)?;

        self.start(Scheduling::Preemptive, clock);
        let agents = agents
            .into_iter()
            .map(|agent| tokio::spawn(agent.run()))
            .collect();
        let monitor = tokio::spawn(monitor.watch());

        let joined = join_all(monitor, agents, &token).await;
        self.finish(
            Scheduling::Preemptive,
            started_at,
            clock,
            &progress,
            joined,
        )
    }

    /// Run every unit as a local task on one thread.
    ///
    /// The returned future is `!Send`; drive it with `block_on` on a
    /// current-thread runtime or await it from a non-spawned context.
    ///
    /// # Errors
    ///
    /// Same as [`Coordinator::run_preemptive`].
    pub async fn run_cooperative(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RunReport, CoordinatorError> {
        let token = cancel.child_token();
        let started_at = Utc::now();
        let clock = RunClock::start();
        let progress: Vec<_> = (0..self.ring.agent_count)
            .map(|_| Rc::new(LocalProgress::new()))
            .collect();
        let Launch {
            agents,
            monitor,
            progress,
        } = self.prepare(progress, clock, &token)?;

        let local = LocalSet::new();
        let joined = local
            .run_until(async {
                self.start(Scheduling::Cooperative, clock);
                let agents = agents
                    .into_iter()
                    .map(|agent| tokio::task::spawn_local(agent.run()))
                    .collect();
                let monitor = tokio::task::spawn_local(monitor.watch());
                join_all(monitor, agents, &token).await
            })
            .await;

        self.finish(
            Scheduling::Cooperative,
            started_at,
            clock,
            &progress,
            joined,
        )
    }

    /// Build agents and the monitor around the given progress records.
    fn prepare<P: ProgressCell + Clone>(
        &self,
        progress: Vec<P>,
        clock: RunClock,
        token: &CancellationToken,
    ) -> Result<Launch<P>, CoordinatorError> {
        let baseline = clock.now_ms();
        let timing = AgentTiming::from_ring(&self.ring);

        let mut agents = Vec::with_capacity(progress.len());
        for (index, cell) in progress.iter().enumerate() {
            cell.reset(baseline);
            let id = AgentId::new(index);
            let resources =
                self.pool
                    .ordered_pair_for(id)
                    .ok_or_else(|| CoordinatorError::InvalidConfig {
                        reason: format!("agent {id} has no resources in the ring"),
                    })?;
            agents.push(Agent::new(
                id,
                resources,
                cell.clone(),
                timing,
                clock,
                Arc::clone(&self.sink),
                token.clone(),
            ));
        }

        let monitor = LivenessMonitor::new(
            progress.clone(),
            self.ring.die_timeout(),
            self.ring.target_action_count,
            self.monitor.poll_interval(),
            clock,
            Arc::clone(&self.sink),
            token.clone(),
        );

        Ok(Launch {
            agents,
            monitor,
            progress,
        })
    }

    fn start(&self, scheduling: Scheduling, clock: RunClock) {
        info!(
            %scheduling,
            agents = self.ring.agent_count,
            die_timeout_ms = self.ring.die_timeout_ms,
            act_duration_ms = self.ring.act_duration_ms,
            rest_duration_ms = self.ring.rest_duration_ms,
            target = self.ring.target_action_count,
            "run starting"
        );
        self.sink.emit(&SimEvent::for_run(
            clock.now_ms(),
            EventKind::RunStarted {
                agent_count: self.ring.agent_count,
            },
        ));
    }

    fn finish<P: ProgressCell>(
        &self,
        scheduling: Scheduling,
        started_at: DateTime<Utc>,
        clock: RunClock,
        progress: &[P],
        joined: Joined,
    ) -> Result<RunReport, CoordinatorError> {
        let elapsed_ms = clock.now_ms();
        self.sink
            .emit(&SimEvent::for_run(elapsed_ms, EventKind::RunEnded));

        if let Some(reason) = joined.failure {
            warn!(%reason, "run aborted by a failed task");
            return Err(CoordinatorError::TaskFailed { reason });
        }

        let Some(outcome) = joined.verdict else {
            info!(elapsed_ms, "run cancelled");
            return Err(CoordinatorError::Cancelled);
        };

        let report = RunReport {
            outcome,
            scheduling,
            started_at,
            elapsed_ms,
            action_counts: progress.iter().map(ProgressCell::actions).collect(),
            agent_exits: joined.exits,
        };
        info!(
            %outcome,
            elapsed_ms,
            total_actions = report.total_actions(),
            min_actions = report.min_actions(),
            "run finished"
        );
        Ok(report)
    }
}

impl core::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Coordinator")
            .field("ring", &self.ring)
            .field("monitor", &self.monitor)
            .field("resources", &self.pool.len())
            .finish_non_exhaustive()
    }
}

/// Wait for the monitor, then for every agent.
///
/// The monitor always finishes first or together with cancellation, and
/// every agent exits once the token has fired. If the monitor itself
/// failed, the token is fired here so the agents still stop.
async fn join_all(
    monitor: JoinHandle<Option<RunOutcome>>,
    agents: Vec<JoinHandle<AgentExit>>,
    token: &CancellationToken,
) -> Joined {
    let mut failure = None;
    let verdict = match monitor.await {
        Ok(verdict) => verdict,
        Err(e) => {
            token.cancel();
            failure = Some(format!("liveness monitor: {e}"));
            None
        }
    };

    let mut exits = Vec::with_capacity(agents.len());
    for (index, handle) in agents.into_iter().enumerate() {
        match handle.await {
            Ok(exit) => exits.push(exit),
            Err(e) => {
                failure.get_or_insert_with(|| format!("agent {index}: {e}"));
                exits.push(AgentExit::Cancelled);
            }
        }
    }

    Joined {
        verdict,
        exits,
        failure,
    }
}
