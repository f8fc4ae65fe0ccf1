//! Event and outcome structs shared between the core and the engine.

use serde::{Deserialize, Serialize};

use crate::enums::AgentPhase;
use crate::ids::{AgentId, ResourceId};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A single status event emitted during a run.
///
/// Events are ordered by emission; `elapsed_ms` is measured from the run
/// epoch, not from process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
    /// The agent the event is about, if any.
    pub agent: Option<AgentId>,
    /// What happened.
    pub kind: EventKind,
}

impl SimEvent {
    /// Create an event about a specific agent.
    pub const fn for_agent(elapsed_ms: u64, agent: AgentId, kind: EventKind) -> Self {
        Self {
            elapsed_ms,
            agent: Some(agent),
            kind,
        }
    }

    /// Create a run-level event with no agent attached.
    pub const fn for_run(elapsed_ms: u64, kind: EventKind) -> Self {
        Self {
            elapsed_ms,
            agent: None,
            kind,
        }
    }

    /// Serialize the event as a single JSON line.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error (never expected for this type).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The kind of a [`SimEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The run is about to start its agents and monitor.
    RunStarted {
        /// Number of agents in the ring.
        agent_count: usize,
    },
    /// An agent acquired one of its two resources.
    ResourceTaken {
        /// The resource that was acquired.
        resource: ResourceId,
    },
    /// An agent holds both resources and started acting.
    Acting {
        /// The agent's completed-action count including this one.
        action_count: u64,
    },
    /// An agent released its resources and is resting.
    Resting,
    /// An agent finished resting.
    Thinking,
    /// The liveness monitor declared an agent starved.
    Starved {
        /// Milliseconds since the agent's last action at detection time.
        since_last_action_ms: u64,
    },
    /// The run reached a verdict.
    RunSummary {
        /// The verdict.
        outcome: RunOutcome,
    },
    /// Every agent and the monitor have exited.
    RunEnded,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// The terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every agent reached the target action count.
    Success {
        /// The target every agent reached.
        target: u64,
    },
    /// An agent went longer than the die timeout without acting.
    Starvation {
        /// The first agent found starved.
        agent: AgentId,
    },
}

impl RunOutcome {
    /// Whether the run ended in success.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The starved agent, if the run ended in starvation.
    pub const fn starved_agent(self) -> Option<AgentId> {
        match self {
            Self::Starvation { agent } => Some(agent),
            Self::Success { .. } => None,
        }
    }
}

impl core::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Success { target } => write!(f, "success (every agent reached {target})"),
            Self::Starvation { agent } => write!(f, "starvation (agent {agent})"),
        }
    }
}

/// How a single agent's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "exit", rename_all = "snake_case")]
pub enum AgentExit {
    /// The agent's deadline ran out while it was acquiring resources.
    Dead {
        /// The phase the agent was in when the deadline ran out.
        phase: AgentPhase,
    },
    /// The agent observed the shutdown signal and released everything.
    Cancelled,
}
