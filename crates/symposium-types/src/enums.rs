//! Enumeration types for the Symposium simulation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Agent life-cycle
// ---------------------------------------------------------------------------

/// A state in an agent's life-cycle.
///
/// The live states form a loop:
///
/// ```text
/// Thinking -> AcquiringFirst -> AcquiringSecond -> Acting -> Releasing -> Resting -> Thinking
/// ```
///
/// `Dead` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    /// Between cycles, about to request resources.
    Thinking,
    /// Waiting for the lower-numbered resource of the pair.
    AcquiringFirst,
    /// Holding the first resource, waiting for the second.
    AcquiringSecond,
    /// Holding both resources for the act duration.
    Acting,
    /// Handing both resources back.
    Releasing,
    /// Resting between cycles, holding nothing.
    Resting,
    /// Ran out of time while acquiring a resource.
    Dead,
    /// Observed the shared shutdown signal.
    Cancelled,
}

impl core::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Thinking => "thinking",
            Self::AcquiringFirst => "acquiring_first",
            Self::AcquiringSecond => "acquiring_second",
            Self::Acting => "acting",
            Self::Releasing => "releasing",
            Self::Resting => "resting",
            Self::Dead => "dead",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

/// How agents and the liveness monitor are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduling {
    /// Every agent and the monitor run as independent tasks on a
    /// multi-thread runtime. Shared state goes through atomics.
    #[default]
    Preemptive,
    /// Every agent and the monitor run as local tasks on a single thread,
    /// yielding at each suspension point.
    Cooperative,
}

impl Scheduling {
    /// Parse a scheduling model name (case-insensitive).
    ///
    /// Accepts `preemptive` / `threaded` and `cooperative` / `coroutine`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "preemptive" | "threaded" => Some(Self::Preemptive),
            "cooperative" | "coroutine" => Some(Self::Cooperative),
            _ => None,
        }
    }
}

impl core::fmt::Display for Scheduling {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Preemptive => f.write_str("preemptive"),
            Self::Cooperative => f.write_str("cooperative"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_names() {
        assert_eq!(Scheduling::from_name("Preemptive"), Some(Scheduling::Preemptive));
        assert_eq!(Scheduling::from_name(" coroutine "), Some(Scheduling::Cooperative));
        assert_eq!(Scheduling::from_name("green"), None);
    }

    #[test]
    fn scheduling_yaml_names_are_snake_case() {
        let json = serde_json::to_string(&Scheduling::Cooperative).unwrap_or_default();
        assert_eq!(json, "\"cooperative\"");
    }
}
