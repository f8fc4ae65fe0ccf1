//! Shared type definitions for the Symposium ring simulation.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries: identifiers, the agent life-cycle phases, the event stream,
//! and the run outcome.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for agent and resource ring positions
//! - [`enums`] -- Agent life-cycle phases and scheduling models
//! - [`structs`] -- Events, run outcomes, and per-agent exits

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AgentPhase, Scheduling};
pub use ids::{AgentId, ResourceId};
pub use structs::{AgentExit, EventKind, RunOutcome, SimEvent};
