//! Resource ring, agent life-cycle, and run coordination for the Symposium
//! simulation.
//!
//! `N` agents sit around a ring of `N` binary resources. Each agent needs
//! both of its neighbouring resources to act, rests, and tries again. A
//! liveness monitor watches every agent's last action and ends the run
//! either when every agent reached a target count or when one of them went
//! longer than the die timeout without acting.
//!
//! # Modules
//!
//! - [`agent`] -- The per-agent life-cycle with bounded, cancellable waits.
//! - [`clock`] -- Monotonic run clock in milliseconds since start.
//! - [`config`] -- Configuration loading from `symposium-config.yaml` into
//!   strongly-typed structs.
//! - [`coordinator`] -- Builds the ring and runs it under the preemptive
//!   or cooperative scheduling model.
//! - [`events`] -- [`EventSink`] trait and the console, tracing, memory,
//!   and fan-out sinks.
//! - [`monitor`] -- The [`LivenessMonitor`] that declares the verdict.
//! - [`progress`] -- Per-agent last-action timestamp and action count.
//! - [`resource`] -- Exclusive resources and the ring that owns them.
//!
//! [`EventSink`]: events::EventSink
//! [`LivenessMonitor`]: monitor::LivenessMonitor

pub mod agent;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod monitor;
pub mod progress;
pub mod resource;

pub use config::{ConfigError, SimulationConfig};
pub use coordinator::{Coordinator, CoordinatorError, RunReport};
