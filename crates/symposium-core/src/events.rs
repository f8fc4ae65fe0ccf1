//! Event sinks: where the run's status stream goes.
//!
//! Agents and the monitor emit [`SimEvent`]s from many tasks at once. A
//! sink serializes them so each event is written whole, as one line, in
//! emission order. The core never formats output itself; it hands events
//! to whatever [`EventSink`] the caller provided.
//!
//! - [`ConsoleSink`] -- plain text lines on any writer (stdout by default)
//! - [`TracingSink`] -- structured `tracing` events
//! - [`MemorySink`] -- in-memory capture for tests and library callers
//! - [`FanoutSink`] -- forwards to several sinks

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use symposium_types::{EventKind, RunOutcome, SimEvent};
use tracing::{info, warn};

/// A synchronized consumer of simulation events.
pub trait EventSink: Send + Sync {
    /// Record one event. Must not block for long: it is called while
    /// agents hold resources.
    fn emit(&self, event: &SimEvent);
}

/// Render an event as a single console line.
///
/// The wording follows the classic dining-table log, so `ResourceTaken`
/// reads as taking a fork and `Acting` as eating.
pub fn console_line(event: &SimEvent) -> String {
    let ms = event.elapsed_ms;
    let who = event
        .agent
        .map_or_else(|| "-".to_owned(), |agent| agent.to_string());
    match &event.kind {
        EventKind::RunStarted { .. } => "Simulation starting...".to_owned(),
        EventKind::ResourceTaken { .. } => format!("{ms}ms: {who} has taken a fork"),
        EventKind::Acting { action_count } => {
            format!("{ms}ms: {who} is eating (meal #{action_count})")
        }
        EventKind::Resting => format!("{ms}ms: {who} is sleeping"),
        EventKind::Thinking => format!("{ms}ms: {who} is thinking"),
        EventKind::Starved { .. } => format!("{ms}ms: {who} died"),
        EventKind::RunSummary {
            outcome: RunOutcome::Success { target },
        } => format!("{ms}ms: All philosophers completed {target} meals."),
        EventKind::RunSummary {
            outcome: RunOutcome::Starvation { agent },
        } => format!("{ms}ms: Simulation failed, {agent} starved."),
        EventKind::RunEnded => "Simulation ended.".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Writes one plain-text line per event to a shared writer.
#[derive(Debug)]
pub struct ConsoleSink<W> {
    /// The writer, locked per line.
    out: Mutex<W>,
}

impl ConsoleSink<std::io::Stdout> {
    /// Console sink on the process's standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    /// Wrap an arbitrary writer.
    pub const fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn emit(&self, event: &SimEvent) {
        let line = console_line(event);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(error = %e, "failed to write event line");
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Emits each event as a structured `tracing` event at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &SimEvent) {
        match event.to_json() {
            Ok(json) => info!(
                target: "symposium::events",
                elapsed_ms = event.elapsed_ms,
                agent = event.agent.map(|a| a.index()),
                event = %json,
                "{}",
                console_line(event)
            ),
            Err(e) => warn!(error = %e, "failed to serialize event"),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Collects events in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Captured events.
    events: Mutex<Vec<SimEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of every event captured so far.
    pub fn events(&self) -> Vec<SimEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of events captured so far.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been captured yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &SimEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Forwards every event to each wrapped sink in order.
#[derive(Default)]
pub struct FanoutSink {
    /// Downstream sinks.
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Create a fan-out over the given sinks.
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl core::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &SimEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
