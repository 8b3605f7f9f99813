//! Per-iteration event recorder
//!
//! The recorder is a bag of events published by instrumented user code
//! during one iteration: panics the executor recovered and recursion-depth
//! samples. Validators read the bag while evaluating; the executor drops
//! it when the iteration's chaos context is dropped.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A panic recovered by the executor during an iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanicEvent {
    /// Recovered panic payload, rendered to a string.
    pub payload: String,
    /// Step that was executing when the panic fired, if known.
    pub step: Option<String>,
    /// When the panic was recovered.
    pub recovered_at: DateTime<Utc>,
}

/// A recursion-depth sample reported by instrumented user code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecursionSample {
    /// Observed depth.
    pub depth: u32,
}

#[derive(Debug, Default)]
struct RecorderInner {
    panics: Vec<PanicEvent>,
    recursion: Vec<RecursionSample>,
}

/// Shared handle to the iteration's event bag.
///
/// Written by user-code tasks, read by validators; internal mutex.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    inner: Arc<Mutex<RecorderInner>>,
}

impl EventRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a recovered panic.
    pub fn record_panic(&self, payload: impl Into<String>, step: Option<String>) {
        let event = PanicEvent {
            payload: payload.into(),
            step,
            recovered_at: Utc::now(),
        };
        self.inner.lock().panics.push(event);
    }

    /// Record a recursion-depth sample.
    pub fn record_recursion(&self, depth: u32) {
        self.inner.lock().recursion.push(RecursionSample { depth });
    }

    /// Snapshot of the recovered panics so far.
    pub fn panics(&self) -> Vec<PanicEvent> {
        self.inner.lock().panics.clone()
    }

    /// Snapshot of the recursion samples so far.
    pub fn recursion_samples(&self) -> Vec<RecursionSample> {
        self.inner.lock().recursion.clone()
    }

    /// Number of panics recovered this iteration.
    pub fn panic_count(&self) -> usize {
        self.inner.lock().panics.len()
    }

    /// Deepest recursion sample seen this iteration, if any.
    pub fn max_recursion_depth(&self) -> Option<u32> {
        self.inner.lock().recursion.iter().map(|s| s.depth).max()
    }
}
