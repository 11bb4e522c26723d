//! Shared test probes.
//!
//! Provides:
//! - [`Recorder`]: an order-preserving log of observed values
//! - [`CallCounter`]: an atomic invocation counter
//!
//! Use these in tests instead of creating ad-hoc shared-state cells.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

/// An order-preserving log of observed values, cloneable into callbacks.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<Value>>>,
}

impl Recorder {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one observation.
    pub fn record(&self, value: impl Into<Value>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value.into());
    }

    /// All observations so far, in recording order.
    pub fn entries(&self) -> Vec<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain and return all observations.
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// An atomic invocation counter, cloneable into callbacks and targets.
#[derive(Clone, Debug, Default)]
pub struct CallCounter {
    count: Arc<AtomicU32>,
}

impl CallCounter {
    /// A counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter.
    pub fn bump(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of bumps so far.
    pub fn calls(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}
