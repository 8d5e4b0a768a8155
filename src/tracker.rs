//! Outstanding-request tracking for refresh cycles
//!
//! A cycle registers the sources it requests up front. Each resolution removes
//! its source; the resolution that empties the set is told to emit the
//! diagnostic fingerprint. Set mutation and the trigger decision happen under
//! one lock, so the fingerprint fires exactly once per cycle no matter how
//! the completions interleave.

use crate::telemetry::{TelemetrySource, lock};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Identifier of one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(pub u64);

/// Result of reporting a resolved source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Other sources of the cycle are still in flight
    Pending { remaining: usize },
    /// Last source resolved; caller emits the fingerprint
    CycleComplete,
    /// Source was not expected by the active cycle (straggler or duplicate)
    Ignored,
}

#[derive(Debug)]
enum TrackerState {
    Idle,
    InFlight {
        cycle: CycleId,
        sources: BTreeSet<TelemetrySource>,
    },
}

#[derive(Debug)]
struct Inner {
    state: TrackerState,
    next_cycle: u64,
}

/// In-flight set of the current refresh cycle
#[derive(Debug)]
pub struct OutstandingRequests {
    inner: Mutex<Inner>,
}

impl Default for OutstandingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl OutstandingRequests {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: TrackerState::Idle,
                next_cycle: 1,
            }),
        }
    }

    /// Open a cycle for `sources`. Returns `None` while a previous cycle is
    /// still waiting for resolutions, or when there is nothing to request.
    pub fn begin_cycle<I>(&self, sources: I) -> Option<CycleId>
    where
        I: IntoIterator<Item = TelemetrySource>,
    {
        let mut inner = lock(&self.inner);
        if matches!(inner.state, TrackerState::InFlight { .. }) {
            return None;
        }
        let sources: BTreeSet<TelemetrySource> = sources.into_iter().collect();
        if sources.is_empty() {
            return None;
        }
        let cycle = CycleId(inner.next_cycle);
        inner.next_cycle += 1;
        inner.state = TrackerState::InFlight { cycle, sources };
        Some(cycle)
    }

    /// Report that `source` of `cycle` resolved
    pub fn complete(&self, cycle: CycleId, source: TelemetrySource) -> Completion {
        let mut inner = lock(&self.inner);
        let TrackerState::InFlight {
            cycle: active,
            sources,
        } = &mut inner.state
        else {
            return Completion::Ignored;
        };
        if *active != cycle || !sources.remove(&source) {
            return Completion::Ignored;
        }
        if sources.is_empty() {
            inner.state = TrackerState::Idle;
            Completion::CycleComplete
        } else {
            Completion::Pending {
                remaining: sources.len(),
            }
        }
    }

    /// Sources still awaited by the active cycle
    pub fn in_flight(&self) -> Vec<TelemetrySource> {
        let inner = lock(&self.inner);
        match &inner.state {
            TrackerState::Idle => Vec::new(),
            TrackerState::InFlight { sources, .. } => sources.iter().copied().collect(),
        }
    }

    pub fn active_cycle(&self) -> Option<CycleId> {
        let inner = lock(&self.inner);
        match &inner.state {
            TrackerState::Idle => None,
            TrackerState::InFlight { cycle, .. } => Some(*cycle),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active_cycle().is_none()
    }
}
