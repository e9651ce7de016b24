//! Single-flight gate: at most one evaluation in flight.

use std::sync::atomic::{AtomicBool, Ordering};

/// Idle/busy flag flipped with compare-and-set.
#[derive(Debug, Default)]
pub struct SingleFlightGate {
    busy: AtomicBool,
}

impl SingleFlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move idle -> busy. Returns `None` if already busy.
    ///
    /// The gate returns to idle when the guard drops, including on early
    /// return or panic.
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    /// Mark the gate busy for the life of the guard.
    ///
    /// For an owner that runs evaluations strictly one after another, such
    /// as the dispatcher task; the gate is then a busy flag for observers
    /// rather than a lock.
    pub fn enter(&self) -> GateGuard<'_> {
        let was_busy = self.busy.swap(true, Ordering::AcqRel);
        debug_assert!(!was_busy, "single-flight gate entered while busy");
        GateGuard { gate: self }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the gate busy while alive.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a SingleFlightGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}
