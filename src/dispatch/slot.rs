//! Single-slot, overwrite-on-full frame channel.
//!
//! Producers never block: a delivery while a frame is already parked
//! replaces it, dropping the older frame (and releasing its lease) on the
//! spot. The consumer always sees the most recent frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::telemetry;
use crate::types::Frame;

/// What happened to a delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Parked in an empty slot.
    Accepted,
    /// Parked, replacing a frame nobody had picked up yet.
    Replaced,
    /// The slot is closed; the frame was dropped.
    Closed,
}

impl Delivery {
    fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Replaced => "replaced",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    pending: Option<Frame>,
    closed: bool,
}

/// Holds at most one pending frame.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    notify: Notify,
    delivered: AtomicU64,
    replaced: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A producer handle onto this slot.
    pub fn sink(self: &Arc<Self>) -> FrameSink {
        FrameSink {
            slot: Arc::clone(self),
        }
    }

    /// Park `frame`, replacing any frame still waiting.
    pub fn push(&self, frame: Frame) -> Delivery {
        let (delivery, displaced) = {
            let mut state = self.lock();
            if state.closed {
                (Delivery::Closed, Some(frame))
            } else {
                let displaced = state.pending.replace(frame);
                let delivery = if displaced.is_some() {
                    Delivery::Replaced
                } else {
                    Delivery::Accepted
                };
                (delivery, displaced)
            }
        };
        // Dropped outside the lock so lease callbacks never run under it.
        drop(displaced);

        match delivery {
            Delivery::Closed => {}
            Delivery::Replaced => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.replaced.fetch_add(1, Ordering::Relaxed);
                self.notify.notify_one();
            }
            Delivery::Accepted => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.notify.notify_one();
            }
        }
        metrics::counter!(telemetry::FRAMES_TOTAL, "outcome" => delivery.label()).increment(1);
        delivery
    }

    /// Wait for the next frame. Returns `None` once the slot is closed.
    pub async fn next(&self) -> Option<Frame> {
        loop {
            {
                let mut state = self.lock();
                if let Some(frame) = state.pending.take() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Take the pending frame without waiting.
    pub fn try_take(&self) -> Option<Frame> {
        self.lock().pending.take()
    }

    /// Close the slot. The pending frame, if any, is dropped and waiting
    /// consumers wake up with `None`.
    pub fn close(&self) {
        let displaced = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.take()
        };
        drop(displaced);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Frames accepted into the slot, including ones later replaced.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames dropped because a newer one replaced them.
    pub fn replaced(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    // The state is a plain option plus a flag; a panic elsewhere cannot
    // leave it half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer side of a [`FrameSlot`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FrameSink {
    slot: Arc<FrameSlot>,
}

impl FrameSink {
    pub fn push(&self, frame: Frame) -> Delivery {
        self.slot.push(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}
