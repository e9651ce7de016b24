//! Frame dispatcher: one evaluation task per binding.
//!
//! Frames are pushed into a [`FrameSlot`]; a dedicated task takes the most
//! recent frame, binds it, evaluates it and publishes a report. While the
//! task is busy new frames overwrite each other in the slot, so under load
//! the skill always works on the freshest frame and nothing queues up.
//! Reports follow the same rule: when the consumer falls behind and the
//! report buffer is full, the new report is dropped and counted rather than
//! holding up the next evaluation.
//!
//! ```text
//!  source ──push──► [ slot (1) ] ──next──► evaluate ──► report stream
//!                    overwrite             single flight
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::gate::SingleFlightGate;
use super::slot::{FrameSink, FrameSlot};
use crate::Result;
use crate::skill::{Skill, SkillBinding, Timings, bind_and_evaluate};

/// Default number of reports buffered between the dispatcher and its
/// consumer.
pub const DEFAULT_REPORT_BUFFER: usize = 16;

/// Outcome of one evaluated frame.
#[derive(Debug, Clone)]
pub struct DispatchReport<T> {
    pub sequence: u64,
    pub timestamp: Duration,
    pub timings: Timings,
    pub summary: T,
}

/// Counters for a running dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames accepted into the slot.
    pub delivered: u64,
    /// Frames overwritten before evaluation.
    pub replaced: u64,
    /// Frames evaluated successfully.
    pub evaluated: u64,
    /// Frames whose bind, evaluate or summary failed.
    pub failed: u64,
    /// Reports dropped because the report buffer was full.
    pub unreported: u64,
}

#[derive(Debug, Default)]
struct Counters {
    evaluated: AtomicU64,
    failed: AtomicU64,
    unreported: AtomicU64,
}

/// Runs a skill over a stream of frames, one at a time.
pub struct FrameDispatcher {
    slot: Arc<FrameSlot>,
    gate: Arc<SingleFlightGate>,
    counters: Arc<Counters>,
    task: JoinHandle<SkillBinding>,
}

impl FrameDispatcher {
    /// Start the evaluation task.
    ///
    /// `summarize` turns an evaluated binding into the report payload. The
    /// binding is owned by the task until [`shutdown`](Self::shutdown)
    /// hands it back.
    ///
    /// # Panics
    ///
    /// Requires a tokio runtime context.
    pub fn spawn<T, F>(
        skill: Arc<dyn Skill>,
        binding: SkillBinding,
        summarize: F,
        buffer: usize,
    ) -> (Self, ReceiverStream<Result<DispatchReport<T>>>)
    where
        T: Send + 'static,
        F: Fn(&SkillBinding) -> Result<T> + Send + 'static,
    {
        let slot = FrameSlot::new();
        let gate = Arc::new(SingleFlightGate::new());
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let task = tokio::spawn(run(
            skill,
            binding,
            summarize,
            Arc::clone(&slot),
            Arc::clone(&gate),
            Arc::clone(&counters),
            tx,
        ));

        let dispatcher = Self {
            slot,
            gate,
            counters,
            task,
        };
        (dispatcher, ReceiverStream::new(rx))
    }

    /// Producer handle for frame sources.
    pub fn sink(&self) -> FrameSink {
        self.slot.sink()
    }

    /// Whether an evaluation is in flight.
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.slot.delivered(),
            replaced: self.slot.replaced(),
            evaluated: self.counters.evaluated.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            unreported: self.counters.unreported.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting frames, let an in-flight evaluation finish, and
    /// return the binding.
    ///
    /// A frame still parked in the slot is dropped unevaluated.
    pub async fn shutdown(self) -> Result<SkillBinding> {
        self.slot.close();
        Ok(self.task.await?)
    }
}

async fn run<T, F>(
    skill: Arc<dyn Skill>,
    mut binding: SkillBinding,
    summarize: F,
    slot: Arc<FrameSlot>,
    gate: Arc<SingleFlightGate>,
    counters: Arc<Counters>,
    tx: mpsc::Sender<Result<DispatchReport<T>>>,
) -> SkillBinding
where
    T: Send + 'static,
    F: Fn(&SkillBinding) -> Result<T> + Send + 'static,
{
    let mut reports = Some(tx);

    while let Some(frame) = slot.next().await {
        let flight = gate.enter();

        let sequence = frame.sequence();
        let timestamp = frame.timestamp();
        let outcome = match bind_and_evaluate(skill.as_ref(), &mut binding, &frame).await {
            Ok(timings) => summarize(&binding).map(|summary| DispatchReport {
                sequence,
                timestamp,
                timings,
                summary,
            }),
            Err(e) => Err(e),
        };
        drop(frame);
        drop(flight);

        match &outcome {
            Ok(_) => {
                counters.evaluated.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    skill = %skill.descriptor().name,
                    sequence,
                    error = %e,
                    "frame evaluation failed"
                );
            }
        }

        if let Some(tx) = &reports {
            match tx.try_send(outcome) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    counters.unreported.fetch_add(1, Ordering::Relaxed);
                    debug!(sequence, "report buffer full, dropping report");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("report receiver dropped, evaluating without reporting");
                    reports = None;
                }
            }
        }
    }

    debug!(
        skill = %skill.descriptor().name,
        evaluations = binding.evaluations(),
        "dispatcher stopped"
    );
    binding
}
