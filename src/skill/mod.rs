//! Skills: descriptors, bindings, evaluators and result readers.

pub mod binding;
pub mod concept_tagger;
pub mod face_sentiment;
pub mod image_scanning;
pub mod object_detector;
pub mod registry;
pub mod skeletal_detector;
pub mod traits;

pub use binding::{BindingState, SkillBinding};
pub use registry::SkillRegistry;
pub use traits::{Skill, SkillFactory};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::instrument;

use crate::device::{DeviceRegistry, ExecutionDevice};
use crate::model::ModelLoader;
use crate::telemetry;
use crate::types::Frame;
use crate::{HuginnError, Result};

/// Pick a device for `factory`.
///
/// `preferred` indexes the factory's supported devices; `None` takes the
/// first. An empty supported list is `NoDeviceAvailable`.
pub fn select_device(
    factory: &dyn SkillFactory,
    registry: &DeviceRegistry,
    preferred: Option<usize>,
) -> Result<ExecutionDevice> {
    let devices = factory.supported_devices(registry)?;
    if devices.is_empty() {
        return Err(HuginnError::NoDeviceAvailable(
            factory.descriptor().name.clone(),
        ));
    }
    let index = preferred.unwrap_or(0);
    devices.get(index).cloned().ok_or_else(|| {
        HuginnError::InvalidInput(format!(
            "device index {index} out of range ({} supported devices)",
            devices.len()
        ))
    })
}

/// Wall-clock time spent in each step of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timings {
    pub bind: Duration,
    pub evaluate: Duration,
}

/// Bind `frame` into `binding` and evaluate it, recording telemetry.
#[instrument(skip_all, fields(skill = %skill.descriptor().name, sequence = frame.sequence()))]
pub async fn bind_and_evaluate(
    skill: &dyn Skill,
    binding: &mut SkillBinding,
    frame: &Frame,
) -> Result<Timings> {
    let name = skill.descriptor().name.clone();

    let started = Instant::now();
    if let Err(e) = binding.set_input_image(frame) {
        metrics::counter!(telemetry::EVALUATIONS_TOTAL,
            "skill" => name,
            "status" => "error",
        )
        .increment(1);
        return Err(e);
    }
    let bind = started.elapsed();
    metrics::histogram!(telemetry::BIND_DURATION_SECONDS, "skill" => name.clone())
        .record(bind.as_secs_f64());

    let started = Instant::now();
    let result = skill.evaluate(binding).await;
    let evaluate = started.elapsed();

    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(telemetry::EVALUATIONS_TOTAL,
        "skill" => name.clone(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::EVALUATE_DURATION_SECONDS, "skill" => name)
        .record(evaluate.as_secs_f64());

    result.map(|()| Timings { bind, evaluate })
}

/// Fail with `UnsupportedDevice` unless `factory` can bind `device`.
pub(crate) fn ensure_can_bind(factory: &dyn SkillFactory, device: &ExecutionDevice) -> Result<()> {
    if factory.can_bind(device) {
        Ok(())
    } else {
        Err(HuginnError::UnsupportedDevice {
            skill: factory.descriptor().name.clone(),
            device: device.to_string(),
        })
    }
}

/// Load a model on the blocking pool.
pub(crate) async fn load_model<M>(
    loader: &Arc<dyn ModelLoader<M>>,
    device: &ExecutionDevice,
) -> Result<Arc<M>>
where
    M: ?Sized + Send + Sync + 'static,
{
    let loader = Arc::clone(loader);
    let device = device.clone();
    run_blocking(move || loader.load(&device)).await
}

/// Run blocking model work off the async runtime.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}
