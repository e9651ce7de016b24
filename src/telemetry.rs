//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `skill` — skill name (e.g. "FaceSentimentAnalyzer")
//! - `status` — outcome: "ok" or "error"
//! - `outcome` — frame delivery outcome: "accepted", "replaced" or "closed"
//! - `source` — frame source name

/// Total frames delivered into a dispatcher slot.
///
/// Labels: `outcome` ("accepted" | "replaced" | "closed").
pub const FRAMES_TOTAL: &str = "huginn_frames_total";

/// Total evaluations run against a binding.
///
/// Labels: `skill`, `status` ("ok" | "error").
pub const EVALUATIONS_TOTAL: &str = "huginn_evaluations_total";

/// Time spent binding a frame into a skill binding, in seconds.
///
/// Labels: `skill`.
pub const BIND_DURATION_SECONDS: &str = "huginn_bind_duration_seconds";

/// Time spent in `Skill::evaluate`, in seconds.
///
/// Labels: `skill`.
pub const EVALUATE_DURATION_SECONDS: &str = "huginn_evaluate_duration_seconds";

/// Total reader ticks where the capture device had no frame ready.
///
/// Labels: `source`.
pub const CAPTURE_MISSES_TOTAL: &str = "huginn_capture_misses_total";
