//! Camera source: stream format negotiation and a background reader.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{FrameSource, SourceKind, SourceState, StateCell};
use crate::dispatch::{Delivery, FrameSink};
use crate::telemetry;
use crate::types::{Frame, PixelFormat, SkillDescriptor};
use crate::{HuginnError, Result};

/// Encodings a camera may stream in, in tie-break order.
pub const FALLBACK_FORMATS: [PixelFormat; 4] = [
    PixelFormat::Bgra8,
    PixelFormat::Nv12,
    PixelFormat::Yuy2,
    PixelFormat::Rgb32,
];

/// Reader period when a device reports no usable frame rate.
const DEFAULT_FRAME_PERIOD: Duration = Duration::from_millis(33);

/// One mode a capture device can stream in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate_numerator: u32,
    pub frame_rate_denominator: u32,
    pub pixel_format: PixelFormat,
}

impl StreamFormat {
    /// Format at a whole-number frame rate.
    pub fn new(width: u32, height: u32, fps: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            frame_rate_numerator: fps,
            frame_rate_denominator: 1,
            pixel_format,
        }
    }

    pub fn with_frame_rate(mut self, numerator: u32, denominator: u32) -> Self {
        self.frame_rate_numerator = numerator;
        self.frame_rate_denominator = denominator;
        self
    }

    /// Frames per second; zero for a zero denominator.
    pub fn fps(&self) -> f64 {
        if self.frame_rate_denominator == 0 {
            0.0
        } else {
            f64::from(self.frame_rate_numerator) / f64::from(self.frame_rate_denominator)
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn frame_period(&self) -> Duration {
        let fps = self.fps();
        if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            DEFAULT_FRAME_PERIOD
        }
    }
}

/// What the consumer would like the camera to stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormatPreference {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub min_fps: f64,
}

impl Default for FormatPreference {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::Bgra8,
            min_fps: 15.0,
        }
    }
}

impl FormatPreference {
    /// Preference taken from a skill's image input, where it declares one.
    pub fn from_descriptor(descriptor: &SkillDescriptor) -> Self {
        let mut preference = Self::default();
        if let Some(input) = descriptor.image_input() {
            if let Some(format) = input.pixel_format {
                preference.pixel_format = format;
            }
            if let Some((width, height)) = input.size {
                preference.width = width;
                preference.height = height;
            }
        }
        preference
    }

    fn target_area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Pick a stream format.
///
/// Only formats at or above `min_fps` whose encoding is in
/// [`FALLBACK_FORMATS`] are considered. The format closest in area to the
/// target wins; on equal area the preferred encoding goes first, then
/// earlier list entries.
pub fn negotiate_format(
    formats: &[StreamFormat],
    preference: &FormatPreference,
) -> Result<StreamFormat> {
    let target = preference.target_area();

    formats
        .iter()
        .filter(|f| f.fps() >= preference.min_fps)
        .filter_map(|f| {
            FALLBACK_FORMATS
                .iter()
                .position(|p| *p == f.pixel_format)
                .map(|rank| (f, rank))
        })
        .min_by_key(|(f, rank)| {
            (
                f.area().abs_diff(target),
                f.pixel_format != preference.pixel_format,
                *rank,
            )
        })
        .map(|(f, _)| *f)
        .ok_or(HuginnError::NoCompatibleFormat)
}

/// Platform capture device.
///
/// Calls are short and non-blocking; `try_acquire_latest_frame` returns
/// `Ok(None)` when no new frame is ready.
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    fn supported_formats(&self) -> Result<Vec<StreamFormat>>;

    fn set_format(&mut self, format: &StreamFormat) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn try_acquire_latest_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Called exactly once.
    fn close(&mut self);
}

type SharedDevice = Arc<Mutex<Option<Box<dyn CaptureDevice>>>>;

fn lock_device(device: &SharedDevice) -> MutexGuard<'_, Option<Box<dyn CaptureDevice>>> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest frame from `device`, or `None` once it has been closed.
fn acquire_latest(device: &SharedDevice) -> Result<Option<Frame>> {
    match lock_device(device).as_mut() {
        Some(device) => device.try_acquire_latest_frame(),
        None => Ok(None),
    }
}

/// Streams frames from a [`CaptureDevice`] at the negotiated rate.
pub struct CameraFrameSource {
    name: String,
    device: SharedDevice,
    preference: FormatPreference,
    format: Mutex<Option<StreamFormat>>,
    state: Arc<StateCell>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl CameraFrameSource {
    pub fn new(device: Box<dyn CaptureDevice>, preference: FormatPreference) -> Self {
        Self {
            name: device.name().to_string(),
            device: Arc::new(Mutex::new(Some(device))),
            preference,
            format: Mutex::new(None),
            state: Arc::new(StateCell::new(SourceState::Unopened)),
            reader: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The format chosen by `start`, if streaming began.
    pub fn negotiated_format(&self) -> Option<StreamFormat> {
        *self.format.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll the device directly.
    ///
    /// After `stop` this yields `Ok(None)`, never an error.
    pub fn acquire_latest(&self) -> Result<Option<Frame>> {
        acquire_latest(&self.device)
    }

    fn open_stream(&self) -> Result<StreamFormat> {
        let mut guard = lock_device(&self.device);
        let Some(device) = guard.as_mut() else {
            return Err(HuginnError::Capture(format!("camera '{}' is closed", self.name)));
        };

        let result = (|| -> Result<StreamFormat> {
            let formats = device.supported_formats()?;
            debug!(camera = %self.name, formats = formats.len(), "negotiating stream format");
            let format = negotiate_format(&formats, &self.preference)?;
            device.set_format(&format)?;
            device.start()?;
            Ok(format)
        })();

        if result.is_err()
            && let Some(mut device) = guard.take()
        {
            device.close();
        }
        result
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn close_device(&self) {
        if let Some(mut device) = lock_device(&self.device).take() {
            device.close();
            info!(camera = %self.name, "camera closed");
        }
    }
}

#[async_trait]
impl FrameSource for CameraFrameSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn frame_width(&self) -> u32 {
        self.negotiated_format().map_or(0, |f| f.width)
    }

    fn frame_height(&self) -> u32 {
        self.negotiated_format().map_or(0, |f| f.height)
    }

    fn state(&self) -> SourceState {
        self.state.get()
    }

    async fn start(&self, sink: FrameSink) -> Result<()> {
        if self.state.get() != SourceState::Unopened {
            return Err(HuginnError::InvalidInput(format!(
                "camera '{}' already {}",
                self.name,
                self.state.get()
            )));
        }

        self.state.set(SourceState::Negotiating);
        let format = match self.open_stream() {
            Ok(format) => format,
            Err(e) => {
                self.state.set(SourceState::Stopped);
                return Err(e);
            }
        };
        *self.format.lock().unwrap_or_else(PoisonError::into_inner) = Some(format);
        info!(
            camera = %self.name,
            width = format.width,
            height = format.height,
            fps = format.fps(),
            pixel_format = %format.pixel_format,
            "camera streaming"
        );
        self.state.set(SourceState::Streaming);

        let device = Arc::clone(&self.device);
        let name = self.name.clone();
        let period = format.frame_period();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let started = Instant::now();
            let mut sequence = 0u64;
            loop {
                ticker.tick().await;
                match acquire_latest(&device) {
                    Ok(Some(frame)) => {
                        sequence += 1;
                        let frame = frame
                            .with_sequence(sequence)
                            .with_timestamp(started.elapsed());
                        if sink.push(frame) == Delivery::Closed {
                            debug!(camera = %name, "sink closed, reader exiting");
                            break;
                        }
                    }
                    Ok(None) => {
                        metrics::counter!(telemetry::CAPTURE_MISSES_TOTAL, "source" => name.clone())
                            .increment(1);
                    }
                    Err(e) => {
                        warn!(camera = %name, error = %e, "frame acquisition failed");
                    }
                }
            }
        });
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(reader) = self.take_reader() {
            super::stop_reader(&self.name, reader).await;
        }
        self.close_device();
        self.state.set(SourceState::Stopped);
        Ok(())
    }
}

impl Drop for CameraFrameSource {
    fn drop(&mut self) {
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
        self.close_device();
    }
}
