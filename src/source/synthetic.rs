//! In-process capture device producing solid-colour raw surfaces.
//!
//! Frames come from a bounded pool: each acquired frame holds a lease and
//! the device reports "no frame" while every pool slot is out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use super::camera::{CaptureDevice, StreamFormat};
use super::surface::RawSurface;
use crate::types::{Frame, FrameLease, PixelFormat};
use crate::{HuginnError, Result};

const DEFAULT_POOL_SIZE: usize = 3;

#[derive(Debug, Default)]
struct PoolState {
    outstanding: AtomicUsize,
    acquired: AtomicU64,
    closed: AtomicBool,
}

/// Synthetic [`CaptureDevice`].
#[derive(Debug)]
pub struct SyntheticCamera {
    name: String,
    formats: Vec<StreamFormat>,
    format: Option<StreamFormat>,
    streaming: bool,
    pool_size: usize,
    fill: u8,
    pool: Arc<PoolState>,
}

impl SyntheticCamera {
    pub fn new(name: impl Into<String>, formats: Vec<StreamFormat>) -> Self {
        Self {
            name: name.into(),
            formats,
            format: None,
            streaming: false,
            pool_size: DEFAULT_POOL_SIZE,
            fill: 0,
            pool: Arc::new(PoolState::default()),
        }
    }

    /// A device advertising a typical webcam mode list.
    pub fn webcam() -> Self {
        Self::new(
            "Synthetic Webcam",
            vec![
                StreamFormat::new(3840, 2160, 10, PixelFormat::Bgra8),
                StreamFormat::new(1920, 1080, 30, PixelFormat::Nv12),
                StreamFormat::new(1280, 720, 30, PixelFormat::Bgra8),
                StreamFormat::new(640, 480, 30, PixelFormat::Yuy2),
            ],
        )
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Byte every generated surface is filled with.
    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    /// Observer for pool and lifecycle counters.
    pub fn handle(&self) -> SyntheticCameraHandle {
        SyntheticCameraHandle {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl CaptureDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_formats(&self) -> Result<Vec<StreamFormat>> {
        Ok(self.formats.clone())
    }

    fn set_format(&mut self, format: &StreamFormat) -> Result<()> {
        if !self.formats.contains(format) {
            return Err(HuginnError::Capture(format!(
                "{} does not offer {}x{} {}",
                self.name, format.width, format.height, format.pixel_format
            )));
        }
        self.format = Some(*format);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.format.is_none() {
            return Err(HuginnError::Capture(format!(
                "{} started without a format",
                self.name
            )));
        }
        self.streaming = true;
        Ok(())
    }

    fn try_acquire_latest_frame(&mut self) -> Result<Option<Frame>> {
        let format = match self.format {
            Some(format) if self.streaming => format,
            _ => return Err(HuginnError::Capture(format!("{} is not streaming", self.name))),
        };
        if self.pool.outstanding.load(Ordering::Acquire) >= self.pool_size {
            return Ok(None);
        }

        self.pool.outstanding.fetch_add(1, Ordering::AcqRel);
        self.pool.acquired.fetch_add(1, Ordering::Relaxed);
        let surface = RawSurface::filled(format.width, format.height, format.pixel_format, self.fill);
        let pool = Arc::clone(&self.pool);
        let lease = FrameLease::new(move || {
            pool.outstanding.fetch_sub(1, Ordering::AcqRel);
        });
        Ok(Some(Frame::from_surface(Arc::new(surface)).with_lease(lease)))
    }

    fn close(&mut self) {
        self.streaming = false;
        self.pool.closed.store(true, Ordering::Release);
    }
}

/// Read-only view of a [`SyntheticCamera`]'s counters.
#[derive(Debug, Clone)]
pub struct SyntheticCameraHandle {
    pool: Arc<PoolState>,
}

impl SyntheticCameraHandle {
    /// Frames handed out and not yet dropped.
    pub fn outstanding(&self) -> usize {
        self.pool.outstanding.load(Ordering::Acquire)
    }

    /// Frames handed out since creation.
    pub fn acquired(&self) -> u64 {
        self.pool.acquired.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.pool.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_yields_no_frame() {
        let format = StreamFormat::new(4, 4, 30, PixelFormat::Bgra8);
        let mut camera = SyntheticCamera::new("test", vec![format]).with_pool_size(2);
        let handle = camera.handle();
        camera.set_format(&format).unwrap();
        camera.start().unwrap();

        let a = camera.try_acquire_latest_frame().unwrap().unwrap();
        let b = camera.try_acquire_latest_frame().unwrap().unwrap();
        assert!(camera.try_acquire_latest_frame().unwrap().is_none());
        assert_eq!(handle.outstanding(), 2);

        drop(a);
        assert_eq!(handle.outstanding(), 1);
        assert!(camera.try_acquire_latest_frame().unwrap().is_some());
        drop(b);
        assert_eq!(handle.acquired(), 3);
    }

    #[test]
    fn acquire_before_start_is_capture_error() {
        let mut camera = SyntheticCamera::webcam();
        let err = camera.try_acquire_latest_frame().unwrap_err();
        assert!(err.is_transient());
    }
}
