//! Frame sources: still images, looping animations and cameras.
//!
//! A source pushes frames into a [`FrameSink`]. It owns whatever device or
//! decoder produces them and releases it on [`FrameSource::stop`] or drop.

pub mod camera;
pub mod file;
pub mod surface;
pub mod synthetic;

pub use camera::{
    CameraFrameSource, CaptureDevice, FALLBACK_FORMATS, FormatPreference, StreamFormat,
    negotiate_format,
};
pub use file::{
    ANIMATION_EXTENSIONS, AnimationFrameSource, IMAGE_EXTENSIONS, ImageFileFrameSource,
    validate_extension,
};
pub use surface::RawSurface;
pub use synthetic::{SyntheticCamera, SyntheticCameraHandle};

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::Result;
use crate::dispatch::FrameSink;

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A single still image.
    Photo,
    /// A decoded animation looped until stopped.
    Video,
    Camera,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Camera => "camera",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceState {
    Unopened = 0,
    Negotiating = 1,
    Streaming = 2,
    Stopped = 3,
}

impl SourceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unopened,
            1 => Self::Negotiating,
            2 => Self::Streaming,
            _ => Self::Stopped,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Negotiating => "negotiating",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source state readable from any thread.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: SourceState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> SourceState {
        SourceState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SourceState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Abort a background reader and wait for it to end.
///
/// Returns `false` when the reader had panicked.
pub(crate) async fn stop_reader(source: &str, reader: JoinHandle<()>) -> bool {
    reader.abort();
    match reader.await {
        Ok(()) => true,
        Err(e) if e.is_cancelled() => true,
        Err(e) => {
            warn!(source, error = %e, "frame reader failed");
            false
        }
    }
}

/// A producer of timestamped frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn frame_width(&self) -> u32;

    fn frame_height(&self) -> u32;

    fn state(&self) -> SourceState;

    /// Begin delivering frames into `sink`.
    async fn start(&self, sink: FrameSink) -> Result<()>;

    /// Stop delivering and release the underlying device.
    ///
    /// Once this returns no further frames reach the sink. Stopping twice
    /// is a no-op.
    async fn stop(&self) -> Result<()>;
}

/// Open a file source, choosing still image or animation by extension.
pub async fn open_file_source(path: impl AsRef<Path>) -> Result<Box<dyn FrameSource>> {
    let path = path.as_ref();
    let extension = file::extension_of(path);
    if ANIMATION_EXTENSIONS.contains(&extension.as_str()) {
        Ok(Box::new(AnimationFrameSource::open(path).await?))
    } else {
        validate_extension(path)?;
        Ok(Box::new(ImageFileFrameSource::open(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_cell_round_trips() {
        let cell = StateCell::new(SourceState::Unopened);
        for state in [
            SourceState::Negotiating,
            SourceState::Streaming,
            SourceState::Stopped,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[tokio::test]
    async fn stopping_a_running_reader_is_clean() {
        let reader = tokio::spawn(std::future::pending::<()>());
        assert!(stop_reader("pending", reader).await);

        let finished = tokio::spawn(async {});
        tokio::task::yield_now().await;
        assert!(stop_reader("finished", finished).await);
    }

    #[tokio::test]
    async fn panicked_reader_is_reported() {
        let reader = tokio::spawn(async {
            if true {
                panic!("decoder blew up");
            }
        });
        while !reader.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(!stop_reader("panicking", reader).await);
    }
}
