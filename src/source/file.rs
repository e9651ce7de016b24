//! File-backed sources: a still image delivered once, or an animation
//! looped until stopped.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{FrameSource, SourceKind, SourceState, StateCell};
use crate::dispatch::{Delivery, FrameSink};
use crate::types::Frame;
use crate::{HuginnError, Result};

/// Still image extensions accepted as input.
pub const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// Animation extensions looped as video.
pub const ANIMATION_EXTENSIONS: [&str; 1] = ["gif"];

const EXPECTED_IMAGE: &str = ".jpg or .png";

/// Delay used for animation frames that declare none.
const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Lowercased extension of `path`, or empty.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Reject anything that is not a `.jpg` or `.png` path.
///
/// Only the name is checked; the file is not touched.
pub fn validate_extension(path: impl AsRef<Path>) -> Result<()> {
    let extension = extension_of(path.as_ref());
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(HuginnError::UnsupportedExtension {
            extension,
            expected: EXPECTED_IMAGE,
        })
    }
}

/// Delivers one decoded still image.
#[derive(Debug)]
pub struct ImageFileFrameSource {
    path: PathBuf,
    image: Arc<DynamicImage>,
    state: StateCell,
}

impl ImageFileFrameSource {
    /// Validate the extension and decode the file on the blocking pool.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        validate_extension(&path)?;

        let decode_path = path.clone();
        let image = tokio::task::spawn_blocking(move || image::open(decode_path)).await??;
        debug!(path = %path.display(), width = image.width(), height = image.height(), "decoded image");

        Ok(Self {
            path,
            image: Arc::new(image),
            state: StateCell::new(SourceState::Unopened),
        })
    }

    /// Source over an image already in memory.
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            path: PathBuf::new(),
            image: Arc::new(image),
            state: StateCell::new(SourceState::Unopened),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> &Arc<DynamicImage> {
        &self.image
    }
}

#[async_trait]
impl FrameSource for ImageFileFrameSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Photo
    }

    fn frame_width(&self) -> u32 {
        self.image.width()
    }

    fn frame_height(&self) -> u32 {
        self.image.height()
    }

    fn state(&self) -> SourceState {
        self.state.get()
    }

    async fn start(&self, sink: FrameSink) -> Result<()> {
        if self.state.get() != SourceState::Unopened {
            return Err(HuginnError::InvalidInput(format!(
                "photo source already {}",
                self.state.get()
            )));
        }
        self.state.set(SourceState::Streaming);
        sink.push(Frame::from_shared(Arc::clone(&self.image)).with_sequence(1));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.state.set(SourceState::Stopped);
        Ok(())
    }
}

/// One decoded animation frame and how long it stays on screen.
#[derive(Debug, Clone)]
struct AnimationFrame {
    image: Arc<DynamicImage>,
    delay: Duration,
}

/// Loops a decoded animation at its own frame delays.
#[derive(Debug)]
pub struct AnimationFrameSource {
    path: PathBuf,
    frames: Arc<[AnimationFrame]>,
    width: u32,
    height: u32,
    state: Arc<StateCell>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl AnimationFrameSource {
    /// Decode every frame of a `.gif` up front.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let extension = extension_of(&path);
        if !ANIMATION_EXTENSIONS.contains(&extension.as_str()) {
            return Err(HuginnError::UnsupportedExtension {
                extension,
                expected: ".gif",
            });
        }

        let decode_path = path.clone();
        let frames = tokio::task::spawn_blocking(move || decode_gif(&decode_path)).await??;
        let Some(first) = frames.first() else {
            return Err(HuginnError::InvalidInput(format!(
                "animation '{}' has no frames",
                path.display()
            )));
        };
        let (width, height) = (first.image.width(), first.image.height());
        info!(path = %path.display(), frames = frames.len(), width, height, "decoded animation");

        Ok(Self {
            path,
            frames: frames.into(),
            width,
            height,
            state: Arc::new(StateCell::new(SourceState::Unopened)),
            reader: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn decode_gif(path: &Path) -> Result<Vec<AnimationFrame>> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok(frames
        .into_iter()
        .map(|frame| {
            let delay = Duration::from(frame.delay());
            AnimationFrame {
                delay: if delay.is_zero() {
                    DEFAULT_FRAME_DELAY
                } else {
                    delay
                },
                image: Arc::new(DynamicImage::ImageRgba8(frame.into_buffer())),
            }
        })
        .collect())
}

#[async_trait]
impl FrameSource for AnimationFrameSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }

    fn frame_width(&self) -> u32 {
        self.width
    }

    fn frame_height(&self) -> u32 {
        self.height
    }

    fn state(&self) -> SourceState {
        self.state.get()
    }

    async fn start(&self, sink: FrameSink) -> Result<()> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if reader.is_some() || self.state.get() != SourceState::Unopened {
            return Err(HuginnError::InvalidInput(format!(
                "video source already {}",
                self.state.get()
            )));
        }
        self.state.set(SourceState::Streaming);

        let frames = Arc::clone(&self.frames);
        let state = Arc::clone(&self.state);
        *reader = Some(tokio::spawn(async move {
            let started = Instant::now();
            let mut sequence = 0u64;
            'playback: loop {
                for frame in frames.iter() {
                    sequence += 1;
                    let delivered = sink.push(
                        Frame::from_shared(Arc::clone(&frame.image))
                            .with_sequence(sequence)
                            .with_timestamp(started.elapsed()),
                    );
                    if delivered == Delivery::Closed {
                        break 'playback;
                    }
                    tokio::time::sleep(frame.delay).await;
                }
            }
            debug!(frames = sequence, "animation playback ended");
            state.set(SourceState::Stopped);
        }));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(reader) = self.take_reader() {
            super::stop_reader(&self.path.display().to_string(), reader).await;
        }
        self.state.set(SourceState::Stopped);
        Ok(())
    }
}

impl Drop for AnimationFrameSource {
    fn drop(&mut self) {
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_jpg_and_png_only() {
        assert!(validate_extension("a/b/photo.jpg").is_ok());
        assert!(validate_extension("PHOTO.PNG").is_ok());

        let err = validate_extension("clip.bmp").unwrap_err();
        match err {
            HuginnError::UnsupportedExtension { extension, .. } => assert_eq!(extension, "bmp"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(validate_extension("no_extension").is_err());
        assert!(validate_extension("photo.jpeg").is_err());
    }

    #[tokio::test]
    async fn photo_delivers_exactly_once() {
        let slot = crate::dispatch::FrameSlot::new();
        let source = ImageFileFrameSource::from_image(DynamicImage::new_rgb8(4, 3));
        source.start(slot.sink()).await.unwrap();
        assert_eq!(source.state(), SourceState::Streaming);
        assert_eq!(slot.delivered(), 1);
        assert!(source.start(slot.sink()).await.is_err());
        assert_eq!(slot.delivered(), 1);
        source.stop().await.unwrap();
        assert_eq!(source.state(), SourceState::Stopped);
    }
}
