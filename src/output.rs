//! Writing results next to their input file.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::info;

use crate::{HuginnError, Result};

/// Suffix for processed images.
pub const MODIFIED_SUFFIX: &str = "_mod";

/// Suffix for cropped face images.
pub const FACE_SUFFIX: &str = "_face";

/// `<dir>/<stem><suffix>.<extension>` next to `input`, or the first free
/// `<stem><suffix> (N).<extension>` for N = 2, 3, ... if that exists.
pub fn unique_output_path(input: &Path, suffix: &str, extension: &str) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            HuginnError::InvalidInput(format!("'{}' has no file name", input.display()))
        })?;
    let dir = input.parent().unwrap_or_else(|| Path::new(""));

    let candidate = dir.join(format!("{stem}{suffix}.{extension}"));
    if !candidate.exists() {
        return Ok(candidate);
    }
    (2u32..)
        .map(|n| dir.join(format!("{stem}{suffix} ({n}).{extension}")))
        .find(|path| !path.exists())
        .ok_or_else(|| HuginnError::Runtime("no free output file name".to_string()))
}

/// Encode `image` as JPEG at `path`.
pub fn save_jpeg(image: &DynamicImage, path: &Path) -> Result<()> {
    // JPEG has no alpha channel.
    image.to_rgb8().save_with_format(path, image::ImageFormat::Jpeg)?;
    Ok(())
}

/// Save `image` as `<stem><suffix>.jpg` next to `input` without
/// overwriting anything. Returns the path written.
pub fn save_next_to(input: &Path, suffix: &str, image: &DynamicImage) -> Result<PathBuf> {
    let path = unique_output_path(input, suffix, "jpg")?;
    save_jpeg(image, &path)?;
    info!(path = %path.display(), "wrote output image");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_without_stem() {
        assert!(unique_output_path(Path::new(""), MODIFIED_SUFFIX, "jpg").is_err());
    }

    #[test]
    fn keeps_input_directory() {
        let path = unique_output_path(Path::new("/nonexistent/dir/cat.png"), "_mod", "jpg").unwrap();
        assert_eq!(path, Path::new("/nonexistent/dir/cat_mod.jpg"));
    }
}
