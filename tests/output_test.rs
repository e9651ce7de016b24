//! Tests for writing processed images next to their input.

use huginn::output::{FACE_SUFFIX, MODIFIED_SUFFIX, save_next_to, unique_output_path};
use image::DynamicImage;

#[test]
fn first_output_uses_plain_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("receipt.png");

    let path = unique_output_path(&input, MODIFIED_SUFFIX, "jpg").unwrap();
    assert_eq!(path, dir.path().join("receipt_mod.jpg"));
}

#[test]
fn existing_outputs_are_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("receipt.jpg");
    let image = DynamicImage::new_rgb8(8, 8);

    let first = save_next_to(&input, MODIFIED_SUFFIX, &image).unwrap();
    let second = save_next_to(&input, MODIFIED_SUFFIX, &image).unwrap();
    let third = save_next_to(&input, MODIFIED_SUFFIX, &image).unwrap();

    assert_eq!(first, dir.path().join("receipt_mod.jpg"));
    assert_eq!(second, dir.path().join("receipt_mod (2).jpg"));
    assert_eq!(third, dir.path().join("receipt_mod (3).jpg"));
    for path in [&first, &second, &third] {
        assert!(path.exists());
    }
}

#[test]
fn written_output_is_a_readable_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("portrait.png");
    let image = DynamicImage::new_rgba8(10, 6);

    let path = save_next_to(&input, FACE_SUFFIX, &image).unwrap();
    assert_eq!(path.file_name().unwrap(), "portrait_face.jpg");

    let decoded = image::open(&path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (10, 6));
}

#[test]
fn suffixes_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.jpg");
    let image = DynamicImage::new_rgb8(4, 4);

    save_next_to(&input, MODIFIED_SUFFIX, &image).unwrap();
    let face = unique_output_path(&input, FACE_SUFFIX, "jpg").unwrap();
    assert_eq!(face, dir.path().join("photo_face.jpg"));
}
