//! Image decoding and thumbnail generation
//!
//! [`ImageDecoder`] is the seam between the fingerprinter and whatever
//! actually understands image formats. [`ImageCrateDecoder`] is the default,
//! backed by the `image` crate.

use crate::error::{MetadataError, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// A decoded image and its bounded JPEG thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    /// JPEG-encoded thumbnail
    pub thumbnail: Vec<u8>,
}

/// Decodes raw file bytes into dimensions and a thumbnail.
///
/// Any error means the file is treated as corrupted.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], max_width: u32, max_height: u32) -> Result<DecodedImage>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageCrateDecoder {
    pub fn new() -> Self {
        Self
    }

    fn bounded_thumbnail(img: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
        if img.width() <= max_width && img.height() <= max_height {
            img.clone()
        } else {
            img.thumbnail(max_width, max_height)
        }
    }
}

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8], max_width: u32, max_height: u32) -> Result<DecodedImage> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| MetadataError::CorruptedFile(format!("Failed to decode image: {}", e)))?;

        if img.width() == 0 || img.height() == 0 {
            return Err(MetadataError::CorruptedFile(
                "Image has no pixels".to_string(),
            ));
        }

        // JPEG cannot carry alpha
        let thumb = DynamicImage::ImageRgb8(
            Self::bounded_thumbnail(&img, max_width, max_height).to_rgb8(),
        );

        let mut thumbnail = Vec::new();
        thumb
            .write_to(&mut Cursor::new(&mut thumbnail), ImageFormat::Jpeg)
            .map_err(|e| MetadataError::ImageError(format!("Failed to encode thumbnail: {}", e)))?;

        Ok(DecodedImage {
            width: img.width(),
            height: img.height(),
            thumbnail_width: thumb.width(),
            thumbnail_height: thumb.height(),
            thumbnail,
        })
    }
}

/// Read the EXIF orientation tag, if the container carries one
pub fn read_exif_orientation(bytes: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_large_image_is_bounded() {
        let decoded = ImageCrateDecoder::new()
            .decode(&test_images::png(800, 600), 200, 150)
            .unwrap();

        assert_eq!((decoded.width, decoded.height), (800, 600));
        assert_eq!((decoded.thumbnail_width, decoded.thumbnail_height), (200, 150));
        assert_eq!(
            image::guess_format(&decoded.thumbnail).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_decode_keeps_aspect_ratio() {
        let decoded = ImageCrateDecoder::new()
            .decode(&test_images::png(1000, 200), 200, 150)
            .unwrap();
        assert_eq!(decoded.thumbnail_width, 200);
        assert_eq!(decoded.thumbnail_height, 40);
    }

    #[test]
    fn test_small_image_not_upscaled() {
        let decoded = ImageCrateDecoder::new()
            .decode(&test_images::png(40, 30), 200, 150)
            .unwrap();
        assert_eq!((decoded.thumbnail_width, decoded.thumbnail_height), (40, 30));
    }

    #[test]
    fn test_garbage_is_corrupted() {
        let err = ImageCrateDecoder::new()
            .decode(b"definitely not an image", 200, 150)
            .unwrap_err();
        assert!(matches!(err, MetadataError::CorruptedFile(_)));
    }

    #[test]
    fn test_exif_orientation_read_from_jpeg() {
        let bytes = test_images::jpeg_with_orientation(64, 32, 6);
        assert_eq!(read_exif_orientation(&bytes), Some(6));

        // The extra segment does not get in the way of decoding
        let decoded = ImageCrateDecoder::new().decode(&bytes, 200, 150).unwrap();
        assert_eq!((decoded.width, decoded.height), (64, 32));
    }

    #[test]
    fn test_no_exif_orientation_in_png() {
        assert_eq!(read_exif_orientation(&test_images::png(4, 4)), None);
        assert_eq!(read_exif_orientation(b"garbage"), None);
    }
}
