//! Asset fingerprinting
//!
//! Turns a file on disk into an [`Asset`]: content hash, pixel and thumbnail
//! dimensions, EXIF rotation and file properties. The thumbnail itself goes
//! into the [`BlobStore`].
//!
//! Fingerprinting never touches the catalog tables; the caller decides what
//! to do with the outcome.

use crate::decoder::{read_exif_orientation, DecodedImage, ImageCrateDecoder, ImageDecoder};
use crate::error::Result;
use chrono::{DateTime, Utc};
use core_library::{
    Asset, AssetFlag, BlobStore, Dimensions, FileProperties, Folder, Rotation,
};
use core_runtime::CatalogConfig;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// What fingerprinting a file produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintOutcome {
    Fingerprinted(Asset),
    /// The file could not be read or decoded
    Corrupted(String),
}

pub struct AssetFingerprinter {
    decoder: Arc<dyn ImageDecoder>,
    max_width: u32,
    max_height: u32,
}

impl AssetFingerprinter {
    pub fn new(decoder: Arc<dyn ImageDecoder>, max_width: u32, max_height: u32) -> Self {
        Self {
            decoder,
            max_width,
            max_height,
        }
    }

    /// Fingerprinter using the `image` crate and the configured thumbnail bounds
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(
            Arc::new(ImageCrateDecoder::new()),
            config.thumbnail_max_width,
            config.thumbnail_max_height,
        )
    }

    /// Fingerprint `file_name` inside `folder`.
    ///
    /// On success the thumbnail is stored in `blobs`. The `Err` arm is only
    /// used when the background decoding task itself fails.
    pub async fn fingerprint(
        &self,
        folder: &Folder,
        file_name: &str,
        blobs: &mut BlobStore,
    ) -> Result<FingerprintOutcome> {
        let path = folder.path.join(file_name);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => return Ok(unreadable(file_name, e)),
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(unreadable(file_name, e)),
        };

        let modified_at: DateTime<Utc> = match metadata.modified() {
            Ok(modified) => modified.into(),
            Err(e) => return Ok(unreadable(file_name, e)),
        };
        // Not every filesystem records creation time
        let created_at: DateTime<Utc> = metadata
            .created()
            .map(Into::into)
            .unwrap_or(modified_at);

        let decoder = Arc::clone(&self.decoder);
        let (max_width, max_height) = (self.max_width, self.max_height);
        let (hash, decoded, orientation) = tokio::task::spawn_blocking(move || {
            let hash = content_hash(&bytes);
            let decoded = decoder.decode(&bytes, max_width, max_height);
            let orientation = read_exif_orientation(&bytes);
            (hash, decoded, orientation)
        })
        .await?;

        let DecodedImage {
            width,
            height,
            thumbnail_width,
            thumbnail_height,
            thumbnail,
        } = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Image could not be decoded");
                return Ok(FingerprintOutcome::Corrupted(e.to_string()));
            }
        };

        let rotation = orientation
            .map(Rotation::from_exif_orientation)
            .unwrap_or_default();

        let asset = Asset {
            folder_id: folder.id,
            file_name: file_name.to_string(),
            hash,
            pixel_size: Dimensions::new(width, height),
            thumbnail_size: Dimensions::new(thumbnail_width, thumbnail_height),
            file_properties: FileProperties {
                size: metadata.len(),
                created_at,
                modified_at,
            },
            thumbnail_created_at: Utc::now(),
            rotation: Rotation::None,
            rotated: AssetFlag::default(),
            corrupted: AssetFlag::default(),
            image_data: None,
        }
        .with_rotation(rotation);

        blobs.put(folder.id, file_name, thumbnail);
        debug!(
            file = %file_name,
            width,
            height,
            rotation = rotation.degrees(),
            "Asset fingerprinted"
        );
        Ok(FingerprintOutcome::Fingerprinted(asset))
    }
}

/// SHA-256 of `bytes` as lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn unreadable(file_name: &str, err: std::io::Error) -> FingerprintOutcome {
    warn!(file = %file_name, error = %err, "File could not be read");
    FingerprintOutcome::Corrupted(format!("Failed to read {}: {}", file_name, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::test_images;
    use crate::error::MetadataError;
    use mockall::mock;
    use tempfile::TempDir;

    mock! {
        pub Decoder {}

        impl ImageDecoder for Decoder {
            fn decode(&self, bytes: &[u8], max_width: u32, max_height: u32) -> Result<DecodedImage>;
        }
    }

    fn folder_with(dir: &TempDir, name: &str, bytes: &[u8]) -> Folder {
        std::fs::write(dir.path().join(name), bytes).unwrap();
        Folder::new(dir.path())
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"test data"),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[tokio::test]
    async fn test_fingerprint_real_png() {
        let dir = TempDir::new().unwrap();
        let bytes = test_images::png(400, 300);
        let folder = folder_with(&dir, "photo.png", &bytes);
        let mut blobs = BlobStore::new();

        let fingerprinter =
            AssetFingerprinter::new(Arc::new(ImageCrateDecoder::new()), 200, 150);
        let outcome = fingerprinter
            .fingerprint(&folder, "photo.png", &mut blobs)
            .await
            .unwrap();

        let FingerprintOutcome::Fingerprinted(asset) = outcome else {
            panic!("expected a fingerprinted asset");
        };
        assert_eq!(asset.folder_id, folder.id);
        assert_eq!(asset.hash, content_hash(&bytes));
        assert_eq!(asset.pixel_size, Dimensions::new(400, 300));
        assert_eq!(asset.thumbnail_size, Dimensions::new(200, 150));
        assert_eq!(asset.file_properties.size, bytes.len() as u64);
        assert_eq!(asset.rotation, Rotation::None);
        assert!(!asset.corrupted.active);
        assert!(blobs.get(&folder.id, "photo.png").is_some());
    }

    #[tokio::test]
    async fn test_exif_orientation_sets_rotation() {
        let dir = TempDir::new().unwrap();
        let bytes = test_images::jpeg_with_orientation(80, 40, 6);
        let folder = folder_with(&dir, "portrait.jpg", &bytes);
        let mut blobs = BlobStore::new();

        let fingerprinter =
            AssetFingerprinter::new(Arc::new(ImageCrateDecoder::new()), 200, 150);
        let outcome = fingerprinter
            .fingerprint(&folder, "portrait.jpg", &mut blobs)
            .await
            .unwrap();

        let FingerprintOutcome::Fingerprinted(asset) = outcome else {
            panic!("expected a fingerprinted asset");
        };
        assert_eq!(asset.rotation, Rotation::Clockwise90);
        assert!(asset.rotated.active);
        assert_eq!(asset.pixel_size, Dimensions::new(80, 40));
    }

    #[tokio::test]
    async fn test_decoder_receives_configured_bounds() {
        let dir = TempDir::new().unwrap();
        let folder = folder_with(&dir, "a.jpg", b"raw");

        let mut decoder = MockDecoder::new();
        decoder
            .expect_decode()
            .withf(|bytes, max_width, max_height| {
                bytes.to_vec() == b"raw" && *max_width == 64 && *max_height == 48
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(DecodedImage {
                    width: 640,
                    height: 480,
                    thumbnail_width: 64,
                    thumbnail_height: 48,
                    thumbnail: vec![0xFF, 0xD8],
                })
            });

        let fingerprinter = AssetFingerprinter::new(Arc::new(decoder), 64, 48);
        let mut blobs = BlobStore::new();
        let outcome = fingerprinter
            .fingerprint(&folder, "a.jpg", &mut blobs)
            .await
            .unwrap();

        assert!(matches!(outcome, FingerprintOutcome::Fingerprinted(_)));
        assert_eq!(blobs.get(&folder.id, "a.jpg"), Some(&[0xFF, 0xD8][..]));
    }

    #[tokio::test]
    async fn test_decode_failure_is_corrupted_and_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let folder = folder_with(&dir, "broken.jpg", b"nope");

        let mut decoder = MockDecoder::new();
        decoder
            .expect_decode()
            .returning(|_, _, _| Err(MetadataError::CorruptedFile("bad header".to_string())));

        let fingerprinter = AssetFingerprinter::new(Arc::new(decoder), 200, 150);
        let mut blobs = BlobStore::new();
        let outcome = fingerprinter
            .fingerprint(&folder, "broken.jpg", &mut blobs)
            .await
            .unwrap();

        match outcome {
            FingerprintOutcome::Corrupted(reason) => assert!(reason.contains("bad header")),
            other => panic!("expected corruption, got {:?}", other),
        }
        assert!(!blobs.has_changes());
    }

    #[tokio::test]
    async fn test_missing_file_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let folder = Folder::new(dir.path());
        let mut decoder = MockDecoder::new();
        decoder.expect_decode().never();

        let fingerprinter = AssetFingerprinter::new(Arc::new(decoder), 200, 150);
        let mut blobs = BlobStore::new();
        let outcome = fingerprinter
            .fingerprint(&folder, "gone.jpg", &mut blobs)
            .await
            .unwrap();
        assert!(matches!(outcome, FingerprintOutcome::Corrupted(_)));
    }
}
