//! First-frame extraction for video files
//!
//! The extracted frame is written as `<video file name>.jpg` into a cache
//! directory, where the catalog walk later picks it up as an ordinary image.
//!
//! Two behaviors to be aware of:
//! - an existing frame is reused as-is, even if the video changed since;
//! - videos with identical content share one frame. A `.frames.json`
//!   manifest in the cache directory maps content hash to the frame written
//!   first, so a second copy under another name gets no frame of its own.

use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use core_library::layout::write_atomic;
use core_runtime::logging::path_label;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

pub const FRAME_MANIFEST_NAME: &str = ".frames.json";

/// Writes the first frame of `video` as a JPEG at `output`
#[async_trait]
pub trait FrameGrabber: Send + Sync {
    async fn grab_first_frame(&self, video: &Path, output: &Path) -> Result<()>;
}

/// Shells out to `ffmpeg -frames:v 1`
#[derive(Debug, Clone)]
pub struct FfmpegFrameGrabber {
    binary: PathBuf,
}

impl FfmpegFrameGrabber {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegFrameGrabber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameGrabber for FfmpegFrameGrabber {
    async fn grab_first_frame(&self, video: &Path, output: &Path) -> Result<()> {
        let output_result = Command::new(&self.binary)
            .arg("-nostdin")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "2", "-y"])
            .arg(output)
            .output()
            .await
            .map_err(|e| {
                MetadataError::FrameExtraction(format!(
                    "Failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(MetadataError::FrameExtraction(format!(
                "ffmpeg exited with {}: {}",
                output_result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

pub struct VideoFrameExtractor {
    grabber: Arc<dyn FrameGrabber>,
}

impl VideoFrameExtractor {
    pub fn new(grabber: Arc<dyn FrameGrabber>) -> Self {
        Self { grabber }
    }

    pub fn with_ffmpeg() -> Self {
        Self::new(Arc::new(FfmpegFrameGrabber::new()))
    }

    /// Frame path a video maps to, before content collapsing
    pub fn frame_path(video_path: &Path, cache_dir: &Path) -> Result<PathBuf> {
        let file_name = video_path.file_name().ok_or_else(|| {
            MetadataError::UnsupportedFormat(format!(
                "{} has no file name",
                video_path.display()
            ))
        })?;
        Ok(cache_dir.join(format!("{}.jpg", file_name.to_string_lossy())))
    }

    /// Return the cached first frame of `video_path`, extracting it if needed
    #[instrument(level = "debug", skip_all, fields(video = %video_path.display()))]
    pub async fn extract_first_frame(&self, video_path: &Path, cache_dir: &Path) -> Result<PathBuf> {
        let output = Self::frame_path(video_path, cache_dir)?;
        if tokio::fs::try_exists(&output).await? {
            debug!("Frame already cached");
            return Ok(output);
        }

        tokio::fs::create_dir_all(cache_dir).await?;

        let hash = hash_file(video_path.to_path_buf()).await?;
        let manifest_path = cache_dir.join(FRAME_MANIFEST_NAME);
        let mut manifest = read_manifest(&manifest_path).await?;

        if let Some(existing) = manifest.get(&hash) {
            let existing = cache_dir.join(existing);
            if tokio::fs::try_exists(&existing).await? {
                debug!(frame = %existing.display(), "Identical video content already has a frame");
                return Ok(existing);
            }
        }

        self.grabber.grab_first_frame(video_path, &output).await?;
        if !tokio::fs::try_exists(&output).await? {
            warn!("Frame grabber reported success but wrote nothing");
            return Err(MetadataError::FrameExtraction(format!(
                "No frame written to {}",
                output.display()
            )));
        }

        let frame_name = output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        manifest.insert(hash, frame_name);
        write_manifest(&manifest_path, &manifest)?;

        info!(frame = %path_label(&output), "First frame extracted");
        Ok(output)
    }
}

/// Streamed SHA-256 of a file, computed on the blocking pool
async fn hash_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await?
}

async fn read_manifest(path: &Path) -> Result<BTreeMap<String, String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| MetadataError::Manifest(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_manifest(path: &Path, manifest: &BTreeMap<String, String>) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| MetadataError::Manifest(e.to_string()))?;
    write_atomic(path, &bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use tempfile::TempDir;

    mock! {
        pub Grabber {}

        #[async_trait]
        impl FrameGrabber for Grabber {
            async fn grab_first_frame(&self, video: &Path, output: &Path) -> Result<()>;
        }
    }

    fn writing_grabber(times: usize) -> MockGrabber {
        let mut grabber = MockGrabber::new();
        grabber
            .expect_grab_first_frame()
            .times(times)
            .returning(|_, output| {
                std::fs::write(output, b"jpeg").unwrap();
                Ok(())
            });
        grabber
    }

    #[test]
    fn test_frame_path() {
        let path =
            VideoFrameExtractor::frame_path(Path::new("/v/clip.mp4"), Path::new("/cache")).unwrap();
        assert_eq!(path, PathBuf::from("/cache/clip.mp4.jpg"));
    }

    #[tokio::test]
    async fn test_extracts_once_and_reuses_existing_frame() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"video-a").unwrap();
        let cache = dir.path().join("cache");

        let extractor = VideoFrameExtractor::new(Arc::new(writing_grabber(1)));
        let first = extractor.extract_first_frame(&video, &cache).await.unwrap();
        assert_eq!(first, cache.join("clip.mp4.jpg"));

        // Changed content under the same name is not re-extracted
        std::fs::write(&video, b"video-b").unwrap();
        let second = extractor.extract_first_frame(&video, &cache).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_identical_content_shares_first_frame() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("cache");
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let extractor = VideoFrameExtractor::new(Arc::new(writing_grabber(1)));
        let frame_a = extractor.extract_first_frame(&a, &cache).await.unwrap();
        let frame_b = extractor.extract_first_frame(&b, &cache).await.unwrap();

        assert_eq!(frame_a, frame_b);
        assert!(!cache.join("b.mp4.jpg").exists());
        assert!(cache.join(FRAME_MANIFEST_NAME).exists());
    }

    #[tokio::test]
    async fn test_distinct_content_gets_distinct_frames() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("cache");
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        std::fs::write(&a, b"one").unwrap();
        std::fs::write(&b, b"two").unwrap();

        let extractor = VideoFrameExtractor::new(Arc::new(writing_grabber(2)));
        let frame_a = extractor.extract_first_frame(&a, &cache).await.unwrap();
        let frame_b = extractor.extract_first_frame(&b, &cache).await.unwrap();
        assert_ne!(frame_a, frame_b);
    }

    #[tokio::test]
    async fn test_grabber_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mov");
        std::fs::write(&video, b"x").unwrap();

        let mut grabber = MockGrabber::new();
        grabber
            .expect_grab_first_frame()
            .returning(|_, _| Err(MetadataError::FrameExtraction("no stream".to_string())));

        let extractor = VideoFrameExtractor::new(Arc::new(grabber));
        let err = extractor
            .extract_first_frame(&video, &dir.path().join("cache"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::FrameExtraction(_)));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_binary_is_extraction_error() {
        let dir = TempDir::new().unwrap();
        let grabber = FfmpegFrameGrabber::with_binary(dir.path().join("no-such-ffmpeg"));
        let err = grabber
            .grab_first_frame(&dir.path().join("a.mp4"), &dir.path().join("a.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::FrameExtraction(_)));
    }
}
