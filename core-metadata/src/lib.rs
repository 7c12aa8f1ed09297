//! # Asset Metadata Module
//!
//! Derives catalog metadata from files on disk.
//!
//! ## Overview
//!
//! This module handles:
//! - Media type classification by extension
//! - Image decoding and bounded JPEG thumbnails (`image` crate)
//! - EXIF orientation
//! - SHA-256 content hashing
//! - First-frame extraction for videos (ffmpeg)

pub mod decoder;
pub mod error;
pub mod fingerprint;
pub mod media;
pub mod video;

pub use decoder::{DecodedImage, ImageCrateDecoder, ImageDecoder};
pub use error::{MetadataError, Result};
pub use fingerprint::{content_hash, AssetFingerprinter, FingerprintOutcome};
pub use media::{classify, MediaKind};
pub use video::{FfmpegFrameGrabber, FrameGrabber, VideoFrameExtractor};
