//! # Core Configuration Module
//!
//! Provides configuration management for the photo catalog core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `CatalogConfig` instance that holds every setting the synchronization
//! engine needs. It enforces fail-fast validation so an invalid setup is
//! rejected before the first run touches the disk.
//!
//! ## Required Settings
//!
//! - `root_dir` - The directory tree that is catalogued
//! - `database_dir` - Base directory of the versioned catalog database
//!
//! ## Optional Settings (with defaults)
//!
//! - `batch_size` - Create/update budget per run (default 10 000)
//! - `thumbnail_max_width` / `thumbnail_max_height` - Thumbnail bounds (200×150)
//! - `analyse_videos` - Extract first frames of videos (default off)
//! - `video_cache_dir` - Where first frames are written
//!   (default `<database_dir>/<version>/FirstFrameVideos`)
//! - `database_version` - Version label of the database layout (default `v1.0`)
//! - `backups_to_keep` - Number of dated archives retained (default 2)
//! - `hash_algorithms` - Toggles consumed by the duplicate finder only
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::CatalogConfig;
//!
//! let config = CatalogConfig::builder()
//!     .root_dir("/photos")
//!     .database_dir("/var/lib/catalog")
//!     .batch_size(500)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.batch_size, 500);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CatalogConfig;
//!
//! // Missing database directory
//! let config = CatalogConfig::builder()
//!     .root_dir("/photos")
//!     .build()
//!     .expect("Should fail - missing database directory");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default create/update budget for one synchronization run.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default thumbnail bounds in pixels.
pub const DEFAULT_THUMBNAIL_MAX_WIDTH: u32 = 200;
pub const DEFAULT_THUMBNAIL_MAX_HEIGHT: u32 = 150;

/// Upper bound accepted for either thumbnail dimension.
pub const MAX_THUMBNAIL_DIMENSION: u32 = 4096;

/// Default version label of the on-disk database layout.
pub const DEFAULT_DATABASE_VERSION: &str = "v1.0";

/// Default number of dated backup archives kept on disk.
pub const DEFAULT_BACKUPS_TO_KEEP: usize = 2;

/// Name of the first-frame cache directory when none is configured.
pub const DEFAULT_VIDEO_CACHE_DIR_NAME: &str = "FirstFrameVideos";

/// Core configuration for the photo catalog.
///
/// Use [`CatalogConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Root of the directory tree being catalogued
    pub root_dir: PathBuf,

    /// Base directory holding the versioned database and its backups
    pub database_dir: PathBuf,

    /// Version label of the database layout (e.g. `v1.0`)
    pub database_version: String,

    /// Maximum number of create/update mutations committed per run
    pub batch_size: usize,

    /// Maximum thumbnail width in pixels
    pub thumbnail_max_width: u32,

    /// Maximum thumbnail height in pixels
    pub thumbnail_max_height: u32,

    /// Hash algorithm toggles (duplicate finder only)
    pub hash_algorithms: HashAlgorithms,

    /// Whether video files are routed through first-frame extraction
    pub analyse_videos: bool,

    /// Directory receiving extracted first frames
    pub video_cache_dir: PathBuf,

    /// Number of dated backup archives retained
    pub backups_to_keep: usize,
}

/// Hash algorithms the standalone duplicate finder may compute.
///
/// The synchronization engine always records a SHA-256 content hash; these
/// toggles are carried through configuration for the duplicate finder and
/// are not consulted for change detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HashAlgorithms {
    pub sha512: bool,
    pub md5: bool,
    pub phash: bool,
    pub dhash: bool,
}

impl HashAlgorithms {
    /// Returns true when no toggle is set.
    pub fn is_empty(&self) -> bool {
        !(self.sha512 || self.md5 || self.phash || self.dhash)
    }
}

impl CatalogConfig {
    /// Creates a new builder for constructing a `CatalogConfig`.
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder::default()
    }

    /// Builds a configuration from deserialized settings.
    pub fn from_settings(settings: CatalogSettings) -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(root) = settings.root_dir {
            builder = builder.root_dir(root);
        }
        if let Some(db) = settings.database_dir {
            builder = builder.database_dir(db);
        }
        if let Some(version) = settings.database_version {
            builder = builder.database_version(version);
        }
        if let Some(batch) = settings.batch_size {
            builder = builder.batch_size(batch);
        }
        if let Some(width) = settings.thumbnail_max_width {
            builder = builder.thumbnail_max_width(width);
        }
        if let Some(height) = settings.thumbnail_max_height {
            builder = builder.thumbnail_max_height(height);
        }
        if let Some(cache) = settings.video_cache_dir {
            builder = builder.video_cache_dir(cache);
        }
        if let Some(keep) = settings.backups_to_keep {
            builder = builder.backups_to_keep(keep);
        }

        builder
            .analyse_videos(settings.analyse_videos)
            .hash_algorithms(settings.hash_algorithms)
            .build()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Root and database directories are not empty
    /// - The root (and the video cache, when used) is an absolute path
    /// - Thumbnail bounds are within (0, 4096]
    /// - At least one backup is retained
    /// - The video cache directory is not the root itself
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::Config("Root directory cannot be empty".to_string()));
        }

        if !self.root_dir.is_absolute() {
            return Err(Error::Config(format!(
                "Root directory {} must be an absolute path",
                self.root_dir.display()
            )));
        }

        if self.database_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Database directory cannot be empty".to_string(),
            ));
        }

        if self.database_version.trim().is_empty() {
            return Err(Error::Config(
                "Database version label cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("width", self.thumbnail_max_width),
            ("height", self.thumbnail_max_height),
        ] {
            if value == 0 || value > MAX_THUMBNAIL_DIMENSION {
                return Err(Error::Config(format!(
                    "Thumbnail max {} must be between 1 and {} pixels, got {}",
                    name, MAX_THUMBNAIL_DIMENSION, value
                )));
            }
        }

        if self.backups_to_keep == 0 {
            return Err(Error::Config(
                "At least one backup archive must be kept".to_string(),
            ));
        }

        if self.analyse_videos && !self.video_cache_dir.is_absolute() {
            return Err(Error::Config(format!(
                "Video cache directory {} must be an absolute path",
                self.video_cache_dir.display()
            )));
        }

        if self.analyse_videos && self.video_cache_dir == self.root_dir {
            return Err(Error::Config(
                "Video cache directory must differ from the root directory".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`CatalogConfig`] instances.
#[derive(Debug, Default)]
pub struct CatalogConfigBuilder {
    root_dir: Option<PathBuf>,
    database_dir: Option<PathBuf>,
    database_version: Option<String>,
    batch_size: Option<usize>,
    thumbnail_max_width: Option<u32>,
    thumbnail_max_height: Option<u32>,
    hash_algorithms: HashAlgorithms,
    analyse_videos: bool,
    video_cache_dir: Option<PathBuf>,
    backups_to_keep: Option<usize>,
}

impl CatalogConfigBuilder {
    /// Sets the root directory to catalogue (required).
    pub fn root_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the database base directory (required).
    pub fn database_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_dir = Some(path.into());
        self
    }

    /// Sets the database layout version label.
    pub fn database_version(mut self, version: impl Into<String>) -> Self {
        self.database_version = Some(version.into());
        self
    }

    /// Sets the create/update budget per run. Zero disables mutations.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn thumbnail_max_width(mut self, width: u32) -> Self {
        self.thumbnail_max_width = Some(width);
        self
    }

    pub fn thumbnail_max_height(mut self, height: u32) -> Self {
        self.thumbnail_max_height = Some(height);
        self
    }

    pub fn hash_algorithms(mut self, algorithms: HashAlgorithms) -> Self {
        self.hash_algorithms = algorithms;
        self
    }

    /// Enables routing of video files through first-frame extraction.
    pub fn analyse_videos(mut self, enabled: bool) -> Self {
        self.analyse_videos = enabled;
        self
    }

    /// Sets the directory receiving extracted first frames.
    pub fn video_cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.video_cache_dir = Some(path.into());
        self
    }

    pub fn backups_to_keep(mut self, count: usize) -> Self {
        self.backups_to_keep = Some(count);
        self
    }

    /// Builds the final [`CatalogConfig`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when a required setting is missing or the
    /// resulting configuration fails validation.
    pub fn build(self) -> Result<CatalogConfig> {
        let root_dir = self.root_dir.ok_or_else(|| {
            Error::Config("Root directory is required. Call root_dir() on the builder.".to_string())
        })?;

        let database_dir = self.database_dir.ok_or_else(|| {
            Error::Config(
                "Database directory is required. Call database_dir() on the builder.".to_string(),
            )
        })?;

        let database_version = self
            .database_version
            .unwrap_or_else(|| DEFAULT_DATABASE_VERSION.to_string());

        let video_cache_dir = self.video_cache_dir.unwrap_or_else(|| {
            default_video_cache_dir(&database_dir, &database_version)
        });

        let config = CatalogConfig {
            root_dir,
            database_dir,
            database_version,
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            thumbnail_max_width: self
                .thumbnail_max_width
                .unwrap_or(DEFAULT_THUMBNAIL_MAX_WIDTH),
            thumbnail_max_height: self
                .thumbnail_max_height
                .unwrap_or(DEFAULT_THUMBNAIL_MAX_HEIGHT),
            hash_algorithms: self.hash_algorithms,
            analyse_videos: self.analyse_videos,
            video_cache_dir,
            backups_to_keep: self.backups_to_keep.unwrap_or(DEFAULT_BACKUPS_TO_KEEP),
        };

        config.validate()?;
        Ok(config)
    }
}

fn default_video_cache_dir(database_dir: &Path, version: &str) -> PathBuf {
    database_dir.join(version).join(DEFAULT_VIDEO_CACHE_DIR_NAME)
}

/// Serializable settings, typically read from a JSON file.
///
/// Every field is optional so partial files can rely on builder defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CatalogSettings {
    pub root_dir: Option<PathBuf>,
    pub database_dir: Option<PathBuf>,
    pub database_version: Option<String>,
    pub batch_size: Option<usize>,
    pub thumbnail_max_width: Option<u32>,
    pub thumbnail_max_height: Option<u32>,
    pub hash_algorithms: HashAlgorithms,
    pub analyse_videos: bool,
    pub video_cache_dir: Option<PathBuf>,
    pub backups_to_keep: Option<usize>,
}

impl CatalogSettings {
    /// Reads settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Settings {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&raw).map_err(|e| match e {
            Error::Settings { message, .. } => Error::Settings {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parses settings from a JSON string.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Settings {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }
}
