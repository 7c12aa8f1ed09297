//! Domain models for the photo catalog
//!
//! Folders live in an arena keyed by [`FolderId`]; assets reference their
//! owning folder by key rather than by pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(pub Uuid);

impl FolderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for FolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Folder
// =============================================================================

/// A catalogued directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Unique identifier
    pub id: FolderId,
    /// Absolute path on disk, unique across the catalog
    pub path: PathBuf,
}

impl Folder {
    /// Create a new folder record for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: FolderId::new(),
            path: path.into(),
        }
    }

    /// Last path component, or the full path for filesystem roots
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Whether this folder is `path` or lives below it
    pub fn is_within(&self, path: &Path) -> bool {
        self.path.starts_with(path)
    }

    /// Validate folder data
    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("Folder path cannot be empty".to_string());
        }

        if !self.path.is_absolute() {
            return Err(format!(
                "Folder path {} must be absolute",
                self.path.display()
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Asset
// =============================================================================

/// Width and height in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// File-system properties captured when the asset was fingerprinted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    /// Size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// Drives change detection on later runs
    pub modified_at: DateTime<Utc>,
}

/// Clockwise rotation needed to display the image upright
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Map an EXIF orientation tag value onto a rotation.
    ///
    /// Mirrored orientations (2, 4, 5, 7) are treated as upright.
    pub fn from_exif_orientation(orientation: u32) -> Self {
        match orientation {
            3 => Rotation::Clockwise180,
            6 => Rotation::Clockwise90,
            8 => Rotation::Clockwise270,
            _ => Rotation::None,
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }

    pub fn is_rotated(&self) -> bool {
        *self != Rotation::None
    }
}

/// Boolean marker with an optional diagnostic message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFlag {
    pub active: bool,
    pub message: Option<String>,
}

impl AssetFlag {
    pub fn raised(message: impl Into<String>) -> Self {
        Self {
            active: true,
            message: Some(message.into()),
        }
    }
}

pub const ROTATED_MESSAGE: &str = "The asset has been rotated";

/// A catalogued image file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Owning folder
    pub folder_id: FolderId,
    /// File name within the folder
    pub file_name: String,
    /// SHA-256 of the file content, lowercase hex
    pub hash: String,
    pub pixel_size: Dimensions,
    pub thumbnail_size: Dimensions,
    pub file_properties: FileProperties,
    pub thumbnail_created_at: DateTime<Utc>,
    pub rotation: Rotation,
    pub rotated: AssetFlag,
    pub corrupted: AssetFlag,
    /// Thumbnail bytes, only populated for the folder currently being viewed
    #[serde(skip)]
    pub image_data: Option<Vec<u8>>,
}

impl Asset {
    /// Full path of the backing file
    pub fn full_path(&self, folder: &Folder) -> PathBuf {
        folder.path.join(&self.file_name)
    }

    /// Whether the file on disk has been modified since it was catalogued
    pub fn is_stale(&self, modified_at: &DateTime<Utc>) -> bool {
        self.file_properties.modified_at != *modified_at
    }

    /// Set rotation and keep the rotated flag consistent with it
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self.rotated = if rotation.is_rotated() {
            AssetFlag::raised(ROTATED_MESSAGE)
        } else {
            AssetFlag::default()
        };
        self
    }

    /// Validate asset data
    pub fn validate(&self) -> Result<(), String> {
        if self.file_name.trim().is_empty() {
            return Err("Asset file name cannot be empty".to_string());
        }

        if self.file_name.contains('/') || self.file_name.contains('\\') {
            return Err(format!(
                "Asset file name {} must not contain path separators",
                self.file_name
            ));
        }

        if self.hash.len() != 64 || !self.hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("Asset hash must be a 64 character hex digest".to_string());
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_folder_id_round_trip() {
        let id = FolderId::new();
        let parsed = FolderId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(FolderId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_folder_name_and_containment() {
        let folder = Folder::new("/photos/2024/beach");
        assert_eq!(folder.name(), "beach");
        assert!(folder.is_within(Path::new("/photos")));
        assert!(folder.is_within(Path::new("/photos/2024/beach")));
        assert!(!folder.is_within(Path::new("/photos/2024/bea")));
    }

    #[test]
    fn test_folder_validation() {
        assert!(Folder::new("/photos").validate().is_ok());
        assert!(Folder::new("").validate().is_err());
        assert!(Folder::new("relative/dir").validate().is_err());
    }

    #[test]
    fn test_rotation_from_exif() {
        assert_eq!(Rotation::from_exif_orientation(1), Rotation::None);
        assert_eq!(Rotation::from_exif_orientation(3).degrees(), 180);
        assert_eq!(Rotation::from_exif_orientation(6).degrees(), 90);
        assert_eq!(Rotation::from_exif_orientation(8).degrees(), 270);
        assert_eq!(Rotation::from_exif_orientation(5), Rotation::None);
    }

    #[test]
    fn test_with_rotation_sets_flag() {
        let asset = fixtures::asset(FolderId::new(), "a.jpg").with_rotation(Rotation::Clockwise90);
        assert!(asset.rotated.active);
        assert_eq!(asset.rotated.message.as_deref(), Some(ROTATED_MESSAGE));

        let upright = asset.with_rotation(Rotation::None);
        assert!(!upright.rotated.active);
        assert!(upright.rotated.message.is_none());
    }

    #[test]
    fn test_is_stale() {
        let asset = fixtures::asset(FolderId::new(), "a.jpg");
        let modified = asset.file_properties.modified_at;
        assert!(!asset.is_stale(&modified));
        assert!(asset.is_stale(&(modified + Duration::seconds(1))));
    }

    #[test]
    fn test_asset_validation() {
        let folder_id = FolderId::new();
        assert!(fixtures::asset(folder_id, "a.jpg").validate().is_ok());
        assert!(fixtures::asset(folder_id, " ").validate().is_err());
        assert!(fixtures::asset(folder_id, "x/a.jpg").validate().is_err());

        let mut bad_hash = fixtures::asset(folder_id, "a.jpg");
        bad_hash.hash = "xyz".to_string();
        assert!(bad_hash.validate().is_err());
    }

    #[test]
    fn test_image_data_is_not_serialized() {
        let mut asset = fixtures::asset(FolderId::new(), "a.jpg");
        asset.image_data = Some(vec![1, 2, 3]);
        let json = serde_json::to_string(&asset).unwrap();
        assert!(!json.contains("image_data"));

        let restored: Asset = serde_json::from_str(&json).unwrap();
        assert!(restored.image_data.is_none());
    }
}
