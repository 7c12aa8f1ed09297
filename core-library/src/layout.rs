//! Versioned on-disk layout of the catalog database
//!
//! ```text
//! <base>/<version>/tables/folders.json
//! <base>/<version>/tables/assets.json
//! <base>/<version>/blobs/<folder-id>.bin
//! <base>/<version>_Backups/yyyyMMdd.zip
//! ```

use crate::error::{LibraryError, Result};
use crate::models::FolderId;
use core_runtime::CatalogConfig;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const TABLES_DIR: &str = "tables";
pub const BLOBS_DIR: &str = "blobs";
pub const FOLDERS_TABLE: &str = "folders.json";
pub const ASSETS_TABLE: &str = "assets.json";
pub const BLOB_EXTENSION: &str = "bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLayout {
    base_dir: PathBuf,
    version: String,
}

impl DatabaseLayout {
    pub fn new(base_dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            version: version.into(),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(&config.database_dir, &config.database_version)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `<base>/<version>`
    pub fn database_dir(&self) -> PathBuf {
        self.base_dir.join(&self.version)
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.database_dir().join(TABLES_DIR)
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.database_dir().join(BLOBS_DIR)
    }

    pub fn folders_table(&self) -> PathBuf {
        self.tables_dir().join(FOLDERS_TABLE)
    }

    pub fn assets_table(&self) -> PathBuf {
        self.tables_dir().join(ASSETS_TABLE)
    }

    pub fn blob_file(&self, folder_id: &FolderId) -> PathBuf {
        self.blobs_dir().join(blob_file_name(folder_id))
    }

    /// Sibling directory holding the dated archives
    pub fn backups_dir(&self) -> PathBuf {
        self.base_dir.join(format!("{}_Backups", self.version))
    }

    /// Create the tables and blobs directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.tables_dir(), self.blobs_dir()] {
            fs::create_dir_all(&dir).map_err(|e| LibraryError::io(&dir, e))?;
        }
        Ok(())
    }
}

pub fn blob_file_name(folder_id: &FolderId) -> String {
    format!("{}.{}", folder_id, BLOB_EXTENSION)
}

/// Parse `<folder-id>.bin` back into a folder id
pub fn parse_blob_file_name(name: &str) -> Option<FolderId> {
    let stem = name.strip_suffix(&format!(".{}", BLOB_EXTENSION))?;
    FolderId::from_string(stem).ok()
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers never observe a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| LibraryError::InvalidInput {
        field: "path".to_string(),
        message: format!("{} has no parent directory", path.display()),
    })?;
    fs::create_dir_all(dir).map_err(|e| LibraryError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| LibraryError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| LibraryError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| LibraryError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| LibraryError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = DatabaseLayout::new("/data/catalog", "v1.0");
        assert_eq!(layout.database_dir(), PathBuf::from("/data/catalog/v1.0"));
        assert_eq!(
            layout.folders_table(),
            PathBuf::from("/data/catalog/v1.0/tables/folders.json")
        );
        assert_eq!(
            layout.assets_table(),
            PathBuf::from("/data/catalog/v1.0/tables/assets.json")
        );
        assert_eq!(
            layout.backups_dir(),
            PathBuf::from("/data/catalog/v1.0_Backups")
        );
    }

    #[test]
    fn test_blob_file_name_round_trip() {
        let id = FolderId::new();
        let name = blob_file_name(&id);
        assert!(name.ends_with(".bin"));
        assert_eq!(parse_blob_file_name(&name), Some(id));
        assert_eq!(parse_blob_file_name("notes.txt"), None);
        assert_eq!(parse_blob_file_name("garbage.bin"), None);
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("file.json");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        let leftovers = fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = TempDir::new().unwrap();
        let layout = DatabaseLayout::new(dir.path(), "v2");
        layout.ensure_dirs().unwrap();
        assert!(layout.tables_dir().is_dir());
        assert!(layout.blobs_dir().is_dir());
    }
}
