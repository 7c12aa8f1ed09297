//! Structural form of the persisted catalog
//!
//! A [`CatalogSnapshot`] is what ends up on disk after a flush and inside a
//! backup archive. Comparing two snapshots compares parsed records rather
//! than raw bytes.

use crate::blobs::{decode_folder_blobs, encode_folder_blobs, read_blob_dir, FolderBlobs};
use crate::error::{LibraryError, Result};
use crate::layout::{
    blob_file_name, parse_blob_file_name, DatabaseLayout, ASSETS_TABLE, BLOBS_DIR, FOLDERS_TABLE,
    TABLES_DIR,
};
use crate::models::{Asset, Folder, FolderId};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// Folders in path order
    pub folders: Vec<Folder>,
    /// Assets grouped by folder, in sequence order
    pub assets: Vec<Asset>,
    pub blobs: BTreeMap<FolderId, FolderBlobs>,
}

impl CatalogSnapshot {
    /// Read the flushed tables and blobs; missing files read as empty
    pub fn load(layout: &DatabaseLayout) -> Result<Self> {
        Ok(Self {
            folders: read_table(&layout.folders_table())?,
            assets: read_table(&layout.assets_table())?,
            blobs: read_blob_dir(&layout.blobs_dir())?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.assets.is_empty() && self.blobs.is_empty()
    }

    /// Rebuild a snapshot from archive entries (`name`, `bytes`).
    ///
    /// Entries outside the known layout are ignored.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let folders_entry = format!("{}/{}", TABLES_DIR, FOLDERS_TABLE);
        let assets_entry = format!("{}/{}", TABLES_DIR, ASSETS_TABLE);
        let blob_prefix = format!("{}/", BLOBS_DIR);

        let mut snapshot = Self::default();
        for (name, bytes) in entries {
            if name == folders_entry {
                snapshot.folders = decode_table(&bytes)?;
            } else if name == assets_entry {
                snapshot.assets = decode_table(&bytes)?;
            } else if let Some(folder_id) = name
                .strip_prefix(&blob_prefix)
                .and_then(parse_blob_file_name)
            {
                snapshot.blobs.insert(folder_id, decode_folder_blobs(&bytes)?);
            }
        }
        Ok(snapshot)
    }

    /// Archive entries (`name`, `bytes`) mirroring the on-disk layout
    pub fn to_entries(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut entries = vec![
            (
                format!("{}/{}", TABLES_DIR, FOLDERS_TABLE),
                encode_table(&self.folders)?,
            ),
            (
                format!("{}/{}", TABLES_DIR, ASSETS_TABLE),
                encode_table(&self.assets)?,
            ),
        ];
        for (folder_id, blobs) in &self.blobs {
            entries.push((
                format!("{}/{}", BLOBS_DIR, blob_file_name(folder_id)),
                encode_folder_blobs(blobs)?,
            ));
        }
        Ok(entries)
    }
}

pub(crate) fn encode_table<T: serde::Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(rows)?)
}

fn decode_table<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(crate) fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match fs::read(path) {
        Ok(bytes) => decode_table(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(LibraryError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    fn sample() -> CatalogSnapshot {
        let folder = Folder::new("/photos");
        let mut blobs = BTreeMap::new();
        blobs.insert(
            folder.id,
            FolderBlobs::from([("a.jpg".to_string(), vec![1, 2, 3])]),
        );
        CatalogSnapshot {
            assets: vec![fixtures::asset(folder.id, "a.jpg")],
            folders: vec![folder],
            blobs,
        }
    }

    #[test]
    fn test_entries_rebuild_equal_snapshot() {
        let snapshot = sample();
        let entries = snapshot.to_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "tables/folders.json");

        let rebuilt = CatalogSnapshot::from_entries(entries).unwrap();
        assert_eq!(rebuilt, snapshot);
    }

    #[test]
    fn test_blob_change_breaks_equality() {
        let snapshot = sample();
        let mut changed = snapshot.clone();
        let folder_id = changed.folders[0].id;
        changed
            .blobs
            .get_mut(&folder_id)
            .unwrap()
            .insert("a.jpg".to_string(), vec![4]);
        assert_ne!(snapshot, changed);
    }

    #[test]
    fn test_unknown_entries_ignored() {
        let entries = vec![("notes/readme.txt".to_string(), b"hello".to_vec())];
        let snapshot = CatalogSnapshot::from_entries(entries).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_corrupt_table_is_serialization_error() {
        let entries = vec![("tables/assets.json".to_string(), b"{oops".to_vec())];
        let err = CatalogSnapshot::from_entries(entries).unwrap_err();
        assert!(matches!(err, LibraryError::Serialization(_)));
    }
}
