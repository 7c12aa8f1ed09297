//! Thumbnail blob storage
//!
//! Thumbnails are grouped per folder (file name -> JPEG bytes) and persisted
//! as one MessagePack file per folder.

use crate::error::{LibraryError, Result};
use crate::layout::{parse_blob_file_name, write_atomic, DatabaseLayout};
use crate::models::FolderId;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// File name -> thumbnail bytes for a single folder
pub type FolderBlobs = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Default)]
pub struct BlobStore {
    folders: BTreeMap<FolderId, FolderBlobs>,
    dirty: BTreeSet<FolderId>,
    removed: BTreeSet<FolderId>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<folder-id>.bin` under the layout's blobs directory
    pub fn load(layout: &DatabaseLayout) -> Result<Self> {
        Ok(Self {
            folders: read_blob_dir(&layout.blobs_dir())?,
            ..Self::default()
        })
    }

    pub fn put(&mut self, folder_id: FolderId, file_name: impl Into<String>, bytes: Vec<u8>) {
        self.folders
            .entry(folder_id)
            .or_default()
            .insert(file_name.into(), bytes);
        self.removed.remove(&folder_id);
        self.dirty.insert(folder_id);
    }

    pub fn get(&self, folder_id: &FolderId, file_name: &str) -> Option<&[u8]> {
        self.folders
            .get(folder_id)
            .and_then(|blobs| blobs.get(file_name))
            .map(Vec::as_slice)
    }

    /// Remove one thumbnail, returning its bytes if it existed
    pub fn remove(&mut self, folder_id: &FolderId, file_name: &str) -> Option<Vec<u8>> {
        let removed = self.folders.get_mut(folder_id)?.remove(file_name);
        if removed.is_some() {
            self.dirty.insert(*folder_id);
        }
        removed
    }

    /// Drop every thumbnail of a folder; its blob file is deleted at flush
    pub fn remove_folder(&mut self, folder_id: &FolderId) {
        self.folders.remove(folder_id);
        self.dirty.remove(folder_id);
        self.removed.insert(*folder_id);
    }

    pub fn folder(&self, folder_id: &FolderId) -> Option<&FolderBlobs> {
        self.folders.get(folder_id)
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty() || !self.removed.is_empty()
    }

    /// Write dirty folders and delete blob files of removed folders.
    ///
    /// Returns the number of blob files written.
    pub fn flush(&mut self, layout: &DatabaseLayout) -> Result<usize> {
        let mut written = 0;
        for folder_id in &self.dirty {
            let bytes = match self.folders.get(folder_id) {
                Some(blobs) => encode_folder_blobs(blobs)?,
                None => encode_folder_blobs(&FolderBlobs::new())?,
            };
            write_atomic(&layout.blob_file(folder_id), &bytes)?;
            written += 1;
        }

        for folder_id in &self.removed {
            let path = layout.blob_file(folder_id);
            match fs::remove_file(&path) {
                Ok(()) => debug!(folder_id = %folder_id, "Removed blob file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(LibraryError::io(&path, e)),
            }
        }

        self.dirty.clear();
        self.removed.clear();
        Ok(written)
    }
}

/// Read all blob files from a directory; a missing directory is empty
pub fn read_blob_dir(dir: &Path) -> Result<BTreeMap<FolderId, FolderBlobs>> {
    let mut folders = BTreeMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(folders),
        Err(e) => return Err(LibraryError::io(dir, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| LibraryError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(folder_id) = parse_blob_file_name(&name) else {
            continue;
        };
        let bytes = fs::read(entry.path()).map_err(|e| LibraryError::io(entry.path(), e))?;
        folders.insert(folder_id, decode_folder_blobs(&bytes)?);
    }

    Ok(folders)
}

pub fn decode_folder_blobs(bytes: &[u8]) -> Result<FolderBlobs> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn encode_folder_blobs(blobs: &FolderBlobs) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(blobs)?)
}
