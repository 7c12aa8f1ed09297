//! In-memory catalog tables with dirty tracking
//!
//! `CatalogStore` owns the folder arena, the per-folder asset sequences and
//! the [`BlobStore`]. Every mutation reports what changed and marks the store
//! dirty; [`CatalogStore::flush`] persists everything and clears the flag.

use crate::blobs::BlobStore;
use crate::error::{LibraryError, Result};
use crate::layout::{write_atomic, DatabaseLayout};
use crate::models::{Asset, Folder, FolderId};
use crate::snapshot::{encode_table, read_table};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of [`CatalogStore::upsert_folder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderMutation {
    Created(Folder),
    Existing(Folder),
}

impl FolderMutation {
    pub fn folder(&self) -> &Folder {
        match self {
            FolderMutation::Created(folder) | FolderMutation::Existing(folder) => folder,
        }
    }

    pub fn into_folder(self) -> Folder {
        match self {
            FolderMutation::Created(folder) | FolderMutation::Existing(folder) => folder,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, FolderMutation::Created(_))
    }
}

/// Result of [`CatalogStore::upsert_asset`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetMutation {
    Created(Asset),
    Updated { previous: Asset, current: Asset },
}

impl AssetMutation {
    pub fn asset(&self) -> &Asset {
        match self {
            AssetMutation::Created(asset) => asset,
            AssetMutation::Updated { current, .. } => current,
        }
    }
}

/// A folder removed by [`CatalogStore::delete_folder`] together with its assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedFolder {
    pub folder: Folder,
    pub assets: Vec<Asset>,
}

/// A folder with its assets in sequence order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderListing {
    pub folder: Folder,
    pub assets: Vec<Asset>,
}

/// Result of [`CatalogStore::flush`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was dirty, no file was touched
    Unchanged,
    Written {
        folders: usize,
        assets: usize,
        blob_files: usize,
    },
}

#[derive(Debug)]
pub struct CatalogStore {
    layout: DatabaseLayout,
    folders: BTreeMap<FolderId, Folder>,
    by_path: BTreeMap<PathBuf, FolderId>,
    assets: BTreeMap<FolderId, Vec<Asset>>,
    blobs: BlobStore,
    dirty: bool,
}

impl CatalogStore {
    /// Empty store bound to `layout`; nothing is read from disk
    pub fn new(layout: DatabaseLayout) -> Self {
        Self {
            layout,
            folders: BTreeMap::new(),
            by_path: BTreeMap::new(),
            assets: BTreeMap::new(),
            blobs: BlobStore::new(),
            dirty: false,
        }
    }

    /// Load previously flushed tables and blobs. A missing database is an
    /// empty catalog.
    pub fn open(layout: DatabaseLayout) -> Result<Self> {
        let folders: Vec<Folder> = read_table(&layout.folders_table())?;
        let assets: Vec<Asset> = read_table(&layout.assets_table())?;
        let blobs = BlobStore::load(&layout)?;

        let mut store = Self::new(layout);
        store.blobs = blobs;
        for folder in folders {
            store.by_path.insert(folder.path.clone(), folder.id);
            store.folders.insert(folder.id, folder);
        }
        for asset in assets {
            if !store.folders.contains_key(&asset.folder_id) {
                return Err(LibraryError::folder_not_found(asset.folder_id));
            }
            store.assets.entry(asset.folder_id).or_default().push(asset);
        }

        info!(
            folders = store.folders.len(),
            assets = store.asset_count(),
            "Catalog loaded"
        );
        Ok(store)
    }

    pub fn layout(&self) -> &DatabaseLayout {
        &self.layout
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn blobs_mut(&mut self) -> &mut BlobStore {
        &mut self.blobs
    }

    // -------------------------------------------------------------------------
    // Folders
    // -------------------------------------------------------------------------

    pub fn get_folder(&self, id: &FolderId) -> Option<&Folder> {
        self.folders.get(id)
    }

    pub fn get_folder_by_path(&self, path: &Path) -> Option<&Folder> {
        self.by_path.get(path).and_then(|id| self.folders.get(id))
    }

    /// All folders in path order
    pub fn folders(&self) -> impl Iterator<Item = &Folder> {
        self.by_path.values().filter_map(|id| self.folders.get(id))
    }

    /// Return the folder for `path`, creating it if it is not catalogued yet
    pub fn upsert_folder(&mut self, path: impl Into<PathBuf>) -> Result<FolderMutation> {
        let path = path.into();
        if let Some(folder) = self.get_folder_by_path(&path) {
            return Ok(FolderMutation::Existing(folder.clone()));
        }

        let folder = Folder::new(path);
        folder
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "path".to_string(),
                message,
            })?;

        debug!(folder_id = %folder.id, path = %folder.path.display(), "Folder created");
        self.by_path.insert(folder.path.clone(), folder.id);
        self.folders.insert(folder.id, folder.clone());
        self.dirty = true;
        Ok(FolderMutation::Created(folder))
    }

    /// Alias of [`upsert_folder`](Self::upsert_folder)
    pub fn create_folder(&mut self, path: impl Into<PathBuf>) -> Result<FolderMutation> {
        self.upsert_folder(path)
    }

    /// Remove a folder and every folder below it, cascading to their assets
    /// and thumbnails. Deepest folders come first in the result.
    pub fn delete_folder(&mut self, id: &FolderId) -> Result<Vec<RemovedFolder>> {
        let root = self
            .folders
            .get(id)
            .map(|folder| folder.path.clone())
            .ok_or_else(|| LibraryError::folder_not_found(id))?;

        let doomed: Vec<FolderId> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.starts_with(&root))
            .map(|(_, id)| *id)
            .rev()
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for folder_id in doomed {
            let Some(folder) = self.folders.remove(&folder_id) else {
                continue;
            };
            self.by_path.remove(&folder.path);
            let assets = self.assets.remove(&folder_id).unwrap_or_default();
            self.blobs.remove_folder(&folder_id);
            debug!(
                folder_id = %folder_id,
                assets = assets.len(),
                "Folder deleted"
            );
            removed.push(RemovedFolder { folder, assets });
        }

        self.dirty = true;
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Assets
    // -------------------------------------------------------------------------

    /// Assets of a folder in sequence order
    pub fn folder_assets(&self, folder_id: &FolderId) -> &[Asset] {
        self.assets
            .get(folder_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find_asset(&self, folder_id: &FolderId, file_name: &str) -> Option<&Asset> {
        self.folder_assets(folder_id)
            .iter()
            .find(|asset| asset.file_name == file_name)
    }

    pub fn asset_count(&self) -> usize {
        self.assets.values().map(Vec::len).sum()
    }

    /// Insert an asset, or replace the one with the same file name. Either
    /// way the asset ends up last in its folder's sequence.
    pub fn upsert_asset(&mut self, mut asset: Asset) -> Result<AssetMutation> {
        if !self.folders.contains_key(&asset.folder_id) {
            return Err(LibraryError::folder_not_found(asset.folder_id));
        }
        asset
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "asset".to_string(),
                message,
            })?;
        asset.image_data = None;

        let sequence = self.assets.entry(asset.folder_id).or_default();
        let previous = sequence
            .iter()
            .position(|existing| existing.file_name == asset.file_name)
            .map(|index| sequence.remove(index));
        sequence.push(asset.clone());
        self.dirty = true;

        Ok(match previous {
            Some(previous) => AssetMutation::Updated {
                previous,
                current: asset,
            },
            None => AssetMutation::Created(asset),
        })
    }

    /// Remove an asset and its thumbnail
    pub fn delete_asset(&mut self, folder_id: &FolderId, file_name: &str) -> Option<Asset> {
        let sequence = self.assets.get_mut(folder_id)?;
        let index = sequence
            .iter()
            .position(|asset| asset.file_name == file_name)?;
        let asset = sequence.remove(index);
        self.blobs.remove(folder_id, file_name);
        self.dirty = true;
        Some(asset)
    }

    /// Folders at or below `path`, in path order, with their assets
    pub fn list_folders_and_assets_by_path(&self, path: &Path) -> Vec<FolderListing> {
        self.folders()
            .filter(|folder| folder.is_within(path))
            .map(|folder| FolderListing {
                folder: folder.clone(),
                assets: self.folder_assets(&folder.id).to_vec(),
            })
            .collect()
    }

    /// Assets of the folder at `path` with `image_data` filled from the blob
    /// store
    pub fn load_folder_view(&self, path: &Path) -> Result<Vec<Asset>> {
        let folder = self
            .get_folder_by_path(path)
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Folder".to_string(),
                id: path.display().to_string(),
            })?;

        Ok(self
            .folder_assets(&folder.id)
            .iter()
            .map(|asset| {
                let mut asset = asset.clone();
                asset.image_data = self
                    .blobs
                    .get(&folder.id, &asset.file_name)
                    .map(<[u8]>::to_vec);
                asset
            })
            .collect())
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    pub fn has_changes(&self) -> bool {
        self.dirty || self.blobs.has_changes()
    }

    /// Persist tables and blobs. The dirty flag is cleared only after every
    /// file has been written.
    pub fn flush(&mut self) -> Result<FlushOutcome> {
        if !self.has_changes() {
            return Ok(FlushOutcome::Unchanged);
        }

        self.layout.ensure_dirs()?;
        let blob_files = self.blobs.flush(&self.layout)?;

        let (folders, assets) = {
            let folders: Vec<&Folder> = self.folders().collect();
            let assets: Vec<&Asset> = folders
                .iter()
                .flat_map(|folder| self.folder_assets(&folder.id))
                .collect();

            write_atomic(&self.layout.folders_table(), &encode_table(&folders)?)?;
            write_atomic(&self.layout.assets_table(), &encode_table(&assets)?)?;
            (folders.len(), assets.len())
        };

        self.dirty = false;
        info!(folders, assets, blob_files, "Catalog flushed");
        Ok(FlushOutcome::Written {
            folders,
            assets,
            blob_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use crate::snapshot::CatalogSnapshot;
    use tempfile::TempDir;

    fn store() -> (TempDir, CatalogStore) {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::new(DatabaseLayout::new(dir.path(), "v1.0"));
        (dir, store)
    }

    #[test]
    fn test_upsert_folder_is_idempotent() {
        let (_dir, mut store) = store();
        let created = store.upsert_folder("/photos").unwrap();
        assert!(created.is_created());
        assert!(store.has_changes());

        let existing = store.upsert_folder("/photos").unwrap();
        assert!(!existing.is_created());
        assert_eq!(created.folder().id, existing.folder().id);
        assert_eq!(store.folders().count(), 1);
    }

    #[test]
    fn test_upsert_folder_rejects_relative_path() {
        let (_dir, mut store) = store();
        assert!(matches!(
            store.upsert_folder("photos"),
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_upsert_asset_requires_folder() {
        let (_dir, mut store) = store();
        let err = store
            .upsert_asset(fixtures::asset(FolderId::new(), "a.jpg"))
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn test_update_moves_asset_to_end() {
        let (_dir, mut store) = store();
        let folder = store.upsert_folder("/photos").unwrap().into_folder();

        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            let mutation = store.upsert_asset(fixtures::asset(folder.id, name)).unwrap();
            assert!(matches!(mutation, AssetMutation::Created(_)));
        }

        let mut changed = fixtures::asset(folder.id, "a.jpg");
        changed.hash = "b".repeat(64);
        let mutation = store.upsert_asset(changed).unwrap();
        match mutation {
            AssetMutation::Updated { previous, current } => {
                assert_eq!(previous.hash, "a".repeat(64));
                assert_eq!(current.hash, "b".repeat(64));
            }
            other => panic!("expected update, got {:?}", other),
        }

        let names: Vec<_> = store
            .folder_assets(&folder.id)
            .iter()
            .map(|a| a.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["b.jpg", "c.jpg", "a.jpg"]);
    }

    #[test]
    fn test_delete_asset_drops_thumbnail() {
        let (_dir, mut store) = store();
        let folder = store.upsert_folder("/photos").unwrap().into_folder();
        store.blobs_mut().put(folder.id, "a.jpg", vec![1, 2]);
        store.upsert_asset(fixtures::asset(folder.id, "a.jpg")).unwrap();

        let removed = store.delete_asset(&folder.id, "a.jpg").unwrap();
        assert_eq!(removed.file_name, "a.jpg");
        assert!(store.blobs().get(&folder.id, "a.jpg").is_none());
        assert!(store.delete_asset(&folder.id, "a.jpg").is_none());
    }

    #[test]
    fn test_delete_folder_cascades() {
        let (_dir, mut store) = store();
        let root = store.upsert_folder("/photos").unwrap().into_folder();
        let child = store.upsert_folder("/photos/2024").unwrap().into_folder();
        let sibling = store.upsert_folder("/photos-old").unwrap().into_folder();
        store.upsert_asset(fixtures::asset(root.id, "a.jpg")).unwrap();
        store.upsert_asset(fixtures::asset(child.id, "b.jpg")).unwrap();

        let removed = store.delete_folder(&root.id).unwrap();
        let paths: Vec<_> = removed.iter().map(|r| r.folder.path.clone()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/photos/2024"), PathBuf::from("/photos")]
        );
        assert_eq!(removed[0].assets.len(), 1);
        assert_eq!(removed[1].assets.len(), 1);

        assert!(store.get_folder(&sibling.id).is_some());
        assert!(store.get_folder_by_path(Path::new("/photos")).is_none());
        assert_eq!(store.asset_count(), 0);
    }

    #[test]
    fn test_list_folders_and_assets_by_path() {
        let (_dir, mut store) = store();
        let root = store.upsert_folder("/photos").unwrap().into_folder();
        store.upsert_folder("/photos/b").unwrap();
        store.upsert_folder("/photos/a").unwrap();
        store.upsert_folder("/elsewhere").unwrap();
        store.upsert_asset(fixtures::asset(root.id, "x.jpg")).unwrap();

        let listing = store.list_folders_and_assets_by_path(Path::new("/photos"));
        let paths: Vec<_> = listing.iter().map(|l| l.folder.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/photos"),
                PathBuf::from("/photos/a"),
                PathBuf::from("/photos/b")
            ]
        );
        assert_eq!(listing[0].assets.len(), 1);
    }

    #[test]
    fn test_flush_then_open_round_trip() {
        let (dir, mut store) = store();
        let folder = store.upsert_folder("/photos").unwrap().into_folder();
        store.blobs_mut().put(folder.id, "a.jpg", vec![5; 10]);
        store.upsert_asset(fixtures::asset(folder.id, "a.jpg")).unwrap();
        store.upsert_asset(fixtures::asset(folder.id, "b.jpg")).unwrap();

        let outcome = store.flush().unwrap();
        assert_eq!(
            outcome,
            FlushOutcome::Written {
                folders: 1,
                assets: 2,
                blob_files: 1
            }
        );
        assert!(!store.has_changes());
        assert_eq!(store.flush().unwrap(), FlushOutcome::Unchanged);

        let reopened = CatalogStore::open(DatabaseLayout::new(dir.path(), "v1.0")).unwrap();
        assert_eq!(reopened.folders().count(), 1);
        assert_eq!(reopened.folder_assets(&folder.id).len(), 2);
        assert!(!reopened.has_changes());

        let snapshot = CatalogSnapshot::load(reopened.layout()).unwrap();
        assert_eq!(snapshot.assets.len(), 2);
        assert_eq!(snapshot.blobs[&folder.id]["a.jpg"], vec![5; 10]);
    }

    #[test]
    fn test_load_folder_view_populates_image_data() {
        let (_dir, mut store) = store();
        let folder = store.upsert_folder("/photos").unwrap().into_folder();
        store.blobs_mut().put(folder.id, "a.jpg", vec![3, 3, 3]);
        store.upsert_asset(fixtures::asset(folder.id, "a.jpg")).unwrap();

        let view = store.load_folder_view(Path::new("/photos")).unwrap();
        assert_eq!(view[0].image_data.as_deref(), Some(&[3u8, 3, 3][..]));

        // Stored records stay free of image data
        assert!(store.folder_assets(&folder.id)[0].image_data.is_none());
        assert!(store.load_folder_view(Path::new("/missing")).is_err());
    }
}
