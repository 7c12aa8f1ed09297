//! # Catalog Synchronization Engine
//!
//! Reconciles the directory tree under the configured root with the
//! persisted catalog.
//!
//! ## Run outline
//!
//! 1. Root missing: purge its records, then go straight to the backup.
//!    Otherwise make sure the root folder is catalogued (silently).
//! 2. Cancelled already: skip the walk.
//! 3. Walk every directory in path order (plus the video frame cache when
//!    video analysis is on). Each folder is diffed against the catalog:
//!    removed files are deleted, changed files re-fingerprinted, new files
//!    fingerprinted, videos routed to the frame extractor. Creates and
//!    updates are capped by the batch size.
//! 4. `FolderInspectionCompleted`.
//! 5. Flush, unless cancelled.
//! 6. Backup snapshot.
//! 7. `CatalogProcessEnded`.
//!
//! A directory-level failure emits `CatalogProcessFailed` and jumps straight
//! to `CatalogProcessEnded`, skipping flush and backup.
//!
//! ## Concurrency
//!
//! One run at a time per engine. The catalog sits behind a
//! `tokio::sync::Mutex`; a second caller gets [`SyncError::SyncInProgress`]
//! instead of waiting. Cancellation is observed before the walk and between
//! folders only.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::{CatalogConfig, EventLog};
//! use core_sync::{CatalogEvent, CatalogSyncEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = CatalogConfig::builder()
//!     .root_dir("/home/ana/Pictures")
//!     .database_dir("/home/ana/.catalog")
//!     .build()?;
//! let engine = CatalogSyncEngine::open(config)?;
//!
//! let events: EventLog<CatalogEvent> = EventLog::new();
//! let summary = engine.synchronize(&events, &CancellationToken::new()).await?;
//! println!("{} assets added", summary.assets_created);
//! ```

use crate::backup::{BackupOutcome, BackupSnapshotter};
use crate::error::{Result, SyncError};
use crate::events::CatalogEvent;
use chrono::{DateTime, Utc};
use core_library::{
    AssetMutation, CatalogStore, DatabaseLayout, Folder, FolderMutation, RemovedFolder,
};
use core_metadata::{
    classify, AssetFingerprinter, FingerprintOutcome, MediaKind, VideoFrameExtractor,
};
use core_runtime::{logging::path_label, CatalogConfig, EventSink};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    Cancelled,
    /// The root directory no longer exists
    RootMissing,
    Failed(String),
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub outcome: SyncOutcome,
    pub folders_visited: usize,
    pub folders_created: usize,
    pub folders_deleted: usize,
    pub assets_created: usize,
    pub assets_updated: usize,
    pub assets_deleted: usize,
    pub assets_not_created: usize,
    pub frames_extracted: usize,
    /// Whether the catalog was written to disk
    pub flushed: bool,
    pub backup: Option<BackupOutcome>,
}

impl SyncSummary {
    fn new() -> Self {
        Self {
            outcome: SyncOutcome::Completed,
            folders_visited: 0,
            folders_created: 0,
            folders_deleted: 0,
            assets_created: 0,
            assets_updated: 0,
            assets_deleted: 0,
            assets_not_created: 0,
            frames_extracted: 0,
            flushed: false,
            backup: None,
        }
    }

    pub fn mutations(&self) -> usize {
        self.assets_created + self.assets_updated
    }
}

/// How the folder walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkEnd {
    Finished,
    Cancelled,
}

/// Per-run bookkeeping
struct Run<'a> {
    events: &'a dyn EventSink<CatalogEvent>,
    summary: SyncSummary,
    /// Remaining create/update budget
    budget: usize,
}

impl<'a> Run<'a> {
    fn emit(&self, event: CatalogEvent) {
        debug!(event = event.description(), "Catalog event");
        self.events.publish(event);
    }

    /// Emit deletions for folders removed with cascade
    fn emit_removed(&mut self, removed: Vec<RemovedFolder>) {
        for RemovedFolder { folder, assets } in removed {
            for (index, asset) in assets.iter().enumerate() {
                self.summary.assets_deleted += 1;
                self.emit(CatalogEvent::AssetDeleted {
                    asset: asset.clone(),
                    folder_assets: assets[index + 1..].to_vec(),
                    corrupted: false,
                });
            }
            self.summary.folders_deleted += 1;
            self.emit(CatalogEvent::FolderDeleted { folder });
        }
    }
}

/// A regular file found while listing a folder
struct ListedFile {
    name: String,
    kind: MediaKind,
    modified_at: DateTime<Utc>,
}

/// Contents of one folder
struct Listing {
    files: Vec<ListedFile>,
    /// Entries present in the directory whose metadata could not be read
    unreadable: HashSet<String>,
}

pub struct CatalogSyncEngine {
    config: CatalogConfig,
    store: Mutex<CatalogStore>,
    fingerprinter: AssetFingerprinter,
    frame_extractor: VideoFrameExtractor,
    backup: BackupSnapshotter,
}

impl CatalogSyncEngine {
    /// Open the catalog described by `config` with the default decoder and
    /// the ffmpeg frame grabber
    pub fn open(config: CatalogConfig) -> Result<Self> {
        config.validate()?;
        let layout = DatabaseLayout::from_config(&config);
        let store = CatalogStore::open(layout)?;
        let fingerprinter = AssetFingerprinter::from_config(&config);
        Ok(Self::new(
            config,
            store,
            fingerprinter,
            VideoFrameExtractor::with_ffmpeg(),
        ))
    }

    pub fn new(
        config: CatalogConfig,
        store: CatalogStore,
        fingerprinter: AssetFingerprinter,
        frame_extractor: VideoFrameExtractor,
    ) -> Self {
        let backup = BackupSnapshotter::new(store.layout().clone(), config.backups_to_keep);
        Self {
            config,
            store: Mutex::new(store),
            fingerprinter,
            frame_extractor,
            backup,
        }
    }

    pub fn with_fingerprinter(mut self, fingerprinter: AssetFingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    pub fn with_frame_extractor(mut self, frame_extractor: VideoFrameExtractor) -> Self {
        self.frame_extractor = frame_extractor;
        self
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn backup(&self) -> &BackupSnapshotter {
        &self.backup
    }

    /// Lock the catalog for inspection. Waits for a running sync to finish.
    pub async fn catalog(&self) -> MutexGuard<'_, CatalogStore> {
        self.store.lock().await
    }

    /// Run one synchronization pass.
    ///
    /// Progress is reported through `events`; the stream always ends with
    /// `CatalogProcessEnded`. The only error is
    /// [`SyncError::SyncInProgress`]; every other failure is reported as an
    /// event and in the summary's outcome.
    #[instrument(skip(self, events, cancel), fields(root = %path_label(&self.config.root_dir)))]
    pub async fn synchronize(
        &self,
        events: &dyn EventSink<CatalogEvent>,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary> {
        let mut store = self
            .store
            .try_lock()
            .map_err(|_| SyncError::SyncInProgress {
                root: self.config.root_dir.display().to_string(),
            })?;

        let mut run = Run {
            events,
            summary: SyncSummary::new(),
            budget: self.config.batch_size,
        };

        info!(batch_size = self.config.batch_size, "Catalog synchronization started");
        if let Err(e) = self.run(&mut store, &mut run, cancel).await {
            error!(error = %e, "Catalog synchronization failed");
            run.summary.outcome = SyncOutcome::Failed(e.to_string());
            run.emit(CatalogEvent::CatalogProcessFailed {
                error: e.to_string(),
            });
        }
        run.emit(CatalogEvent::CatalogProcessEnded);

        info!(
            outcome = ?run.summary.outcome,
            created = run.summary.assets_created,
            updated = run.summary.assets_updated,
            deleted = run.summary.assets_deleted,
            flushed = run.summary.flushed,
            "Catalog synchronization ended"
        );
        Ok(run.summary)
    }

    /// Steps 1 to 6. An `Err` aborts the run before flush and backup.
    async fn run(
        &self,
        store: &mut CatalogStore,
        run: &mut Run<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let root = self.config.root_dir.clone();

        if !is_dir(&root).await {
            warn!("Root directory is missing");
            if let Some(folder) = store.get_folder_by_path(&root).map(|f| f.id) {
                let removed = store.delete_folder(&folder)?;
                run.emit_removed(removed);
            }
            run.summary.outcome = SyncOutcome::RootMissing;
            run.summary.backup = Some(self.backup.run(run.events).await?);
            return Ok(());
        }

        // The root never produces a FolderCreated event
        store.upsert_folder(&root)?;

        let walk_end = if cancel.is_cancelled() {
            info!("Cancelled before the walk started");
            WalkEnd::Cancelled
        } else {
            self.walk(store, run, cancel).await?
        };

        run.emit(CatalogEvent::FolderInspectionCompleted);

        if walk_end == WalkEnd::Cancelled {
            run.summary.outcome = SyncOutcome::Cancelled;
        } else {
            store.flush()?;
            run.summary.flushed = true;
        }

        run.summary.backup = Some(self.backup.run(run.events).await?);
        Ok(())
    }

    async fn walk(
        &self,
        store: &mut CatalogStore,
        run: &mut Run<'_>,
        cancel: &CancellationToken,
    ) -> Result<WalkEnd> {
        let directories = self.enumerate_directories().await?;
        debug!(count = directories.len(), "Directories enumerated");

        for directory in &directories {
            if cancel.is_cancelled() {
                info!(
                    visited = run.summary.folders_visited,
                    "Cancelled between folders"
                );
                return Ok(WalkEnd::Cancelled);
            }
            self.visit_folder(store, run, directory).await?;
        }

        self.purge_vanished_folders(store, run, &directories)?;
        Ok(WalkEnd::Finished)
    }

    /// Root and every directory below it, plus the frame cache when video
    /// analysis is on, sorted by path
    async fn enumerate_directories(&self) -> Result<Vec<PathBuf>> {
        let mut roots = vec![self.config.root_dir.clone()];
        if self.config.analyse_videos {
            let cache = &self.config.video_cache_dir;
            tokio::fs::create_dir_all(cache)
                .await
                .map_err(|e| SyncError::directory(cache, e))?;
            roots.push(cache.clone());
        }

        tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut directories = BTreeSet::new();
            for root in roots {
                for entry in WalkDir::new(&root).follow_links(false) {
                    let entry = entry.map_err(|e| {
                        let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                        SyncError::directory(path, e)
                    })?;
                    if entry.file_type().is_dir() {
                        directories.insert(entry.into_path());
                    }
                }
            }
            Ok(directories.into_iter().collect())
        })
        .await?
    }

    #[instrument(level = "debug", skip(self, store, run), fields(folder = %directory.display()))]
    async fn visit_folder(
        &self,
        store: &mut CatalogStore,
        run: &mut Run<'_>,
        directory: &Path,
    ) -> Result<()> {
        let folder = match store.upsert_folder(directory)? {
            FolderMutation::Created(folder) => {
                run.summary.folders_created += 1;
                run.emit(CatalogEvent::FolderCreated {
                    folder: folder.clone(),
                });
                folder
            }
            FolderMutation::Existing(folder) => folder,
        };

        run.summary.folders_visited += 1;
        run.emit(CatalogEvent::FolderInspectionInProgress {
            folder: folder.clone(),
        });

        let Listing { files, unreadable } = self.list_files(directory).await?;
        let on_disk: HashMap<&str, &ListedFile> = files
            .iter()
            .filter(|file| file.kind == MediaKind::Image)
            .map(|file| (file.name.as_str(), file))
            .collect();

        // Removed files. An entry we failed to stat is still there.
        let gone: Vec<String> = store
            .folder_assets(&folder.id)
            .iter()
            .filter(|asset| !on_disk.contains_key(asset.file_name.as_str()))
            .filter(|asset| !unreadable.contains(&asset.file_name))
            .map(|asset| asset.file_name.clone())
            .collect();
        for file_name in gone {
            if let Some(asset) = store.delete_asset(&folder.id, &file_name) {
                debug!(file = %file_name, "Asset file removed");
                run.summary.assets_deleted += 1;
                run.emit(CatalogEvent::AssetDeleted {
                    asset,
                    folder_assets: store.folder_assets(&folder.id).to_vec(),
                    corrupted: false,
                });
            }
        }

        for file in &files {
            match file.kind {
                MediaKind::Image => self.reconcile_image(store, run, &folder, file).await,
                MediaKind::Video if self.config.analyse_videos => {
                    self.extract_frame(run, &folder, file).await
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn reconcile_image(
        &self,
        store: &mut CatalogStore,
        run: &mut Run<'_>,
        folder: &Folder,
        file: &ListedFile,
    ) {
        if let Some(asset) = store.find_asset(&folder.id, &file.name) {
            if !asset.is_stale(&file.modified_at) {
                return;
            }
        }

        if run.budget == 0 {
            debug!(file = %file.name, "Batch budget exhausted, deferring");
            return;
        }

        let outcome = match self
            .fingerprinter
            .fingerprint(folder, &file.name, store.blobs_mut())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => FingerprintOutcome::Corrupted(e.to_string()),
        };

        match outcome {
            FingerprintOutcome::Fingerprinted(asset) => match store.upsert_asset(asset) {
                Ok(AssetMutation::Created(asset)) => {
                    run.budget -= 1;
                    run.summary.assets_created += 1;
                    run.emit(CatalogEvent::AssetCreated {
                        asset,
                        folder_assets: store.folder_assets(&folder.id).to_vec(),
                    });
                }
                Ok(AssetMutation::Updated { current, .. }) => {
                    run.budget -= 1;
                    run.summary.assets_updated += 1;
                    run.emit(CatalogEvent::AssetUpdated {
                        asset: current,
                        folder_assets: store.folder_assets(&folder.id).to_vec(),
                    });
                }
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Asset rejected by catalog");
                    store.blobs_mut().remove(&folder.id, &file.name);
                    self.report_corrupted(store, run, folder, file, e.to_string());
                }
            },
            FingerprintOutcome::Corrupted(reason) => {
                self.report_corrupted(store, run, folder, file, reason)
            }
        }
    }

    /// A new file becomes `AssetNotCreated`; a catalogued one is deleted
    fn report_corrupted(
        &self,
        store: &mut CatalogStore,
        run: &mut Run<'_>,
        folder: &Folder,
        file: &ListedFile,
        reason: String,
    ) {
        match store.delete_asset(&folder.id, &file.name) {
            Some(asset) => {
                run.summary.assets_deleted += 1;
                run.emit(CatalogEvent::AssetDeleted {
                    asset,
                    folder_assets: store.folder_assets(&folder.id).to_vec(),
                    corrupted: true,
                });
            }
            None => {
                run.summary.assets_not_created += 1;
                run.emit(CatalogEvent::AssetNotCreated {
                    path: folder.path.join(&file.name),
                    reason,
                });
            }
        }
    }

    async fn extract_frame(&self, run: &mut Run<'_>, folder: &Folder, file: &ListedFile) {
        if run.budget == 0 {
            debug!(file = %file.name, "Batch budget exhausted, skipping frame extraction");
            return;
        }

        let video = folder.path.join(&file.name);
        match self
            .frame_extractor
            .extract_first_frame(&video, &self.config.video_cache_dir)
            .await
        {
            Ok(frame) => {
                run.summary.frames_extracted += 1;
                debug!(frame = %frame.display(), "Video frame available");
            }
            Err(e) => warn!(file = %file.name, error = %e, "Frame extraction failed"),
        }
    }

    /// Regular files of a directory, sorted by name
    async fn list_files(&self, directory: &Path) -> Result<Listing> {
        let mut entries = tokio::fs::read_dir(directory)
            .await
            .map_err(|e| SyncError::directory(directory, e))?;

        let mut files = Vec::new();
        let mut unreadable = HashSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SyncError::directory(directory, e))?
        {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!(file = %path_label(&path), "Skipping file with non UTF-8 name");
                continue;
            };
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping unreadable entry");
                    unreadable.insert(name);
                    continue;
                }
            };
            let modified_at = match metadata.modified() {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping file without modification time");
                    unreadable.insert(name);
                    continue;
                }
            };
            files.push(ListedFile {
                kind: classify(&path),
                name,
                modified_at,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Listing { files, unreadable })
    }

    /// Drop catalogued folders under the walked trees that no longer exist
    fn purge_vanished_folders(
        &self,
        store: &mut CatalogStore,
        run: &mut Run<'_>,
        walked: &[PathBuf],
    ) -> Result<()> {
        let walked: BTreeSet<&Path> = walked.iter().map(PathBuf::as_path).collect();
        let mut scopes = vec![self.config.root_dir.as_path()];
        if self.config.analyse_videos {
            scopes.push(self.config.video_cache_dir.as_path());
        }

        let vanished: Vec<_> = store
            .folders()
            .filter(|folder| scopes.iter().any(|scope| folder.is_within(scope)))
            .filter(|folder| !walked.contains(folder.path.as_path()))
            .map(|folder| folder.id)
            .collect();

        for folder_id in vanished {
            // Already gone with a vanished parent
            if store.get_folder(&folder_id).is_none() {
                continue;
            }
            let removed = store.delete_folder(&folder_id)?;
            run.emit_removed(removed);
        }
        Ok(())
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}
