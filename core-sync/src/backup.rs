//! Dated zip snapshots of the persisted catalog
//!
//! One archive per calendar day, `yyyyMMdd.zip`, in the layout's backups
//! directory. The archive mirrors the database directory:
//! `tables/folders.json`, `tables/assets.json` and `blobs/<folder-id>.bin`.
//!
//! ```text
//! no archive today  -> BackupCreationStarted -> write -> BackupCompleted
//! archive today     -> compare -> equal     -> NoBackupChangesDetected
//!                              -> different -> BackupUpdateStarted -> write -> BackupCompleted
//! ```

use crate::error::{Result, SyncError};
use crate::events::CatalogEvent;
use chrono::{Local, NaiveDate};
use core_library::{CatalogSnapshot, DatabaseLayout};
use core_runtime::{logging::path_label, EventSink};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const ARCHIVE_EXTENSION: &str = "zip";
const ARCHIVE_DATE_FORMAT: &str = "%Y%m%d";

/// What the snapshotter did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created(PathBuf),
    Updated(PathBuf),
    NoChanges(PathBuf),
}

impl BackupOutcome {
    pub fn archive(&self) -> &Path {
        match self {
            BackupOutcome::Created(path)
            | BackupOutcome::Updated(path)
            | BackupOutcome::NoChanges(path) => path,
        }
    }
}

enum BackupPlan {
    Create(CatalogSnapshot),
    Update(CatalogSnapshot),
    UpToDate,
}

#[derive(Debug, Clone)]
pub struct BackupSnapshotter {
    layout: DatabaseLayout,
    backups_to_keep: usize,
}

impl BackupSnapshotter {
    pub fn new(layout: DatabaseLayout, backups_to_keep: usize) -> Self {
        Self {
            layout,
            backups_to_keep: backups_to_keep.max(1),
        }
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.layout.backups_dir()
    }

    pub fn archive_path(&self, date: NaiveDate) -> PathBuf {
        self.backups_dir().join(format!(
            "{}.{}",
            date.format(ARCHIVE_DATE_FORMAT),
            ARCHIVE_EXTENSION
        ))
    }

    /// Snapshot the persisted catalog under today's local date
    pub async fn run(&self, events: &dyn EventSink<CatalogEvent>) -> Result<BackupOutcome> {
        self.run_for_date(Local::now().date_naive(), events).await
    }

    pub async fn run_for_date(
        &self,
        date: NaiveDate,
        events: &dyn EventSink<CatalogEvent>,
    ) -> Result<BackupOutcome> {
        let archive = self.archive_path(date);

        let planner = self.clone();
        let target = archive.clone();
        let plan = tokio::task::spawn_blocking(move || planner.plan(&target)).await??;

        let (snapshot, outcome) = match plan {
            BackupPlan::UpToDate => {
                debug!(archive = %archive.display(), "Backup matches catalog");
                events.publish(CatalogEvent::NoBackupChangesDetected);
                return Ok(BackupOutcome::NoChanges(archive));
            }
            BackupPlan::Create(snapshot) => {
                events.publish(CatalogEvent::BackupCreationStarted);
                (snapshot, BackupOutcome::Created(archive.clone()))
            }
            BackupPlan::Update(snapshot) => {
                events.publish(CatalogEvent::BackupUpdateStarted);
                (snapshot, BackupOutcome::Updated(archive.clone()))
            }
        };

        let writer = self.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            write_archive(&archive, &snapshot)?;
            writer.prune()?;
            Ok(())
        })
        .await??;

        events.publish(CatalogEvent::BackupCompleted);
        info!(archive = %path_label(outcome.archive()), "Backup written");
        Ok(outcome)
    }

    fn plan(&self, archive: &Path) -> Result<BackupPlan> {
        let current = CatalogSnapshot::load(&self.layout)?;
        if !archive.exists() {
            return Ok(BackupPlan::Create(current));
        }

        match read_archive(archive) {
            Ok(existing) if existing == current => Ok(BackupPlan::UpToDate),
            Ok(_) => Ok(BackupPlan::Update(current)),
            Err(e) => {
                warn!(archive = %path_label(archive), error = %e, "Existing backup unreadable, replacing it");
                Ok(BackupPlan::Update(current))
            }
        }
    }

    /// Dated archives in the backups directory, oldest first
    pub fn list_archives(&self) -> Result<Vec<PathBuf>> {
        let dir = self.backups_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut archives = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if archive_date(&path).is_some() {
                archives.push(path);
            }
        }
        archives.sort_by_key(|path| archive_date(path));
        Ok(archives)
    }

    /// Delete all but the newest `backups_to_keep` archives
    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        let archives = self.list_archives()?;
        let excess = archives.len().saturating_sub(self.backups_to_keep);

        let mut removed = Vec::with_capacity(excess);
        for path in archives.into_iter().take(excess) {
            fs::remove_file(&path)?;
            debug!(archive = %path.display(), "Old backup removed");
            removed.push(path);
        }
        Ok(removed)
    }
}

fn archive_date(path: &Path) -> Option<NaiveDate> {
    if path.extension()?.to_str()? != ARCHIVE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, ARCHIVE_DATE_FORMAT).ok()
}

/// Write `snapshot` to `path` atomically
pub fn write_archive(path: &Path, snapshot: &CatalogSnapshot) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| SyncError::Backup(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir)?;

    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut zip = ZipWriter::new(tmp);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in snapshot.to_entries()? {
        zip.start_file(name, options)?;
        zip.write_all(&bytes)?;
    }
    let tmp = zip.finish()?;
    tmp.persist(path).map_err(|e| SyncError::Io(e.error))?;
    Ok(())
}

/// Rebuild the snapshot stored in an archive
pub fn read_archive(path: &Path) -> Result<CatalogSnapshot> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        entries.push((file.name().to_string(), bytes));
    }
    Ok(CatalogSnapshot::from_entries(entries)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::CatalogStore;
    use core_runtime::EventLog;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DatabaseLayout, BackupSnapshotter) {
        let dir = TempDir::new().unwrap();
        let layout = DatabaseLayout::new(dir.path().join("db"), "v1.0");
        let snapshotter = BackupSnapshotter::new(layout.clone(), 2);
        (dir, layout, snapshotter)
    }

    fn persist_folder(layout: &DatabaseLayout, path: &str) {
        let mut store = CatalogStore::open(layout.clone()).unwrap();
        let folder = store.upsert_folder(path).unwrap().into_folder();
        store.blobs_mut().put(folder.id, "a.jpg", vec![1, 2, 3]);
        store.flush().unwrap();
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_no_changes_then_update() {
        let (_dir, layout, snapshotter) = setup();
        persist_folder(&layout, "/photos");
        let events: EventLog<CatalogEvent> = EventLog::new();

        let created = snapshotter.run_for_date(day(1), &events).await.unwrap();
        assert_eq!(created, BackupOutcome::Created(snapshotter.archive_path(day(1))));
        assert!(created.archive().exists());

        let unchanged = snapshotter.run_for_date(day(1), &events).await.unwrap();
        assert!(matches!(unchanged, BackupOutcome::NoChanges(_)));

        persist_folder(&layout, "/more-photos");
        let updated = snapshotter.run_for_date(day(1), &events).await.unwrap();
        assert!(matches!(updated, BackupOutcome::Updated(_)));

        assert_eq!(
            events.drain(),
            vec![
                CatalogEvent::BackupCreationStarted,
                CatalogEvent::BackupCompleted,
                CatalogEvent::NoBackupChangesDetected,
                CatalogEvent::BackupUpdateStarted,
                CatalogEvent::BackupCompleted,
            ]
        );

        let archived = read_archive(updated.archive()).unwrap();
        assert_eq!(archived, CatalogSnapshot::load(&layout).unwrap());
        assert_eq!(archived.folders.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_catalog_still_gets_archive() {
        let (_dir, _layout, snapshotter) = setup();
        let events: EventLog<CatalogEvent> = EventLog::new();
        let outcome = snapshotter.run_for_date(day(2), &events).await.unwrap();
        assert!(matches!(outcome, BackupOutcome::Created(_)));
        assert!(read_archive(outcome.archive()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_archive_is_replaced() {
        let (_dir, layout, snapshotter) = setup();
        persist_folder(&layout, "/photos");
        let archive = snapshotter.archive_path(day(3));
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, b"not a zip").unwrap();

        let events: EventLog<CatalogEvent> = EventLog::new();
        let outcome = snapshotter.run_for_date(day(3), &events).await.unwrap();
        assert!(matches!(outcome, BackupOutcome::Updated(_)));
        assert_eq!(read_archive(&archive).unwrap().folders.len(), 1);
    }

    #[tokio::test]
    async fn test_retention_keeps_newest() {
        let (_dir, layout, snapshotter) = setup();
        let events: EventLog<CatalogEvent> = EventLog::new();
        for d in 1..=3 {
            persist_folder(&layout, &format!("/photos/{}", d));
            snapshotter.run_for_date(day(d), &events).await.unwrap();
        }

        let archives = snapshotter.list_archives().unwrap();
        assert_eq!(
            archives,
            vec![snapshotter.archive_path(day(2)), snapshotter.archive_path(day(3))]
        );
    }

    #[test]
    fn test_archive_date_parsing() {
        assert_eq!(archive_date(Path::new("/b/20240301.zip")), Some(day(1)));
        assert_eq!(archive_date(Path::new("/b/20240301.tar")), None);
        assert_eq!(archive_date(Path::new("/b/notes.zip")), None);
    }
}
