//! Catalog synchronization event protocol
//!
//! Every run emits an ordered stream of [`CatalogEvent`]s through an
//! [`EventSink`](core_runtime::EventSink). The stream always ends with
//! [`CatalogEvent::CatalogProcessEnded`].
//!
//! A typical first run over a folder with two images:
//!
//! ```text
//! FolderInspectionInProgress(root)
//! AssetCreated(a.jpg)
//! AssetCreated(b.jpg)
//! FolderInspectionCompleted
//! BackupCreationStarted
//! BackupCompleted
//! CatalogProcessEnded
//! ```

use core_library::{Asset, Folder};
use core_runtime::EventSeverity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CatalogEvent {
    /// A folder is about to be diffed against the catalog
    FolderInspectionInProgress { folder: Folder },
    /// The folder walk has ended (possibly cut short by cancellation)
    FolderInspectionCompleted,
    /// A directory was catalogued for the first time (never the root)
    FolderCreated { folder: Folder },
    /// A folder and its assets left the catalog
    FolderDeleted { folder: Folder },
    AssetCreated {
        asset: Asset,
        /// Assets of the owning folder after the change
        folder_assets: Vec<Asset>,
    },
    /// A new file could not be fingerprinted; nothing was stored
    AssetNotCreated { path: PathBuf, reason: String },
    AssetUpdated {
        asset: Asset,
        folder_assets: Vec<Asset>,
    },
    AssetDeleted {
        asset: Asset,
        folder_assets: Vec<Asset>,
        /// The file still exists but no longer decodes
        corrupted: bool,
    },
    BackupCreationStarted,
    BackupUpdateStarted,
    BackupCompleted,
    NoBackupChangesDetected,
    CatalogProcessFailed { error: String },
    CatalogProcessEnded,
}

impl CatalogEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CatalogEvent::FolderInspectionInProgress { .. } => "Inspecting folder",
            CatalogEvent::FolderInspectionCompleted => "Folder inspection completed",
            CatalogEvent::FolderCreated { .. } => "Folder added to catalog",
            CatalogEvent::FolderDeleted { .. } => "Folder removed from catalog",
            CatalogEvent::AssetCreated { .. } => "Asset added",
            CatalogEvent::AssetNotCreated { .. } => "Asset could not be added",
            CatalogEvent::AssetUpdated { .. } => "Asset updated",
            CatalogEvent::AssetDeleted {
                corrupted: true, ..
            } => "Corrupted asset removed",
            CatalogEvent::AssetDeleted { .. } => "Asset removed",
            CatalogEvent::BackupCreationStarted => "Creating backup",
            CatalogEvent::BackupUpdateStarted => "Updating backup",
            CatalogEvent::BackupCompleted => "Backup completed",
            CatalogEvent::NoBackupChangesDetected => "Backup already up to date",
            CatalogEvent::CatalogProcessFailed { .. } => "Catalog synchronization failed",
            CatalogEvent::CatalogProcessEnded => "Catalog synchronization ended",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CatalogEvent::CatalogProcessFailed { .. } => EventSeverity::Error,
            CatalogEvent::AssetNotCreated { .. }
            | CatalogEvent::AssetDeleted {
                corrupted: true, ..
            } => EventSeverity::Warning,
            CatalogEvent::FolderInspectionCompleted
            | CatalogEvent::BackupCompleted
            | CatalogEvent::NoBackupChangesDetected
            | CatalogEvent::CatalogProcessEnded => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Created, updated, deleted or not-created asset events
    pub fn is_asset_event(&self) -> bool {
        matches!(
            self,
            CatalogEvent::AssetCreated { .. }
                | CatalogEvent::AssetNotCreated { .. }
                | CatalogEvent::AssetUpdated { .. }
                | CatalogEvent::AssetDeleted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        let failed = CatalogEvent::CatalogProcessFailed {
            error: "boom".to_string(),
        };
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(
            CatalogEvent::CatalogProcessEnded.severity(),
            EventSeverity::Info
        );
        assert_eq!(
            CatalogEvent::AssetNotCreated {
                path: PathBuf::from("/p/a.jpg"),
                reason: "bad".to_string()
            }
            .severity(),
            EventSeverity::Warning
        );
        assert_eq!(
            CatalogEvent::BackupCreationStarted.severity(),
            EventSeverity::Debug
        );
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CatalogEvent::FolderCreated {
            folder: Folder::new("/photos/2024"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"FolderCreated\""));

        let back: CatalogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_is_asset_event() {
        assert!(CatalogEvent::AssetNotCreated {
            path: PathBuf::from("x.jpg"),
            reason: String::new()
        }
        .is_asset_event());
        assert!(!CatalogEvent::FolderInspectionCompleted.is_asset_event());
    }
}
