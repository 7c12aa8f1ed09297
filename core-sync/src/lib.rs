//! # Catalog Sync Module
//!
//! Keeps the photo catalog in step with the file system.
//!
//! ## Overview
//!
//! This module manages:
//! - The folder walk and per-folder diff (`CatalogSyncEngine`)
//! - The ordered progress event protocol (`CatalogEvent`)
//! - Dated zip backups of the persisted catalog (`BackupSnapshotter`)

pub mod backup;
pub mod engine;
pub mod error;
pub mod events;

pub use backup::{BackupOutcome, BackupSnapshotter};
pub use engine::{CatalogSyncEngine, SyncOutcome, SyncSummary};
pub use error::{Result, SyncError};
pub use events::CatalogEvent;
