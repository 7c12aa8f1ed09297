//! # Catalog Storage
//!
//! Owns the persisted photo catalog: folder and asset tables, thumbnail
//! blobs and the versioned directory layout they live in.
//!
//! ## Overview
//!
//! - [`models`]: `Folder`, `Asset` and their identifiers
//! - [`store`]: `CatalogStore`, the in-memory tables with dirty tracking
//! - [`blobs`]: `BlobStore`, per-folder thumbnail bytes
//! - [`layout`]: `DatabaseLayout`, where tables, blobs and backups live
//! - [`snapshot`]: `CatalogSnapshot`, the structural persisted form used by
//!   backups

pub mod blobs;
pub mod error;
pub mod layout;
pub mod models;
pub mod snapshot;
pub mod store;

pub use blobs::{BlobStore, FolderBlobs};
pub use error::{LibraryError, Result};
pub use layout::DatabaseLayout;
pub use models::{Asset, AssetFlag, Dimensions, FileProperties, Folder, FolderId, Rotation};
pub use snapshot::CatalogSnapshot;
pub use store::{
    AssetMutation, CatalogStore, FlushOutcome, FolderListing, FolderMutation, RemovedFolder,
};
