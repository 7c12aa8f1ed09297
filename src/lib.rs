//! Workspace facade crate.
//!
//! Re-exports the individual workspace crates so host applications can depend
//! on `catalog-workspace` alone. The `sync` feature (on by default) pulls in
//! the fingerprinting and synchronization crates; without it only the runtime
//! and catalog storage layers are exposed.

pub use core_library as library;
pub use core_runtime as runtime;

#[cfg(feature = "sync")]
pub use core_metadata as metadata;
#[cfg(feature = "sync")]
pub use core_sync as sync;
