//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the photo catalog core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus and event sinks
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the other workspace crates
//! depend on. It establishes the configuration surface, the logging
//! conventions, and the event delivery mechanisms used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CatalogConfig, CatalogConfigBuilder, CatalogSettings, HashAlgorithms};
pub use error::{Error, Result};
pub use events::{EventBus, EventLog, EventSeverity, EventSink, EventStream};
