//! Common types shared across the upfall crates.
//!
//! This module provides the closed error taxonomy every provider maps into
//! and the data model exchanged between providers and the orchestrator.

pub mod error;
pub mod types;

pub use error::{Error, ProviderFailure, Result};
pub use types::{
    PathConflictPolicy, ProviderHelp, RemotePath, UploadOptions, UploadResult, WriteMode,
};
