//! upfall upload orchestration
//!
//! This crate turns a set of registered providers into a single upload call:
//! - Provider selection: one named provider, an explicit chain, or the default chain
//! - Fallback across the chain with fatal/backend failure classification
//! - Setup diagnostics that report whether each provider is usable

pub mod chain;
pub mod config;
pub mod selector;
pub mod setup;

pub use chain::{SkipReason, Uploader};
pub use config::UploadConfig;
pub use selector::ProviderSelector;
pub use setup::{check, check_all, ProviderStatus};
