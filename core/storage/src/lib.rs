//! Upload providers for upfall.
//!
//! This module provides the trait-based contract every storage backend
//! satisfies, the registry that holds them in preference order, and the
//! Dropbox backend with chunked, conflict-aware uploads.
//!
//! # Design Principles
//! - Provider isolation: backend errors are translated at the backend boundary
//! - Injectable seams: credentials, clock, sleep and the remote API are traits
//! - Async first: the blocking surface drives the same futures

pub mod clock;
pub mod credentials;
pub mod dropbox;
pub mod memory;
pub mod naming;
pub mod provider;
pub mod registry;
pub mod retry;

pub use clock::{Clock, FixedClock, SystemClock};
pub use credentials::{
    CachedCredentials, CredentialSource, Credentials, EnvCredentials, StaticCredentials,
};
pub use dropbox::{DropboxProvider, DropboxSettings, DropboxUploader};
pub use memory::MemoryDropboxApi;
pub use provider::{block_on, Provider, UploadClient};
pub use registry::{create_default_registry, ProviderRegistry};
pub use retry::{RecordingSleeper, RetryExecutor, RetryPolicy, Sleeper, TokioSleeper};
