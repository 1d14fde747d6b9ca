//! Dropbox upload provider.
//!
//! This module provides a backend on top of the Dropbox v2 HTTP API with:
//! - Upload directory management (a stray file in its place is replaced)
//! - Skip/overwrite/unique conflict handling
//! - Single-request uploads up to 4 MiB, session-based chunked uploads above
//! - Idempotent share-link retrieval with direct-download rewriting

pub mod api;
pub mod client;
pub mod provider;
pub mod session;
pub mod uploader;

pub use api::{
    Account, ApiResult, CommitInfo, DropboxApi, DropboxError, FileMetadata, FolderMetadata,
    Metadata, UploadSessionCursor,
};
pub use client::DropboxClient;
pub use provider::{Connector, DropboxProvider, DropboxSettings, PROVIDER_HELP, PROVIDER_NAME};
pub use session::{ChunkedUploadSession, ProgressTracker, SessionState};
pub use uploader::{direct_download_url, DropboxUploader};
