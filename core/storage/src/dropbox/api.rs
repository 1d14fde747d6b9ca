//! Dropbox API surface used by the uploader.
//!
//! [`DropboxApi`] is the seam between the upload protocol and the wire. The
//! HTTP implementation lives in [`super::client`]; tests use
//! [`crate::memory::MemoryDropboxApi`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use upfall_common::{Error, WriteMode};

/// Native Dropbox errors. Translated into [`Error`] at the backend boundary.
#[derive(Debug, Error)]
pub enum DropboxError {
    /// Nothing exists at the path.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// A shared link for the path has already been created.
    #[error("Shared link already exists: {0}")]
    SharedLinkAlreadyExists(String),

    /// Token missing, malformed, expired or revoked.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Rate limiting or a server-side failure.
    #[error("Service unavailable ({status}): {summary}")]
    Unavailable { status: u16, summary: String },

    /// Any other endpoint error.
    #[error("API error ({status}): {summary}")]
    Api { status: u16, summary: String },

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<DropboxError> for Error {
    fn from(err: DropboxError) -> Self {
        match err {
            DropboxError::Auth(message) => Error::Authentication(format!("Dropbox: {}", message)),
            DropboxError::Unavailable { .. } => Error::Transient(err.to_string()),
            DropboxError::Http(ref http) if http.is_timeout() || http.is_connect() => {
                Error::Transient(err.to_string())
            }
            other => Error::upload_with_source(format!("Dropbox: {}", other), other),
        }
    }
}

/// Result type for raw Dropbox calls.
pub type ApiResult<T> = std::result::Result<T, DropboxError>;

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Metadata of a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
}

/// Tagged metadata as returned by `files/get_metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
pub enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
}

impl Metadata {
    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }
}

/// The account a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Position inside an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSessionCursor {
    pub session_id: String,
    pub offset: u64,
}

/// Where and how a finished upload is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub path: String,
    pub mode: WriteMode,
    #[serde(default)]
    pub autorename: bool,
    #[serde(default)]
    pub mute: bool,
}

impl CommitInfo {
    pub fn new(path: impl Into<String>, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
            autorename: false,
            mute: false,
        }
    }
}

/// Dropbox endpoints the uploader relies on.
#[async_trait]
pub trait DropboxApi: Send + Sync {
    /// `users/get_current_account`, used as a token handshake.
    async fn current_account(&self) -> ApiResult<Account>;

    /// `files/get_metadata`; a missing path is `Ok(None)`.
    async fn get_metadata(&self, path: &str) -> ApiResult<Option<Metadata>>;

    /// `files/delete_v2`.
    async fn delete(&self, path: &str) -> ApiResult<()>;

    /// `files/create_folder_v2`.
    async fn create_folder(&self, path: &str) -> ApiResult<FolderMetadata>;

    /// `files/upload`: the whole file in one request.
    async fn upload(&self, contents: Bytes, commit: &CommitInfo) -> ApiResult<FileMetadata>;

    /// `files/upload_session/start` with the first chunk. Returns the session id.
    async fn upload_session_start(&self, contents: Bytes) -> ApiResult<String>;

    /// `files/upload_session/append_v2` at `cursor`.
    async fn upload_session_append(
        &self,
        contents: Bytes,
        cursor: &UploadSessionCursor,
    ) -> ApiResult<()>;

    /// `files/upload_session/finish`: last chunk plus commit.
    async fn upload_session_finish(
        &self,
        contents: Bytes,
        cursor: &UploadSessionCursor,
        commit: &CommitInfo,
    ) -> ApiResult<FileMetadata>;

    /// `sharing/create_shared_link_with_settings`. Returns the link URL.
    ///
    /// Fails with [`DropboxError::SharedLinkAlreadyExists`] when one exists.
    async fn create_shared_link(&self, path: &str) -> ApiResult<String>;

    /// `sharing/list_shared_links` for a single path. Returns link URLs.
    async fn list_shared_links(&self, path: &str) -> ApiResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_deserialize_tagged() {
        let file: Metadata = serde_json::from_str(
            r#"{".tag": "file", "id": "id:1", "name": "a.txt", "path_display": "/upload/a.txt", "size": 12, "rev": "015"}"#,
        )
        .unwrap();
        let folder: Metadata = serde_json::from_str(
            r#"{".tag": "folder", "id": "id:2", "name": "upload", "path_display": "/upload"}"#,
        )
        .unwrap();

        assert!(!file.is_folder());
        assert!(folder.is_folder());
        match file {
            Metadata::File(meta) => assert_eq!(meta.size, 12),
            Metadata::Folder(_) => panic!("expected file"),
        }
    }

    #[test]
    fn test_commit_info_serializes_mode() {
        let commit = CommitInfo::new("/upload/a.txt", WriteMode::Overwrite);
        let json = serde_json::to_value(&commit).unwrap();
        assert_eq!(json["mode"], "overwrite");
        assert_eq!(json["autorename"], false);

        let commit = CommitInfo::new("/upload/a.txt", WriteMode::Add);
        assert_eq!(serde_json::to_value(&commit).unwrap()["mode"], "add");
    }

    #[test]
    fn test_error_translation() {
        let err: Error = DropboxError::Auth("expired_access_token/".to_string()).into();
        assert!(matches!(err, Error::Authentication(_)));
        assert!(err.to_string().contains("expired_access_token"));

        let err: Error = DropboxError::Unavailable {
            status: 503,
            summary: "try later".to_string(),
        }
        .into();
        assert!(err.is_transient());

        let err: Error = DropboxError::Api {
            status: 409,
            summary: "path/conflict/file/".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Upload { source: Some(_), .. }));
        assert!(!err.is_fatal());

        let err: Error = DropboxError::InvalidResponse("not json".to_string()).into();
        assert!(matches!(err, Error::Upload { .. }));
    }
}
