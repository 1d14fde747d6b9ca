//! In-memory Dropbox API for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use upfall_common::WriteMode;

use crate::credentials::Credentials;
use crate::dropbox::api::{
    Account, ApiResult, CommitInfo, DropboxApi, DropboxError, FileMetadata, FolderMetadata,
    Metadata, UploadSessionCursor,
};
use crate::dropbox::provider::Connector;

/// Which endpoint a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentAccount,
    GetMetadata,
    Delete,
    CreateFolder,
    Upload,
    SessionStart,
    SessionAppend,
    SessionFinish,
    CreateSharedLink,
    ListSharedLinks,
}

/// A recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CurrentAccount,
    GetMetadata {
        path: String,
    },
    Delete {
        path: String,
    },
    CreateFolder {
        path: String,
    },
    Upload {
        path: String,
        mode: WriteMode,
        len: u64,
    },
    SessionStart {
        len: u64,
    },
    SessionAppend {
        session_id: String,
        offset: u64,
        len: u64,
    },
    SessionFinish {
        session_id: String,
        offset: u64,
        len: u64,
        path: String,
        mode: WriteMode,
    },
    CreateSharedLink {
        path: String,
    },
    ListSharedLinks {
        path: String,
    },
}

impl ApiCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::CurrentAccount => Operation::CurrentAccount,
            Self::GetMetadata { .. } => Operation::GetMetadata,
            Self::Delete { .. } => Operation::Delete,
            Self::CreateFolder { .. } => Operation::CreateFolder,
            Self::Upload { .. } => Operation::Upload,
            Self::SessionStart { .. } => Operation::SessionStart,
            Self::SessionAppend { .. } => Operation::SessionAppend,
            Self::SessionFinish { .. } => Operation::SessionFinish,
            Self::CreateSharedLink { .. } => Operation::CreateSharedLink,
            Self::ListSharedLinks { .. } => Operation::ListSharedLinks,
        }
    }

    /// Whether the call transfers file content.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Upload { .. }
                | Self::SessionStart { .. }
                | Self::SessionAppend { .. }
                | Self::SessionFinish { .. }
        )
    }
}

/// Failure to return from the next call of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// 503 from the server.
    Unavailable,
    /// 401, token rejected.
    Auth,
    /// 409 with an unrecognized summary.
    Api,
    /// 409 claiming a shared link already exists.
    SharedLinkExists,
}

impl InjectedFailure {
    fn into_error(self, operation: Operation) -> DropboxError {
        match self {
            Self::Unavailable => DropboxError::Unavailable {
                status: 503,
                summary: format!("{:?} unavailable", operation),
            },
            Self::Auth => DropboxError::Auth("invalid_access_token/".to_string()),
            Self::Api => DropboxError::Api {
                status: 409,
                summary: format!("{:?} rejected", operation),
            },
            Self::SharedLinkExists => DropboxError::SharedLinkAlreadyExists(
                "shared_link_already_exists/".to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    File { id: String, data: Vec<u8> },
    Folder { id: String },
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    sessions: HashMap<String, Vec<u8>>,
    links: HashMap<String, Vec<String>>,
    calls: Vec<ApiCall>,
    failures: HashMap<Operation, VecDeque<InjectedFailure>>,
}

/// In-memory Dropbox.
///
/// Keeps files, folders, open upload sessions and shared links, records
/// every call, and can be told to fail specific operations.
#[derive(Debug, Default)]
pub struct MemoryDropboxApi {
    state: Mutex<State>,
}

impl MemoryDropboxApi {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector handing out this store to a `DropboxProvider`.
    pub fn connector(self: &Arc<Self>) -> Connector<MemoryDropboxApi> {
        let api = Arc::clone(self);
        Box::new(move |_: Credentials| -> ApiResult<Arc<MemoryDropboxApi>> { Ok(api.clone()) })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and apply any pending injected failure.
    fn begin(&self, call: ApiCall) -> ApiResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        let operation = call.operation();
        state.calls.push(call);
        let failure = state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(failure) => Err(failure.into_error(operation)),
            None => Ok(state),
        }
    }

    /// Store a file directly, bypassing call recording.
    pub fn insert_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.lock().entries.insert(
            path.to_string(),
            Entry::File {
                id: new_id(),
                data: data.into(),
            },
        );
    }

    /// Create a folder directly, bypassing call recording.
    pub fn insert_folder(&self, path: &str) {
        self.lock()
            .entries
            .insert(path.to_string(), Entry::Folder { id: new_id() });
    }

    /// Register an existing shared link.
    pub fn insert_shared_link(&self, path: &str, url: &str) {
        self.lock()
            .links
            .entry(path.to_string())
            .or_default()
            .push(url.to_string());
    }

    /// Content of a stored file.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().entries.get(path) {
            Some(Entry::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_folder(&self, path: &str) -> bool {
        matches!(self.lock().entries.get(path), Some(Entry::Folder { .. }))
    }

    /// Paths of all stored files, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        let state = self.lock();
        let mut paths: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::File { .. }))
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Number of sessions started but never finished.
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Number of calls made to `operation`.
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Number of calls that carried file content.
    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|call| call.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail the next `times` calls of `operation`.
    pub fn fail_next(&self, operation: Operation, failure: InjectedFailure, times: usize) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .extend(std::iter::repeat(failure).take(times));
    }
}

fn new_id() -> String {
    format!("id:{}", Uuid::new_v4().simple())
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn conflict(summary: &str) -> DropboxError {
    DropboxError::Api {
        status: 409,
        summary: summary.to_string(),
    }
}

fn write_file(state: &mut State, commit: &CommitInfo, data: Vec<u8>) -> ApiResult<FileMetadata> {
    match state.entries.get(&commit.path) {
        Some(Entry::Folder { .. }) => return Err(conflict("path/conflict/folder/")),
        Some(Entry::File { .. }) if commit.mode == WriteMode::Add => {
            return Err(conflict("path/conflict/file/"))
        }
        _ => {}
    }

    let id = new_id();
    let size = data.len() as u64;
    state
        .entries
        .insert(commit.path.clone(), Entry::File { id: id.clone(), data });

    Ok(FileMetadata {
        id,
        name: file_name(&commit.path),
        path_display: Some(commit.path.clone()),
        size,
    })
}

fn session_data<'a>(
    state: &'a mut State,
    cursor: &UploadSessionCursor,
) -> ApiResult<&'a mut Vec<u8>> {
    let data = state
        .sessions
        .get_mut(&cursor.session_id)
        .ok_or_else(|| conflict("lookup_failed/closed/"))?;
    if data.len() as u64 != cursor.offset {
        return Err(conflict("lookup_failed/incorrect_offset/"));
    }
    Ok(data)
}

#[async_trait]
impl DropboxApi for MemoryDropboxApi {
    async fn current_account(&self) -> ApiResult<Account> {
        drop(self.begin(ApiCall::CurrentAccount)?);
        Ok(Account {
            account_id: "dbid:memory".to_string(),
            email: None,
        })
    }

    async fn get_metadata(&self, path: &str) -> ApiResult<Option<Metadata>> {
        let state = self.begin(ApiCall::GetMetadata {
            path: path.to_string(),
        })?;

        Ok(state.entries.get(path).map(|entry| match entry {
            Entry::File { id, data } => Metadata::File(FileMetadata {
                id: id.clone(),
                name: file_name(path),
                path_display: Some(path.to_string()),
                size: data.len() as u64,
            }),
            Entry::Folder { id } => Metadata::Folder(FolderMetadata {
                id: id.clone(),
                name: file_name(path),
                path_display: Some(path.to_string()),
            }),
        }))
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        let mut state = self.begin(ApiCall::Delete {
            path: path.to_string(),
        })?;

        if state.entries.remove(path).is_none() {
            return Err(DropboxError::NotFound(format!("path_lookup/not_found/{}", path)));
        }
        let prefix = format!("{}/", path);
        state.entries.retain(|key, _| !key.starts_with(&prefix));
        state.links.remove(path);
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> ApiResult<FolderMetadata> {
        let mut state = self.begin(ApiCall::CreateFolder {
            path: path.to_string(),
        })?;

        if state.entries.contains_key(path) {
            return Err(conflict("path/conflict/folder/"));
        }
        let id = new_id();
        state
            .entries
            .insert(path.to_string(), Entry::Folder { id: id.clone() });

        Ok(FolderMetadata {
            id,
            name: file_name(path),
            path_display: Some(path.to_string()),
        })
    }

    async fn upload(&self, contents: Bytes, commit: &CommitInfo) -> ApiResult<FileMetadata> {
        let mut state = self.begin(ApiCall::Upload {
            path: commit.path.clone(),
            mode: commit.mode,
            len: contents.len() as u64,
        })?;
        write_file(&mut state, commit, contents.to_vec())
    }

    async fn upload_session_start(&self, contents: Bytes) -> ApiResult<String> {
        let mut state = self.begin(ApiCall::SessionStart {
            len: contents.len() as u64,
        })?;
        let session_id = Uuid::new_v4().to_string();
        state.sessions.insert(session_id.clone(), contents.to_vec());
        Ok(session_id)
    }

    async fn upload_session_append(
        &self,
        contents: Bytes,
        cursor: &UploadSessionCursor,
    ) -> ApiResult<()> {
        let mut state = self.begin(ApiCall::SessionAppend {
            session_id: cursor.session_id.clone(),
            offset: cursor.offset,
            len: contents.len() as u64,
        })?;
        session_data(&mut state, cursor)?.extend_from_slice(&contents);
        Ok(())
    }

    async fn upload_session_finish(
        &self,
        contents: Bytes,
        cursor: &UploadSessionCursor,
        commit: &CommitInfo,
    ) -> ApiResult<FileMetadata> {
        let mut state = self.begin(ApiCall::SessionFinish {
            session_id: cursor.session_id.clone(),
            offset: cursor.offset,
            len: contents.len() as u64,
            path: commit.path.clone(),
            mode: commit.mode,
        })?;

        let mut data = std::mem::take(session_data(&mut state, cursor)?);
        data.extend_from_slice(&contents);
        state.sessions.remove(&cursor.session_id);
        write_file(&mut state, commit, data)
    }

    async fn create_shared_link(&self, path: &str) -> ApiResult<String> {
        let mut state = self.begin(ApiCall::CreateSharedLink {
            path: path.to_string(),
        })?;

        let id = match state.entries.get(path) {
            Some(Entry::File { id, .. }) | Some(Entry::Folder { id }) => id.clone(),
            None => return Err(DropboxError::NotFound(format!("path/not_found/{}", path))),
        };
        if state.links.get(path).is_some_and(|links| !links.is_empty()) {
            return Err(DropboxError::SharedLinkAlreadyExists(format!(
                "shared_link_already_exists/{}",
                path
            )));
        }

        let url = format!(
            "https://www.dropbox.com/scl/fi/{}/{}?rlkey=memory&dl=0",
            id.trim_start_matches("id:"),
            file_name(path)
        );
        state
            .links
            .insert(path.to_string(), vec![url.clone()]);
        Ok(url)
    }

    async fn list_shared_links(&self, path: &str) -> ApiResult<Vec<String>> {
        let state = self.begin(ApiCall::ListSharedLinks {
            path: path.to_string(),
        })?;
        Ok(state.links.get(path).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_metadata() {
        let api = MemoryDropboxApi::new();
        api.upload(
            Bytes::from_static(b"hello"),
            &CommitInfo::new("/upload/a.txt", WriteMode::Add),
        )
        .await
        .unwrap();

        assert_eq!(api.file("/upload/a.txt").unwrap(), b"hello");
        match api.get_metadata("/upload/a.txt").await.unwrap() {
            Some(Metadata::File(meta)) => assert_eq!(meta.size, 5),
            other => panic!("unexpected metadata: {:?}", other),
        }
        assert!(api.get_metadata("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_mode_conflicts_overwrite_replaces() {
        let api = MemoryDropboxApi::new();
        api.insert_file("/a.txt", b"old".to_vec());

        let result = api
            .upload(Bytes::from_static(b"new"), &CommitInfo::new("/a.txt", WriteMode::Add))
            .await;
        assert!(matches!(result, Err(DropboxError::Api { status: 409, .. })));

        api.upload(
            Bytes::from_static(b"new"),
            &CommitInfo::new("/a.txt", WriteMode::Overwrite),
        )
        .await
        .unwrap();
        assert_eq!(api.file("/a.txt").unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_session_checks_offset() {
        let api = MemoryDropboxApi::new();
        let session_id = api
            .upload_session_start(Bytes::from_static(b"abcd"))
            .await
            .unwrap();

        let wrong = UploadSessionCursor {
            session_id: session_id.clone(),
            offset: 3,
        };
        assert!(api
            .upload_session_append(Bytes::from_static(b"ef"), &wrong)
            .await
            .is_err());

        let cursor = UploadSessionCursor {
            session_id,
            offset: 4,
        };
        api.upload_session_finish(
            Bytes::from_static(b"ef"),
            &cursor,
            &CommitInfo::new("/big.bin", WriteMode::Add),
        )
        .await
        .unwrap();

        assert_eq!(api.file("/big.bin").unwrap(), b"abcdef");
        assert_eq!(api.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_shared_link_already_exists() {
        let api = MemoryDropboxApi::new();
        api.insert_file("/a.txt", b"x".to_vec());

        let url = api.create_shared_link("/a.txt").await.unwrap();
        assert!(url.ends_with("/a.txt?rlkey=memory&dl=0"));

        let again = api.create_shared_link("/a.txt").await;
        assert!(matches!(again, Err(DropboxError::SharedLinkAlreadyExists(_))));
        assert_eq!(api.list_shared_links("/a.txt").await.unwrap(), vec![url]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let api = MemoryDropboxApi::new();
        api.fail_next(Operation::CurrentAccount, InjectedFailure::Auth, 1);

        assert!(matches!(
            api.current_account().await,
            Err(DropboxError::Auth(_))
        ));
        assert!(api.current_account().await.is_ok());
        assert_eq!(api.count(Operation::CurrentAccount), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_children() {
        let api = MemoryDropboxApi::new();
        api.insert_folder("/upload");
        api.insert_file("/upload/a.txt", b"a".to_vec());

        api.delete("/upload").await.unwrap();
        assert!(api.file_paths().is_empty());
        assert!(matches!(
            api.delete("/upload").await,
            Err(DropboxError::NotFound(_))
        ));
    }
}
