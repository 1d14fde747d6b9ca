//! Chunked, conflict-aware upload protocol against [`DropboxApi`].

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};
use url::Url;

use upfall_common::{
    Error, PathConflictPolicy, RemotePath, Result, UploadOptions, UploadResult, WriteMode,
};

use crate::clock::{Clock, SystemClock};
use crate::naming::unique_file_name;
use crate::provider::UploadClient;
use crate::retry::{RetryExecutor, RetryPolicy};

use super::api::{CommitInfo, DropboxApi, DropboxError, Metadata};
use super::provider::{DropboxSettings, PROVIDER_NAME};
use super::session::{ChunkedUploadSession, ProgressTracker, SessionState};

const MIB: f64 = 1024.0 * 1024.0;

/// Dropbox upload client.
///
/// Runs one upload attempt per call: validate, name, ensure the upload
/// folder, resolve conflicts, transfer, fetch a share link.
pub struct DropboxUploader<A> {
    api: Arc<A>,
    settings: DropboxSettings,
    clock: Arc<dyn Clock>,
    retry: RetryExecutor,
}

impl<A: DropboxApi> DropboxUploader<A> {
    /// Create an uploader with the system clock and the share-link retry policy.
    pub fn new(api: Arc<A>, settings: DropboxSettings) -> Self {
        Self {
            api,
            settings,
            clock: Arc::new(SystemClock),
            retry: RetryExecutor::new(RetryPolicy::share_link()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn settings(&self) -> &DropboxSettings {
        &self.settings
    }

    fn chunk_size(&self) -> u64 {
        self.settings.chunk_size.max(1) as u64
    }

    /// Upload a file and return its direct-download URL.
    pub async fn upload_file(&self, local_path: &Path, options: &UploadOptions) -> Result<String> {
        let size = self.validate(local_path).await?;

        let upload_dir = RemotePath::parse(
            options
                .upload_path
                .as_deref()
                .unwrap_or(&self.settings.upload_path),
        )?;
        let target = upload_dir.join(&self.target_name(local_path, options)?)?;
        let target_path = target.to_string_path();

        self.ensure_upload_directory(&upload_dir).await?;

        match options.conflict_policy() {
            PathConflictPolicy::UniqueName => {}
            policy => {
                if self.target_exists(&target_path).await? {
                    info!("File exists at {}", target_path);
                    if policy == PathConflictPolicy::SkipExisting {
                        return self.share_url(&target_path).await;
                    }
                }
            }
        }

        self.transfer(local_path, size, &target_path, options.write_mode())
            .await?;
        self.share_url(&target_path).await
    }

    /// Check that the source is a regular file within the size limit.
    async fn validate(&self, local_path: &Path) -> Result<u64> {
        let metadata = tokio::fs::metadata(local_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Validation(format!("File not found: {}", local_path.display()))
            } else {
                Error::Validation(format!("Cannot access {}: {}", local_path.display(), e))
            }
        })?;

        if !metadata.is_file() {
            return Err(Error::Validation(format!(
                "Not a regular file: {}",
                local_path.display()
            )));
        }

        let size = metadata.len();
        if size > self.settings.max_file_size {
            return Err(Error::Validation(format!(
                "File too large: {:.1}MB > {:.1}MB",
                size as f64 / MIB,
                self.settings.max_file_size as f64 / MIB
            )));
        }
        Ok(size)
    }

    /// Remote file name: the requested or local name, timestamped if unique.
    fn target_name(&self, local_path: &Path, options: &UploadOptions) -> Result<String> {
        let name = match &options.remote_path {
            Some(name) => name.clone(),
            None => local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::Validation(format!("No file name in {}", local_path.display()))
                })?,
        };

        if options.unique {
            Ok(unique_file_name(&name, self.clock.now()))
        } else {
            Ok(name)
        }
    }

    /// Make sure the upload directory exists and is a folder.
    ///
    /// Checked on every call; nothing is cached between uploads.
    async fn ensure_upload_directory(&self, dir: &RemotePath) -> Result<()> {
        if dir.is_root() {
            return Ok(());
        }
        let path = dir.to_string_path();

        match self.api.get_metadata(&path).await? {
            Some(Metadata::Folder(_)) => return Ok(()),
            Some(Metadata::File(_)) => {
                warn!("{} is a file, replacing it with a folder", path);
                self.api.delete(&path).await?;
            }
            None => debug!("Creating upload folder {}", path),
        }

        self.api.create_folder(&path).await?;
        Ok(())
    }

    /// Whether a file already sits at the target path.
    async fn target_exists(&self, target_path: &str) -> Result<bool> {
        match self.api.get_metadata(target_path).await? {
            Some(Metadata::Folder(_)) => Err(Error::StructuralConflict(format!(
                "Path {} is a directory",
                target_path
            ))),
            Some(Metadata::File(_)) => Ok(true),
            None => Ok(false),
        }
    }

    /// Send the file body, in one request or through a session.
    async fn transfer(
        &self,
        local_path: &Path,
        size: u64,
        target_path: &str,
        mode: WriteMode,
    ) -> Result<()> {
        if size <= self.chunk_size() {
            info!(
                "Uploading small file: {} ({} bytes) to {}",
                local_path.display(),
                size,
                target_path
            );
            let content = tokio::fs::read(local_path).await?;
            self.api
                .upload(Bytes::from(content), &CommitInfo::new(target_path, mode))
                .await?;
            return Ok(());
        }

        info!(
            "Uploading large file: {} ({} bytes) to {} in chunks",
            local_path.display(),
            size,
            target_path
        );
        let mut file = File::open(local_path).await?;
        let mut session = ChunkedUploadSession::new(target_path, mode, size);

        let result = self.send_chunks(&mut file, &mut session).await;
        if let Err(err) = &result {
            session.fail();
            warn!(
                "Chunked upload to {} abandoned at {}/{} bytes (session {}): {}",
                target_path,
                session.offset(),
                session.total_size(),
                session.session_id().unwrap_or("not started"),
                err
            );
        }
        result
    }

    async fn send_chunks(&self, file: &mut File, session: &mut ChunkedUploadSession) -> Result<()> {
        let chunk_size = self.chunk_size();
        let mut progress = ProgressTracker::new();

        let first = read_chunk(file, chunk_size).await?;
        let consumed = first.len() as u64;
        let session_id = self.api.upload_session_start(first).await?;
        session.start(session_id, consumed)?;
        report_progress(&mut progress, session);

        while session.has_remaining() {
            let is_final = session.is_final_chunk(chunk_size);
            let chunk = read_chunk(file, chunk_size).await?;
            if chunk.is_empty() {
                return Err(Error::upload(format!(
                    "Source file shrank during upload: expected {} bytes, read {}",
                    session.total_size(),
                    session.offset()
                )));
            }

            let consumed = chunk.len() as u64;
            let cursor = session.cursor()?;
            if is_final {
                self.api
                    .upload_session_finish(chunk, &cursor, &session.commit_info())
                    .await?;
                session.finish(consumed)?;
            } else {
                self.api.upload_session_append(chunk, &cursor).await?;
                session.append(consumed)?;
            }
            report_progress(&mut progress, session);
        }

        if session.state() != SessionState::Finished {
            return Err(Error::upload("Upload session ended without a commit"));
        }
        Ok(())
    }

    /// Share link for the target, retried on transient failures.
    async fn share_url(&self, target_path: &str) -> Result<String> {
        self.retry
            .execute(|| self.request_share_url(target_path))
            .await
    }

    /// Create a share link, or reuse the first existing one.
    async fn request_share_url(&self, target_path: &str) -> Result<String> {
        let url = match self.api.create_shared_link(target_path).await {
            Ok(url) => url,
            Err(DropboxError::SharedLinkAlreadyExists(_)) => self
                .api
                .list_shared_links(target_path)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    Error::upload(format!(
                        "Failed to get existing share link for {}",
                        target_path
                    ))
                })?,
            Err(e) => return Err(e.into()),
        };

        direct_download_url(&url)
    }
}

#[async_trait]
impl<A: DropboxApi + 'static> UploadClient for DropboxUploader<A> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn upload(&self, local_path: &Path, options: &UploadOptions) -> Result<UploadResult> {
        let started = Instant::now();
        let url = self.upload_file(local_path, options).await?;
        let elapsed = started.elapsed();
        info!("Uploaded {} in {:?}: {}", local_path.display(), elapsed, url);
        Ok(UploadResult::success(url, PROVIDER_NAME, elapsed))
    }
}

/// Rewrite a share link so it downloads instead of opening a preview.
///
/// Sets `dl=1`, replacing an existing `dl` value in place.
pub fn direct_download_url(link: &str) -> Result<String> {
    let mut url = Url::parse(link)
        .map_err(|e| Error::upload_with_source(format!("Invalid share link: {}", link), e))?;

    let mut found = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            if key == "dl" {
                found = true;
                (key.into_owned(), "1".to_string())
            } else {
                (key.into_owned(), value.into_owned())
            }
        })
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear().extend_pairs(&pairs);
        if !found {
            query.append_pair("dl", "1");
        }
    }
    Ok(url.into())
}

/// Read up to `chunk_size` bytes, fewer only at end of file.
async fn read_chunk(file: &mut File, chunk_size: u64) -> std::io::Result<Bytes> {
    let mut buf = vec![0u8; chunk_size as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

fn report_progress(progress: &mut ProgressTracker, session: &ChunkedUploadSession) {
    if let Some(percent) = progress.update(session.offset(), session.total_size()) {
        info!("Upload progress: {}%", percent);
    }
}
