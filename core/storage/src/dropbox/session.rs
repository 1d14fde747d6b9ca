//! Chunked upload session state.

use upfall_common::{Error, Result, WriteMode};

use super::api::{CommitInfo, UploadSessionCursor};

/// Lifecycle of a chunked transfer.
///
/// `NotStarted -> SessionStarted -> Appending -> Finished`, with `Failed`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    SessionStarted,
    Appending,
    Finished,
    Failed,
}

/// A single-use upload session.
///
/// `offset` always equals the number of source bytes handed to the remote
/// side. A session is never resumed; a new attempt starts a new session.
#[derive(Debug, Clone)]
pub struct ChunkedUploadSession {
    session_id: Option<String>,
    offset: u64,
    total_size: u64,
    target_path: String,
    mode: WriteMode,
    state: SessionState,
}

impl ChunkedUploadSession {
    pub fn new(target_path: impl Into<String>, mode: WriteMode, total_size: u64) -> Self {
        Self {
            session_id: None,
            offset: 0,
            total_size,
            target_path: target_path.into(),
            mode,
            state: SessionState::NotStarted,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes not yet sent.
    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.offset)
    }

    /// Whether there is anything left to send.
    pub fn has_remaining(&self) -> bool {
        self.offset < self.total_size
    }

    /// Whether the next chunk is the last one and must be sent as a commit.
    pub fn is_final_chunk(&self, chunk_size: u64) -> bool {
        self.remaining() <= chunk_size
    }

    /// Record the session id returned for the first chunk.
    pub fn start(&mut self, session_id: impl Into<String>, consumed: u64) -> Result<()> {
        self.expect_state(&[SessionState::NotStarted], "start")?;
        self.session_id = Some(session_id.into());
        self.offset = consumed;
        self.state = SessionState::SessionStarted;
        Ok(())
    }

    /// Cursor for the next append or the final commit.
    pub fn cursor(&self) -> Result<UploadSessionCursor> {
        let session_id = self
            .session_id
            .clone()
            .ok_or_else(|| Error::upload("Upload session has not been started"))?;
        Ok(UploadSessionCursor {
            session_id,
            offset: self.offset,
        })
    }

    /// Record an appended chunk.
    pub fn append(&mut self, consumed: u64) -> Result<()> {
        self.expect_state(
            &[SessionState::SessionStarted, SessionState::Appending],
            "append",
        )?;
        self.offset += consumed;
        self.state = SessionState::Appending;
        Ok(())
    }

    /// Record the committed final chunk.
    pub fn finish(&mut self, consumed: u64) -> Result<()> {
        self.expect_state(
            &[SessionState::SessionStarted, SessionState::Appending],
            "finish",
        )?;
        self.offset += consumed;
        self.state = SessionState::Finished;
        Ok(())
    }

    /// Abandon the session. The remote side is not told.
    pub fn fail(&mut self) {
        if self.state != SessionState::Finished {
            self.state = SessionState::Failed;
        }
    }

    /// Commit parameters for the final chunk.
    pub fn commit_info(&self) -> CommitInfo {
        CommitInfo::new(self.target_path.clone(), self.mode)
    }

    fn expect_state(&self, allowed: &[SessionState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::upload(format!(
                "Cannot {} upload session in state {:?}",
                action, self.state
            )))
        }
    }
}

/// Emits a notification each time progress grows by at least ten points.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed cumulative progress; returns the percentage to report, if any.
    pub fn update(&mut self, consumed: u64, total: u64) -> Option<u8> {
        if total == 0 {
            return None;
        }
        let percent = (consumed.min(total) as u128 * 100 / total as u128) as u64;
        if percent >= self.last + 10 {
            self.last = percent;
            Some(percent as u8)
        } else {
            None
        }
    }
}
