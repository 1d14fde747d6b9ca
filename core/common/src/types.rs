//! Data model shared by providers and the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Outcome of a successful upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    /// Public URL of the stored object.
    pub url: String,
    /// Identity of the provider that produced the URL.
    pub provider: String,
    /// Wall time spent in the provider.
    pub elapsed: Duration,
    pub success: bool,
}

impl UploadResult {
    /// Create a successful result.
    pub fn success(url: impl Into<String>, provider: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            url: url.into(),
            provider: provider.into(),
            elapsed,
            success: true,
        }
    }
}

/// How a write treats an object already present at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail if the target exists.
    Add,
    /// Replace the target.
    Overwrite,
}

impl WriteMode {
    /// `Overwrite` iff the caller asked for force.
    pub fn from_force(force: bool) -> Self {
        if force {
            Self::Overwrite
        } else {
            Self::Add
        }
    }
}

/// What to do when the target name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathConflictPolicy {
    /// Keep the existing object and return its link.
    #[default]
    SkipExisting,
    /// Replace the existing object.
    OverwriteExisting,
    /// Never look for conflicts; write under a timestamped name.
    UniqueName,
}

impl PathConflictPolicy {
    /// Derive the policy from the caller's `unique` and `force` flags.
    ///
    /// `unique` wins: a timestamped name never needs a conflict check.
    pub fn from_flags(unique: bool, force: bool) -> Self {
        match (unique, force) {
            (true, _) => Self::UniqueName,
            (false, true) => Self::OverwriteExisting,
            (false, false) => Self::SkipExisting,
        }
    }
}

/// Static diagnostic text for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderHelp {
    /// How to configure credentials.
    pub setup: &'static str,
    /// How to install what the provider needs.
    pub deps: &'static str,
}

/// Caller-supplied knobs for a single upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Remote file name to use instead of the local one.
    #[serde(default)]
    pub remote_path: Option<String>,
    /// Write under a timestamped name.
    #[serde(default)]
    pub unique: bool,
    /// Overwrite an existing object.
    #[serde(default)]
    pub force: bool,
    /// Remote folder to upload into (provider default when absent).
    #[serde(default)]
    pub upload_path: Option<String>,
    /// Provider-specific extras.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = Some(remote_path.into());
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_upload_path(mut self, upload_path: impl Into<String>) -> Self {
        self.upload_path = Some(upload_path.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn conflict_policy(&self) -> PathConflictPolicy {
        PathConflictPolicy::from_flags(self.unique, self.force)
    }

    pub fn write_mode(&self) -> WriteMode {
        WriteMode::from_force(self.force)
    }
}

/// An absolute, slash-separated path on a remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePath {
    components: Vec<String>,
}

impl RemotePath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a path string, ignoring leading and trailing separators.
    ///
    /// # Errors
    /// - Returns `Validation` for empty inner components (`/a//b`)
    pub fn parse(path: &str) -> crate::Result<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut components = Vec::new();
        for comp in trimmed.split('/') {
            if comp.is_empty() {
                return Err(crate::Error::Validation(format!(
                    "Invalid remote path: {}",
                    path
                )));
            }
            components.push(comp.to_string());
        }
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Last component.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a single child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        if child.is_empty() || child.contains('/') || child.contains('\\') {
            return Err(crate::Error::Validation(format!(
                "Invalid remote file name: {:?}",
                child
            )));
        }
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            "/".to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}
