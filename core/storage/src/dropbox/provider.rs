//! Dropbox provider registration: settings, credentials and client handshake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use upfall_common::{Error, ProviderHelp, Result};

use crate::credentials::{CredentialSource, Credentials};
use crate::provider::{Provider, UploadClient};
use crate::retry::RetryExecutor;

use super::api::{ApiResult, DropboxApi};
use super::client::DropboxClient;
use super::uploader::DropboxUploader;

/// Provider identity.
pub const PROVIDER_NAME: &str = "dropbox";

/// Variable holding the access token.
pub const ACCESS_TOKEN_VAR: &str = "DROPBOX_ACCESS_TOKEN";

/// Older variable name, still accepted.
pub const LEGACY_TOKEN_VAR: &str = "DROPBOX_APP_TOKEN";

pub const PROVIDER_HELP: ProviderHelp = ProviderHelp {
    setup: "To use Dropbox storage, run setup to see what is missing, then:\n\
            1. Create an app at https://www.dropbox.com/developers/apps\n\
            2. Enable the files.content.write and sharing.write permissions\n\
            3. Generate an access token and set DROPBOX_ACCESS_TOKEN\n\
            (DROPBOX_APP_TOKEN is read as a fallback)",
    deps: "No extra dependencies; the Dropbox backend is built into upfall.",
};

/// Dropbox backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxSettings {
    /// Remote folder uploads land in.
    pub upload_path: String,
    /// Largest accepted source file, in bytes.
    pub max_file_size: u64,
    /// Single-request threshold and chunk size, in bytes.
    pub chunk_size: usize,
    /// Call the account endpoint when building a client.
    pub verify_token: bool,
}

impl DropboxSettings {
    pub const DEFAULT_UPLOAD_PATH: &'static str = "/upload";
    pub const MAX_FILE_SIZE: u64 = 150 * 1024 * 1024;
    pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

    pub fn with_upload_path(mut self, path: impl Into<String>) -> Self {
        self.upload_path = path.into();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_verify_token(mut self, verify: bool) -> Self {
        self.verify_token = verify;
        self
    }
}

impl Default for DropboxSettings {
    fn default() -> Self {
        Self {
            upload_path: Self::DEFAULT_UPLOAD_PATH.to_string(),
            max_file_size: Self::MAX_FILE_SIZE,
            chunk_size: Self::CHUNK_SIZE,
            verify_token: true,
        }
    }
}

/// Builds the API handle a client talks to.
pub type Connector<A> = Box<dyn Fn(Credentials) -> ApiResult<Arc<A>> + Send + Sync>;

/// Dropbox as a registered provider.
pub struct DropboxProvider<A = DropboxClient> {
    credentials: Arc<dyn CredentialSource>,
    settings: DropboxSettings,
    connector: Connector<A>,
    retry: Option<RetryExecutor>,
}

impl DropboxProvider {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self::with_settings(credentials, DropboxSettings::default())
    }

    /// Provider talking to the Dropbox HTTP API.
    pub fn with_settings(credentials: Arc<dyn CredentialSource>, settings: DropboxSettings) -> Self {
        Self::with_connector(
            credentials,
            settings,
            Box::new(|credentials: Credentials| DropboxClient::new(credentials).map(Arc::new)),
        )
    }
}

impl<A: DropboxApi + 'static> DropboxProvider<A> {
    /// Provider talking to whatever API `connector` returns.
    pub fn with_connector(
        credentials: Arc<dyn CredentialSource>,
        settings: DropboxSettings,
        connector: Connector<A>,
    ) -> Self {
        Self {
            credentials,
            settings,
            connector,
            retry: None,
        }
    }

    /// Replace the share-link retry executor of built clients.
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn settings(&self) -> &DropboxSettings {
        &self.settings
    }
}

#[async_trait]
impl<A: DropboxApi + 'static> Provider for DropboxProvider<A> {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn help(&self) -> ProviderHelp {
        PROVIDER_HELP
    }

    fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .first_present(&[ACCESS_TOKEN_VAR, LEGACY_TOKEN_VAR])
    }

    async fn client(&self) -> Result<Arc<dyn UploadClient>> {
        let credentials = self.credentials().ok_or_else(|| {
            Error::Authentication(format!(
                "{} is not configured (set {})",
                PROVIDER_NAME, ACCESS_TOKEN_VAR
            ))
        })?;
        debug!("Building Dropbox client from {}", credentials.source());

        let api = (self.connector)(credentials).map_err(|e| {
            warn!("Failed to initialize Dropbox client: {}", e);
            Error::from(e)
        })?;

        if self.settings.verify_token {
            match api.current_account().await {
                Ok(account) => debug!("Dropbox token belongs to {}", account.account_id),
                Err(e) => {
                    warn!("Dropbox token check failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        let mut uploader = DropboxUploader::new(api, self.settings.clone());
        if let Some(retry) = &self.retry {
            uploader = uploader.with_retry(retry.clone());
        }
        Ok(Arc::new(uploader))
    }
}
