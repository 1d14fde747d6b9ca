//! Upload orchestration across an ordered chain of providers.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use upfall_common::{Error, ProviderFailure, Result, UploadOptions, UploadResult};
use upfall_storage::{block_on, Provider, ProviderRegistry, UploadClient};

use crate::config::UploadConfig;
use crate::selector::ProviderSelector;

/// Why a provider was passed over without attempting an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Name is not in the registry.
    UnknownProvider,
    /// No credentials were found.
    NotConfigured,
    /// Credentials exist but no client could be built; carries the cause.
    ClientUnavailable(String),
}

impl SkipReason {
    /// Message naming the provider, used when a skip is terminal.
    pub fn describe(&self, provider: &str) -> String {
        match self {
            Self::UnknownProvider => format!("Unknown provider '{}'", provider),
            Self::NotConfigured => format!("{} is not configured", provider),
            Self::ClientUnavailable(cause) => {
                format!("Failed to initialize {} client: {}", provider, cause)
            }
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProvider => write!(f, "unknown provider"),
            Self::NotConfigured => write!(f, "not configured"),
            Self::ClientUnavailable(cause) => write!(f, "failed to initialize client: {}", cause),
        }
    }
}

/// Uploads files through the first provider that works.
pub struct Uploader {
    registry: Arc<ProviderRegistry>,
    config: UploadConfig,
}

impl Uploader {
    /// Create an uploader that falls back in registration order.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self::from_arc(Arc::new(registry))
    }

    pub fn from_arc(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            config: UploadConfig::default(),
        }
    }

    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload a file through the selected provider(s).
    ///
    /// # Errors
    /// - `Validation` / `StructuralConflict` as soon as any provider reports one
    /// - For a single provider, its own failure
    /// - For a chain, `AllProvidersFailed` once every provider was passed over or failed
    pub async fn upload(
        &self,
        local_path: &Path,
        selector: impl Into<ProviderSelector>,
        options: &UploadOptions,
    ) -> Result<UploadResult> {
        match selector.into() {
            ProviderSelector::Single(name) => self.upload_single(local_path, &name, options).await,
            ProviderSelector::Chain(names) => self.upload_chain(local_path, &names, options).await,
            ProviderSelector::Default => {
                let names = self.config.default_chain(&self.registry);
                self.upload_chain(local_path, &names, options).await
            }
        }
    }

    /// Upload a file and return only its URL.
    pub async fn upload_url(
        &self,
        local_path: &Path,
        selector: impl Into<ProviderSelector>,
        options: &UploadOptions,
    ) -> Result<String> {
        Ok(self.upload(local_path, selector, options).await?.url)
    }

    /// Blocking form of [`Uploader::upload`].
    ///
    /// # Errors
    /// - `Upload` when called from inside a Tokio runtime
    pub fn upload_blocking(
        &self,
        local_path: &Path,
        selector: impl Into<ProviderSelector>,
        options: &UploadOptions,
    ) -> Result<UploadResult> {
        block_on(self.upload(local_path, selector, options))
    }

    async fn upload_single(
        &self,
        local_path: &Path,
        name: &str,
        options: &UploadOptions,
    ) -> Result<UploadResult> {
        let provider = self.registry.resolve(name)?;
        let client = prepare(provider.as_ref())
            .await
            .map_err(|reason| Error::Authentication(reason.describe(name)))?;
        client.upload(local_path, options).await
    }

    async fn upload_chain(
        &self,
        local_path: &Path,
        names: &[String],
        options: &UploadOptions,
    ) -> Result<UploadResult> {
        if names.is_empty() {
            return Err(Error::Validation("No providers to try".to_string()));
        }

        let mut failures = Vec::new();

        for name in names {
            let client = match self.registry.resolve(name) {
                Ok(provider) => prepare(provider.as_ref()).await,
                Err(_) => Err(SkipReason::UnknownProvider),
            };
            let client = match client {
                Ok(client) => client,
                Err(reason) => {
                    info!("Skipping {}: {}", name, reason);
                    failures.push(ProviderFailure::new(name.as_str(), reason.to_string()));
                    continue;
                }
            };

            debug!("Uploading {} with {}", local_path.display(), name);
            match client.upload(local_path, options).await {
                Ok(result) => {
                    info!("Uploaded {} with {}", local_path.display(), name);
                    return Ok(result);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("Provider {} failed: {}", name, err);
                    failures.push(ProviderFailure::new(name.as_str(), err.to_string()));
                }
            }
        }

        Err(Error::AllProvidersFailed(failures))
    }
}

/// Resolve credentials and build a client, or say why not.
pub(crate) async fn prepare(
    provider: &dyn Provider,
) -> std::result::Result<Arc<dyn UploadClient>, SkipReason> {
    if provider.credentials().is_none() {
        return Err(SkipReason::NotConfigured);
    }
    provider
        .client()
        .await
        .map_err(|err| SkipReason::ClientUnavailable(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use upfall_common::ProviderHelp;
    use upfall_storage::dropbox::{DropboxProvider, DropboxSettings};
    use upfall_storage::memory::{ApiCall, InjectedFailure, Operation};
    use upfall_storage::{
        Credentials, MemoryDropboxApi, RecordingSleeper, RetryExecutor, RetryPolicy,
        StaticCredentials,
    };

    #[derive(Debug, Clone, Copy)]
    enum Outcome {
        Url(&'static str),
        Transient,
        Auth,
        Invalid,
        Conflict,
    }

    #[derive(Default)]
    struct Counters {
        credentials: AtomicU32,
        clients: AtomicU32,
        uploads: AtomicU32,
    }

    struct FakeClient {
        name: &'static str,
        outcome: Outcome,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl UploadClient for FakeClient {
        fn name(&self) -> &str {
            self.name
        }

        async fn upload(&self, _local_path: &Path, _options: &UploadOptions) -> Result<UploadResult> {
            self.counters.uploads.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Url(url) => Ok(UploadResult::success(url, self.name, Duration::ZERO)),
                Outcome::Transient => Err(Error::Transient("503 from server".into())),
                Outcome::Auth => Err(Error::Authentication("token rejected".into())),
                Outcome::Invalid => Err(Error::Validation("File too large".into())),
                Outcome::Conflict => Err(Error::StructuralConflict("is a directory".into())),
            }
        }
    }

    struct FakeProvider {
        name: &'static str,
        configured: bool,
        buildable: bool,
        outcome: Outcome,
        counters: Arc<Counters>,
    }

    impl FakeProvider {
        fn new(name: &'static str, outcome: Outcome) -> Self {
            Self {
                name,
                configured: true,
                buildable: true,
                outcome,
                counters: Arc::new(Counters::default()),
            }
        }

        fn unconfigured(name: &'static str) -> Self {
            Self {
                configured: false,
                ..Self::new(name, Outcome::Url("unused"))
            }
        }

        fn unbuildable(name: &'static str) -> Self {
            Self {
                buildable: false,
                ..Self::new(name, Outcome::Url("unused"))
            }
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn help(&self) -> ProviderHelp {
            ProviderHelp {
                setup: "set FAKE_TOKEN",
                deps: "none",
            }
        }

        fn credentials(&self) -> Option<Credentials> {
            self.counters.credentials.fetch_add(1, Ordering::SeqCst);
            self.configured
                .then(|| Credentials::new("secret", "FAKE_TOKEN"))
        }

        async fn client(&self) -> Result<Arc<dyn UploadClient>> {
            self.counters.clients.fetch_add(1, Ordering::SeqCst);
            if !self.buildable {
                return Err(Error::Authentication("expired_access_token/".into()));
            }
            Ok(Arc::new(FakeClient {
                name: self.name,
                outcome: self.outcome,
                counters: self.counters.clone(),
            }))
        }
    }

    /// Dropbox provider over the in-memory API, retrying without real sleeps.
    fn memory_dropbox(
        api: &Arc<MemoryDropboxApi>,
        sleeper: Arc<RecordingSleeper>,
    ) -> Arc<DropboxProvider<MemoryDropboxApi>> {
        Arc::new(
            DropboxProvider::with_connector(
                Arc::new(StaticCredentials::new().with("DROPBOX_ACCESS_TOKEN", "sl.memory")),
                DropboxSettings::default(),
                api.connector(),
            )
            .with_retry(RetryExecutor::with_sleeper(RetryPolicy::share_link(), sleeper)),
        )
    }

    fn uploader_with(providers: Vec<Arc<dyn Provider>>) -> Uploader {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            registry.register(provider).unwrap();
        }
        Uploader::new(registry)
    }

    fn source_file() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"jpeg bytes").unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_falls_back_past_unconfigured_and_failing_providers() {
        let (_dir, path) = source_file();

        let a = Arc::new(FakeProvider::unconfigured("a"));
        let api = Arc::new(MemoryDropboxApi::new());
        api.fail_next(Operation::CreateSharedLink, InjectedFailure::Unavailable, 3);
        let sleeper = Arc::new(RecordingSleeper::new());
        let b = memory_dropbox(&api, sleeper.clone());
        let c = Arc::new(FakeProvider::new("c", Outcome::Url("https://c.example/photo.jpg")));

        let uploader = uploader_with(vec![a.clone() as Arc<dyn Provider>, b, c.clone()]);
        let result = uploader
            .upload(&path, ["a", "dropbox", "c"], &UploadOptions::new())
            .await
            .unwrap();

        assert_eq!(result.url, "https://c.example/photo.jpg");
        assert_eq!(result.provider, "c");

        assert_eq!(a.counters.credentials.load(Ordering::SeqCst), 1);
        assert_eq!(a.counters.uploads.load(Ordering::SeqCst), 0);

        assert_eq!(api.count(Operation::Upload), 1);
        assert_eq!(api.count(Operation::CreateSharedLink), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(4), Duration::from_secs(4)]
        );

        assert_eq!(c.counters.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_success_stops_chain() {
        let (_dir, path) = source_file();
        let a = Arc::new(FakeProvider::new("a", Outcome::Url("https://a.example/x")));
        let b = Arc::new(FakeProvider::new("b", Outcome::Url("https://b.example/x")));

        let uploader = uploader_with(vec![a as Arc<dyn Provider>, b.clone()]);
        let url = uploader
            .upload_url(&path, ["a", "b"], &UploadOptions::new())
            .await
            .unwrap();

        assert_eq!(url, "https://a.example/x");
        assert_eq!(b.counters.credentials.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fatal_errors_stop_chain() {
        let (_dir, path) = source_file();

        for outcome in [Outcome::Invalid, Outcome::Conflict] {
            let a = Arc::new(FakeProvider::new("a", outcome));
            let b = Arc::new(FakeProvider::new("b", Outcome::Url("https://b.example/x")));
            let uploader = uploader_with(vec![a as Arc<dyn Provider>, b.clone()]);

            let err = uploader
                .upload(&path, ["a", "b"], &UploadOptions::new())
                .await
                .unwrap_err();

            assert!(err.is_fatal());
            assert_eq!(b.counters.uploads.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_validation_from_real_backend_stops_chain() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");

        let api = Arc::new(MemoryDropboxApi::new());
        let dropbox = memory_dropbox(&api, Arc::new(RecordingSleeper::new()));
        let c = Arc::new(FakeProvider::new("c", Outcome::Url("https://c.example/x")));
        let uploader = uploader_with(vec![dropbox as Arc<dyn Provider>, c.clone()]);

        let err = uploader
            .upload(&missing, ["dropbox", "c"], &UploadOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(api.calls(), vec![ApiCall::CurrentAccount]);
        assert_eq!(c.counters.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_lists_every_provider() {
        let (_dir, path) = source_file();
        let a = Arc::new(FakeProvider::unconfigured("a"));
        let b = Arc::new(FakeProvider::unbuildable("b"));
        let c = Arc::new(FakeProvider::new("c", Outcome::Auth));
        let d = Arc::new(FakeProvider::new("d", Outcome::Transient));
        let uploader = uploader_with(vec![a as Arc<dyn Provider>, b, c, d]);

        let err = uploader
            .upload(&path, ["a", "b", "nope", "c", "d"], &UploadOptions::new())
            .await
            .unwrap_err();

        let Error::AllProvidersFailed(failures) = &err else {
            panic!("expected aggregate failure, got {:?}", err);
        };
        let providers: Vec<&str> = failures.iter().map(|f| f.provider.as_str()).collect();
        assert_eq!(providers, ["a", "b", "nope", "c", "d"]);
        assert_eq!(failures[0].reason, "not configured");
        assert_eq!(
            failures[1].reason,
            "failed to initialize client: Authentication error: expired_access_token/"
        );
        assert_eq!(failures[2].reason, "unknown provider");
        assert!(failures[3].reason.contains("token rejected"));
        assert!(failures[4].reason.contains("503"));
        assert!(err.to_string().starts_with("All providers failed: a: not configured; "));
    }

    #[tokio::test]
    async fn test_single_provider_failures_are_final() {
        let (_dir, path) = source_file();
        let a = Arc::new(FakeProvider::unconfigured("a"));
        let b = Arc::new(FakeProvider::unbuildable("b"));
        let c = Arc::new(FakeProvider::new("c", Outcome::Transient));
        let uploader = uploader_with(vec![a as Arc<dyn Provider>, b, c]);
        let options = UploadOptions::new();

        let err = uploader.upload(&path, "a", &options).await.unwrap_err();
        assert!(matches!(&err, Error::Authentication(m) if m == "a is not configured"));

        let err = uploader.upload(&path, "b", &options).await.unwrap_err();
        assert!(matches!(&err, Error::Authentication(m)
            if m.starts_with("Failed to initialize b client") && m.contains("expired_access_token")));

        let err = uploader.upload(&path, "c", &options).await.unwrap_err();
        assert!(matches!(err, Error::Transient(_)));

        let err = uploader.upload(&path, "zzz", &options).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_chain_is_rejected() {
        let (_dir, path) = source_file();
        let uploader = uploader_with(vec![]);

        let err = uploader
            .upload(&path, Vec::<String>::new(), &UploadOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = uploader
            .upload(&path, ProviderSelector::Default, &UploadOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_default_chain_uses_registration_order() {
        let (_dir, path) = source_file();
        let a = Arc::new(FakeProvider::new("a", Outcome::Transient));
        let b = Arc::new(FakeProvider::new("b", Outcome::Url("https://b.example/x")));
        let uploader = uploader_with(vec![a.clone() as Arc<dyn Provider>, b]);

        let result = uploader
            .upload(&path, ProviderSelector::Default, &UploadOptions::new())
            .await
            .unwrap();

        assert_eq!(result.provider, "b");
        assert_eq!(a.counters.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_configured_chain_overrides_registration_order() {
        let (_dir, path) = source_file();
        let a = Arc::new(FakeProvider::new("a", Outcome::Url("https://a.example/x")));
        let b = Arc::new(FakeProvider::new("b", Outcome::Url("https://b.example/x")));
        let uploader = uploader_with(vec![a.clone() as Arc<dyn Provider>, b])
            .with_config(UploadConfig::default().with_providers(["b", "a"]));

        let result = uploader
            .upload(&path, ProviderSelector::Default, &UploadOptions::new())
            .await
            .unwrap();

        assert_eq!(result.provider, "b");
        assert_eq!(a.counters.credentials.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blocking_upload() {
        let (_dir, path) = source_file();
        let api = Arc::new(MemoryDropboxApi::new());
        let dropbox = memory_dropbox(&api, Arc::new(RecordingSleeper::new()));
        let uploader = uploader_with(vec![dropbox as Arc<dyn Provider>]);

        let result = uploader
            .upload_blocking(&path, "dropbox", &UploadOptions::new())
            .unwrap();

        assert_eq!(result.provider, "dropbox");
        assert!(result.url.ends_with("/photo.jpg?rlkey=memory&dl=1"));
        assert_eq!(api.file("/upload/photo.jpg").unwrap(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_rejected_dropbox_token_is_skipped_with_cause() {
        let (_dir, path) = source_file();
        let api = Arc::new(MemoryDropboxApi::new());
        api.fail_next(Operation::CurrentAccount, InjectedFailure::Auth, 1);
        let dropbox = memory_dropbox(&api, Arc::new(RecordingSleeper::new()));
        let c = Arc::new(FakeProvider::new("c", Outcome::Transient));
        let uploader = uploader_with(vec![dropbox as Arc<dyn Provider>, c]);

        let err = uploader
            .upload(&path, ["dropbox", "c"], &UploadOptions::new())
            .await
            .unwrap_err();

        let Error::AllProvidersFailed(failures) = &err else {
            panic!("expected aggregate failure, got {:?}", err);
        };
        assert_eq!(failures[0].provider, "dropbox");
        assert!(failures[0].reason.starts_with("failed to initialize client"));
        assert!(failures[0].reason.contains("invalid_access_token"));
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_blocking_upload_inside_runtime_is_an_error() {
        let (_dir, path) = source_file();
        let c = Arc::new(FakeProvider::new("c", Outcome::Url("https://c.example/x")));
        let uploader = uploader_with(vec![c.clone() as Arc<dyn Provider>]);

        let err = uploader
            .upload_blocking(&path, "c", &UploadOptions::new())
            .unwrap_err();

        assert!(matches!(err, Error::Upload { .. }));
        assert_eq!(c.counters.uploads.load(Ordering::SeqCst), 0);
    }
}
