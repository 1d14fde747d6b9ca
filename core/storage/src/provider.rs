//! Provider contract.
//!
//! A backend is split in two: the [`Provider`] knows how to find credentials
//! and build a client, the [`UploadClient`] performs uploads. Construction
//! failures stay on the provider side so the orchestrator can tell
//! "not configured" apart from "failed while uploading".

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use upfall_common::{Error, ProviderHelp, Result, UploadOptions, UploadResult};

use crate::credentials::Credentials;

/// A ready-to-use client for one backend.
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Provider identity (e.g., "dropbox").
    fn name(&self) -> &str;

    /// Upload a local file and return its public URL.
    ///
    /// # Preconditions
    /// - `local_path` points at a regular file
    ///
    /// # Postconditions
    /// - The object is reachable at the returned URL
    /// - `elapsed` covers the whole call
    ///
    /// # Errors
    /// - `Validation` / `StructuralConflict` for input faults
    /// - `Authentication`, `Transient`, `Upload` for backend faults
    async fn upload(&self, local_path: &Path, options: &UploadOptions) -> Result<UploadResult>;

    /// Blocking form of [`UploadClient::upload`].
    ///
    /// Drives the async upload on a private current-thread runtime, so both
    /// forms share every step.
    ///
    /// # Errors
    /// - `Upload` when called from inside a Tokio runtime
    fn upload_blocking(&self, local_path: &Path, options: &UploadOptions) -> Result<UploadResult> {
        block_on(self.upload(local_path, options))
    }
}

/// A registered backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identity used in logs, diagnostics and preference chains.
    fn name(&self) -> &str;

    /// Static setup and dependency instructions.
    fn help(&self) -> ProviderHelp;

    /// Resolve credentials from the configured source.
    ///
    /// Absence means "not configured"; this never fails.
    fn credentials(&self) -> Option<Credentials>;

    /// Build a client, performing any handshake the backend needs.
    ///
    /// # Errors
    /// - `Authentication` when credentials are missing or rejected
    /// - Whatever the handshake failed with otherwise
    async fn client(&self) -> Result<Arc<dyn UploadClient>>;

    /// Upload through a freshly built client.
    async fn upload(&self, local_path: &Path, options: &UploadOptions) -> Result<UploadResult> {
        let client = self.client().await?;
        client.upload(local_path, options).await
    }
}

/// Run a future to completion on a private current-thread runtime.
///
/// # Errors
/// - `Upload` when the calling thread already runs a Tokio runtime
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::upload(
            "Blocking upload called from inside an async runtime; use the async form",
        ));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct EchoClient {
        calls: AtomicU32,
    }

    #[async_trait]
    impl UploadClient for EchoClient {
        fn name(&self) -> &str {
            "echo"
        }

        async fn upload(&self, local_path: &Path, options: &UploadOptions) -> Result<UploadResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = options
                .remote_path
                .clone()
                .unwrap_or_else(|| local_path.display().to_string());
            Ok(UploadResult::success(
                format!("https://echo.test/{}", name),
                "echo",
                Duration::ZERO,
            ))
        }
    }

    struct EchoProvider {
        configured: bool,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn help(&self) -> ProviderHelp {
            ProviderHelp {
                setup: "nothing to set up",
                deps: "none",
            }
        }

        fn credentials(&self) -> Option<Credentials> {
            self.configured.then(|| Credentials::new("echo-token", "ECHO_TOKEN"))
        }

        async fn client(&self) -> Result<Arc<dyn UploadClient>> {
            if self.credentials().is_none() {
                return Err(Error::Authentication("echo is not configured".into()));
            }
            Ok(Arc::new(EchoClient {
                calls: AtomicU32::new(0),
            }))
        }
    }

    #[test]
    fn test_blocking_matches_async() {
        let client = EchoClient {
            calls: AtomicU32::new(0),
        };
        let options = UploadOptions::new().with_remote_path("a.txt");

        let blocking = client
            .upload_blocking(Path::new("/tmp/a.txt"), &options)
            .unwrap();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let async_result = runtime
            .block_on(client.upload(Path::new("/tmp/a.txt"), &options))
            .unwrap();

        assert_eq!(blocking.url, async_result.url);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_upload_uses_client() {
        let provider = EchoProvider { configured: true };
        let result = provider
            .upload(Path::new("x.bin"), &UploadOptions::new())
            .await
            .unwrap();
        assert_eq!(result.url, "https://echo.test/x.bin");
    }

    #[tokio::test]
    async fn test_provider_upload_without_credentials() {
        let provider = EchoProvider { configured: false };
        let err = provider
            .upload(Path::new("x.bin"), &UploadOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_blocking_inside_runtime_is_an_error() {
        let client = EchoClient {
            calls: AtomicU32::new(0),
        };

        let err = client
            .upload_blocking(Path::new("/tmp/a.txt"), &UploadOptions::new())
            .unwrap_err();

        assert!(matches!(err, Error::Upload { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}
