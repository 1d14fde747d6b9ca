//! Dropbox v2 HTTP client.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::credentials::Credentials;

use super::api::{
    Account, ApiResult, CommitInfo, DropboxApi, DropboxError, FileMetadata, FolderMetadata,
    Metadata, UploadSessionCursor,
};

/// RPC endpoint base URL.
const DROPBOX_API_BASE: &str = "https://api.dropboxapi.com/2";
/// Content upload endpoint base URL.
const DROPBOX_CONTENT_BASE: &str = "https://content.dropboxapi.com/2";
/// Header carrying the JSON argument of content endpoints.
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

#[derive(Debug, Deserialize)]
struct SessionStartResponse {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateFolderResponse {
    metadata: FolderMetadata,
}

#[derive(Debug, Deserialize)]
struct SharedLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ListSharedLinksResponse {
    links: Vec<SharedLink>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_summary: String,
}

#[derive(Debug, Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

/// Dropbox API client bound to one access token.
pub struct DropboxClient {
    http: Client,
    credentials: Credentials,
    api_base: String,
    content_base: String,
}

impl DropboxClient {
    /// Create a client for the given token.
    ///
    /// # Errors
    /// - `Auth` if the token cannot be sent as a bearer header
    /// - `Http` if the HTTP client cannot be built
    pub fn new(credentials: Credentials) -> ApiResult<Self> {
        let token = credentials.expose();
        if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DropboxError::Auth(format!(
                "malformed access token in {}",
                credentials.source()
            )));
        }

        let http = Client::builder()
            .user_agent(concat!("upfall/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            credentials,
            api_base: DROPBOX_API_BASE.to_string(),
            content_base: DROPBOX_CONTENT_BASE.to_string(),
        })
    }

    /// Point the client at different hosts (proxies, test servers).
    pub fn with_base_urls(mut self, api_base: impl Into<String>, content_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.content_base = content_base.into();
        self
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.credentials.expose())
    }

    /// Call an RPC endpoint with a JSON body.
    async fn rpc<A: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        arg: &A,
    ) -> ApiResult<R> {
        let url = format!("{}/{}", self.api_base, endpoint);
        debug!("Dropbox RPC {}", endpoint);

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .json(arg)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Call a content-upload endpoint; the argument travels in a header.
    async fn content<A: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        arg: &A,
        body: Bytes,
    ) -> ApiResult<R> {
        let url = format!("{}/{}", self.content_base, endpoint);
        let arg = header_safe_json(arg)?;
        debug!("Dropbox content {} ({} bytes)", endpoint, body.len());

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.auth_header())
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(API_ARG_HEADER, arg)
            .body(body)
            .send()
            .await?;

        handle_response(response).await
    }
}

#[async_trait]
impl DropboxApi for DropboxClient {
    async fn current_account(&self) -> ApiResult<Account> {
        self.rpc("users/get_current_account", &()).await
    }

    async fn get_metadata(&self, path: &str) -> ApiResult<Option<Metadata>> {
        match self
            .rpc::<_, Metadata>("files/get_metadata", &PathArg { path })
            .await
        {
            Ok(metadata) => Ok(Some(metadata)),
            Err(DropboxError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        let _: serde_json::Value = self.rpc("files/delete_v2", &PathArg { path }).await?;
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> ApiResult<FolderMetadata> {
        let response: CreateFolderResponse = self
            .rpc(
                "files/create_folder_v2",
                &json!({ "path": path, "autorename": false }),
            )
            .await?;
        Ok(response.metadata)
    }

    async fn upload(&self, contents: Bytes, commit: &CommitInfo) -> ApiResult<FileMetadata> {
        self.content("files/upload", commit, contents).await
    }

    async fn upload_session_start(&self, contents: Bytes) -> ApiResult<String> {
        let response: SessionStartResponse = self
            .content("files/upload_session/start", &json!({ "close": false }), contents)
            .await?;
        Ok(response.session_id)
    }

    async fn upload_session_append(
        &self,
        contents: Bytes,
        cursor: &UploadSessionCursor,
    ) -> ApiResult<()> {
        let _: serde_json::Value = self
            .content(
                "files/upload_session/append_v2",
                &json!({ "cursor": cursor, "close": false }),
                contents,
            )
            .await?;
        Ok(())
    }

    async fn upload_session_finish(
        &self,
        contents: Bytes,
        cursor: &UploadSessionCursor,
        commit: &CommitInfo,
    ) -> ApiResult<FileMetadata> {
        self.content(
            "files/upload_session/finish",
            &json!({ "cursor": cursor, "commit": commit }),
            contents,
        )
        .await
    }

    async fn create_shared_link(&self, path: &str) -> ApiResult<String> {
        let link: SharedLink = self
            .rpc("sharing/create_shared_link_with_settings", &PathArg { path })
            .await?;
        Ok(link.url)
    }

    async fn list_shared_links(&self, path: &str) -> ApiResult<Vec<String>> {
        let response: ListSharedLinksResponse = self
            .rpc(
                "sharing/list_shared_links",
                &json!({ "path": path, "direct_only": true }),
            )
            .await?;
        Ok(response.links.into_iter().map(|link| link.url).collect())
    }
}

/// Serialize an argument for the `Dropbox-API-Arg` header.
///
/// Header values must be ASCII, so everything above 0x7F is escaped as
/// `\uXXXX` (surrogate pairs outside the BMP).
fn header_safe_json<A: Serialize + ?Sized>(arg: &A) -> ApiResult<String> {
    let raw = serde_json::to_string(arg)
        .map_err(|e| DropboxError::InvalidResponse(format!("Failed to encode argument: {}", e)))?;

    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(escaped)
}

/// Map an HTTP response onto a parsed body or a native error.
async fn handle_response<R: DeserializeOwned>(response: reqwest::Response) -> ApiResult<R> {
    let status = response.status();

    if status.is_success() {
        let body = response.bytes().await?;
        // Some endpoints answer with an empty body; treat it as JSON null.
        let body: &[u8] = if body.is_empty() { b"null" } else { &body };
        return serde_json::from_slice(body)
            .map_err(|e| DropboxError::InvalidResponse(format!("Failed to parse response: {}", e)));
    }

    let text = response.text().await.unwrap_or_default();
    let summary = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error_summary)
        .ok()
        .filter(|summary| !summary.is_empty())
        .unwrap_or(text);

    Err(classify_error(status, summary))
}

fn classify_error(status: StatusCode, summary: String) -> DropboxError {
    if status == StatusCode::UNAUTHORIZED {
        DropboxError::Auth(summary)
    } else if status == StatusCode::CONFLICT && summary.contains("not_found") {
        DropboxError::NotFound(summary)
    } else if status == StatusCode::CONFLICT && summary.contains("shared_link_already_exists") {
        DropboxError::SharedLinkAlreadyExists(summary)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DropboxError::Unavailable {
            status: status.as_u16(),
            summary,
        }
    } else {
        DropboxError::Api {
            status: status.as_u16(),
            summary,
        }
    }
}
