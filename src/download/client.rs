//! HTTP client wrapper for probing, sniffing and downloading media.
//!
//! `HttpClient` is created once and cloned freely; clones share the
//! underlying connection pool.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Client, ClientBuilder, Method, Proxy};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::{
    filename_from_response_url, parse_content_disposition, resolve_unique_path,
    sanitize_filename, with_inferred_extension,
};
use crate::user_agent::{self, BROWSER_USER_AGENT};

/// HTTP client for media requests.
///
/// # Example
///
/// ```no_run
/// use media_scout_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let path = client
///     .download_to_file("https://example.com/clip.mp4", Path::new("./downloads"))
///     .await?;
/// println!("Downloaded to: {}", path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Header-level facts about a remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    /// `Content-Length`, when the server sent one.
    pub content_length: Option<u64>,
    /// `Content-Type`, when the server sent one.
    pub content_type: Option<String>,
    /// Whether the server advertised byte-range support.
    pub accepts_ranges: bool,
}

/// A fetched text body with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResponse {
    pub body: String,
    pub content_type: Option<String>,
    /// URL after redirects.
    pub final_url: String,
}

/// Outcome of a completed download.
#[derive(Debug, Clone)]
pub struct DownloadFileResult {
    /// Final output path.
    pub path: PathBuf,
    /// Bytes written to disk.
    pub bytes_downloaded: u64,
    /// Size the server announced, when known.
    pub content_length: Option<u64>,
    /// Content type the server announced, when known.
    pub content_type: Option<String>,
}

impl HttpClient {
    /// Creates a client with default timeouts (30s connect, 5min read).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend or proxy
    /// configuration cannot be initialised.
    pub fn new() -> Result<Self, DownloadError> {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the client cannot be built.
    pub fn new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let client = build_client(connect_timeout_secs, read_timeout_secs)?;
        Ok(Self { client })
    }

    /// Issues a HEAD request and reports size, type and range support.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on network failure or a non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo, DownloadError> {
        let response = self.send_request(Method::HEAD, url, None, None).await?;
        let headers = response.headers();
        let info = ProbeInfo {
            content_length: headers
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok()),
            content_type: header_string(&response, CONTENT_TYPE),
            accepts_ranges: headers
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.eq_ignore_ascii_case("bytes")),
        };
        debug!(
            content_length = ?info.content_length,
            content_type = ?info.content_type,
            "probe complete"
        );
        Ok(info)
    }

    /// Fetches at most `len` leading bytes, asking for a byte range.
    ///
    /// Servers that ignore `Range` still work: the body is read only until
    /// `len` bytes have arrived.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on network failure or a non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_prefix(&self, url: &str, len: usize) -> Result<Vec<u8>, DownloadError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let range = format!("bytes=0-{}", len - 1);
        let response = self
            .send_request(Method::GET, url, None, Some(&range))
            .await?;

        let mut prefix = Vec::with_capacity(len);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::network(url, e))?;
            let take = (len - prefix.len()).min(chunk.len());
            prefix.extend_from_slice(&chunk[..take]);
            if prefix.len() >= len {
                break;
            }
        }
        Ok(prefix)
    }

    /// Fetches a text body (manifest, page) along with its content type.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on network failure or a non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &str) -> Result<TextResponse, DownloadError> {
        self.fetch_text_inner(url, None).await
    }

    /// Fetches an HTML page presenting a browser User-Agent.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on network failure or a non-success status.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &str) -> Result<TextResponse, DownloadError> {
        self.fetch_text_inner(url, Some(BROWSER_USER_AGENT)).await
    }

    async fn fetch_text_inner(
        &self,
        url: &str,
        user_agent: Option<&str>,
    ) -> Result<TextResponse, DownloadError> {
        let response = self.send_request(Method::GET, url, user_agent, None).await?;
        let content_type = header_string(&response, CONTENT_TYPE);
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        debug!(bytes = body.len(), "text fetched");
        Ok(TextResponse {
            body,
            content_type,
            final_url,
        })
    }

    /// Downloads `url` into `output_dir`, returning the saved path.
    ///
    /// The filename comes from Content-Disposition, then the URL path, then a
    /// timestamp fallback; an existing file is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails, the
    /// server returns an error status or writing to disk fails.
    #[must_use = "download result contains the path to the downloaded file"]
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download_to_file(
        &self,
        url: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        Ok(self.download_to_file_with_name(url, output_dir, None).await?.path)
    }

    /// Downloads `url`, saving under `preferred_filename` when given.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`download_to_file`](Self::download_to_file).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download_to_file_with_name(
        &self,
        url: &str,
        output_dir: &Path,
        preferred_filename: Option<&str>,
    ) -> Result<DownloadFileResult, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::io(output_dir, e))?;

        let response = self.send_request(Method::GET, url, None, None).await?;
        let content_type = header_string(&response, CONTENT_TYPE);
        let content_length = response.content_length();

        let filename = preferred_filename
            .map(sanitize_filename)
            .filter(|name| !name.trim_matches('_').is_empty())
            .unwrap_or_else(|| extract_filename(&response, &parsed_url));
        let filename = with_inferred_extension(&filename, content_type.as_deref());
        let file_path = resolve_unique_path(output_dir, &filename);
        debug!(path = %file_path.display(), "resolved output path");

        let mut file = File::create(&file_path)
            .await
            .map_err(|e| DownloadError::io(file_path.clone(), e))?;

        let stream_result = stream_to_file(&mut file, response, url, &file_path).await;
        if stream_result.is_err() {
            debug!(path = %file_path.display(), "cleaning up partial file after error");
            let _ = tokio::fs::remove_file(&file_path).await;
        }
        let bytes_downloaded = stream_result?;

        info!(path = %file_path.display(), bytes = bytes_downloaded, "download complete");

        Ok(DownloadFileResult {
            path: file_path,
            bytes_downloaded,
            content_length,
            content_type,
        })
    }

    async fn send_request(
        &self,
        method: Method,
        url: &str,
        user_agent: Option<&str>,
        range_header: Option<&str>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.request(method, url);
        if let Some(ua) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }
        if let Some(range) = range_header {
            request = request.header(RANGE, range);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else if e.is_builder() {
                DownloadError::invalid_url(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Streams the response body to `file`, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Filename from Content-Disposition, then the URL path, then a timestamp.
fn extract_filename(response: &reqwest::Response, url: &Url) -> String {
    if let Some(filename) = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|cd| cd.to_str().ok())
        .and_then(parse_content_disposition)
    {
        return sanitize_filename(&filename);
    }

    if let Some(filename) = filename_from_response_url(url) {
        return filename;
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}")
}

fn build_client(connect_timeout_secs: u64, read_timeout_secs: u64) -> Result<Client, DownloadError> {
    match try_build_client(connect_timeout_secs, read_timeout_secs, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            warn!(
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(connect_timeout_secs, read_timeout_secs, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Build(error)) => {
                    Err(DownloadError::client_build(error.to_string()))
                }
                Err(BuildClientFailure::Panic) => Err(DownloadError::client_build(
                    "builder panicked while applying env-proxy fallback",
                )),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(DownloadError::client_build(error.to_string())),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

// `catch_unwind` does not suppress panic-hook stderr output; silence the hook
// while building so recovered proxy panics leave CLI stderr clean.
static CLIENT_BUILD_PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn try_build_client(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind_silent(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(connect_timeout_secs, read_timeout_secs);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn catch_unwind_silent<F, T>(operation: F) -> Result<T, Box<dyn std::any::Any + Send + 'static>>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    let _panic_hook_guard = CLIENT_BUILD_PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(operation);
    set_hook(previous_hook);
    outcome
}

fn base_client_builder(connect_timeout_secs: u64, read_timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
