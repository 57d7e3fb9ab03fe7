//! Job kinds run by the scheduler on behalf of a scan session.
//!
//! - [`ANALYZE`]: HEAD probe plus a short ranged GET sniffed for magic
//!   numbers; the size feeds back into the quality estimate
//! - [`VALIDATE`]: expands a manifest into its segments
//! - [`DOWNLOAD`]: streams a resource into an output directory
//!
//! Payloads and results are JSON (the only data crossing into a unit), with
//! typed views for each side.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::classify::{OCTET_STREAM, mime_from_bytes};
use crate::download::{HttpClient, SNIFF_BYTES};
use crate::manifest::ManifestResolver;
use crate::quality::Measurement;
use crate::resource::Resource;
use crate::scheduler::{JobError, JobHandler, Scheduler, TaskRequest};

pub const ANALYZE: &str = "analyze";
pub const VALIDATE: &str = "validate";
pub const DOWNLOAD: &str = "download";

/// Payload of `analyze` and `validate` tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPayload {
    pub url: String,
}

impl UrlPayload {
    /// Serializes `{"url": ...}`.
    #[must_use]
    pub fn json(url: &str) -> Value {
        serde_json::json!({ "url": url })
    }
}

/// Result of an `analyze` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub url: String,
    /// `Content-Length` from the probe.
    pub size: Option<u64>,
    /// `Content-Type` from the probe.
    pub content_type: Option<String>,
    /// MIME type recognised from the leading bytes.
    pub sniffed_type: Option<String>,
    pub accepts_ranges: bool,
}

impl AnalysisReport {
    /// The estimator input this report carries.
    #[must_use]
    pub fn measurement(&self) -> Measurement {
        Measurement {
            size: self.size.unwrap_or(0),
            ..Measurement::default()
        }
    }
}

/// Result of a `validate` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub url: String,
    pub segments: Vec<Resource>,
}

/// Payload of a `download` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    /// Preferred filename; derived from the response when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Result of a `download` task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadReport {
    pub url: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Probes a resource for size and type.
#[derive(Debug, Clone)]
pub struct AnalyzeJob {
    client: HttpClient,
}

impl AnalyzeJob {
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for AnalyzeJob {
    async fn handle(&self, request: TaskRequest) -> Result<Value, JobError> {
        let UrlPayload { url } = serde_json::from_value(request.payload)?;
        let probe = self
            .client
            .probe(&url)
            .await
            .map_err(|e| JobError::new(e.to_string()))?;

        // The sniff is best-effort: plenty of servers reject ranged requests.
        let sniffed_type = match self.client.fetch_prefix(&url, SNIFF_BYTES).await {
            Ok(prefix) => Some(mime_from_bytes(&prefix))
                .filter(|mime| *mime != OCTET_STREAM)
                .map(str::to_string),
            Err(error) => {
                debug!(url = %url, error = %error, "prefix fetch failed");
                None
            }
        };

        let report = AnalysisReport {
            url,
            size: probe.content_length,
            content_type: probe.content_type,
            sniffed_type,
            accepts_ranges: probe.accepts_ranges,
        };
        Ok(serde_json::to_value(report)?)
    }
}

/// Expands a manifest into segment resources.
#[derive(Debug, Clone)]
pub struct ValidateJob {
    resolver: ManifestResolver,
}

impl ValidateJob {
    #[must_use]
    pub fn new(resolver: ManifestResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl JobHandler for ValidateJob {
    async fn handle(&self, request: TaskRequest) -> Result<Value, JobError> {
        let UrlPayload { url } = serde_json::from_value(request.payload)?;
        let segments = self
            .resolver
            .try_resolve(&url)
            .await
            .map_err(|e| JobError::new(e.to_string()))?;
        Ok(serde_json::to_value(ValidationReport { url, segments })?)
    }
}

/// Saves a resource to disk.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    client: HttpClient,
}

impl DownloadJob {
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for DownloadJob {
    async fn handle(&self, request: TaskRequest) -> Result<Value, JobError> {
        let DownloadRequest {
            url,
            output_dir,
            filename,
        } = serde_json::from_value(request.payload)?;

        let result = self
            .client
            .download_to_file_with_name(&url, &output_dir, filename.as_deref())
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "download failed");
                JobError::new(e.to_string())
            })?;

        Ok(serde_json::to_value(DownloadReport {
            url,
            path: result.path,
            bytes: result.bytes_downloaded,
        })?)
    }
}

/// Registers `analyze`, `validate` and `download` on `scheduler`.
pub fn register_standard_jobs(scheduler: &Scheduler, client: &HttpClient) {
    scheduler.register_job_kind(ANALYZE, Arc::new(AnalyzeJob::new(client.clone())));
    scheduler.register_job_kind(
        VALIDATE,
        Arc::new(ValidateJob::new(ManifestResolver::http(client.clone()))),
    );
    scheduler.register_job_kind(DOWNLOAD, Arc::new(DownloadJob::new(client.clone())));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scheduler::TaskId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(action: &str, payload: Value) -> TaskRequest {
        TaskRequest {
            task_id: TaskId(1),
            action: action.to_string(),
            payload,
        }
    }

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[tokio::test]
    async fn test_analyze_reports_size_and_sniffed_type() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/photo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-length", "734003")
                    .insert_header("content-type", "application/octet-stream"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/photo"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(PNG_HEADER))
            .mount(&server)
            .await;

        let job = AnalyzeJob::new(HttpClient::new().unwrap());
        let url = format!("{}/photo", server.uri());
        let value = job
            .handle(request(ANALYZE, UrlPayload::json(&url)))
            .await
            .unwrap();
        let report: AnalysisReport = serde_json::from_value(value).unwrap();

        assert_eq!(report.size, Some(734_003));
        assert_eq!(report.sniffed_type.as_deref(), Some("image/png"));
        assert_eq!(report.measurement().size, 734_003);
    }

    #[tokio::test]
    async fn test_analyze_fails_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let job = AnalyzeJob::new(HttpClient::new().unwrap());
        let url = format!("{}/missing.jpg", server.uri());
        let err = job
            .handle(request(ANALYZE, UrlPayload::json(&url)))
            .await
            .unwrap_err();
        assert!(err.message().contains("404"), "got: {err}");
    }

    #[tokio::test]
    async fn test_job_rejects_malformed_payload() {
        let job = AnalyzeJob::new(HttpClient::new().unwrap());
        let err = job
            .handle(request(ANALYZE, serde_json::json!({"href": "x"})))
            .await
            .unwrap_err();
        assert!(err.message().starts_with("invalid job payload"));
    }

    #[tokio::test]
    async fn test_validate_returns_segments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live/index.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("#EXTM3U\n#EXTINF:4,\nseg0.ts\n#EXTINF:4,\nseg1.ts\n"),
            )
            .mount(&server)
            .await;

        let job = ValidateJob::new(ManifestResolver::http(HttpClient::new().unwrap()));
        let url = format!("{}/live/index.m3u8", server.uri());
        let value = job
            .handle(request(VALIDATE, UrlPayload::json(&url)))
            .await
            .unwrap();
        let report: ValidationReport = serde_json::from_value(value).unwrap();

        assert_eq!(report.segments.len(), 2);
        assert_eq!(report.segments[1].url, format!("{}/live/seg1.ts", server.uri()));
        assert_eq!(report.segments[1].parent_url.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/clip.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(vec![7u8; 64]),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new(HttpClient::new().unwrap());
        let payload = serde_json::to_value(DownloadRequest {
            url: format!("{}/media/clip.mp4", server.uri()),
            output_dir: dir.path().to_path_buf(),
            filename: None,
        })
        .unwrap();
        let value = job.handle(request(DOWNLOAD, payload)).await.unwrap();
        let report: DownloadReport = serde_json::from_value(value).unwrap();

        assert_eq!(report.bytes, 64);
        assert_eq!(report.path, dir.path().join("clip.mp4"));
        assert_eq!(std::fs::read(&report.path).unwrap().len(), 64);
    }
}
