//! Scan session: detectors → aggregator → scheduler → write-back.
//!
//! A [`ScanSession`] owns the resource set for one page. [`ScanSession::rescan`]
//! runs every detector over a document, merges the candidates and schedules
//! background work for what is new:
//!
//! | Resource | Job | Priority |
//! |---|---|---|
//! | manifest | `validate` | high |
//! | video | `analyze` | medium |
//! | everything else | `analyze` | low |
//!
//! Job results flow back into the same set: analysis sizes go through the
//! quality estimator, validated manifests contribute their segments.
//! Results that arrive after [`ScanSession::navigate`] are discarded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::aggregate::Aggregator;
use crate::detect::{DetectorSet, NetworkMonitor, Observation, StreamingDetector};
use crate::document::{Document, Stylesheet};
use crate::download::{DownloadError, HttpClient};
use crate::jobs::{
    self, ANALYZE, AnalysisReport, DOWNLOAD, DownloadReport, DownloadRequest, UrlPayload,
    VALIDATE, ValidationReport,
};
use crate::resource::{Resource, ResourceType};
use crate::scheduler::{Scheduler, TaskId, TaskOutcome, TaskPriority};

/// What a session schedules automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Probe new non-manifest resources for size and type.
    pub analyze: bool,
    /// Expand new manifests into segments.
    pub validate_streams: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            analyze: true,
            validate_streams: true,
        }
    }
}

/// Outcome of one [`ScanSession::rescan`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RescanReport {
    /// Candidates produced by the detectors, duplicates included.
    pub detected: usize,
    /// Resources new to the set.
    pub added: Vec<Resource>,
    /// Background tasks submitted for the new resources.
    pub scheduled: Vec<TaskId>,
    /// Detectors that failed and were skipped.
    pub detector_failures: usize,
}

/// One failed download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub url: String,
    pub error: String,
}

/// Outcome of [`ScanSession::download_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub succeeded: Vec<DownloadReport>,
    pub failed: Vec<DownloadFailure>,
}

/// State shared with task callbacks and network observers.
struct SessionState {
    aggregator: Mutex<Aggregator>,
    generation: AtomicU64,
}

impl SessionState {
    fn aggregator(&self) -> MutexGuard<'_, Aggregator> {
        self.aggregator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    /// Locks the resource set only while `generation` is the live page.
    /// The generation changes only under this lock.
    fn current_aggregator(&self, generation: u64) -> Option<MutexGuard<'_, Aggregator>> {
        let guard = self.aggregator();
        self.is_current(generation).then_some(guard)
    }

    fn apply_analysis(&self, generation: u64, outcome: TaskOutcome) {
        let report = outcome
            .map_err(|e| e.to_string())
            .and_then(|value| serde_json::from_value::<AnalysisReport>(value).map_err(|e| e.to_string()));
        let Some(mut aggregator) = self.current_aggregator(generation) else {
            return;
        };
        match report {
            Ok(report) => {
                let measurement = report.measurement();
                if let Some(resource) = aggregator.apply_measurement(&report.url, measurement) {
                    debug!(
                        url = %resource.url,
                        quality = %resource.quality,
                        size = resource.size,
                        "analysis applied"
                    );
                }
            }
            Err(error) => debug!(error = %error, "analysis produced no measurement"),
        }
    }

    fn apply_validation(&self, generation: u64, outcome: TaskOutcome) {
        let report = outcome.map_err(|e| e.to_string()).and_then(|value| {
            serde_json::from_value::<ValidationReport>(value).map_err(|e| e.to_string())
        });
        let Some(mut aggregator) = self.current_aggregator(generation) else {
            return;
        };
        match report {
            Ok(report) => {
                let added = aggregator.merge(report.segments);
                info!(url = %report.url, segments = added.len(), "manifest validated");
            }
            Err(error) => warn!(error = %error, "stream validation failed"),
        }
    }
}

/// Detection-and-scheduling pipeline for one page at a time.
pub struct ScanSession {
    state: Arc<SessionState>,
    detectors: DetectorSet,
    scheduler: Scheduler,
    config: SessionConfig,
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("detectors", &self.detectors.len())
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl ScanSession {
    /// Creates a session with the standard detectors. The scheduler must
    /// have the `analyze`, `validate` and `download` kinds registered (see
    /// [`jobs::register_standard_jobs`]).
    #[must_use]
    pub fn new(scheduler: Scheduler, aggregator: Aggregator, config: SessionConfig) -> Self {
        Self::with_detectors(scheduler, aggregator, DetectorSet::standard(), config)
    }

    #[must_use]
    pub fn with_detectors(
        scheduler: Scheduler,
        aggregator: Aggregator,
        detectors: DetectorSet,
        config: SessionConfig,
    ) -> Self {
        Self {
            state: Arc::new(SessionState {
                aggregator: Mutex::new(aggregator),
                generation: AtomicU64::new(0),
            }),
            detectors,
            scheduler,
            config,
        }
    }

    /// Session wired to a fresh HTTP-backed job set.
    #[must_use]
    pub fn http(scheduler: Scheduler, client: &HttpClient, config: SessionConfig) -> Self {
        jobs::register_standard_jobs(&scheduler, client);
        Self::new(scheduler, Aggregator::new(), config)
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs `f` against the current resource set.
    pub fn with_aggregator<R>(&self, f: impl FnOnce(&Aggregator) -> R) -> R {
        f(&self.state.aggregator())
    }

    /// All resources in discovery order.
    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        self.state.aggregator().get_all()
    }

    /// Detects, merges and schedules work for the new resources.
    #[instrument(skip_all, fields(url = %document.url()))]
    pub fn rescan(&self, document: &Document) -> RescanReport {
        let detection = self.detectors.run(document);
        let detected = detection.resources.len();
        let (added, generation) = {
            let mut aggregator = self.state.aggregator();
            let added = aggregator.merge(detection.resources);
            (added, self.state.generation.load(Ordering::Acquire))
        };
        let scheduled = added
            .iter()
            .filter_map(|resource| {
                schedule_follow_up(&self.state, &self.scheduler, self.config, generation, resource)
            })
            .collect::<Vec<_>>();

        info!(
            detected,
            added = added.len(),
            scheduled = scheduled.len(),
            failures = detection.errors.len(),
            "rescan complete"
        );

        RescanReport {
            detected,
            added,
            scheduled,
            detector_failures: detection.errors.len(),
        }
    }

    /// Forgets the current page. Results of tasks still in flight are
    /// discarded when they arrive.
    pub fn navigate(&self) {
        let mut aggregator = self.state.aggregator();
        self.state.generation.fetch_add(1, Ordering::AcqRel);
        aggregator.clear();
        drop(aggregator);
        debug!("session reset for navigation");
    }

    /// Feeds requests seen on `monitor` into the session: new manifests are
    /// merged and validated. Cancel the returned handle to stop.
    pub fn observe_network(&self, monitor: &NetworkMonitor) -> Observation {
        let state = Arc::clone(&self.state);
        let scheduler = self.scheduler.clone();
        let config = self.config;
        StreamingDetector.observe(monitor, move |resource| {
            let (added, generation) = {
                let mut aggregator = state.aggregator();
                let added = aggregator.merge([resource]);
                (added, state.generation.load(Ordering::Acquire))
            };
            for resource in &added {
                schedule_follow_up(&state, &scheduler, config, generation, resource);
            }
        })
    }

    /// Downloads every resource in the set into `output_dir`.
    ///
    /// Each download is its own task; one failure never stops the rest.
    #[instrument(skip(self), fields(dir = %output_dir.display()))]
    pub async fn download_all(&self, output_dir: &Path) -> DownloadSummary {
        let resources = self.resources();
        let mut pending = Vec::with_capacity(resources.len());

        for resource in resources {
            let (tx, rx) = oneshot::channel();
            let request = DownloadRequest {
                url: resource.url.clone(),
                output_dir: PathBuf::from(output_dir),
                filename: Some(resource.filename.clone()).filter(|name| !name.is_empty()),
            };
            let payload = match serde_json::to_value(&request) {
                Ok(payload) => payload,
                Err(error) => {
                    pending.push((resource.url, None, Some(error.to_string())));
                    continue;
                }
            };
            match self
                .scheduler
                .submit(DOWNLOAD, payload, TaskPriority::Medium, move |outcome| {
                    let _ = tx.send(outcome);
                }) {
                Ok(_) => pending.push((resource.url, Some(rx), None)),
                Err(error) => pending.push((resource.url, None, Some(error.to_string()))),
            }
        }

        let outcomes = join_all(pending.into_iter().map(|(url, rx, error)| async move {
            let outcome = match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(crate::scheduler::TaskError::Cancelled))
                    .map_err(|e| e.to_string())
                    .and_then(|value| {
                        serde_json::from_value::<DownloadReport>(value).map_err(|e| e.to_string())
                    }),
                None => Err(error.unwrap_or_default()),
            };
            (url, outcome)
        }))
        .await;

        let mut summary = DownloadSummary::default();
        for (url, outcome) in outcomes {
            match outcome {
                Ok(report) => summary.succeeded.push(report),
                Err(error) => {
                    warn!(url = %url, error = %error, "resource download failed");
                    summary.failed.push(DownloadFailure { url, error });
                }
            }
        }

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "download-all complete"
        );
        summary
    }
}

/// Submits the background job a newly added resource calls for.
fn schedule_follow_up(
    state: &Arc<SessionState>,
    scheduler: &Scheduler,
    config: SessionConfig,
    generation: u64,
    resource: &Resource,
) -> Option<TaskId> {
    if resource.is_stream_segment {
        return None;
    }

    let callback_state = Arc::clone(state);
    let submitted = if resource.is_manifest() {
        if !config.validate_streams {
            return None;
        }
        scheduler.submit(
            VALIDATE,
            UrlPayload::json(&resource.url),
            TaskPriority::High,
            move |outcome| callback_state.apply_validation(generation, outcome),
        )
    } else {
        if !config.analyze {
            return None;
        }
        let priority = if resource.resource_type == ResourceType::Video {
            TaskPriority::Medium
        } else {
            TaskPriority::Low
        };
        scheduler.submit(
            ANALYZE,
            UrlPayload::json(&resource.url),
            priority,
            move |outcome| callback_state.apply_analysis(generation, outcome),
        )
    };

    match submitted {
        Ok(id) => Some(id),
        Err(error) => {
            warn!(url = %resource.url, error = %error, "could not schedule follow-up");
            None
        }
    }
}

/// Fetches a page and its linked stylesheets into a [`Document`].
///
/// Stylesheets that fail to load are skipped.
///
/// # Errors
///
/// Returns [`DownloadError`] when the page itself cannot be fetched.
#[instrument(skip(client))]
pub async fn load_page(client: &HttpClient, url: &str) -> Result<Document, DownloadError> {
    let page = client.fetch_page(url).await?;
    let final_url = Url::parse(&page.final_url).map_err(|_| DownloadError::invalid_url(&page.final_url))?;
    let mut document = Document::parse_html(&page.body, final_url);

    for href in document.linked_stylesheets() {
        match client.fetch_text(href.as_str()).await {
            Ok(sheet) => document.add_stylesheet(Stylesheet::external(href, sheet.body)),
            Err(error) => debug!(href = %href, error = %error, "stylesheet skipped"),
        }
    }
    Ok(document)
}
