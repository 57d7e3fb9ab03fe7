//! Streaming manifest detection.
//!
//! Statically, any attribute value ending in `.m3u8` or `.mpd` is a manifest
//! candidate. Live, a [`StreamingDetector`] can observe the page's network
//! traffic through a [`NetworkMonitor`] and report manifests as they are
//! requested, identified by URL suffix or response content type.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, trace};
use url::Url;

use super::{DetectionContext, DetectionError, Detector, walk_all_elements};
use crate::classify::{self, StreamingKind};
use crate::document::Document;
use crate::resource::{Resource, ResourceSource, ResourceType, now_millis};

/// Finds HLS/DASH manifest references.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingDetector;

impl Detector for StreamingDetector {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn detect(
        &self,
        document: &Document,
        ctx: &DetectionContext,
    ) -> Result<Vec<Resource>, DetectionError> {
        let mut found = Vec::new();
        walk_all_elements(document.tree(), &mut |element| {
            for (_, value) in element.attributes() {
                let Some(kind) = classify::streaming_kind(value, None) else {
                    continue;
                };
                if let Some(url) = ctx.resolve(value) {
                    found.push(manifest_resource(&url, kind, ctx.timestamp()));
                }
            }
        });
        Ok(found)
    }
}

impl StreamingDetector {
    /// Starts live observation of `monitor`.
    ///
    /// `on_found` is called once per observed request that looks like a
    /// manifest. Observation continues until [`Observation::cancel`] is
    /// called; dropping the handle does not stop it.
    pub fn observe<F>(&self, monitor: &NetworkMonitor, on_found: F) -> Observation
    where
        F: Fn(Resource) + Send + Sync + 'static,
    {
        let id = monitor.attach(Arc::new(move |request: &ObservedRequest| {
            if classify::is_excluded_scheme(&request.url) {
                return;
            }
            let Some(kind) = classify::streaming_kind(&request.url, request.content_type.as_deref())
            else {
                return;
            };
            let Ok(url) = Url::parse(&request.url) else {
                trace!(url = %request.url, "ignoring unparseable observed request");
                return;
            };
            debug!(url = %url, kind = ?kind, "manifest observed on the network");
            on_found(manifest_resource(&url, kind, now_millis()));
        }));

        Observation {
            monitor: Arc::downgrade(&monitor.inner),
            id,
            active: AtomicBool::new(true),
        }
    }
}

fn manifest_resource(url: &Url, kind: StreamingKind, timestamp: u64) -> Resource {
    Resource::new(
        url.as_str(),
        ResourceType::Video,
        ResourceSource::Streaming,
        timestamp,
    )
    .with_content_type(kind.content_type())
}

/// A network request seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRequest {
    /// Absolute request URL.
    pub url: String,
    /// Response content type, when known.
    pub content_type: Option<String>,
}

impl ObservedRequest {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

type Listener = Arc<dyn Fn(&ObservedRequest) + Send + Sync>;

#[derive(Default)]
struct MonitorInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl MonitorInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Fan-out point for network requests observed by the host.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone, Default)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl NetworkMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `request` to every attached listener. Returns how many saw it.
    pub fn publish(&self, request: &ObservedRequest) -> usize {
        // Snapshot so listeners may cancel observations while being called.
        let listeners: Vec<Listener> = self
            .inner
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &listeners {
            listener(request);
        }
        listeners.len()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    fn attach(&self, listener: Listener) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, listener));
        id
    }
}

/// Handle to a live observation started by [`StreamingDetector::observe`].
#[derive(Debug)]
pub struct Observation {
    monitor: Weak<MonitorInner>,
    id: u64,
    active: AtomicBool,
}

impl Observation {
    /// Stops observing. Idempotent; returns true only on the first call.
    pub fn cancel(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(inner) = self.monitor.upgrade() {
            inner.listeners().retain(|(id, _)| *id != self.id);
        }
        true
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
