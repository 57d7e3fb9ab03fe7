//! The aggregator: canonical, deduplicated resource set for one page.
//!
//! Identity is the exact absolute URL. The first candidate seen for a URL
//! wins: later detections never overwrite it. Only the quality estimator
//! (via [`Aggregator::apply_measurement`]) updates size and quality of a
//! stored resource.
//!
//! New resources are pushed to an optional [`ResourceSink`] (the UI/storage
//! collaborator). Iteration order is insertion order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use url::Url;

use crate::quality::{self, Measurement};
use crate::resource::{Resource, ResourceType};

/// Receives resources as they enter the aggregated set.
pub trait ResourceSink: Send + Sync {
    /// Called once per merge with every newly added resource.
    fn submit_resources(&self, resources: &[Resource]);

    /// Called for each newly added manifest or stream segment.
    fn submit_streaming_resource(&self, resource: &Resource);
}

/// Notifications delivered by a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// One merge's worth of new resources.
    Resources(Vec<Resource>),
    /// A new manifest or stream segment.
    Streaming(Resource),
}

#[derive(Debug, Clone)]
enum EventSender {
    Unbounded(mpsc::UnboundedSender<SinkEvent>),
    Bounded(mpsc::Sender<SinkEvent>),
}

/// A [`ResourceSink`] that forwards notifications over a tokio channel.
///
/// The unbounded flavour buffers every event until the receiver drains it.
/// Long-running observers whose consumer may stall should use
/// [`ChannelSink::bounded`], which drops events while the channel is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: EventSender,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::with_sender(EventSender::Unbounded(sender)), receiver)
    }

    /// Creates a sink that holds at most `capacity` undelivered events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::with_sender(EventSender::Bounded(sender)), receiver)
    }

    fn with_sender(sender: EventSender) -> Self {
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Events discarded because a bounded channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, event: SinkEvent) {
        match &self.sender {
            EventSender::Unbounded(sender) => {
                if sender.send(event).is_err() {
                    trace!("resource sink receiver dropped");
                }
            }
            EventSender::Bounded(sender) => match sender.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(dropped, "resource sink full; event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!("resource sink receiver dropped");
                }
            },
        }
    }
}

impl ResourceSink for ChannelSink {
    fn submit_resources(&self, resources: &[Resource]) {
        self.deliver(SinkEvent::Resources(resources.to_vec()));
    }

    fn submit_streaming_resource(&self, resource: &Resource) {
        self.deliver(SinkEvent::Streaming(resource.clone()));
    }
}

/// Owns the deduplicated resource set.
#[derive(Default)]
pub struct Aggregator {
    resources: IndexMap<String, Resource>,
    sink: Option<Arc<dyn ResourceSink>>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("resources", &self.resources.len())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator that notifies `sink` of additions.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn ResourceSink>) -> Self {
        Self {
            resources: IndexMap::new(),
            sink: Some(sink),
        }
    }

    /// Inserts every candidate whose URL is not yet present.
    ///
    /// Returns the resources that were actually added, in candidate order.
    pub fn merge(&mut self, candidates: impl IntoIterator<Item = Resource>) -> Vec<Resource> {
        let mut added = Vec::new();
        let mut duplicates = 0usize;

        for candidate in candidates {
            if self.resources.contains_key(&candidate.url) {
                duplicates += 1;
                continue;
            }
            self.resources
                .insert(candidate.url.clone(), candidate.clone());
            added.push(candidate);
        }

        debug!(
            added = added.len(),
            duplicates,
            total = self.resources.len(),
            "merged candidates"
        );

        if !added.is_empty()
            && let Some(sink) = &self.sink
        {
            sink.submit_resources(&added);
            for resource in added
                .iter()
                .filter(|r| r.is_stream_segment || r.is_manifest())
            {
                sink.submit_streaming_resource(resource);
            }
        }

        added
    }

    /// All resources in insertion order.
    #[must_use]
    pub fn get_all(&self) -> Vec<Resource> {
        self.resources.values().cloned().collect()
    }

    /// Borrowing iterator over the set, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&Resource> {
        self.resources.get(url)
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.resources.contains_key(url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[must_use]
    pub fn get_by_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .cloned()
            .collect()
    }

    /// Resources of the same type living in the same directory as `url`,
    /// excluding `url` itself. Empty when `url` is unknown.
    #[must_use]
    pub fn get_similar(&self, url: &str) -> Vec<Resource> {
        let Some(target) = self.resources.get(url) else {
            return Vec::new();
        };
        let Some(directory) = directory_key(url) else {
            return Vec::new();
        };

        self.resources
            .values()
            .filter(|r| r.url != url && r.resource_type == target.resource_type)
            .filter(|r| directory_key(&r.url).as_deref() == Some(directory.as_str()))
            .cloned()
            .collect()
    }

    /// Segments produced by `manifest_url`, in playback order.
    #[must_use]
    pub fn segments_of(&self, manifest_url: &str) -> Vec<Resource> {
        let mut segments: Vec<Resource> = self
            .resources
            .values()
            .filter(|r| r.parent_url.as_deref() == Some(manifest_url))
            .cloned()
            .collect();
        segments.sort_by_key(|r| r.index.unwrap_or(usize::MAX));
        segments
    }

    /// Folds a measurement into the stored resource through the estimator.
    ///
    /// Returns the updated resource, or `None` when `url` is unknown.
    pub fn apply_measurement(&mut self, url: &str, measurement: Measurement) -> Option<&Resource> {
        let resource = self.resources.get_mut(url)?;
        if quality::apply_measurement(resource, measurement) {
            debug!(url = %url, quality = %resource.quality, "quality re-evaluated");
        }
        Some(resource)
    }

    /// Drops every resource.
    pub fn clear(&mut self) {
        let dropped = self.resources.len();
        self.resources.clear();
        info!(dropped, "aggregated resources cleared");
    }
}

/// `scheme://host[:port]/dir/` of a URL: everything up to the last `/`.
fn directory_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let path = parsed.path();
    let directory = &path[..=path.rfind('/')?];
    Some(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}{directory}", parsed.scheme()),
        None => format!("{}://{host}{directory}", parsed.scheme()),
    })
}
