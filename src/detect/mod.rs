//! Resource detection strategies.
//!
//! Each [`Detector`] turns a [`Document`] into raw candidate [`Resource`]s.
//! A [`DetectorSet`] runs several detectors in order and contains their
//! failures: a detector that errors or panics is logged and contributes
//! nothing, while its siblings still run.
//!
//! # Detectors
//!
//! - [`DomDetector`] - `img`/`video`/`audio`/`source` elements
//! - [`CssDetector`] - `background`/`background-image` `url(...)` references
//! - [`ShadowDetector`] - shadow trees and custom-element attributes
//! - [`AttributeDetector`] - media-looking attributes anywhere in the tree
//! - [`StreamingDetector`] - HLS/DASH references, plus live network observation

mod attribute;
mod css;
mod dom;
mod shadow;
mod streaming;

pub use attribute::AttributeDetector;
pub use css::{CssDetector, extract_css_urls};
pub use dom::DomDetector;
pub use shadow::ShadowDetector;
pub use streaming::{NetworkMonitor, Observation, ObservedRequest, StreamingDetector};

use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::classify;
use crate::document::{Document, Element, Tree};
use crate::resource::{Resource, ResourceSource, ResourceType, now_millis};

/// Attribute names that always count as media references.
const MEDIA_ATTRIBUTES: &[&str] = &["src", "data-src", "poster", "data-background"];

/// Standard tags whose untyped references are still media.
const MEDIA_ELEMENTS: &[&str] = &["img", "picture", "video", "audio", "source", "image"];

/// Substrings that mark an attribute name as media-bearing.
const MEDIA_ATTRIBUTE_MARKERS: &[&str] = &["src", "image", "video", "poster", "thumbnail"];

/// Errors raised inside a single detector.
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    /// The detector could not traverse part of the document.
    #[error("{detector} detector failed: {message}")]
    Traversal {
        /// Name of the failing detector.
        detector: String,
        /// What went wrong.
        message: String,
    },

    /// The detector panicked; the panic was contained.
    #[error("{detector} detector panicked")]
    Panicked {
        /// Name of the failing detector.
        detector: String,
    },
}

impl DetectionError {
    /// Creates a traversal error.
    pub fn traversal(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Traversal {
            detector: detector.into(),
            message: message.into(),
        }
    }
}

/// Per-pass inputs shared by all detectors.
#[derive(Debug, Clone)]
pub struct DetectionContext {
    base_url: Url,
    timestamp: u64,
}

impl DetectionContext {
    #[must_use]
    pub fn new(base_url: Url, timestamp: u64) -> Self {
        Self {
            base_url,
            timestamp,
        }
    }

    /// Context for `document`, stamped with the current time.
    #[must_use]
    pub fn for_document(document: &Document) -> Self {
        Self::new(document.base_url().clone(), now_millis())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Resolves `raw` against the document base; excluded schemes yield `None`.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<Url> {
        classify::resolve_url(raw, &self.base_url)
    }

    /// Builds a candidate resource stamped with this pass's timestamp.
    #[must_use]
    pub fn resource(&self, url: &Url, resource_type: ResourceType, source: ResourceSource) -> Resource {
        Resource::new(url.as_str(), resource_type, source, self.timestamp)
    }
}

/// A strategy that extracts candidate resources from a document.
pub trait Detector: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Produces candidates. Duplicates are allowed; the aggregator dedups.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] when the document cannot be traversed.
    fn detect(
        &self,
        document: &Document,
        ctx: &DetectionContext,
    ) -> Result<Vec<Resource>, DetectionError>;
}

/// Outcome of running a [`DetectorSet`].
#[derive(Debug, Default)]
pub struct Detection {
    /// Candidates from every detector that succeeded, in detector order.
    pub resources: Vec<Resource>,
    /// Contained failures, one per failing detector.
    pub errors: Vec<DetectionError>,
}

/// Ordered collection of detectors run as one pass.
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.detectors.iter().map(|d| d.name()).collect();
        f.debug_struct("DetectorSet").field("detectors", &names).finish()
    }
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl DetectorSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// DOM, CSS, shadow, attribute and streaming detectors, in that order.
    ///
    /// Order matters only for provenance: the first detector to report a URL
    /// is the one the aggregator keeps.
    #[must_use]
    pub fn standard() -> Self {
        let mut set = Self::new();
        set.register(Box::new(DomDetector));
        set.register(Box::new(CssDetector));
        set.register(Box::new(ShadowDetector));
        set.register(Box::new(AttributeDetector));
        set.register(Box::new(StreamingDetector));
        set
    }

    /// Appends a detector.
    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Runs every detector against `document`.
    #[instrument(skip(self, document), fields(url = %document.url()))]
    pub fn run(&self, document: &Document) -> Detection {
        let ctx = DetectionContext::for_document(document);
        self.run_with_context(document, &ctx)
    }

    /// Runs every detector with an explicit context.
    pub fn run_with_context(&self, document: &Document, ctx: &DetectionContext) -> Detection {
        let mut detection = Detection::default();

        for detector in &self.detectors {
            let name = detector.name();
            let result = catch_unwind(AssertUnwindSafe(|| detector.detect(document, ctx)))
                .unwrap_or_else(|_| {
                    Err(DetectionError::Panicked {
                        detector: name.to_string(),
                    })
                });

            match result {
                Ok(found) => {
                    debug!(detector = name, count = found.len(), "detector finished");
                    detection.resources.extend(found);
                }
                Err(error) => {
                    warn!(detector = name, error = %error, "detector failed; continuing with partial results");
                    detection.errors.push(error);
                }
            }
        }

        detection
    }
}

/// Returns true when an attribute name suggests it holds a media URL.
#[must_use]
pub fn is_media_attribute(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    MEDIA_ATTRIBUTES.contains(&name.as_str())
        || MEDIA_ATTRIBUTE_MARKERS
            .iter()
            .any(|marker| name.contains(marker))
}

/// Splits a `srcset` value into its candidate URLs.
pub(crate) fn srcset_urls(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .filter(|url| !url.is_empty())
}

/// Guesses the media type an attribute refers to from its name.
fn type_hint_from_attribute(name: &str) -> Option<ResourceType> {
    if name.contains("video") {
        Some(ResourceType::Video)
    } else if name.contains("poster")
        || name.contains("thumbnail")
        || name.contains("image")
        || name.contains("background")
    {
        Some(ResourceType::Image)
    } else {
        None
    }
}

/// Candidates from every media-looking attribute of `element`.
///
/// Values whose type cannot be inferred from either the URL or the attribute
/// name are kept only for the always-media attributes, and only on media
/// elements or custom elements. A bare `src` on `script` or `iframe` is not
/// media.
pub(crate) fn media_attribute_candidates(
    element: &Element,
    ctx: &DetectionContext,
    source: ResourceSource,
) -> Vec<Resource> {
    let mut found = Vec::new();
    let keeps_untyped =
        MEDIA_ELEMENTS.contains(&element.tag()) || element.is_custom_element();

    for (name, value) in element.attributes() {
        if !is_media_attribute(name) {
            continue;
        }

        let raw_values: Vec<&str> = if name.ends_with("srcset") {
            srcset_urls(value).collect()
        } else {
            vec![value]
        };

        for raw in raw_values {
            let Some(url) = ctx.resolve(raw) else {
                continue;
            };
            let resource_type = classify::resource_type_from_url(url.as_str())
                .or_else(|| type_hint_from_attribute(name));
            let resource_type = match resource_type {
                Some(resource_type) => resource_type,
                None if keeps_untyped && MEDIA_ATTRIBUTES.contains(&name) => ResourceType::Other,
                None => continue,
            };
            found.push(ctx.resource(&url, resource_type, source));
        }
    }

    found
}

/// Visits every element of `tree` and of every shadow tree nested in it.
pub(crate) fn walk_all_elements<'a>(tree: &'a Tree, visit: &mut dyn FnMut(&'a Element)) {
    let mut pending: Vec<&'a Tree> = vec![tree];
    while let Some(current) = pending.pop() {
        for element in current.elements() {
            visit(element);
            if let Some(shadow) = element.shadow_root() {
                pending.push(&shadow.tree);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::document::{Element, ShadowRoot, ShadowRootMode, Tree};

    fn ctx() -> DetectionContext {
        DetectionContext::new(Url::parse("https://example.com/page/").unwrap(), 1)
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&self, _: &Document, _: &DetectionContext) -> Result<Vec<Resource>, DetectionError> {
            Err(DetectionError::traversal("failing", "permission denied"))
        }
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn name(&self) -> &'static str {
            "panicking"
        }

        #[allow(clippy::panic)]
        fn detect(&self, _: &Document, _: &DetectionContext) -> Result<Vec<Resource>, DetectionError> {
            panic!("malformed tree");
        }
    }

    // ==================== Heuristic Tests ====================

    #[test]
    fn test_is_media_attribute() {
        for name in [
            "src",
            "data-src",
            "poster",
            "data-background",
            "data-hires-src",
            "data-image",
            "data-video-url",
            "data-thumbnail",
            "SRCSET",
        ] {
            assert!(is_media_attribute(name), "{name} should be a media attribute");
        }
        for name in ["href", "class", "id", "data-id", "alt"] {
            assert!(!is_media_attribute(name), "{name} should not be a media attribute");
        }
    }

    #[test]
    fn test_srcset_urls() {
        let urls: Vec<&str> = srcset_urls("small.jpg 480w, large.jpg 1080w,  huge.jpg 2x").collect();
        assert_eq!(urls, vec!["small.jpg", "large.jpg", "huge.jpg"]);
    }

    #[test]
    fn test_media_attribute_candidates_types_and_filters() {
        let element = Element::new("x-gallery")
            .with_attr("data-src", "photos/one")
            .with_attr("data-video-url", "clips/intro")
            .with_attr("data-image-id", "1234")
            .with_attr("poster", "poster.jpg")
            .with_attr("data-thumb-src", "data:image/png;base64,AAAA");
        let found = media_attribute_candidates(&element, &ctx(), ResourceSource::Attribute);
        let urls: Vec<(&str, ResourceType)> = found
            .iter()
            .map(|r| (r.url.as_str(), r.resource_type))
            .collect();
        assert_eq!(
            urls,
            vec![
                ("https://example.com/page/photos/one", ResourceType::Other),
                ("https://example.com/page/clips/intro", ResourceType::Video),
                ("https://example.com/page/1234", ResourceType::Image),
                ("https://example.com/page/poster.jpg", ResourceType::Image),
            ]
        );
    }

    #[test]
    fn test_untyped_src_on_non_media_tags_is_ignored() {
        for tag in ["iframe", "script", "embed"] {
            let element = Element::new(tag).with_attr("src", "/widgets/player");
            let found = media_attribute_candidates(&element, &ctx(), ResourceSource::Attribute);
            assert!(found.is_empty(), "{tag} produced {found:?}");
        }

        let embed = Element::new("embed").with_attr("src", "/media/intro.mp4");
        let found = media_attribute_candidates(&embed, &ctx(), ResourceSource::Attribute);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_type, ResourceType::Video);

        let img = Element::new("img").with_attr("src", "/render?id=7");
        let found = media_attribute_candidates(&img, &ctx(), ResourceSource::Attribute);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_type, ResourceType::Other);
    }

    #[test]
    fn test_walk_all_elements_enters_nested_shadow_roots() {
        let inner = ShadowRoot::new(
            ShadowRootMode::Closed,
            Tree::new(vec![Element::new("video")], Vec::new()),
        );
        let outer = ShadowRoot::new(
            ShadowRootMode::Open,
            Tree::new(vec![Element::new("inner-el").with_shadow_root(inner)], Vec::new()),
        );
        let tree = Tree::new(vec![Element::new("outer-el").with_shadow_root(outer)], Vec::new());

        let mut tags = Vec::new();
        walk_all_elements(&tree, &mut |element| tags.push(element.tag().to_string()));
        assert_eq!(tags, vec!["outer-el", "inner-el", "video"]);
    }

    // ==================== DetectorSet Tests ====================

    #[test]
    fn test_detector_set_contains_failures() {
        let document = Document::new(
            Url::parse("https://example.com/").unwrap(),
            Tree::new(
                vec![Element::new("img").with_attr("src", "a.png")],
                Vec::new(),
            ),
        );

        let mut set = DetectorSet::new();
        set.register(Box::new(FailingDetector));
        set.register(Box::new(PanickingDetector));
        set.register(Box::new(DomDetector));

        let detection = set.run(&document);
        assert_eq!(detection.errors.len(), 2);
        assert!(matches!(detection.errors[1], DetectionError::Panicked { .. }));
        assert_eq!(detection.resources.len(), 1);
        assert_eq!(detection.resources[0].url, "https://example.com/a.png");
    }

    #[test]
    fn test_standard_set_has_five_detectors() {
        let set = DetectorSet::standard();
        assert_eq!(set.len(), 5);
        assert!(!set.is_empty());
    }
}
