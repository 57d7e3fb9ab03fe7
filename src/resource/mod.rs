//! Resource types: the discovered, downloadable media candidates.
//!
//! A [`Resource`] is identified by its absolute `url`. Everything else is
//! either provenance (`source`), inferred at discovery (`resource_type`,
//! `content_type`, `filename`) or derived by the quality estimator
//! (`quality`, `size_formatted`).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::classify;
use crate::quality;

/// Kind of media a resource represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    /// Still image.
    Image,
    /// Video file or streaming manifest.
    Video,
    /// Audio file.
    Audio,
    /// One segment produced by expanding a manifest.
    StreamingSegment,
    /// Anything else that looked downloadable.
    Other,
}

impl ResourceType {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::StreamingSegment => "streaming-segment",
            Self::Other => "other",
        }
    }

    /// Returns the MIME top-level kind used for `<kind>/unknown` content types.
    #[must_use]
    pub fn mime_kind(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video | Self::StreamingSegment => "video",
            Self::Audio => "audio",
            Self::Other => "application",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "streaming-segment" => Ok(Self::StreamingSegment),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid resource type: {s}")),
        }
    }
}

/// Which detection strategy produced a resource. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceSource {
    /// Standard media elements in the light DOM.
    Dom,
    /// `url(...)` references in stylesheets and inline styles.
    Css,
    /// Media elements inside shadow roots.
    ShadowDom,
    /// Media-looking attributes on arbitrary elements.
    Attribute,
    /// Manifests and segments from markup or observed network requests.
    Streaming,
    /// URLs guessed from naming patterns rather than seen.
    Predicted,
    /// Reported by the host for an element the user picked.
    ContextMenu,
}

impl ResourceSource {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dom => "dom",
            Self::Css => "css",
            Self::ShadowDom => "shadow-dom",
            Self::Attribute => "attribute",
            Self::Streaming => "streaming",
            Self::Predicted => "predicted",
            Self::ContextMenu => "context-menu",
        }
    }
}

impl fmt::Display for ResourceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Heuristic quality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "HD")]
    Hd,
    #[serde(rename = "SD")]
    Sd,
    #[serde(rename = "LD")]
    Ld,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Quality {
    /// Returns the stable string label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hd => "HD",
            Self::Sd => "SD",
            Self::Ld => "LD",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What evidence the current `quality` was computed from.
///
/// Ordered by authority: a quality derived from a lower basis never replaces
/// one derived from a higher basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBasis {
    /// Nothing measured yet.
    #[default]
    None,
    /// Byte size only.
    Size,
    /// Pixel dimensions.
    Dimensions,
}

/// A discovered media candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Absolute URL; the identity key.
    pub url: String,
    /// Media kind.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Inferred MIME type, possibly `<kind>/unknown`.
    pub content_type: String,
    /// Detection provenance.
    pub source: ResourceSource,
    /// Derived quality class.
    pub quality: Quality,
    /// Evidence `quality` was derived from.
    pub quality_basis: QualityBasis,
    /// Pixel width, 0 when unknown.
    pub width: u32,
    /// Pixel height, 0 when unknown.
    pub height: u32,
    /// Byte size, 0 when unknown.
    pub size: u64,
    /// Human readable size.
    pub size_formatted: String,
    /// Playback length in seconds (video/audio only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Discovery time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Decoded, query-stripped last path segment.
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_stream_segment: bool,
    /// Manifest that produced this segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
    /// Playback order within the parent manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default)]
    pub is_predicted: bool,
}

impl Resource {
    /// Creates a resource with content type and filename inferred from the URL.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        resource_type: ResourceType,
        source: ResourceSource,
        timestamp: u64,
    ) -> Self {
        let url = url.into();
        let content_type = classify::mime_from_url(&url, resource_type);
        let filename = classify::filename_from_url(&url);
        Self {
            url,
            resource_type,
            content_type,
            source,
            quality: Quality::Unknown,
            quality_basis: QualityBasis::None,
            width: 0,
            height: 0,
            size: 0,
            size_formatted: quality::format_size(0),
            duration: None,
            timestamp,
            filename,
            thumbnail_url: None,
            is_stream_segment: false,
            parent_url: None,
            index: None,
            is_predicted: false,
        }
    }

    /// Sets pixel dimensions and recomputes quality.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        quality::apply_measurement(
            &mut self,
            quality::Measurement {
                width,
                height,
                size: 0,
            },
        );
        self
    }

    /// Sets byte size and recomputes quality.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        quality::apply_measurement(
            &mut self,
            quality::Measurement {
                width: 0,
                height: 0,
                size,
            },
        );
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: f64) -> Self {
        if duration.is_finite() && duration > 0.0 {
            self.duration = Some(duration);
        }
        self
    }

    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Marks this resource as segment `index` of the manifest at `parent_url`.
    #[must_use]
    pub fn as_segment(mut self, parent_url: impl Into<String>, index: usize) -> Self {
        self.resource_type = ResourceType::StreamingSegment;
        self.is_stream_segment = true;
        self.parent_url = Some(parent_url.into());
        self.index = Some(index);
        self
    }

    /// Marks this resource as predicted rather than observed.
    #[must_use]
    pub fn predicted(mut self) -> Self {
        self.source = ResourceSource::Predicted;
        self.is_predicted = true;
        self
    }

    /// Returns true when this resource is an HLS or DASH manifest.
    #[must_use]
    pub fn is_manifest(&self) -> bool {
        classify::streaming_kind(&self.url, Some(&self.content_type)).is_some()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Resource {{ url: {}, type: {}, quality: {}, source: {} }}",
            self.url, self.resource_type, self.quality, self.source
        )
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
