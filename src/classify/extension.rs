//! Extension-based MIME inference and streaming manifest detection.

use crate::resource::ResourceType;

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("avif", "image/avif"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
];

const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("m4s", "video/iso.segment"),
    ("webm", "video/webm"),
    ("ogv", "video/ogg"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("flv", "video/x-flv"),
    ("ts", "video/mp2t"),
    ("m3u8", HLS_CONTENT_TYPE),
    ("mpd", DASH_CONTENT_TYPE),
];

const AUDIO_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("oga", "audio/ogg"),
    ("opus", "audio/opus"),
];

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const DASH_CONTENT_TYPE: &str = "application/dash+xml";

/// HLS content types seen in the wild besides the registered one.
const HLS_CONTENT_TYPE_ALIASES: &[&str] = &[
    HLS_CONTENT_TYPE,
    "application/x-mpegurl",
    "audio/mpegurl",
    "audio/x-mpegurl",
];

/// Streaming manifest format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingKind {
    /// HTTP Live Streaming playlist (`.m3u8`).
    Hls,
    /// MPEG-DASH media presentation description (`.mpd`).
    Dash,
}

impl StreamingKind {
    /// Canonical content type for this manifest format.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Hls => HLS_CONTENT_TYPE,
            Self::Dash => DASH_CONTENT_TYPE,
        }
    }
}

/// Returns the lowercase extension of the URL's last path segment.
///
/// Query string and fragment are ignored. Returns `None` when the last
/// segment has no dot.
#[must_use]
pub fn extension_of(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let path = without_fragment.split('?').next().unwrap_or(without_fragment);
    let last_segment = path.rsplit('/').next()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index + 1..];
    if ext.is_empty() || ext.len() > 8 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn lookup(table: &[(&str, &'static str)], ext: &str) -> Option<&'static str> {
    table
        .iter()
        .find_map(|(candidate, mime)| (*candidate == ext).then_some(*mime))
}

/// Infers a MIME type for `url`, assuming it holds media of `kind`.
///
/// Unknown extensions map to `"<kind>/unknown"`. For [`ResourceType::Other`]
/// every table is consulted and the fallback is `application/octet-stream`.
#[must_use]
pub fn mime_from_url(url: &str, kind: ResourceType) -> String {
    let ext = extension_of(url);
    let ext = ext.as_deref().unwrap_or("");
    let found = match kind {
        ResourceType::Image => lookup(IMAGE_TYPES, ext),
        ResourceType::Video | ResourceType::StreamingSegment => lookup(VIDEO_TYPES, ext),
        ResourceType::Audio => lookup(AUDIO_TYPES, ext),
        ResourceType::Other => {
            return lookup(IMAGE_TYPES, ext)
                .or_else(|| lookup(VIDEO_TYPES, ext))
                .or_else(|| lookup(AUDIO_TYPES, ext))
                .unwrap_or(super::OCTET_STREAM)
                .to_string();
        }
    };
    found.map_or_else(|| format!("{}/unknown", kind.mime_kind()), str::to_string)
}

/// Infers the resource type from the URL's extension alone.
#[must_use]
pub fn resource_type_from_url(url: &str) -> Option<ResourceType> {
    let ext = extension_of(url)?;
    if lookup(IMAGE_TYPES, &ext).is_some() {
        Some(ResourceType::Image)
    } else if lookup(VIDEO_TYPES, &ext).is_some() {
        Some(ResourceType::Video)
    } else if lookup(AUDIO_TYPES, &ext).is_some() {
        Some(ResourceType::Audio)
    } else {
        None
    }
}

/// Detects a streaming manifest by URL suffix first, content type second.
#[must_use]
pub fn streaming_kind(url: &str, content_type: Option<&str>) -> Option<StreamingKind> {
    match extension_of(url).as_deref() {
        Some("m3u8") => return Some(StreamingKind::Hls),
        Some("mpd") => return Some(StreamingKind::Dash),
        _ => {}
    }

    let mime = content_type?
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if HLS_CONTENT_TYPE_ALIASES.contains(&mime.as_str()) {
        Some(StreamingKind::Hls)
    } else if mime == DASH_CONTENT_TYPE {
        Some(StreamingKind::Dash)
    } else {
        None
    }
}
