//! Quality/size estimator.
//!
//! Classifies resources as HD/SD/LD from pixel dimensions, or from byte size
//! when dimensions are unknown. [`apply_measurement`] is the only writer of
//! `quality` on a resource that is already in the aggregated set, and it only
//! ever moves towards more authoritative evidence.

use tracing::trace;

use crate::resource::{Quality, QualityBasis, Resource, ResourceType};

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

const IMAGE_HD_BYTES: u64 = 500 * KB;
const IMAGE_SD_BYTES: u64 = 100 * KB;
const VIDEO_HD_BYTES: u64 = 10 * MB;
const VIDEO_SD_BYTES: u64 = 2 * MB;

/// A new observation about a resource. Zero fields mean "not measured".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Size in bytes.
    pub size: u64,
}

/// Classifies pixel dimensions. `None` when they carry no signal.
#[must_use]
pub fn quality_from_dimensions(width: u32, height: u32) -> Option<Quality> {
    // 720p and 1080p both classify as HD.
    if width >= 1280 || height >= 720 {
        Some(Quality::Hd)
    } else if width >= 640 || height >= 480 {
        Some(Quality::Sd)
    } else if width > 0 && height > 0 {
        Some(Quality::Ld)
    } else {
        None
    }
}

/// Classifies a byte size. Video-like resources use the larger thresholds.
#[must_use]
pub fn quality_from_size(resource_type: ResourceType, size: u64) -> Option<Quality> {
    let (hd, sd) = match resource_type {
        ResourceType::Video | ResourceType::StreamingSegment => (VIDEO_HD_BYTES, VIDEO_SD_BYTES),
        ResourceType::Image | ResourceType::Audio | ResourceType::Other => {
            (IMAGE_HD_BYTES, IMAGE_SD_BYTES)
        }
    };
    if size > hd {
        Some(Quality::Hd)
    } else if size > sd {
        Some(Quality::Sd)
    } else if size > 0 {
        Some(Quality::Ld)
    } else {
        None
    }
}

/// Estimates quality from everything known, returning the basis used.
#[must_use]
pub fn estimate(
    resource_type: ResourceType,
    width: u32,
    height: u32,
    size: u64,
) -> (Quality, QualityBasis) {
    if let Some(quality) = quality_from_dimensions(width, height) {
        return (quality, QualityBasis::Dimensions);
    }
    if let Some(quality) = quality_from_size(resource_type, size) {
        return (quality, QualityBasis::Size);
    }
    (Quality::Unknown, QualityBasis::None)
}

/// Folds a measurement into `resource` and re-evaluates its quality.
///
/// Known fields overwrite, unknown (zero) fields never erase. The recomputed
/// quality replaces the stored one only when its basis is at least as
/// authoritative as the stored basis. Returns true when `quality` changed.
pub fn apply_measurement(resource: &mut Resource, measurement: Measurement) -> bool {
    if measurement.width > 0 {
        resource.width = measurement.width;
    }
    if measurement.height > 0 {
        resource.height = measurement.height;
    }
    if measurement.size > 0 {
        resource.size = measurement.size;
        resource.size_formatted = format_size(measurement.size);
    }

    let (quality, basis) = estimate(
        resource.resource_type,
        resource.width,
        resource.height,
        resource.size,
    );

    if basis < resource.quality_basis {
        trace!(
            url = %resource.url,
            current = %resource.quality,
            rejected = %quality,
            "keeping more authoritative quality"
        );
        return false;
    }

    let changed = resource.quality != quality;
    resource.quality = quality;
    resource.quality_basis = basis;
    changed
}

/// Formats a byte count for display. Zero renders as `"Unknown"`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "Unknown".to_string();
    }
    if bytes < KB {
        return format!("{bytes} B");
    }
    let (unit, divisor) = if bytes < MB {
        ("KB", KB)
    } else if bytes < GB {
        ("MB", MB)
    } else {
        ("GB", GB)
    };
    format!("{:.1} {unit}", bytes as f64 / divisor as f64)
}
