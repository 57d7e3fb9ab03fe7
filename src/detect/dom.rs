//! Media element detection: `img`, `video`, `audio` and `source`.

use tracing::trace;

use super::{DetectionContext, DetectionError, Detector, srcset_urls};
use crate::classify;
use crate::document::{Document, Element, Tree};
use crate::resource::{Resource, ResourceSource, ResourceType};

/// Scans the light tree for media elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomDetector;

impl Detector for DomDetector {
    fn name(&self) -> &'static str {
        "dom"
    }

    fn detect(
        &self,
        document: &Document,
        ctx: &DetectionContext,
    ) -> Result<Vec<Resource>, DetectionError> {
        Ok(scan_tree(document.tree(), ctx, ResourceSource::Dom))
    }
}

/// Scans one tree (light or shadow), tagging results with `source`.
pub(crate) fn scan_tree(tree: &Tree, ctx: &DetectionContext, source: ResourceSource) -> Vec<Resource> {
    let mut found = Vec::new();
    let mut stack: Vec<(&Element, Option<&str>)> =
        tree.children.iter().rev().map(|e| (e, None)).collect();

    while let Some((element, parent_tag)) = stack.pop() {
        scan_element(element, parent_tag, ctx, source, &mut found);
        stack.extend(
            element
                .children()
                .iter()
                .rev()
                .map(|child| (child, Some(element.tag()))),
        );
    }

    trace!(count = found.len(), source = %source, "media elements scanned");
    found
}

fn scan_element(
    element: &Element,
    parent_tag: Option<&str>,
    ctx: &DetectionContext,
    source: ResourceSource,
    found: &mut Vec<Resource>,
) {
    match element.tag() {
        "img" => {
            for raw in image_candidates(element) {
                push_media(element, raw, ResourceType::Image, ctx, source, found);
            }
        }
        "video" => {
            if let Some(raw) = element.attr("src") {
                push_media(element, raw, ResourceType::Video, ctx, source, found);
            }
        }
        "audio" => {
            if let Some(raw) = element.attr("src") {
                push_media(element, raw, ResourceType::Audio, ctx, source, found);
            }
        }
        "source" => {
            let resource_type = source_type(element, parent_tag);
            let mut raws: Vec<&str> = element.attr("src").into_iter().collect();
            if let Some(srcset) = element.attr("srcset") {
                raws.extend(srcset_urls(srcset));
            }
            for raw in raws {
                let resource_type = resource_type
                    .or_else(|| classify::resource_type_from_url(raw))
                    .unwrap_or(ResourceType::Other);
                push_media(element, raw, resource_type, ctx, source, found);
            }
        }
        _ => {}
    }
}

/// `src` followed by every `srcset` candidate.
fn image_candidates(element: &Element) -> Vec<&str> {
    let mut raws: Vec<&str> = element.attr("src").into_iter().collect();
    if let Some(srcset) = element.attr("srcset") {
        raws.extend(srcset_urls(srcset));
    }
    raws
}

/// Media kind of a `<source>`: its container first, then its `type` attribute.
fn source_type(element: &Element, parent_tag: Option<&str>) -> Option<ResourceType> {
    match parent_tag {
        Some("video") => return Some(ResourceType::Video),
        Some("audio") => return Some(ResourceType::Audio),
        Some("picture") => return Some(ResourceType::Image),
        _ => {}
    }
    let declared = element.attr("type")?.to_ascii_lowercase();
    if declared.starts_with("video/") {
        Some(ResourceType::Video)
    } else if declared.starts_with("audio/") {
        Some(ResourceType::Audio)
    } else if declared.starts_with("image/") {
        Some(ResourceType::Image)
    } else {
        None
    }
}

fn push_media(
    element: &Element,
    raw: &str,
    resource_type: ResourceType,
    ctx: &DetectionContext,
    source: ResourceSource,
    found: &mut Vec<Resource>,
) {
    let Some(url) = ctx.resolve(raw) else {
        return;
    };
    let (width, height) = element.dimensions();
    let mut resource = ctx
        .resource(&url, resource_type, source)
        .with_dimensions(width, height);

    if let Some(info) = element.media_info()
        && let Some(duration) = info.duration
        && matches!(resource_type, ResourceType::Video | ResourceType::Audio)
    {
        resource = resource.with_duration(duration);
    }

    if resource_type == ResourceType::Video
        && let Some(poster) = element.attr("poster").and_then(|p| ctx.resolve(p))
    {
        resource = resource.with_thumbnail(poster.as_str());
    }

    found.push(resource);
}
