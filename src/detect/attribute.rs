//! Attribute detection: media-looking attributes on any element.

use super::{DetectionContext, DetectionError, Detector, media_attribute_candidates, walk_all_elements};
use crate::document::Document;
use crate::resource::{Resource, ResourceSource};

/// Applies the media-attribute heuristic to every element, light or shadow.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeDetector;

impl Detector for AttributeDetector {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn detect(
        &self,
        document: &Document,
        ctx: &DetectionContext,
    ) -> Result<Vec<Resource>, DetectionError> {
        let mut found = Vec::new();
        walk_all_elements(document.tree(), &mut |element| {
            found.extend(media_attribute_candidates(
                element,
                ctx,
                ResourceSource::Attribute,
            ));
        });
        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::document::{Element, ShadowRoot, ShadowRootMode, Tree};
    use crate::resource::ResourceType;

    #[test]
    fn test_lazy_load_attributes_across_shadow_boundaries() {
        let shadow = ShadowRoot::new(
            ShadowRootMode::Open,
            Tree::new(
                vec![Element::new("span").with_attr("data-background", "/bg/dots.svg")],
                Vec::new(),
            ),
        );
        let tree = Tree::new(
            vec![
                Element::new("div")
                    .with_attr("data-src", "lazy/photo.jpg")
                    .with_attr("data-srcset", "a.jpg 1x, b.jpg 2x"),
                Element::new("section").with_shadow_root(shadow),
                Element::new("a").with_attr("href", "page.jpg"),
            ],
            Vec::new(),
        );
        let document = Document::new(Url::parse("https://example.com/p/").unwrap(), tree);
        let ctx = DetectionContext::for_document(&document);

        let found = AttributeDetector.detect(&document, &ctx).unwrap();
        let urls: Vec<&str> = found.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/p/lazy/photo.jpg",
                "https://example.com/p/a.jpg",
                "https://example.com/p/b.jpg",
                "https://example.com/bg/dots.svg",
            ]
        );
        assert!(found.iter().all(|r| r.source == ResourceSource::Attribute));
        assert!(found.iter().all(|r| r.resource_type == ResourceType::Image));
    }
}
