//! Shadow tree detection.
//!
//! Media and backgrounds inside shadow roots are invisible to a light-tree
//! walk, so this detector reruns the DOM and CSS scans inside every shadow
//! root, at any nesting depth. Custom elements are also checked for
//! media-looking attributes, since components often take their media as
//! attributes and render it internally.

use super::{DetectionContext, DetectionError, Detector, css, dom, media_attribute_candidates};
use crate::document::{Document, Tree};
use crate::resource::{Resource, ResourceSource};

#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowDetector;

impl Detector for ShadowDetector {
    fn name(&self) -> &'static str {
        "shadow-dom"
    }

    fn detect(
        &self,
        document: &Document,
        ctx: &DetectionContext,
    ) -> Result<Vec<Resource>, DetectionError> {
        let mut found = Vec::new();
        let mut pending: Vec<&Tree> = vec![document.tree()];

        while let Some(tree) = pending.pop() {
            for element in tree.elements() {
                if element.is_custom_element() {
                    found.extend(media_attribute_candidates(
                        element,
                        ctx,
                        ResourceSource::ShadowDom,
                    ));
                }
                if let Some(shadow) = element.shadow_root() {
                    found.extend(dom::scan_tree(&shadow.tree, ctx, ResourceSource::ShadowDom));
                    found.extend(css::scan_tree(&shadow.tree, ctx, ResourceSource::ShadowDom));
                    pending.push(&shadow.tree);
                }
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::document::{Element, ShadowRoot, ShadowRootMode, Stylesheet};
    use crate::resource::ResourceType;

    fn document(tree: Tree) -> Document {
        Document::new(Url::parse("https://example.com/").unwrap(), tree)
    }

    fn detect(document: &Document) -> Vec<Resource> {
        let ctx = DetectionContext::for_document(document);
        ShadowDetector.detect(document, &ctx).unwrap()
    }

    #[test]
    fn test_finds_media_in_nested_shadow_roots() {
        let innermost = ShadowRoot::new(
            ShadowRootMode::Closed,
            Tree::new(
                vec![Element::new("video").with_attr("src", "deep.webm")],
                vec![Stylesheet::inline(":host { background-image: url(bg.png) }")],
            ),
        );
        let outer = ShadowRoot::new(
            ShadowRootMode::Open,
            Tree::new(
                vec![
                    Element::new("img").with_attr("src", "outer.jpg"),
                    Element::new("div").with_shadow_root(innermost),
                ],
                Vec::new(),
            ),
        );
        let tree = Tree::new(
            vec![
                Element::new("img").with_attr("src", "light.jpg"),
                Element::new("div").with_shadow_root(outer),
            ],
            Vec::new(),
        );

        let found = detect(&document(tree));
        let urls: Vec<&str> = found.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/outer.jpg",
                "https://example.com/deep.webm",
                "https://example.com/bg.png",
            ]
        );
        assert!(found.iter().all(|r| r.source == ResourceSource::ShadowDom));
    }

    #[test]
    fn test_custom_element_attributes() {
        let tree = Tree::new(
            vec![
                Element::new("video-player")
                    .with_attr("data-src", "stream/intro.mp4")
                    .with_attr("poster", "intro.jpg")
                    .with_attr("title", "Intro"),
                Element::new("div").with_attr("data-src", "not-custom.jpg"),
            ],
            Vec::new(),
        );

        let found = detect(&document(tree));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].url, "https://example.com/stream/intro.mp4");
        assert_eq!(found[0].resource_type, ResourceType::Video);
        assert_eq!(found[1].resource_type, ResourceType::Image);
    }

    #[test]
    fn test_empty_document_finds_nothing() {
        assert!(detect(&document(Tree::default())).is_empty());
    }
}
