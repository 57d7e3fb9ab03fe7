//! CSS background detection.
//!
//! Two passes over each stylesheet and inline `style` attribute: one for
//! `background-image` declarations and one for the `background` shorthand.
//! Every `url(...)` token in a matching declaration value is a candidate.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::{DetectionContext, DetectionError, Detector};
use crate::classify;
use crate::document::{Document, Tree};
use crate::resource::{Resource, ResourceSource, ResourceType};

#[allow(clippy::expect_used)]
static BACKGROUND_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)background-image\s*:\s*([^;}]+)").expect("BACKGROUND_IMAGE_RE is valid")
});

#[allow(clippy::expect_used)]
static BACKGROUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)background\s*:\s*([^;}]+)").expect("BACKGROUND_RE is valid")
});

#[allow(clippy::expect_used)]
static URL_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)\s]*))\s*\)"#)
        .expect("URL_TOKEN_RE is valid")
});

/// Scans stylesheets and inline styles for background images.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssDetector;

impl Detector for CssDetector {
    fn name(&self) -> &'static str {
        "css"
    }

    fn detect(
        &self,
        document: &Document,
        ctx: &DetectionContext,
    ) -> Result<Vec<Resource>, DetectionError> {
        Ok(scan_tree(document.tree(), ctx, ResourceSource::Css))
    }
}

/// Extracts raw `url(...)` references from background declarations in `css`.
///
/// The result is the union of both passes, first occurrence first.
#[must_use]
pub fn extract_css_urls(css: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for pattern in [&*BACKGROUND_IMAGE_RE, &*BACKGROUND_RE] {
        for declaration in pattern.captures_iter(css) {
            let Some(value) = declaration.get(1) else {
                continue;
            };
            for token in URL_TOKEN_RE.captures_iter(value.as_str()) {
                let Some(raw) = token.get(1).or_else(|| token.get(2)).or_else(|| token.get(3))
                else {
                    continue;
                };
                let raw = raw.as_str().trim();
                if !raw.is_empty() && seen.insert(raw.to_string()) {
                    urls.push(raw.to_string());
                }
            }
        }
    }

    urls
}

/// Scans the stylesheets and inline styles of one tree.
pub(crate) fn scan_tree(tree: &Tree, ctx: &DetectionContext, source: ResourceSource) -> Vec<Resource> {
    let mut found = Vec::new();

    for sheet in &tree.stylesheets {
        let base = sheet.href.as_ref().unwrap_or(ctx.base_url());
        for raw in extract_css_urls(&sheet.css) {
            if let Some(url) = classify::resolve_url(&raw, base) {
                found.push(background_resource(&url, ctx, source));
            }
        }
    }

    for element in tree.elements() {
        let Some(style) = element.attr("style") else {
            continue;
        };
        for raw in extract_css_urls(style) {
            if let Some(url) = ctx.resolve(&raw) {
                found.push(background_resource(&url, ctx, source));
            }
        }
    }

    trace!(count = found.len(), source = %source, "css backgrounds scanned");
    found
}

/// Backgrounds are images unless the URL clearly says otherwise.
fn background_resource(url: &url::Url, ctx: &DetectionContext, source: ResourceSource) -> Resource {
    let resource_type =
        classify::resource_type_from_url(url.as_str()).unwrap_or(ResourceType::Image);
    ctx.resource(url, resource_type, source)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::document::{Element, Stylesheet};

    fn ctx() -> DetectionContext {
        DetectionContext::new(Url::parse("https://example.com/blog/").unwrap(), 0)
    }

    #[test]
    fn test_extract_css_urls_both_properties() {
        let css = r#"
            .a { background-image: url("hero.jpg"); }
            .b { background: #fff url('tile.png') repeat-x; }
            .c { background-image: image-set(url(one.webp) 1x, url(two.webp) 2x); }
            .d { border-image: url(ignored.png); }
        "#;
        assert_eq!(
            extract_css_urls(css),
            vec!["hero.jpg", "one.webp", "two.webp", "tile.png"]
        );
    }

    #[test]
    fn test_extract_css_urls_dedups_across_passes() {
        let css = ".a { background-image: url(a.png) } .b { background: url(a.png) }";
        assert_eq!(extract_css_urls(css), vec!["a.png"]);
    }

    #[test]
    fn test_extract_css_urls_ignores_empty_and_none() {
        let css = ".a { background-image: url(''); } .b { background: none; }";
        assert!(extract_css_urls(css).is_empty());
    }

    #[test]
    fn test_scan_tree_resolves_against_sheet_href() {
        let sheet = Stylesheet::external(
            Url::parse("https://static.example.com/css/site.css").unwrap(),
            ".hero { background-image: url(../img/hero.jpg); }",
        );
        let tree = Tree::new(Vec::new(), vec![sheet, Stylesheet::inline(".x{background:url(x.png)}")]);
        let found = scan_tree(&tree, &ctx(), ResourceSource::Css);
        let urls: Vec<&str> = found.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://static.example.com/img/hero.jpg",
                "https://example.com/blog/x.png",
            ]
        );
        assert!(found.iter().all(|r| r.source == ResourceSource::Css));
    }

    #[test]
    fn test_scan_tree_reads_inline_styles() {
        let tree = Tree::new(
            vec![
                Element::new("div").with_attr("style", "background-image: url(banner)"),
                Element::new("div").with_attr("style", "background: url(data:image/png;base64,AAAA)"),
            ],
            Vec::new(),
        );
        let found = scan_tree(&tree, &ctx(), ResourceSource::Css);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com/blog/banner");
        assert_eq!(found[0].resource_type, ResourceType::Image);
        assert_eq!(found[0].content_type, "image/unknown");
    }
}
