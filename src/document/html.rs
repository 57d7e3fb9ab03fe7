//! Static HTML to [`Document`] conversion.

use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use super::{Document, Element, ShadowRoot, ShadowRootMode, Stylesheet, Tree};

/// Elements that never carry media references worth keeping.
const SKIPPED_TAGS: &[&str] = &["script", "noscript"];

pub(super) fn parse_document(html: &str, url: Url) -> Document {
    let parsed = Html::parse_document(html);
    let mut builder = TreeBuilder::default();
    let mut stylesheets = Vec::new();
    let root = builder.build_element(parsed.root_element(), &mut stylesheets);

    let base_url = builder
        .base_href
        .as_deref()
        .and_then(|href| url.join(href).ok())
        .unwrap_or_else(|| url.clone());

    debug!(
        url = %url,
        base_url = %base_url,
        stylesheets = stylesheets.len(),
        shadow_roots = builder.shadow_roots,
        "parsed HTML document"
    );

    Document::new(url, Tree::new(vec![root], stylesheets)).with_base_url(base_url)
}

#[derive(Default)]
struct TreeBuilder {
    base_href: Option<String>,
    shadow_roots: usize,
}

impl TreeBuilder {
    fn build_element(&mut self, node: ElementRef<'_>, stylesheets: &mut Vec<Stylesheet>) -> Element {
        let mut element = Element::new(node.value().name());
        for (name, value) in node.value().attrs() {
            element.set_attribute(name, value);
        }

        for child in node.children().filter_map(ElementRef::wrap) {
            if element.shadow_root().is_none()
                && let Some(mode) = shadow_root_mode(child)
            {
                let shadow_root = self.build_shadow_root(child, mode);
                element = element.with_shadow_root(shadow_root);
                continue;
            }
            if let Some(built) = self.build_node(child, stylesheets) {
                element = element.with_child(built);
            }
        }

        element
    }

    fn build_node(
        &mut self,
        node: ElementRef<'_>,
        stylesheets: &mut Vec<Stylesheet>,
    ) -> Option<Element> {
        let tag = node.value().name();
        if tag == "style" {
            stylesheets.push(Stylesheet::inline(node.text().collect::<String>()));
            return None;
        }
        if SKIPPED_TAGS.contains(&tag) {
            return None;
        }
        if tag == "base"
            && self.base_href.is_none()
            && let Some(href) = node.value().attr("href")
        {
            self.base_href = Some(href.to_string());
        }
        Some(self.build_element(node, stylesheets))
    }

    fn build_shadow_root(&mut self, template: ElementRef<'_>, mode: ShadowRootMode) -> ShadowRoot {
        self.shadow_roots += 1;
        let mut stylesheets = Vec::new();
        let mut children = Vec::new();
        for child in template.children().filter_map(ElementRef::wrap) {
            if let Some(built) = self.build_node(child, &mut stylesheets) {
                children.push(built);
            }
        }
        ShadowRoot::new(mode, Tree::new(children, stylesheets))
    }
}

/// Returns the mode of a declarative shadow root template, if `node` is one.
fn shadow_root_mode(node: ElementRef<'_>) -> Option<ShadowRootMode> {
    if node.value().name() != "template" {
        return None;
    }
    let value = node
        .value()
        .attr("shadowrootmode")
        .or_else(|| node.value().attr("shadowroot"))?;
    if value.eq_ignore_ascii_case("closed") {
        Some(ShadowRootMode::Closed)
    } else {
        Some(ShadowRootMode::Open)
    }
}
