//! Document-like tree consumed by the detectors.
//!
//! The hosting environment supplies a [`Document`]: a light tree of
//! [`Element`]s with attribute access, per-tree stylesheets and optional
//! shadow roots. Whether an element is a custom element is an explicit
//! capability of the tree rather than something inferred at runtime.
//!
//! [`Document::parse_html`] builds a tree from static HTML, turning
//! declarative shadow roots (`<template shadowrootmode>`) into attached
//! shadow trees.

mod html;

use url::Url;

/// Runtime media facts the host may know about an element (decoded size,
/// playback length) that are not present in its attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaInfo {
    pub natural_width: u32,
    pub natural_height: u32,
    pub duration: Option<f64>,
}

/// A block of CSS text, optionally loaded from `href`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    /// URL the sheet was loaded from; relative references resolve against it.
    pub href: Option<Url>,
    pub css: String,
}

impl Stylesheet {
    /// A `<style>` block; resolves against the document base.
    #[must_use]
    pub fn inline(css: impl Into<String>) -> Self {
        Self {
            href: None,
            css: css.into(),
        }
    }

    /// A sheet fetched from `href`.
    #[must_use]
    pub fn external(href: Url, css: impl Into<String>) -> Self {
        Self {
            href: Some(href),
            css: css.into(),
        }
    }
}

/// Encapsulation mode of a shadow root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowRootMode {
    #[default]
    Open,
    Closed,
}

/// A set of top-level elements plus the stylesheets scoped to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    pub children: Vec<Element>,
    pub stylesheets: Vec<Stylesheet>,
}

impl Tree {
    #[must_use]
    pub fn new(children: Vec<Element>, stylesheets: Vec<Stylesheet>) -> Self {
        Self {
            children,
            stylesheets,
        }
    }

    /// Depth-first, document-order walk of every element in this tree.
    ///
    /// Does not descend into shadow roots.
    #[must_use]
    pub fn elements(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

/// A shadow subtree attached to a host element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadowRoot {
    pub mode: ShadowRootMode,
    pub tree: Tree,
}

impl ShadowRoot {
    #[must_use]
    pub fn new(mode: ShadowRootMode, tree: Tree) -> Self {
        Self { mode, tree }
    }
}

/// One element of the document tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    shadow_root: Option<Box<ShadowRoot>>,
    custom: bool,
    media_info: Option<MediaInfo>,
}

impl Element {
    /// Creates an element. Tag names are stored lowercase.
    #[must_use]
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn with_shadow_root(mut self, shadow_root: ShadowRoot) -> Self {
        self.shadow_root = Some(Box::new(shadow_root));
        self
    }

    #[must_use]
    pub fn with_media_info(mut self, media_info: MediaInfo) -> Self {
        self.media_info = Some(media_info);
        self
    }

    /// Flags the element as a custom element regardless of its tag name.
    #[must_use]
    pub fn as_custom_element(mut self) -> Self {
        self.custom = true;
        self
    }

    /// Sets an attribute, replacing an existing one with the same name.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns an attribute value; names are case-insensitive.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attributes in source order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    #[must_use]
    pub fn shadow_root(&self) -> Option<&ShadowRoot> {
        self.shadow_root.as_deref()
    }

    #[must_use]
    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.media_info.as_ref()
    }

    /// True for autonomous custom elements (hyphenated tag), customized
    /// built-ins (`is` attribute) and elements the host flagged explicitly.
    #[must_use]
    pub fn is_custom_element(&self) -> bool {
        self.custom || self.tag.contains('-') || self.attr("is").is_some()
    }

    /// Best-known pixel dimensions: host-reported natural size first, then
    /// the `width`/`height` attributes. Zero means unknown.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        if let Some(info) = self.media_info
            && (info.natural_width > 0 || info.natural_height > 0)
        {
            return (info.natural_width, info.natural_height);
        }
        (
            self.attr("width").map_or(0, parse_pixels),
            self.attr("height").map_or(0, parse_pixels),
        )
    }
}

/// Parses the leading integer of a dimension attribute (`"640"`, `"640px"`).
fn parse_pixels(value: &str) -> u32 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

/// Iterator returned by [`Tree::elements`].
#[derive(Debug)]
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.stack.pop()?;
        self.stack.extend(element.children.iter().rev());
        Some(element)
    }
}

/// A page: its URL, the base for relative references and its light tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    url: Url,
    base_url: Url,
    tree: Tree,
}

impl Document {
    /// Creates a document whose base URL is its own URL.
    #[must_use]
    pub fn new(url: Url, tree: Tree) -> Self {
        Self {
            base_url: url.clone(),
            url,
            tree,
        }
    }

    /// Overrides the base URL (as `<base href>` does).
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Parses static HTML into a document.
    #[must_use]
    pub fn parse_html(html: &str, url: Url) -> Self {
        html::parse_document(html, url)
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Attaches a stylesheet fetched after parsing (a `<link rel=stylesheet>`).
    pub fn add_stylesheet(&mut self, stylesheet: Stylesheet) {
        self.tree.stylesheets.push(stylesheet);
    }

    /// Absolute URLs of `<link rel="stylesheet">` elements in the light tree.
    #[must_use]
    pub fn linked_stylesheets(&self) -> Vec<Url> {
        self.tree
            .elements()
            .filter(|element| element.tag() == "link")
            .filter(|element| {
                element.attr("rel").is_some_and(|rel| {
                    rel.split_ascii_whitespace()
                        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
                })
            })
            .filter_map(|element| element.attr("href"))
            .filter_map(|href| self.base_url.join(href.trim()).ok())
            .collect()
    }
}
