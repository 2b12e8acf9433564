//! Markup normalization: drop noise subtrees and re-serialize the body.

use scraper::{ElementRef, Html, Node, Selector};
use tracing::warn;

use crate::error::{Result, ScrapeError};

/// Tags whose whole subtree is removed before diffing.
pub const DEFAULT_STRIP_TAGS: &[&str] = &["script", "style", "noscript", "meta", "link"];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub trait MarkupNormalizer {
    /// Parse `raw`, remove noise and serialize the result.
    fn normalize(&self, raw: &str) -> Result<String>;
}

/// Normalizes with the `scraper` HTML5 parser.
#[derive(Debug, Clone)]
pub struct ScraperNormalizer {
    strip_tags: Vec<String>,
}

impl Default for ScraperNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_STRIP_TAGS.iter().map(|t| t.to_string()).collect())
    }
}

impl ScraperNormalizer {
    pub fn new(strip_tags: Vec<String>) -> Self {
        Self { strip_tags }
    }

    fn is_stripped(&self, name: &str) -> bool {
        self.strip_tags.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    fn write_element(&self, element: ElementRef<'_>, out: &mut String) {
        let el = element.value();
        let name = el.name();

        out.push('<');
        out.push_str(name);
        for (attr, value) in el.attrs() {
            out.push(' ');
            out.push_str(attr);
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&name) {
            return;
        }

        for child in element.children() {
            match child.value() {
                Node::Text(text) => escape_into(text, false, out),
                Node::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(comment);
                    out.push_str("-->");
                }
                Node::Element(child_el) if self.is_stripped(child_el.name()) => {}
                Node::Element(_) => {
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        self.write_element(child_ref, out);
                    }
                }
                _ => {}
            }
        }

        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

impl MarkupNormalizer for ScraperNormalizer {
    fn normalize(&self, raw: &str) -> Result<String> {
        let document = Html::parse_document(raw);
        let body = Selector::parse("body").map_err(|e| ScrapeError::Parse(e.to_string()))?;

        let root = document
            .select(&body)
            .next()
            .unwrap_or_else(|| document.root_element());

        let mut out = String::with_capacity(raw.len());
        if !self.is_stripped(root.value().name()) {
            self.write_element(root, &mut out);
        }
        Ok(out)
    }
}

/// Normalize `raw`, or return it unchanged if the normalizer fails.
pub fn normalize_or_raw(normalizer: &dyn MarkupNormalizer, raw: &str) -> String {
    match normalizer.normalize(raw) {
        Ok(text) => text,
        Err(e) => {
            warn!("Normalization failed, comparing raw markup: {}", e);
            raw.to_string()
        }
    }
}

fn escape_into(text: &str, in_attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !in_attribute => out.push_str("&lt;"),
            '>' if !in_attribute => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            c => out.push(c),
        }
    }
}
