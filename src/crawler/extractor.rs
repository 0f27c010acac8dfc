//! Link extraction
//!
//! Turns a fetched response into candidate URLs for the spider. HTML bodies
//! are run through every registered [`PathExtractor`]; a few response headers
//! also carry paths.
//!
//! # Extraction Rules
//!
//! **Include:**
//! - `<a href>`, `<area href>`, `<link href>`
//! - `<form action>`
//! - `<frame src>`, `<iframe src>`, `<script src>`
//! - `<meta http-equiv="refresh" content="0; url=...">`
//! - `Content-Location` and `Link` response headers
//!
//! **Exclude:**
//! - `javascript:`, `mailto:`, `tel:`, `data:` references
//! - Fragment-only references
//! - Anything that does not resolve to an HTTP(S) URL
//!
//! Relative references resolve against `<base href>` when present, otherwise
//! against the response URL.

use crate::http::HttpResponse;
use crate::url::to_absolute;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Pulls raw path references out of a parsed HTML document
pub trait PathExtractor: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Returns references as written in the document, unresolved
    fn extract(&self, document: &Html) -> Vec<String>;
}

/// Collects one attribute from every element matching a CSS selector
pub struct AttributeExtractor {
    name: &'static str,
    selector: &'static str,
    attribute: &'static str,
}

impl AttributeExtractor {
    pub const fn new(name: &'static str, selector: &'static str, attribute: &'static str) -> Self {
        Self {
            name,
            selector,
            attribute,
        }
    }
}

impl PathExtractor for AttributeExtractor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&self, document: &Html) -> Vec<String> {
        let Ok(selector) = Selector::parse(self.selector) else {
            tracing::warn!("Extractor {} has an invalid selector", self.name);
            return Vec::new();
        };

        document
            .select(&selector)
            .filter_map(|el| el.value().attr(self.attribute))
            .map(str::to_string)
            .collect()
    }
}

/// Reads the target of `<meta http-equiv="refresh">`
pub struct MetaRefreshExtractor;

impl PathExtractor for MetaRefreshExtractor {
    fn name(&self) -> &'static str {
        "meta_refresh"
    }

    fn extract(&self, document: &Html) -> Vec<String> {
        let Ok(selector) = Selector::parse("meta[http-equiv][content]") else {
            return Vec::new();
        };

        document
            .select(&selector)
            .filter(|el| {
                el.value()
                    .attr("http-equiv")
                    .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
            })
            .filter_map(|el| el.value().attr("content"))
            .filter_map(refresh_target)
            .collect()
    }
}

/// Parses `5; url=/next` into `/next`
fn refresh_target(content: &str) -> Option<String> {
    content.split(';').skip(1).find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("url")
            .then(|| value.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
    })
}

fn builtin_extractors() -> Vec<Box<dyn PathExtractor>> {
    vec![
        Box::new(AttributeExtractor::new("anchors", "a[href]", "href")),
        Box::new(AttributeExtractor::new("areas", "area[href]", "href")),
        Box::new(AttributeExtractor::new("forms", "form[action]", "action")),
        Box::new(AttributeExtractor::new("frames", "frame[src], iframe[src]", "src")),
        Box::new(AttributeExtractor::new("links", "link[href]", "href")),
        Box::new(AttributeExtractor::new("scripts", "script[src]", "src")),
        Box::new(MetaRefreshExtractor),
    ]
}

/// Runs every registered extractor over a response
pub struct LinkExtractor {
    extractors: Vec<Box<dyn PathExtractor>>,
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self {
            extractors: builtin_extractors(),
        }
    }
}

impl LinkExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an extractor that runs after the built-in ones
    pub fn register(&mut self, extractor: Box<dyn PathExtractor>) {
        self.extractors.push(extractor);
    }

    pub fn extractor_names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Returns normalized, deduplicated candidate URLs in document order
    pub fn extract(&self, response: &HttpResponse) -> Vec<Url> {
        let mut raw = Vec::new();
        let mut base = response.url.clone();

        if let Some(location) = response.header("content-location") {
            raw.push(location.to_string());
        }
        for value in response.header_all("link") {
            raw.extend(link_header_targets(value));
        }

        if is_markup(response) {
            let document = Html::parse_document(&response.body);
            if let Some(b) = base_href(&document, &response.url) {
                base = b;
            }
            for extractor in &self.extractors {
                let found = extractor.extract(&document);
                tracing::trace!("{} found {} paths on {}", extractor.name(), found.len(), response.url);
                raw.extend(found);
            }
        }

        let mut seen = HashSet::new();
        raw.iter()
            .filter_map(|href| resolve_link(href, &base))
            .filter(|url| seen.insert(url.to_string()))
            .collect()
    }
}

/// Resolves a reference to a normalized absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only references
/// - anything that does not normalize to an HTTP(S) URL
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    to_absolute(href, base).ok()
}

fn base_href(document: &Html, url: &Url) -> Option<Url> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    url.join(href.trim()).ok()
}

/// Extracts `<...>` targets from a `Link` header value
fn link_header_targets(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|part| {
            let start = part.find('<')?;
            let end = part[start..].find('>')? + start;
            Some(part[start + 1..end].to_string())
        })
        .collect()
}

fn is_markup(response: &HttpResponse) -> bool {
    match response.content_type.as_deref() {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.contains("xml")
        }
        None => response.body.trim_start().starts_with('<'),
    }
}
