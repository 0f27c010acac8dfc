//! Auditable elements found on a page

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use url::Url;

/// Kinds of input a module can declare interest in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Link,
    Form,
    Cookie,
    Header,
    /// The response body as a whole
    Body,
    /// The page's path, independent of its inputs
    Path,
    /// The server the page came from
    Server,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Link => "link",
            Self::Form => "form",
            Self::Cookie => "cookie",
            Self::Header => "header",
            Self::Body => "body",
            Self::Path => "path",
            Self::Server => "server",
        };
        f.write_str(s)
    }
}

/// A URL whose query parameters are auditable inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub inputs: BTreeMap<String, String>,
}

impl Link {
    /// Builds a link from a URL, or `None` if it carries no query parameters
    pub fn from_url(url: &Url) -> Option<Self> {
        let inputs: BTreeMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if inputs.is_empty() {
            return None;
        }

        Some(Self {
            url: url.to_string(),
            inputs,
        })
    }
}

/// An HTML form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Form {
    /// Absolute submission URL
    pub action: String,
    /// Upper-cased HTTP method
    pub method: String,
    pub inputs: BTreeMap<String, String>,
}

/// A cookie set by the response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    /// Parses the leading `name=value` pair of a `Set-Cookie` header value
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// A response header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Collects links with query parameters from anchors
pub(crate) fn extract_links(document: &Html, base: &Url) -> Vec<Link> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter_map(|url| Link::from_url(&url))
        .collect()
}

/// Collects every form with its named fields
pub(crate) fn extract_forms(document: &Html, base: &Url) -> Vec<Form> {
    let (Ok(form_selector), Ok(field_selector)) = (
        Selector::parse("form"),
        Selector::parse("input[name], select[name], textarea[name], button[name]"),
    ) else {
        return Vec::new();
    };

    document
        .select(&form_selector)
        .filter_map(|form| {
            let action = match form.value().attr("action").map(str::trim) {
                Some(a) if !a.is_empty() => base.join(a).ok()?,
                _ => base.clone(),
            };
            let method = form
                .value()
                .attr("method")
                .map(|m| m.trim().to_uppercase())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "GET".to_string());

            let inputs = form
                .select(&field_selector)
                .filter_map(|field| {
                    let name = field.value().attr("name")?;
                    Some((name.to_string(), field_value(&field)))
                })
                .collect();

            Some(Form {
                action: action.to_string(),
                method,
                inputs,
            })
        })
        .collect()
}

fn field_value(field: &ElementRef<'_>) -> String {
    match field.value().name() {
        "textarea" => field.text().collect(),
        "select" => Selector::parse("option")
            .ok()
            .and_then(|opt| {
                let mut options = field.select(&opt);
                let first = options.next()?;
                let chosen = std::iter::once(first)
                    .chain(options)
                    .find(|o| o.value().attr("selected").is_some())
                    .unwrap_or(first);
                Some(
                    chosen
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| chosen.text().collect()),
                )
            })
            .unwrap_or_default(),
        _ => field.value().attr("value").unwrap_or_default().to_string(),
    }
}

/// Extracts the page title
pub(crate) fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
