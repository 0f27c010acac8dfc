//! Page model
//!
//! A [`Page`] is an immutable snapshot of a fetched resource together with
//! the auditable elements parsed out of it. Pages are built once, shared as
//! `Arc<Page>` between the spider's observers and the audit dispatcher, and
//! never mutated afterwards.

mod elements;

pub use elements::{Cookie, ElementKind, Form, Header, Link};

use crate::http::HttpResponse;
use scraper::Html;
use url::Url;

/// A fetched resource and its auditable elements
#[derive(Debug, Clone)]
pub struct Page {
    url: Url,
    code: u16,
    body: String,
    content_type: Option<String>,
    title: Option<String>,
    links: Vec<Link>,
    forms: Vec<Form>,
    cookies: Vec<Cookie>,
    headers: Vec<Header>,
}

impl Page {
    /// Builds a page from a response, parsing elements out of HTML bodies
    pub fn from_response(response: &HttpResponse) -> Self {
        let mut builder = Page::builder(response.url.clone())
            .code(response.status)
            .body(response.body.clone());

        if let Some(ct) = &response.content_type {
            builder = builder.content_type(ct.clone());
        }

        builder = builder.links(Link::from_url(&response.url));

        for (name, value) in &response.headers {
            builder = builder.header(name.clone(), value.clone());
        }

        builder = builder.cookies(
            response
                .header_all("set-cookie")
                .filter_map(Cookie::parse_set_cookie),
        );

        if is_html(response.content_type.as_deref(), &response.body) {
            let document = Html::parse_document(&response.body);
            builder.title = elements::extract_title(&document);
            builder = builder
                .links(elements::extract_links(&document, &response.url))
                .forms(elements::extract_forms(&document, &response.url));
        }

        builder.build()
    }

    /// Starts building a page by hand
    ///
    /// ```
    /// use spindle::Page;
    /// use url::Url;
    ///
    /// let page = Page::builder(Url::parse("http://example.com/").unwrap())
    ///     .body("<p>hello</p>")
    ///     .build();
    /// assert_eq!(page.code(), 200);
    /// assert!(page.forms().is_empty());
    /// ```
    pub fn builder(url: Url) -> PageBuilder {
        PageBuilder {
            url,
            code: 200,
            body: String::new(),
            content_type: None,
            title: None,
            links: Vec::new(),
            forms: Vec::new(),
            cookies: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Whether the page offers anything of `kind` to audit
    pub fn has(&self, kind: ElementKind) -> bool {
        match kind {
            ElementKind::Link => !self.links.is_empty(),
            ElementKind::Form => !self.forms.is_empty(),
            ElementKind::Cookie => !self.cookies.is_empty(),
            ElementKind::Header => !self.headers.is_empty(),
            ElementKind::Body => !self.body.is_empty(),
            ElementKind::Path | ElementKind::Server => true,
        }
    }

    /// Whether the content type denotes non-textual content
    ///
    /// Pages without a content type are treated as text.
    pub fn is_binary(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| !is_textual(ct))
            .unwrap_or(false)
    }
}

/// Incremental constructor for [`Page`]
#[derive(Debug)]
pub struct PageBuilder {
    url: Url,
    code: u16,
    body: String,
    content_type: Option<String>,
    title: Option<String>,
    links: Vec<Link>,
    forms: Vec<Form>,
    cookies: Vec<Cookie>,
    headers: Vec<Header>,
}

impl PageBuilder {
    pub fn code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn links(mut self, links: impl IntoIterator<Item = Link>) -> Self {
        self.links.extend(links);
        self
    }

    pub fn forms(mut self, forms: impl IntoIterator<Item = Form>) -> Self {
        self.forms.extend(forms);
        self
    }

    pub fn form(self, form: Form) -> Self {
        self.forms([form])
    }

    pub fn cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        self.cookies.extend(cookies);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn build(mut self) -> Page {
        // Anchors can repeat the page URL's own query
        let mut seen = std::collections::HashSet::new();
        self.links.retain(|link| seen.insert(link.url.clone()));

        Page {
            url: self.url,
            code: self.code,
            body: self.body,
            content_type: self.content_type,
            title: self.title,
            links: self.links,
            forms: self.forms,
            cookies: self.cookies,
            headers: self.headers,
        }
    }
}

fn is_textual(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/")
        || ["html", "xml", "json", "javascript", "x-www-form-urlencoded"]
            .iter()
            .any(|marker| ct.contains(marker))
}

fn is_html(content_type: Option<&str>, body: &str) -> bool {
    match content_type {
        Some(ct) => ct.to_ascii_lowercase().contains("html"),
        None => body.trim_start().starts_with('<'),
    }
}
