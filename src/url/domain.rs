use url::Url;

/// Extracts the lowercase host of a URL
///
/// Returns `None` for URLs without a host, which normalization already
/// rejects for anything the crawler handles.
///
/// ```
/// use url::Url;
/// use spindle::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
