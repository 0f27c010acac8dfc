use crate::UrlError;
use url::Url;

/// Normalizes a URL according to Spindle's identity rules
///
/// Two URLs are considered the same resource iff their normalized forms are
/// equal.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an HTTP or HTTPS scheme (the scheme is kept as-is)
/// 3. Lowercase the host
/// 4. Strip path parameters (`/a;jsessionid=1/b` becomes `/a/b`)
/// 5. Canonicalize percent-encoding in path and query:
///    - Decode escapes of unreserved characters (`%41` becomes `A`)
///    - Upper-case the hex digits of remaining escapes
///    - Escape stray `%` signs as `%25`
/// 6. Remove fragment (everything after #)
///
/// Query parameter order and trailing slashes are preserved; both can change
/// what a server returns.
///
/// # Examples
///
/// ```
/// use spindle::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.COM/a;sid=1/%7euser?q=%2f#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/~user?q=%2F");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already parsed URL
pub fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = canonicalize_percent(&strip_path_params(url.path()));
    url.set_path(&path);

    if let Some(query) = url.query() {
        let query = canonicalize_percent(query);
        url.set_query(Some(&query));
    }

    url.set_fragment(None);

    Ok(url)
}

/// Removes `;params` from every path segment
fn strip_path_params(path: &str) -> String {
    if !path.contains(';') {
        return path.to_string();
    }

    path.split('/')
        .map(|segment| segment.split(';').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("/")
}

/// Rewrites percent-escapes into their canonical form
fn canonicalize_percent(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            match decode_hex_pair(bytes.get(i + 1..i + 3)) {
                Some(byte) if is_unreserved(byte) => out.push(byte as char),
                Some(byte) => out.push_str(&format!("%{:02X}", byte)),
                None => {
                    out.push_str("%25");
                    i += 1;
                    continue;
                }
            }
            i += 3;
        } else {
            // Non-ASCII input is already percent-encoded by the url crate, so
            // everything here is a single-byte char.
            out.push(bytes[i] as char);
            i += 1;
        }
    }

    out
}

fn decode_hex_pair(pair: Option<&[u8]>) -> Option<u8> {
    let pair = pair?;
    if !pair.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let hex = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(hex, 16).ok()
}

/// RFC 3986 unreserved characters
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_preserved() {
        let http = normalize_url("http://example.com/page").unwrap();
        let https = normalize_url("https://example.com/page").unwrap();
        assert_eq!(http.as_str(), "http://example.com/page");
        assert_ne!(http, https);
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_strip_path_params() {
        let result = normalize_url("http://example.com/something;jsessionid=42").unwrap();
        assert_eq!(result.as_str(), "http://example.com/something");

        let result = normalize_url("http://example.com/a;x=1/b;y=2/c").unwrap();
        assert_eq!(result.as_str(), "http://example.com/a/b/c");
    }

    #[test]
    fn test_decode_unreserved_escapes() {
        let result = normalize_url("http://example.com/%7Euser/%41bc").unwrap();
        assert_eq!(result.as_str(), "http://example.com/~user/Abc");
    }

    #[test]
    fn test_uppercase_reserved_escapes() {
        let result = normalize_url("http://example.com/a%2fb?q=%3d").unwrap();
        assert_eq!(result.as_str(), "http://example.com/a%2Fb?q=%3D");
    }

    #[test]
    fn test_stray_percent_is_escaped() {
        let result = normalize_url("http://example.com/100%?x=5%").unwrap();
        assert_eq!(result.as_str(), "http://example.com/100%25?x=5%25");
    }

    #[test]
    fn test_signed_escape_is_stray() {
        assert_eq!(canonicalize_percent("%+1"), "%25+1");
        assert_eq!(canonicalize_percent("a%-fb"), "a%25-fb");
        assert_eq!(decode_hex_pair(Some(b"+1")), None);
        assert_eq!(decode_hex_pair(Some(b"7e")), Some(0x7e));
    }

    #[test]
    fn test_equal_after_normalization() {
        let a = normalize_url("http://Example.com/%7efoo#a").unwrap();
        let b = normalize_url("http://example.com/~foo").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_query_order_and_trailing_slash_preserved() {
        let result = normalize_url("https://example.com/dir/?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/dir/?b=2&a=1");
    }

    #[test]
    fn test_dot_segments_resolved() {
        let result = normalize_url("https://example.com/a/../b/./c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }
}
