//! URL handling module for Spindle
//!
//! This module provides URL normalization, host extraction, wildcard host
//! matching and resolution of relative paths against the seed URL.

mod domain;
mod matcher;
mod normalize;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use domain::extract_domain;
pub use matcher::{host_in_scope, matches_wildcard};
pub use normalize::{normalize_parsed, normalize_url};

/// Resolves `path` against `base` and normalizes the result
///
/// `path` may be absolute, root-relative or relative, and may contain
/// characters that are not valid in a URL (spaces, stray `%`); these are
/// escaped.
///
/// # Examples
///
/// ```
/// use spindle::url::to_absolute;
/// use url::Url;
///
/// let base = Url::parse("http://example.com/dir/page").unwrap();
/// assert_eq!(
///     to_absolute("other", &base).unwrap().as_str(),
///     "http://example.com/dir/other"
/// );
/// assert_eq!(
///     to_absolute("some path %", &base).unwrap().as_str(),
///     "http://example.com/dir/some%20path%20%25"
/// );
/// ```
pub fn to_absolute(path: &str, base: &Url) -> Result<Url, UrlError> {
    let joined = base
        .join(path.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", path, e)))?;
    normalize_parsed(joined)
}
