/// Checks if a host matches a wildcard pattern
///
/// Two kinds of pattern are supported:
/// 1. Exact: "example.com" matches only "example.com"
/// 2. Wildcard: "*.example.com" matches "example.com" itself and any
///    subdomain at any depth
///
/// Matching is case-sensitive; hosts are lowercased during normalization.
///
/// ```
/// use spindle::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Checks whether `candidate` is within the scope of the seed host
///
/// With `include_subdomains` the seed host acts as a `*.` wildcard pattern;
/// otherwise hosts must match exactly. Ports and schemes are not considered,
/// so `http://` and `https://` URLs of one host share a scope.
///
/// ```
/// use spindle::url::host_in_scope;
///
/// assert!(host_in_scope("example.com", "example.com", false));
/// assert!(!host_in_scope("api.example.com", "example.com", false));
/// assert!(host_in_scope("api.example.com", "example.com", true));
/// ```
pub fn host_in_scope(candidate: &str, seed_host: &str, include_subdomains: bool) -> bool {
    if include_subdomains {
        matches_wildcard(&format!("*.{}", seed_host), candidate)
    } else {
        candidate == seed_host
    }
}
