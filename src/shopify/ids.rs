//! Canonicalization of upstream global identifiers.
//!
//! The Admin API hands out ids such as `gid://shopify/Product/123` (and, in
//! older payloads or exports, colon-namespaced forms like
//! `shopify:Product:123`). Local rows are keyed by the bare trailing token.

/// Strip a namespace prefix from an upstream id and return the trailing token.
///
/// Total: inputs that match no known format are returned unchanged, since the
/// upstream id format may change underneath us.
pub fn canonicalize(raw_id: &str) -> String {
    let trimmed = raw_id.trim();

    if let Some(rest) = trimmed.strip_prefix("gid://") {
        // gid://<app>/<Resource>/<id>[?params]
        let path = rest.split(['?', '#']).next().unwrap_or(rest);
        let mut segments = path.split('/');
        if let (Some(_app), Some(_resource), Some(id), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) && !id.is_empty()
        {
            return id.to_owned();
        }
        return raw_id.to_owned();
    }

    // ns:Resource:id (and longer URN-like chains)
    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() >= 3
        && parts[..parts.len() - 1].iter().all(|p| is_namespace_segment(p))
        && let Some(last) = parts.last()
        && !last.is_empty()
    {
        return (*last).to_owned();
    }

    raw_id.to_owned()
}

/// Namespace segments are short identifiers, never blank and never numeric-only.
fn is_namespace_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !segment.chars().all(|c| c.is_ascii_digit())
}
