use url::Url;

/// Resolve an anchor `href` against the page it was found on.
///
/// Returns `None` for empty hrefs, same-page fragments, `javascript:` pseudo
/// links, unresolvable references and anything that is not `http(s)`.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    if trimmed.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    let resolved = base.join(trimmed).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.into()),
        _ => None,
    }
}
