use url::Url;

/// Canonical dedup key for a URL.
///
/// - the fragment is dropped
/// - a bare `scheme://host` gets exactly one trailing slash
/// - any other path loses its trailing slashes
///
/// Parseable URLs also get the `url` crate's canonical casing and default
/// port handling. Input that does not parse is normalized textually and
/// never rejected.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => normalize_parsed(url),
        Err(_) => normalize_text(raw.trim()),
    }
}

fn normalize_parsed(mut url: Url) -> String {
    url.set_fragment(None);
    if url.cannot_be_a_base() {
        return url.into();
    }
    let trimmed = url.path().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        url.set_path("/");
    } else {
        url.set_path(&trimmed);
    }
    url.into()
}

fn normalize_text(raw: &str) -> String {
    let without_fragment = raw.split_once('#').map_or(raw, |(head, _)| head);
    let (body, query) = match without_fragment.split_once('?') {
        Some((body, query)) => (body, Some(query)),
        None => (without_fragment, None),
    };

    let path_start = body
        .find("://")
        .map(|idx| idx + 3)
        .and_then(|authority| body[authority..].find('/').map(|p| authority + p));

    let mut normalized = match path_start {
        Some(start) => {
            let path = body[start..].trim_end_matches('/');
            if path.is_empty() {
                format!("{}/", &body[..start])
            } else {
                format!("{}{}", &body[..start], path)
            }
        }
        None if body.contains("://") => format!("{body}/"),
        None => body.trim_end_matches('/').to_string(),
    };

    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }
    normalized
}
