use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use url::Url;

/// How a host is compared against an allowed domain suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SuffixMatch {
    /// Plain string suffix: `example.com` also admits `evilexample.com`.
    #[default]
    Plain,
    /// Host must equal the suffix or end with `.` followed by it.
    LabelBoundary,
}

/// True iff the URL's host ends with at least one allowed suffix.
///
/// URLs without a host (unparseable, `mailto:`, `data:`) are never allowed.
pub fn is_allowed(url: &str, allowed_domains: &BTreeSet<String>) -> bool {
    is_allowed_with(url, allowed_domains, SuffixMatch::Plain)
}

/// [`is_allowed`] with an explicit matching policy.
pub fn is_allowed_with(url: &str, allowed_domains: &BTreeSet<String>, mode: SuffixMatch) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    allowed_domains
        .iter()
        .any(|suffix| host_matches(&host, suffix, mode))
}

fn host_matches(host: &str, suffix: &str, mode: SuffixMatch) -> bool {
    match mode {
        SuffixMatch::Plain => host.ends_with(suffix),
        SuffixMatch::LabelBoundary => {
            let suffix = suffix.trim_start_matches('.');
            host == suffix
                || host
                    .strip_suffix(suffix)
                    .is_some_and(|head| head.ends_with('.'))
        }
    }
}
