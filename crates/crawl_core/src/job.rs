use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::scope::SuffixMatch;

/// When a URL joins the visited set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VisitPolicy {
    /// Only after a successful fetch; a failed URL may be retried when rediscovered.
    #[default]
    OnSuccess,
    /// As soon as the URL is claimed for fetching, whatever the outcome.
    OnAttempt,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no starter urls given")]
    NoStarterUrls,
    #[error("starter url #{index} is empty")]
    EmptyStarterUrl { index: usize },
    #[error("starter url {url:?} is invalid: {reason}")]
    InvalidStarterUrl { url: String, reason: String },
    #[error("allowed domain #{index} is empty")]
    EmptyDomain { index: usize },
    #[error("allowed domain {domain:?} is not a host suffix")]
    InvalidDomain { domain: String },
}

/// One crawl request. Immutable once validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    pub starter_urls: Vec<String>,
    pub max_hops: u32,
    pub allowed_domains: BTreeSet<String>,
    pub storage_root: PathBuf,
    #[serde(default)]
    pub suffix_match: SuffixMatch,
    #[serde(default)]
    pub visit_policy: VisitPolicy,
}

impl CrawlJob {
    pub fn new(
        starter_urls: impl IntoIterator<Item = impl Into<String>>,
        max_hops: u32,
        allowed_domains: impl IntoIterator<Item = impl Into<String>>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            starter_urls: starter_urls.into_iter().map(Into::into).collect(),
            max_hops,
            allowed_domains: allowed_domains.into_iter().map(Into::into).collect(),
            storage_root: storage_root.into(),
            suffix_match: SuffixMatch::default(),
            visit_policy: VisitPolicy::default(),
        }
    }

    /// Job whose scope is the set of hosts of its own starter URLs.
    pub fn for_sites(
        starter_urls: impl IntoIterator<Item = impl Into<String>>,
        max_hops: u32,
        storage_root: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let starter_urls: Vec<String> = starter_urls.into_iter().map(Into::into).collect();
        let mut allowed = BTreeSet::new();
        for (index, raw) in starter_urls.iter().enumerate() {
            allowed.insert(starter_host(index, raw)?);
        }
        Self::new(starter_urls, max_hops, allowed, storage_root).validate()
    }

    pub fn with_suffix_match(mut self, suffix_match: SuffixMatch) -> Self {
        self.suffix_match = suffix_match;
        self
    }

    pub fn with_visit_policy(mut self, visit_policy: VisitPolicy) -> Self {
        self.visit_policy = visit_policy;
        self
    }

    /// Check every starter URL and domain suffix, returning the job with
    /// trimmed starters and lowercased suffixes.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.starter_urls.is_empty() {
            return Err(ConfigError::NoStarterUrls);
        }
        for (index, raw) in self.starter_urls.iter_mut().enumerate() {
            starter_host(index, raw)?;
            *raw = raw.trim().to_string();
        }

        let mut domains = BTreeSet::new();
        for (index, raw) in self.allowed_domains.iter().enumerate() {
            let domain = raw.trim().to_ascii_lowercase();
            if domain.is_empty() {
                return Err(ConfigError::EmptyDomain { index });
            }
            if domain
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | ':' | '?' | '#' | '@'))
            {
                return Err(ConfigError::InvalidDomain {
                    domain: raw.clone(),
                });
            }
            domains.insert(domain);
        }
        self.allowed_domains = domains;
        Ok(self)
    }
}

fn starter_host(index: usize, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyStarterUrl { index });
    }
    let parsed = Url::parse(trimmed).map_err(|err| ConfigError::InvalidStarterUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    parsed
        .host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| ConfigError::InvalidStarterUrl {
            url: raw.to_string(),
            reason: "url has no host".to_string(),
        })
}
