//! RON job files.
//!
//! ```ron
//! (
//!     starter_urls: ["https://docs.example.com/"],
//!     max_hops: 2,
//!     storage_root: "data/acme",
//!     allowed_domains: Some(["example.com"]),
//!     concurrency: 4,
//! )
//! ```
//!
//! When `allowed_domains` is omitted the starters' own hosts are used.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use crawl_engine::{
    ChromiumSettings, ConfigError, CrawlJob, CrawlSettings, SuffixMatch, VisitPolicy,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    pub starter_urls: Vec<String>,
    pub max_hops: u32,
    pub storage_root: PathBuf,
    #[serde(default)]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default)]
    pub suffix_match: SuffixMatch,
    #[serde(default)]
    pub visit_policy: VisitPolicy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub browser: BrowserFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserFile {
    pub headless: bool,
    pub sandbox: bool,
    pub extra_args: Vec<String>,
    pub remote_debugging_url: Option<String>,
}

impl Default for BrowserFile {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            extra_args: Vec::new(),
            remote_debugging_url: None,
        }
    }
}

fn default_concurrency() -> usize {
    CrawlSettings::default().concurrency
}

fn default_fetch_timeout_secs() -> u64 {
    CrawlSettings::default().fetch_timeout.as_secs()
}

impl JobFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid job file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Build the crawl job. Relative storage roots resolve against `base`.
    pub fn to_job(&self, base: &Path) -> Result<CrawlJob, ConfigError> {
        let root = if self.storage_root.is_absolute() {
            self.storage_root.clone()
        } else {
            base.join(&self.storage_root)
        };
        let job = match &self.allowed_domains {
            Some(domains) => CrawlJob::new(
                self.starter_urls.iter().cloned(),
                self.max_hops,
                domains.iter().cloned(),
                root,
            ),
            None => CrawlJob::for_sites(self.starter_urls.iter().cloned(), self.max_hops, root)?,
        };
        job.with_suffix_match(self.suffix_match)
            .with_visit_policy(self.visit_policy)
            .validate()
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            concurrency: self.concurrency.max(1),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
        }
    }

    /// Browser settings. A non-blank `remote_override` replaces the file's remote URL.
    pub fn chromium_settings(&self, remote_override: Option<String>) -> ChromiumSettings {
        let mut settings = ChromiumSettings {
            headless: self.browser.headless,
            sandbox: self.browser.sandbox,
            remote_debugging_url: remote_override
                .filter(|url| !url.trim().is_empty())
                .or_else(|| self.browser.remote_debugging_url.clone()),
            ..ChromiumSettings::default()
        };
        settings.args.extend(self.browser.extra_args.iter().cloned());
        settings
    }
}
