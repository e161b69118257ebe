use std::fmt;

use crawl_core::{ConfigError, PageRecord, SkipReason};

use crate::persist::PersistError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Response status outside `[200, 400)`.
    HttpStatus(u16),
    Timeout,
    Navigation,
    Render,
    LinkExtraction,
    Launch,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Navigation => write!(f, "navigation error"),
            FailureKind::Render => write!(f, "render error"),
            FailureKind::LinkExtraction => write!(f, "link extraction error"),
            FailureKind::Launch => write!(f, "browser launch error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RenderError {
    pub kind: FailureKind,
    pub message: String,
}

impl RenderError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A URL that was dequeued and attempted but not fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub depth: u32,
    pub error: RenderError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    Started {
        seeds: usize,
    },
    Skipped {
        url: String,
        depth: u32,
        reason: SkipReason,
    },
    PageSaved(PageRecord),
    FetchFailed(FetchFailure),
    LinksFailed {
        url: String,
        error: RenderError,
    },
    Finished {
        pages: usize,
        failures: usize,
        cancelled: bool,
    },
}

/// Everything a finished (or cancelled) crawl produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CrawlReport {
    pub records: Vec<PageRecord>,
    pub failures: Vec<FetchFailure>,
    pub cancelled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("invalid crawl job: {0}")]
    Config(#[from] ConfigError),
    #[error("could not acquire a rendering session: {0}")]
    Session(RenderError),
    #[error("crawl aborted after {} saved page(s): {source}", partial.len())]
    Persistence {
        #[source]
        source: PersistError,
        partial: Vec<PageRecord>,
    },
}

impl CrawlError {
    /// Records saved before the crawl failed. Empty unless the failure was mid-crawl.
    pub fn partial(&self) -> &[PageRecord] {
        match self {
            CrawlError::Persistence { partial, .. } => partial,
            CrawlError::Config(_) | CrawlError::Session(_) => &[],
        }
    }

    pub fn into_partial(self) -> Vec<PageRecord> {
        match self {
            CrawlError::Persistence { partial, .. } => partial,
            CrawlError::Config(_) | CrawlError::Session(_) => Vec::new(),
        }
    }
}
