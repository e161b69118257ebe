//! Crawl engine: rendering seams, page storage and the traversal loop.
#[cfg(feature = "chromium")]
mod chromium;
mod engine;
mod export;
mod links;
mod persist;
mod render;
mod types;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumBackend, ChromiumSettings};
pub use engine::{CrawlEngine, CrawlSettings};
pub use export::{
    load_documents, read_manifest, write_manifest, CrawledDocument, Manifest, ManifestError,
    MANIFEST_FILENAME,
};
pub use links::resolve_href;
pub use persist::{
    ensure_output_dir, unique_filename, AtomicFileWriter, FilePageStore, PageStore, PersistError,
};
pub use render::{
    is_success_status, NullSink, ProgressSink, RenderBackend, RenderSession, RenderedPage,
};
pub use types::{CrawlError, CrawlEvent, CrawlReport, FailureKind, FetchFailure, RenderError};

pub use crawl_core::{
    is_allowed, is_allowed_with, normalize_url, ConfigError, CrawlJob, PageRecord, SkipReason,
    SuffixMatch, VisitPolicy,
};
