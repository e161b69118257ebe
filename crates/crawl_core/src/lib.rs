//! Crawl core: pure traversal model with no IO.
mod job;
mod normalize;
mod record;
mod scope;
mod state;

pub use job::{ConfigError, CrawlJob, VisitPolicy};
pub use normalize::normalize_url;
pub use record::{FrontierEntry, PageRecord};
pub use scope::{is_allowed, is_allowed_with, SuffixMatch};
pub use state::{CrawlState, Dequeued, SkipReason};
