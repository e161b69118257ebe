use std::sync::Arc;
use std::time::Duration;

use crate::{CrawlEvent, RenderError};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: CrawlEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: CrawlEvent) {}
}

/// Source of rendering sessions. The engine acquires exactly one session per
/// crawl and releases it on every exit path.
#[async_trait::async_trait]
pub trait RenderBackend: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn RenderSession>, RenderError>;
}

/// A live browser (or browser-like) context that can open pages.
#[async_trait::async_trait]
pub trait RenderSession: Send + Sync {
    /// Open a fresh page and navigate it to `url`, giving up after `timeout`.
    async fn navigate(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn RenderedPage>, RenderError>;

    /// Release every resource held by the session. Called once, after the last
    /// page has been closed or abandoned.
    async fn release(&self);
}

/// One navigated page.
#[async_trait::async_trait]
pub trait RenderedPage: Send {
    /// Status of the main document response, when the backend observed one.
    fn status(&self) -> Option<u16>;

    /// Address of the loaded document after redirects, if known.
    fn final_url(&self) -> Option<String> {
        None
    }

    /// Fully rendered HTML of the page.
    async fn render(&mut self) -> Result<String, RenderError>;

    /// Raw `href` attribute of every anchor element, unresolved.
    async fn query_links(&mut self) -> Result<Vec<String>, RenderError>;

    async fn close(&mut self);
}

/// Statuses in `[200, 400)` count as a successful fetch.
pub fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}
