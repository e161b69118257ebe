//! In-memory rendering backend for exercising the engine without a browser.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use crawl_engine::{
    CrawlEvent, FailureKind, PageRecord, PageStore, PersistError, ProgressSink, RenderBackend,
    RenderError, RenderSession, RenderedPage,
};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(crawl_logging::initialize_for_tests);
}

#[derive(Debug, Clone)]
pub struct FakePage {
    status: Option<u16>,
    final_url: Option<String>,
    html: String,
    links: Result<Vec<String>, String>,
    delay: Duration,
    failures_before_success: usize,
}

impl FakePage {
    pub fn ok(html: &str, links: &[&str]) -> Self {
        Self {
            status: Some(200),
            final_url: None,
            html: html.to_string(),
            links: Ok(links.iter().map(|l| l.to_string()).collect()),
            delay: Duration::ZERO,
            failures_before_success: 0,
        }
    }

    pub fn status(code: u16) -> Self {
        Self {
            status: Some(code),
            ..Self::ok("<html>error</html>", &[])
        }
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    /// Where the browser reports the page ended up, e.g. after a redirect.
    pub fn with_final_url(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_broken_links(mut self) -> Self {
        self.links = Err("element detached".to_string());
        self
    }

    /// Navigation fails this many times before the page loads.
    pub fn flaky(mut self, failures: usize) -> Self {
        self.failures_before_success = failures;
        self
    }
}

#[derive(Default)]
struct SiteState {
    pages: HashMap<String, FakePage>,
    attempts: Mutex<HashMap<String, usize>>,
    visits: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicBool,
    fail_acquire: bool,
    acquire_delay: Duration,
}

#[derive(Clone, Default)]
pub struct FakeSite {
    state: Arc<SiteState>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        Arc::get_mut(&mut self.state)
            .expect("configure the site before crawling")
            .pages
            .insert(url.to_string(), page);
        self
    }

    pub fn failing_acquire(mut self) -> Self {
        Arc::get_mut(&mut self.state)
            .expect("configure the site before crawling")
            .fail_acquire = true;
        self
    }

    pub fn slow_acquire(mut self, delay: Duration) -> Self {
        Arc::get_mut(&mut self.state)
            .expect("configure the site before crawling")
            .acquire_delay = delay;
        self
    }

    /// Every navigation attempt, in order.
    pub fn visits(&self) -> Vec<String> {
        self.state.visits.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.state.released.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RenderBackend for FakeSite {
    async fn acquire(&self) -> Result<Arc<dyn RenderSession>, RenderError> {
        if !self.state.acquire_delay.is_zero() {
            tokio::time::sleep(self.state.acquire_delay).await;
        }
        if self.state.fail_acquire {
            return Err(RenderError::new(FailureKind::Launch, "no browser installed"));
        }
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

struct FakeSession {
    state: Arc<SiteState>,
}

#[async_trait::async_trait]
impl RenderSession for FakeSession {
    async fn navigate(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn RenderedPage>, RenderError> {
        self.state.visits.lock().unwrap().push(url.to_string());
        let guard = OpenPage::new(self.state.clone());

        let Some(page) = self.state.pages.get(url).cloned() else {
            return Err(RenderError::new(
                FailureKind::Navigation,
                format!("net::ERR_NAME_NOT_RESOLVED at {url}"),
            ));
        };

        if !page.delay.is_zero() {
            tokio::time::sleep(page.delay).await;
        }

        let attempt = {
            let mut attempts = self.state.attempts.lock().unwrap();
            let count = attempts.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if attempt <= page.failures_before_success {
            return Err(RenderError::new(
                FailureKind::Navigation,
                format!("net::ERR_CONNECTION_RESET at {url}"),
            ));
        }

        Ok(Box::new(FakeRenderedPage {
            page,
            _guard: guard,
        }))
    }

    async fn release(&self) {
        self.state.released.store(true, Ordering::SeqCst);
    }
}

/// Tracks how many pages are open at once; dropping it closes the page.
struct OpenPage {
    state: Arc<SiteState>,
}

impl OpenPage {
    fn new(state: Arc<SiteState>) -> Self {
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak.fetch_max(now, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for OpenPage {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeRenderedPage {
    page: FakePage,
    _guard: OpenPage,
}

#[async_trait::async_trait]
impl RenderedPage for FakeRenderedPage {
    fn status(&self) -> Option<u16> {
        self.page.status
    }

    fn final_url(&self) -> Option<String> {
        self.page.final_url.clone()
    }

    async fn render(&mut self) -> Result<String, RenderError> {
        Ok(self.page.html.clone())
    }

    async fn query_links(&mut self) -> Result<Vec<String>, RenderError> {
        self.page
            .links
            .clone()
            .map_err(|message| RenderError::new(FailureKind::LinkExtraction, message))
    }

    async fn close(&mut self) {}
}

/// Collects every emitted event.
#[derive(Default)]
pub struct TestSink {
    events: Mutex<Vec<CrawlEvent>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<CrawlEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: CrawlEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory store that fails once it has saved `capacity` pages.
pub struct LimitedStore {
    capacity: usize,
    saved: Mutex<Vec<(String, String)>>,
}

impl LimitedStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            saved: Mutex::new(Vec::new()),
        }
    }

    pub fn saved(&self) -> Vec<(String, String)> {
        self.saved.lock().unwrap().clone()
    }
}

impl PageStore for LimitedStore {
    fn save(&self, content: &str, source_url: &str) -> Result<PageRecord, PersistError> {
        let mut saved = self.saved.lock().unwrap();
        if saved.len() >= self.capacity {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "No space left on device",
            )));
        }
        saved.push((source_url.to_string(), content.to_string()));
        Ok(PageRecord {
            source_url: source_url.to_string(),
            storage_ref: format!("mem://{}", saved.len()).into(),
            size_bytes: content.len() as u64,
        })
    }
}
