//! Headless Chromium rendering backend over the DevTools protocol.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use crawl_logging::{crawl_debug, crawl_info, crawl_trace, crawl_warn};
use futures_util::{Stream, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::render::{RenderBackend, RenderSession, RenderedPage};
use crate::{FailureKind, RenderError};

/// How long to wait for the main document's response event once navigation
/// has completed.
const STATUS_EVENT_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    pub headless: bool,
    pub sandbox: bool,
    /// DevTools request timeout for the browser connection.
    pub request_timeout: Duration,
    pub args: Vec<String>,
    /// Attach to an already running browser instead of launching one.
    pub remote_debugging_url: Option<String>,
}

impl Default for ChromiumSettings {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            request_timeout: Duration::from_secs(30),
            args: vec![
                "--disable-gpu".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            remote_debugging_url: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChromiumBackend {
    settings: ChromiumSettings,
}

impl ChromiumBackend {
    pub fn new(settings: ChromiumSettings) -> Self {
        Self { settings }
    }

    /// Launch or attach to a browser and start driving its event handler.
    async fn connect(&self) -> Result<(Browser, JoinHandle<()>, bool), RenderError> {
        if let Some(url) = self.settings.remote_debugging_url.as_deref() {
            crawl_info!("Connecting to remote Chrome instance at {}", url);
            let (browser, handler) = Browser::connect(url).await.map_err(launch_error)?;
            return Ok((browser, drive_handler(handler), false));
        }

        let mut builder = BrowserConfig::builder().request_timeout(self.settings.request_timeout);
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if !self.settings.sandbox {
            builder = builder.no_sandbox();
        }
        for arg in &self.settings.args {
            builder = builder.arg(arg.as_str());
        }
        let config = builder
            .build()
            .map_err(|err| RenderError::new(FailureKind::Launch, err))?;
        let (browser, handler) = Browser::launch(config).await.map_err(launch_error)?;
        Ok((browser, drive_handler(handler), true))
    }
}

/// The handler must be polled for the browser connection to make progress.
fn drive_handler<H, T, E>(mut handler: H) -> JoinHandle<()>
where
    H: Stream<Item = Result<T, E>> + Unpin + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    })
}

#[async_trait::async_trait]
impl RenderBackend for ChromiumBackend {
    async fn acquire(&self) -> Result<Arc<dyn RenderSession>, RenderError> {
        let (browser, handler_task, owned) = self.connect().await?;
        crawl_debug!("Browser session acquired (owned={})", owned);
        Ok(Arc::new(ChromiumSession {
            browser: RwLock::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            owned,
        }))
    }
}

struct ChromiumSession {
    browser: RwLock<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    /// False when attached to a remote browser we must not shut down.
    owned: bool,
}

impl ChromiumSession {
    fn abort_handler(&self) {
        if let Ok(mut slot) = self.handler_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

#[async_trait::async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn RenderedPage>, RenderError> {
        let page = {
            let browser = self.browser.read().await;
            let browser = browser.as_ref().ok_or_else(|| {
                RenderError::new(FailureKind::Navigation, "browser session already released")
            })?;
            browser
                .new_page("about:blank")
                .await
                .map_err(|err| RenderError::new(FailureKind::Navigation, err.to_string()))?
        };
        let page = PageGuard::new(page, url);

        let mut responses = page
            .page()?
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|err| RenderError::new(FailureKind::Navigation, err.to_string()))?;

        match tokio::time::timeout(timeout, page.page()?.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                return Err(RenderError::new(FailureKind::Navigation, err.to_string()));
            }
            Err(_) => {
                return Err(RenderError::new(
                    FailureKind::Timeout,
                    format!("navigation exceeded {timeout:?}"),
                ));
            }
        }

        let status = document_status(&mut responses).await;
        let final_url = page.page()?.url().await.ok().flatten();
        crawl_trace!("Navigated to {} ({:?}) with status {:?}", url, final_url, status);
        Ok(Box::new(ChromiumPage {
            page,
            status,
            final_url,
        }))
    }

    async fn release(&self) {
        let browser = self.browser.write().await.take();
        if let Some(mut browser) = browser {
            if self.owned {
                if let Err(err) = browser.close().await {
                    crawl_warn!("Failed to close browser: {}", err);
                }
                if let Err(err) = browser.wait().await {
                    crawl_warn!("Failed to reap browser process: {}", err);
                }
            }
        }
        self.abort_handler();
        crawl_debug!("Browser session released");
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.abort_handler();
    }
}

/// First main-document response seen on the page; iframes come later.
async fn document_status<S>(responses: &mut S) -> Option<u16>
where
    S: Stream<Item = Arc<EventResponseReceived>> + Unpin,
{
    loop {
        match tokio::time::timeout(STATUS_EVENT_WAIT, responses.next()).await {
            Ok(Some(event)) if event.r#type == ResourceType::Document => {
                return u16::try_from(event.response.status).ok();
            }
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

struct ChromiumPage {
    page: PageGuard,
    status: Option<u16>,
    final_url: Option<String>,
}

#[async_trait::async_trait]
impl RenderedPage for ChromiumPage {
    fn status(&self) -> Option<u16> {
        self.status
    }

    fn final_url(&self) -> Option<String> {
        self.final_url.clone()
    }

    async fn render(&mut self) -> Result<String, RenderError> {
        self.page
            .page()?
            .content()
            .await
            .map_err(|err| RenderError::new(FailureKind::Render, err.to_string()))
    }

    async fn query_links(&mut self) -> Result<Vec<String>, RenderError> {
        let extraction = |err: CdpError| {
            RenderError::new(FailureKind::LinkExtraction, err.to_string())
        };
        let anchors = self
            .page
            .page()?
            .find_elements("a[href]")
            .await
            .map_err(extraction)?;

        let mut hrefs = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            if let Some(href) = anchor.attribute("href").await.map_err(extraction)? {
                hrefs.push(href);
            }
        }
        Ok(hrefs)
    }

    async fn close(&mut self) {
        self.page.close().await;
    }
}

/// Closes its page when dropped, so abandoned fetches (cancellation, timeouts)
/// do not leak browser tabs.
struct PageGuard {
    page: Option<Page>,
    url: String,
    runtime: tokio::runtime::Handle,
}

impl PageGuard {
    fn new(page: Page, url: &str) -> Self {
        Self {
            page: Some(page),
            url: url.to_string(),
            runtime: tokio::runtime::Handle::current(),
        }
    }

    fn page(&self) -> Result<&Page, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::new(FailureKind::Render, "page already closed"))
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                crawl_warn!("Failed to close page for {}: {}", self.url, err);
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            let url = std::mem::take(&mut self.url);
            self.runtime.spawn(async move {
                if let Err(err) = page.close().await {
                    crawl_warn!("Deferred close failed for {}: {}", url, err);
                }
            });
        }
    }
}

fn launch_error(err: CdpError) -> RenderError {
    RenderError::new(FailureKind::Launch, err.to_string())
}
