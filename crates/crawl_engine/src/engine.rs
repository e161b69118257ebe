use std::sync::Arc;
use std::time::Duration;

use crawl_core::{CrawlJob, CrawlState, Dequeued, FrontierEntry, SkipReason};
use crawl_logging::{crawl_debug, crawl_error, crawl_info, crawl_warn};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::links::resolve_href;
use crate::persist::PageStore;
use crate::render::{is_success_status, ProgressSink, RenderBackend, RenderSession};
use crate::{CrawlError, CrawlEvent, CrawlReport, FailureKind, FetchFailure, RenderError};

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Maximum number of pages fetched at once. 1 reproduces a strictly
    /// sequential FIFO traversal.
    pub concurrency: usize,
    /// Ceiling for each of navigate, render and link enumeration.
    pub fetch_timeout: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Typed result of one fetch attempt.
enum FetchOutcome {
    Fetched {
        entry: FrontierEntry,
        /// URL the page ended up at, when the backend reports one.
        final_url: Option<String>,
        html: String,
        links: Result<Vec<String>, RenderError>,
    },
    Failed {
        entry: FrontierEntry,
        error: RenderError,
    },
}

/// Breadth-first, domain-restricted crawler.
///
/// The task driving [`CrawlEngine::crawl`] owns the frontier and visited set;
/// fetches run as futures on that task and report back through their
/// [`FetchOutcome`], so no traversal state is shared between fetches.
#[derive(Debug, Clone, Default)]
pub struct CrawlEngine {
    settings: CrawlSettings,
}

impl CrawlEngine {
    pub fn new(settings: CrawlSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Crawl `job`, saving every fetched page through `store`.
    ///
    /// The store decides where pages land; use [`FilePageStore::for_job`] to
    /// root it at the job's `storage_root`.
    ///
    /// [`FilePageStore::for_job`]: crate::FilePageStore::for_job
    pub async fn crawl(
        &self,
        job: CrawlJob,
        backend: &dyn RenderBackend,
        store: &dyn PageStore,
        sink: &dyn ProgressSink,
    ) -> Result<CrawlReport, CrawlError> {
        self.crawl_with_cancel(job, backend, store, sink, CancellationToken::new())
            .await
    }

    /// Crawl until the frontier drains or `cancel` fires. On cancellation the
    /// in-flight fetches are dropped and the report carries what was saved so far.
    pub async fn crawl_with_cancel(
        &self,
        job: CrawlJob,
        backend: &dyn RenderBackend,
        store: &dyn PageStore,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<CrawlReport, CrawlError> {
        let job = job.validate()?;

        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                crawl_warn!("Crawl cancelled before a rendering session was acquired");
                return Ok(cancelled_before_start(sink));
            }
            acquired = backend.acquire() => acquired,
        };
        let session = acquired.map_err(|err| {
            crawl_error!("Failed to acquire rendering session: {}", err);
            CrawlError::Session(err)
        })?;

        let result = self.run(&job, &session, store, sink, &cancel).await;
        session.release().await;
        result
    }

    async fn run(
        &self,
        job: &CrawlJob,
        session: &Arc<dyn RenderSession>,
        store: &dyn PageStore,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, CrawlError> {
        let mut state = CrawlState::new(job);
        let mut report = CrawlReport::default();
        let mut in_flight = FuturesUnordered::new();
        let concurrency = self.settings.concurrency.max(1);

        crawl_info!(
            "Starting crawl: {} seed(s), max_hops={}, concurrency={}",
            state.pending(),
            job.max_hops,
            concurrency
        );
        sink.emit(CrawlEvent::Started {
            seeds: state.pending(),
        });

        loop {
            while in_flight.len() < concurrency {
                match state.dequeue() {
                    Some(Dequeued::Ready(entry)) => {
                        crawl_info!("Crawling [depth {}]: {}", entry.depth, entry.url);
                        in_flight.push(fetch_page(
                            Arc::clone(session),
                            entry,
                            self.settings.fetch_timeout,
                        ));
                    }
                    Some(Dequeued::Parked(entry)) => {
                        crawl_debug!("Holding {} until its running fetch settles", entry.url);
                    }
                    Some(Dequeued::Skipped { entry, reason }) => {
                        crawl_debug!("Skipping {} at depth {}: {:?}", entry.url, entry.depth, reason);
                        sink.emit(CrawlEvent::Skipped {
                            url: entry.url,
                            depth: entry.depth,
                            reason,
                        });
                    }
                    None => break,
                }
            }

            if in_flight.is_empty() {
                break;
            }

            let pending = in_flight.len();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    crawl_warn!("Crawl cancelled with {} fetch(es) in flight", pending);
                    report.cancelled = true;
                    break;
                }
                Some(outcome) = in_flight.next() => outcome,
            };

            match outcome {
                FetchOutcome::Failed { entry, error } => {
                    let requeued = state.record_failure(&entry.url);
                    crawl_warn!("Failed to crawl {}: {}", entry.url, error);
                    if requeued > 0 {
                        crawl_debug!("Re-queued {} rediscovery(ies) of {}", requeued, entry.url);
                    }
                    let failure = FetchFailure {
                        url: entry.url,
                        depth: entry.depth,
                        error,
                    };
                    sink.emit(CrawlEvent::FetchFailed(failure.clone()));
                    report.failures.push(failure);
                }
                FetchOutcome::Fetched {
                    entry,
                    final_url,
                    html,
                    links,
                } => {
                    for duplicate in state.record_success(&entry.url) {
                        sink.emit(CrawlEvent::Skipped {
                            url: duplicate.url,
                            depth: duplicate.depth,
                            reason: SkipReason::AlreadyVisited,
                        });
                    }

                    let record = match store.save(&html, &entry.url) {
                        Ok(record) => record,
                        Err(source) => {
                            crawl_error!("Failed to save page {}: {}", entry.url, source);
                            return Err(CrawlError::Persistence {
                                source,
                                partial: report.records,
                            });
                        }
                    };
                    crawl_info!(
                        "Saved {} ({} bytes) to {:?}",
                        record.source_url,
                        record.size_bytes,
                        record.storage_ref
                    );
                    sink.emit(CrawlEvent::PageSaved(record.clone()));
                    report.records.push(record);

                    match links {
                        Ok(hrefs) => {
                            let added =
                                enqueue_hrefs(&mut state, &entry, final_url.as_deref(), &hrefs);
                            crawl_debug!(
                                "{} link(s) found on {}, {} enqueued",
                                hrefs.len(),
                                entry.url,
                                added
                            );
                        }
                        Err(error) => {
                            crawl_warn!("Failed to extract links from {}: {}", entry.url, error);
                            sink.emit(CrawlEvent::LinksFailed {
                                url: entry.url,
                                error,
                            });
                        }
                    }
                }
            }
        }

        crawl_info!(
            "Crawl finished: {} page(s) saved, {} failure(s){}",
            report.records.len(),
            report.failures.len(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        sink.emit(CrawlEvent::Finished {
            pages: report.records.len(),
            failures: report.failures.len(),
            cancelled: report.cancelled,
        });
        Ok(report)
    }
}

/// Resolve against where the page actually ended up (redirects, trailing
/// slash), falling back to the frontier URL.
fn enqueue_hrefs(
    state: &mut CrawlState,
    entry: &FrontierEntry,
    final_url: Option<&str>,
    hrefs: &[String],
) -> usize {
    let base = final_url
        .and_then(|url| Url::parse(url).ok())
        .or_else(|| Url::parse(&entry.url).ok());
    let Some(base) = base else {
        return 0;
    };
    let resolved: Vec<String> = hrefs
        .iter()
        .filter_map(|href| resolve_href(&base, href))
        .collect();
    state.enqueue_links(entry.depth, resolved)
}

async fn fetch_page(
    session: Arc<dyn RenderSession>,
    entry: FrontierEntry,
    timeout: Duration,
) -> FetchOutcome {
    let mut page = match tokio::time::timeout(timeout, session.navigate(&entry.url, timeout)).await
    {
        Ok(Ok(page)) => page,
        Ok(Err(error)) => return FetchOutcome::Failed { entry, error },
        Err(_) => {
            return FetchOutcome::Failed {
                entry,
                error: timed_out("navigation", timeout),
            }
        }
    };

    if let Some(status) = page.status() {
        if !is_success_status(status) {
            page.close().await;
            return FetchOutcome::Failed {
                entry,
                error: RenderError::new(FailureKind::HttpStatus(status), format!("status {status}")),
            };
        }
    }

    let html = match tokio::time::timeout(timeout, page.render()).await {
        Ok(Ok(html)) => html,
        Ok(Err(error)) => {
            page.close().await;
            return FetchOutcome::Failed { entry, error };
        }
        Err(_) => {
            page.close().await;
            return FetchOutcome::Failed {
                entry,
                error: timed_out("render", timeout),
            };
        }
    };

    let links = match tokio::time::timeout(timeout, page.query_links()).await {
        Ok(links) => links,
        Err(_) => Err(RenderError::new(
            FailureKind::LinkExtraction,
            format!("link enumeration exceeded {timeout:?}"),
        )),
    };
    let final_url = page.final_url();
    page.close().await;

    FetchOutcome::Fetched {
        entry,
        final_url,
        html,
        links,
    }
}

fn cancelled_before_start(sink: &dyn ProgressSink) -> CrawlReport {
    let report = CrawlReport {
        cancelled: true,
        ..CrawlReport::default()
    };
    sink.emit(CrawlEvent::Finished {
        pages: 0,
        failures: 0,
        cancelled: true,
    });
    report
}

fn timed_out(stage: &str, timeout: Duration) -> RenderError {
    RenderError::new(FailureKind::Timeout, format!("{stage} exceeded {timeout:?}"))
}

#[cfg(test)]
mod tests {
    use super::CrawlSettings;
    use std::time::Duration;

    #[test]
    fn default_settings_are_sequential_with_ten_second_timeout() {
        let settings = CrawlSettings::default();
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.fetch_timeout, Duration::from_secs(10));
    }
}
