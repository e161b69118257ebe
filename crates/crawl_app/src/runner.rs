use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use crawl_engine::{
    write_manifest, ChromiumBackend, CrawlEngine, CrawlError, CrawlEvent, CrawlReport,
    FilePageStore, PageRecord, ProgressSink,
};
use crawl_logging::{crawl_info, crawl_warn};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::config::JobFile;

/// Prints one line per saved or failed page to stdout.
#[derive(Default)]
pub struct ConsoleProgress {
    saved: AtomicUsize,
}

impl ProgressSink for ConsoleProgress {
    fn emit(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::PageSaved(record) => {
                let n = self.saved.fetch_add(1, Ordering::Relaxed) + 1;
                println!("[{n:>4}] saved  {} ({} bytes)", record.source_url, record.size_bytes);
            }
            CrawlEvent::FetchFailed(failure) => {
                println!("       failed {} ({})", failure.url, failure.error);
            }
            _ => {}
        }
    }
}

pub async fn run(cli: &Cli) -> Result<CrawlReport> {
    let mut file = JobFile::load(&cli.job)?;
    if let Some(max_hops) = cli.max_hops {
        file.max_hops = max_hops;
    }
    if let Some(concurrency) = cli.concurrency {
        file.concurrency = concurrency;
    }

    let base = cli.job.parent().unwrap_or_else(|| Path::new("."));
    let job = file.to_job(base)?;
    let store = FilePageStore::for_job(&job)
        .with_context(|| format!("cannot use storage root {}", job.storage_root.display()))?;
    let backend = ChromiumBackend::new(file.chromium_settings(cli.remote_debugging_url.clone()));
    let engine = CrawlEngine::new(file.crawl_settings());
    let progress = ConsoleProgress::default();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            crawl_warn!("Interrupt received, stopping crawl");
            on_interrupt.cancel();
        }
    });

    let storage_root = job.storage_root.clone();
    let result = engine
        .crawl_with_cancel(job, &backend, &store, &progress, cancel)
        .await;
    interrupt.abort();

    match result {
        Ok(report) => {
            if !cli.no_manifest {
                save_manifest(&storage_root, &report.records)?;
            }
            Ok(report)
        }
        Err(err) => {
            if !cli.no_manifest && !err.partial().is_empty() {
                save_manifest(&storage_root, err.partial())?;
            }
            Err(crawl_failed(err))
        }
    }
}

fn save_manifest(dir: &Path, records: &[PageRecord]) -> Result<()> {
    let path = write_manifest(dir, records)
        .with_context(|| format!("failed to write manifest into {}", dir.display()))?;
    crawl_info!("Wrote manifest for {} page(s) to {:?}", records.len(), path);
    Ok(())
}

fn crawl_failed(err: CrawlError) -> anyhow::Error {
    let saved = err.partial().len();
    if saved > 0 {
        anyhow::Error::new(err).context(format!("crawl stopped after saving {saved} page(s)"))
    } else {
        anyhow::Error::new(err)
    }
}

pub fn print_summary(report: &CrawlReport) {
    let total_bytes: u64 = report.records.iter().map(|r| r.size_bytes).sum();
    println!(
        "{} page(s) saved, {} bytes, {} failure(s){}",
        report.records.len(),
        total_bytes,
        report.failures.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
}
