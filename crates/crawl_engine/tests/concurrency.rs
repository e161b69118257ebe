mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{init_logging, FakePage, FakeSite, LimitedStore, TestSink};
use crawl_engine::{CrawlEngine, CrawlEvent, CrawlJob, CrawlSettings, NullSink, SkipReason};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ROOT: &str = "https://example.com/";

/// A root linking to `width` children, each linking back to the root and to
/// every sibling.
fn fan_out_site(width: usize, delay: Duration) -> FakeSite {
    let children: Vec<String> = (0..width).map(|i| format!("/p{i}")).collect();
    let child_refs: Vec<&str> = children.iter().map(String::as_str).collect();

    let mut site = FakeSite::new().page(ROOT, FakePage::ok("root", &child_refs));
    for child in &children {
        let mut links = child_refs.clone();
        links.push("/");
        site = site.page(
            &format!("https://example.com{child}"),
            FakePage::ok(child, &links).with_delay(delay),
        );
    }
    site
}

fn engine(concurrency: usize) -> CrawlEngine {
    CrawlEngine::new(CrawlSettings {
        concurrency,
        ..CrawlSettings::default()
    })
}

fn job(max_hops: u32, root: &TempDir) -> CrawlJob {
    CrawlJob::new([ROOT], max_hops, ["example.com"], root.path())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetches_overlap_up_to_the_limit() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let site = fan_out_site(8, Duration::from_millis(30));
    let store = LimitedStore::new(usize::MAX);

    let report = engine(3)
        .crawl(job(1, &temp), &site, &store, &NullSink)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 9);
    assert!(site.peak_concurrency() <= 3, "peak {}", site.peak_concurrency());
    assert!(site.peak_concurrency() > 1);
}

#[tokio::test]
async fn concurrent_crawl_fetches_each_url_once() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let site = fan_out_site(6, Duration::from_millis(5));
    let store = LimitedStore::new(usize::MAX);
    let sink = TestSink::new();

    let report = engine(4)
        .crawl(job(3, &temp), &site, &store, &sink)
        .await
        .unwrap();

    let visits = site.visits();
    let unique: HashSet<&String> = visits.iter().collect();
    assert_eq!(unique.len(), visits.len(), "duplicate fetch in {visits:?}");
    assert_eq!(report.records.len(), 7);
    assert!(report.failures.is_empty());

    let saved: HashSet<String> = sink
        .take()
        .into_iter()
        .filter_map(|event| match event {
            CrawlEvent::PageSaved(record) => Some(record.source_url),
            _ => None,
        })
        .collect();
    assert_eq!(saved.len(), 7);
}

#[tokio::test]
async fn depth_ceiling_holds_under_concurrency() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let site = FakeSite::new()
        .page(ROOT, FakePage::ok("0", &["/one-a", "/one-b"]))
        .page("https://example.com/one-a", FakePage::ok("1a", &["/two"]))
        .page("https://example.com/one-b", FakePage::ok("1b", &["/two"]))
        .page("https://example.com/two", FakePage::ok("2", &[]));
    let store = LimitedStore::new(usize::MAX);

    let report = engine(4)
        .crawl(job(1, &temp), &site, &store, &NullSink)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 3);
    assert!(!site.visits().iter().any(|url| url.ends_with("/two")));
}

#[tokio::test]
async fn cancellation_returns_partial_report_and_releases_session() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let site = fan_out_site(4, Duration::from_secs(5));
    let store = LimitedStore::new(usize::MAX);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let report = engine(2)
        .crawl_with_cancel(job(2, &temp), &site, &store, &NullSink, cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].source_url, ROOT);
    assert!(site.released());
    assert_eq!(site.open_pages(), 0);
}

#[tokio::test]
async fn cancelled_before_start_fetches_nothing() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let site = fan_out_site(2, Duration::ZERO);
    let store = LimitedStore::new(usize::MAX);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = engine(1)
        .crawl_with_cancel(job(1, &temp), &site, &store, &NullSink, cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.records.is_empty());
    assert_eq!(site.acquired(), 0);
    assert!(site.visits().is_empty());
}

#[tokio::test]
async fn cancellation_does_not_wait_for_a_slow_browser_launch() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let site = fan_out_site(2, Duration::ZERO).slow_acquire(Duration::from_secs(30));
    let store = LimitedStore::new(usize::MAX);
    let sink = TestSink::new();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        engine(2).crawl_with_cancel(job(1, &temp), &site, &store, &sink, cancel),
    )
    .await
    .expect("cancel should interrupt session acquisition")
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(site.acquired(), 0);
    assert_eq!(
        sink.take(),
        vec![CrawlEvent::Finished {
            pages: 0,
            failures: 0,
            cancelled: true
        }]
    );
}

#[tokio::test]
async fn url_rediscovered_while_its_fetch_runs_is_retried_after_failure() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let flaky = "https://example.com/flaky";
    let b = "https://example.com/b";
    let site = FakeSite::new()
        .page(
            flaky,
            FakePage::ok("flaky", &[])
                .flaky(1)
                .with_delay(Duration::from_millis(200)),
        )
        .page(b, FakePage::ok("b", &["/flaky"]));
    let store = LimitedStore::new(usize::MAX);
    let job = CrawlJob::new([flaky, b], 1, ["example.com"], temp.path());

    let report = engine(2)
        .crawl(job, &site, &store, &NullSink)
        .await
        .unwrap();

    let saved: Vec<&str> = report.records.iter().map(|r| r.source_url.as_str()).collect();
    assert_eq!(saved, vec![b, flaky]);
    assert_eq!(
        site.visits(),
        vec![flaky.to_string(), b.to_string(), flaky.to_string()]
    );
    assert_eq!(report.failures.len(), 1);
}

#[tokio::test]
async fn duplicate_held_behind_a_successful_fetch_is_not_refetched() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let slow = "https://example.com/slow";
    let b = "https://example.com/b";
    let site = FakeSite::new()
        .page(
            slow,
            FakePage::ok("slow", &[]).with_delay(Duration::from_millis(100)),
        )
        .page(b, FakePage::ok("b", &["/slow"]));
    let store = LimitedStore::new(usize::MAX);
    let sink = TestSink::new();
    let job = CrawlJob::new([slow, b], 1, ["example.com"], temp.path());

    let report = engine(2).crawl(job, &site, &store, &sink).await.unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(site.visits(), vec![slow.to_string(), b.to_string()]);
    assert!(sink.take().iter().any(|event| matches!(
        event,
        CrawlEvent::Skipped { url, depth: 1, reason: SkipReason::AlreadyVisited } if url == slow
    )));
}
