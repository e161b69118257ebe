use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::job::{CrawlJob, VisitPolicy};
use crate::normalize::normalize_url;
use crate::record::FrontierEntry;
use crate::scope::{is_allowed_with, SuffixMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyVisited,
    DepthExceeded,
}

/// Result of popping the front of the frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    /// Claimed for fetching; must be settled with `record_success` or `record_failure`.
    Ready(FrontierEntry),
    /// Same URL is being fetched right now. Held back until that fetch settles:
    /// re-queued on failure, dropped on success.
    Parked(FrontierEntry),
    Skipped {
        entry: FrontierEntry,
        reason: SkipReason,
    },
}

/// Frontier, visited set and in-flight claims for a single crawl run.
///
/// Pure and single-owner: the engine's coordinator is the only mutator, so the
/// visited check and the claim in [`CrawlState::dequeue`] happen in one step.
#[derive(Debug, Clone)]
pub struct CrawlState {
    frontier: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
    in_flight: HashSet<String>,
    parked: HashMap<String, Vec<FrontierEntry>>,
    max_hops: u32,
    allowed_domains: BTreeSet<String>,
    suffix_match: SuffixMatch,
    visit_policy: VisitPolicy,
}

impl CrawlState {
    /// Seed the frontier with the job's normalized starter URLs at depth 0, in order.
    pub fn new(job: &CrawlJob) -> Self {
        let frontier = job
            .starter_urls
            .iter()
            .map(|url| FrontierEntry {
                url: normalize_url(url),
                depth: 0,
            })
            .collect();
        Self {
            frontier,
            visited: HashSet::new(),
            in_flight: HashSet::new(),
            parked: HashMap::new(),
            max_hops: job.max_hops,
            allowed_domains: job.allowed_domains.clone(),
            suffix_match: job.suffix_match,
            visit_policy: job.visit_policy,
        }
    }

    pub fn dequeue(&mut self) -> Option<Dequeued> {
        let mut entry = self.frontier.pop_front()?;
        entry.url = normalize_url(&entry.url);

        let reason = if self.visited.contains(&entry.url) {
            Some(SkipReason::AlreadyVisited)
        } else if entry.depth > self.max_hops {
            Some(SkipReason::DepthExceeded)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Some(Dequeued::Skipped { entry, reason });
        }
        if self.in_flight.contains(&entry.url) {
            self.parked
                .entry(entry.url.clone())
                .or_default()
                .push(entry.clone());
            return Some(Dequeued::Parked(entry));
        }

        self.in_flight.insert(entry.url.clone());
        if self.visit_policy == VisitPolicy::OnAttempt {
            self.visited.insert(entry.url.clone());
        }
        Some(Dequeued::Ready(entry))
    }

    /// Settle a claim whose fetch succeeded: the URL becomes visited.
    ///
    /// Returns the entries parked behind this fetch; they are now redundant.
    pub fn record_success(&mut self, url: &str) -> Vec<FrontierEntry> {
        self.in_flight.remove(url);
        self.visited.insert(url.to_string());
        self.parked.remove(url).unwrap_or_default()
    }

    /// Settle a claim whose fetch failed. Under `OnSuccess` the URL stays
    /// eligible and entries parked behind this fetch go back to the front of
    /// the frontier in their original order. Returns how many were re-queued.
    pub fn record_failure(&mut self, url: &str) -> usize {
        self.in_flight.remove(url);
        let Some(parked) = self.parked.remove(url) else {
            return 0;
        };
        let count = parked.len();
        for entry in parked.into_iter().rev() {
            self.frontier.push_front(entry);
        }
        count
    }

    /// Normalize, scope-filter and enqueue absolute links found on a page at
    /// `parent_depth`. Returns how many entries were appended.
    pub fn enqueue_links<I, S>(&mut self, parent_depth: u32, links: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let depth = parent_depth.saturating_add(1);
        let mut added = 0;
        for link in links {
            let url = normalize_url(link.as_ref());
            if !is_allowed_with(&url, &self.allowed_domains, self.suffix_match) {
                continue;
            }
            if self.visited.contains(&url) {
                continue;
            }
            self.frontier.push_back(FrontierEntry { url, depth });
            added += 1;
        }
        added
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(&normalize_url(url))
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn pending(&self) -> usize {
        self.frontier.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn parked(&self) -> usize {
        self.parked.values().map(Vec::len).sum()
    }

    pub fn frontier_is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Nothing queued and nothing claimed.
    pub fn is_done(&self) -> bool {
        self.frontier.is_empty() && self.in_flight.is_empty()
    }
}
