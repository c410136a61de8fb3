//! Crawl report built while a run progresses
//!
//! The coordinator feeds a [`ReportBuilder`] with one outcome per page task
//! and turns it into an immutable [`CrawlReport`] when the run finishes.

use crate::storage::WriteSummary;
use crate::ErrorKind;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Summary of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,

    /// Pages handed to a worker
    pub pages_attempted: u64,

    /// Attempted pages whose task failed at any stage
    pub pages_failed: u64,

    /// Pages never dispatched, because the deadline expired or every
    /// worker stopped
    pub pages_skipped: u64,

    /// Malformed source items dropped during extraction
    pub items_skipped: u64,

    /// Records appended during this run; feed answers that replace an
    /// existing question are included
    pub records_written_per_category: BTreeMap<String, u64>,

    /// Records held in each category file at the end of the run
    pub records_stored_per_category: BTreeMap<String, u64>,

    pub failures_per_category: BTreeMap<String, u64>,
    pub failures_by_kind: BTreeMap<ErrorKind, u64>,
}

impl CrawlReport {
    pub fn pages_succeeded(&self) -> u64 {
        self.pages_attempted - self.pages_failed
    }

    pub fn total_records(&self) -> u64 {
        self.records_written_per_category.values().sum()
    }

    /// True when some page failed or was never dispatched
    pub fn is_partial(&self) -> bool {
        self.pages_failed > 0 || self.pages_skipped > 0
    }
}

/// Mutable accumulator behind a [`CrawlReport`]
#[derive(Debug)]
pub struct ReportBuilder {
    started_at: DateTime<Utc>,
    started: Instant,
    pages_attempted: u64,
    pages_failed: u64,
    pages_skipped: u64,
    items_skipped: u64,
    failures_per_category: BTreeMap<String, u64>,
    failures_by_kind: BTreeMap<ErrorKind, u64>,
}

impl ReportBuilder {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            pages_attempted: 0,
            pages_failed: 0,
            pages_skipped: 0,
            items_skipped: 0,
            failures_per_category: BTreeMap::new(),
            failures_by_kind: BTreeMap::new(),
        }
    }

    pub fn record_success(&mut self, items_skipped: usize) {
        self.pages_attempted += 1;
        self.items_skipped += items_skipped as u64;
    }

    pub fn record_failure(&mut self, category: &str, kind: ErrorKind, items_skipped: usize) {
        self.pages_attempted += 1;
        self.pages_failed += 1;
        self.items_skipped += items_skipped as u64;
        *self
            .failures_per_category
            .entry(category.to_string())
            .or_insert(0) += 1;
        *self.failures_by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Pages whose worker died before reporting an outcome
    ///
    /// They count as attempted and failed; no category or kind is known.
    pub fn record_lost(&mut self, pages: u64) {
        self.pages_attempted += pages;
        self.pages_failed += pages;
    }

    pub fn record_not_dispatched(&mut self, pages: u64) {
        self.pages_skipped += pages;
    }

    pub fn pages_attempted(&self) -> u64 {
        self.pages_attempted
    }

    pub fn finish(self, writes: WriteSummary) -> CrawlReport {
        CrawlReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed: self.started.elapsed(),
            pages_attempted: self.pages_attempted,
            pages_failed: self.pages_failed,
            pages_skipped: self.pages_skipped,
            items_skipped: self.items_skipped,
            records_written_per_category: writes.written,
            records_stored_per_category: writes.stored,
            failures_per_category: self.failures_per_category,
            failures_by_kind: self.failures_by_kind,
        }
    }
}

/// Prints a report to stdout in a formatted manner
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report ===\n");

    println!("Overview:");
    println!("  Started: {}", report.started_at.to_rfc3339());
    println!("  Finished: {}", report.finished_at.to_rfc3339());
    println!("  Elapsed: {:.2}s", report.elapsed.as_secs_f64());
    println!("  Pages attempted: {}", report.pages_attempted);
    println!("  Pages failed: {}", report.pages_failed);
    if report.pages_skipped > 0 {
        println!("  Pages not dispatched: {}", report.pages_skipped);
    }
    if report.items_skipped > 0 {
        println!("  Malformed items skipped: {}", report.items_skipped);
    }
    println!();

    println!("Records Written:");
    if report.records_written_per_category.is_empty() {
        println!("  (none)");
    }
    for (category, written) in &report.records_written_per_category {
        match report.records_stored_per_category.get(category) {
            Some(stored) => println!("  {}: {} written, {} stored", category, written, stored),
            None => println!("  {}: {} written", category, written),
        }
    }
    println!();

    if !report.failures_per_category.is_empty() {
        println!("Failures by Category:");
        for (category, count) in &report.failures_per_category {
            println!("  {}: {}", category, count);
        }
        println!();

        println!("Failures by Kind:");
        let mut kinds: Vec<_> = report.failures_by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in kinds {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    let success_rate = if report.pages_attempted > 0 {
        (report.pages_succeeded() as f64 / report.pages_attempted as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} pages)",
        success_rate,
        report.pages_succeeded(),
        report.pages_attempted
    );
}
