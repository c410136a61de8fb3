//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives a crawl run:
//! - Building every page address up front
//! - Feeding them to a fixed pool of worker tasks
//! - Retrying transient fetch failures
//! - Collecting per-page outcomes into the crawl report
//!
//! A failing page never stops its siblings; partial completion is the normal
//! outcome of a run.

use crate::config::{validate, Config, CrawlerConfig};
use crate::crawler::address::{PageAddress, PageTemplate};
use crate::crawler::extractor::{extract, ExtractMode};
use crate::crawler::fetcher::{FetchResult, HttpFetcher, PageFetcher};
use crate::output::{CrawlReport, ReportBuilder};
use crate::state::CrawlPhase;
use crate::storage::CategoryWriter;
use crate::{ErrorKind, PageError, SweepError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// One unit of work: a page and how to read it
#[derive(Debug, Clone)]
pub struct PageJob {
    pub address: PageAddress,
    pub mode: ExtractMode,
}

/// Pages of one configured source
#[derive(Debug, Clone)]
struct SourcePlan {
    template: PageTemplate,
    mode: ExtractMode,
    pages: u32,
    page_size: u32,
}

/// Worker pool and retry settings
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub deadline: Option<Duration>,
}

impl From<&CrawlerConfig> for CrawlSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            concurrency: config.concurrency as usize,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            deadline: config.deadline(),
        }
    }
}

/// Outcome of one page task
#[derive(Debug)]
struct PageOutcome {
    job: PageJob,
    items_skipped: usize,
    result: Result<usize, PageError>,
}

/// State shared by all workers of a run
struct WorkerContext<F> {
    fetcher: Arc<F>,
    writer: Arc<CategoryWriter>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<PageJob>>>,
    outcomes: mpsc::UnboundedSender<PageOutcome>,
    max_retries: u32,
    retry_delay: Duration,
    deadline: Option<Instant>,
}

impl<F> WorkerContext<F> {
    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Main crawler coordinator structure
///
/// The coordinator is consumed by [`Coordinator::run`]; its report is the
/// only thing left once the run is done.
pub struct Coordinator<F: PageFetcher + 'static> {
    settings: CrawlSettings,
    sources: Vec<SourcePlan>,
    fetcher: Arc<F>,
    writer: Arc<CategoryWriter>,
    phase: CrawlPhase,
}

impl Coordinator<HttpFetcher> {
    /// Creates a coordinator fetching over HTTP and writing into `output_dir`
    pub fn with_http(config: &Config, output_dir: impl Into<PathBuf>) -> Result<Self, SweepError> {
        validate(config)?;
        let fetcher = HttpFetcher::new(&config.headers, config.crawler.timeout())?;
        let writer = CategoryWriter::new(output_dir)?;
        Self::new(config, fetcher, writer)
    }
}

impl<F: PageFetcher + 'static> Coordinator<F> {
    /// Creates a new coordinator instance
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Configuration is valid, coordinator is idle
    /// * `Err(SweepError)` - Invalid configuration; nothing was dispatched
    pub fn new(config: &Config, fetcher: F, writer: CategoryWriter) -> Result<Self, SweepError> {
        validate(config)?;

        Ok(Self {
            settings: CrawlSettings::from(&config.crawler),
            sources: source_plans(config)?,
            fetcher: Arc::new(fetcher),
            writer: Arc::new(writer),
            phase: CrawlPhase::Idle,
        })
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn writer(&self) -> Arc<CategoryWriter> {
        self.writer.clone()
    }

    /// Every page the run will dispatch, in dispatch order
    pub fn plan(&self) -> Vec<PageJob> {
        expand(&self.sources)
    }

    fn transition(&mut self, to: CrawlPhase) -> Result<(), SweepError> {
        if !self.phase.can_transition_to(to) {
            return Err(SweepError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!("Crawl phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    /// Runs the crawl to completion and returns its report
    ///
    /// Individual page failures are counted in the report; only an internal
    /// phase error makes this return `Err`.
    pub async fn run(mut self) -> Result<CrawlReport, SweepError> {
        let mut report = ReportBuilder::start();

        self.transition(CrawlPhase::Dispatching)?;
        let jobs = self.plan();
        let total = jobs.len() as u64;
        let workers_count = self.settings.concurrency.max(1);
        tracing::info!(
            "Dispatching {} pages from {} sources to {} workers",
            total,
            self.sources.len(),
            workers_count
        );

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        for job in jobs {
            if job_tx.send(job).is_err() {
                break;
            }
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let deadline = self.settings.deadline.map(|d| Instant::now() + d);

        let mut workers = JoinSet::new();
        for worker_id in 0..workers_count {
            let context = WorkerContext {
                fetcher: self.fetcher.clone(),
                writer: self.writer.clone(),
                queue: queue.clone(),
                outcomes: outcome_tx.clone(),
                max_retries: self.settings.max_retries,
                retry_delay: self.settings.retry_delay,
                deadline,
            };
            workers.spawn(run_worker(worker_id, context));
        }
        drop(outcome_tx);

        self.transition(CrawlPhase::Awaiting)?;
        while let Some(outcome) = outcome_rx.recv().await {
            let address = &outcome.job.address;
            match outcome.result {
                Ok(written) => {
                    tracing::info!(
                        "Stored {} records from {} ({})",
                        written,
                        address.url,
                        address.category
                    );
                    report.record_success(outcome.items_skipped);
                }
                Err(e) => {
                    tracing::warn!(
                        category = %address.category,
                        url = %address.url,
                        kind = %e.kind(),
                        "Page failed: {}",
                        e
                    );
                    report.record_failure(&address.category, e.kind(), outcome.items_skipped);
                }
            }

            let done = report.pages_attempted();
            if done % 10 == 0 {
                tracing::info!("Progress: {} / {} pages", done, total);
            }
        }

        // A worker that panicked took its in-flight page down with it
        let mut failed_workers = 0u64;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
                failed_workers += 1;
            }
        }

        self.transition(CrawlPhase::Finalizing)?;
        let unaccounted = total.saturating_sub(report.pages_attempted());
        let lost = failed_workers.min(unaccounted);
        if lost > 0 {
            tracing::error!("{} in-flight pages were lost with their workers", lost);
            report.record_lost(lost);
        }

        let not_dispatched = unaccounted - lost;
        if not_dispatched > 0 {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::warn!(
                    "Deadline expired, {} pages were not dispatched",
                    not_dispatched
                );
            } else {
                tracing::warn!(
                    "All workers stopped early, {} pages were not dispatched",
                    not_dispatched
                );
            }
            report.record_not_dispatched(not_dispatched);
        }
        let writes = self.writer.flush().await;

        self.transition(CrawlPhase::Done)?;
        let report = report.finish(writes);
        tracing::info!(
            "Crawl finished: {} pages attempted, {} failed, {} records in {:?}",
            report.pages_attempted,
            report.pages_failed,
            report.total_records(),
            report.elapsed
        );

        Ok(report)
    }
}

fn source_plans(config: &Config) -> Result<Vec<SourcePlan>, SweepError> {
    config
        .sources
        .iter()
        .map(|source| -> Result<SourcePlan, SweepError> {
            Ok(SourcePlan {
                template: PageTemplate::from_source(source)?,
                mode: source.mode,
                pages: source.pages,
                page_size: source.page_size,
            })
        })
        .collect()
}

fn expand(sources: &[SourcePlan]) -> Vec<PageJob> {
    sources
        .iter()
        .flat_map(|source| {
            source
                .template
                .build(source.pages, source.page_size)
                .into_iter()
                .map(move |address| PageJob {
                    address,
                    mode: source.mode,
                })
        })
        .collect()
}

/// Lists the pages a configuration would dispatch, without side effects
pub fn plan_pages(config: &Config) -> Result<Vec<PageJob>, SweepError> {
    validate(config)?;
    Ok(expand(&source_plans(config)?))
}

async fn run_worker<F: PageFetcher>(worker_id: usize, context: WorkerContext<F>) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        if context.deadline_passed() {
            tracing::debug!("Worker {} stopping: deadline expired", worker_id);
            break;
        }

        let job = context.queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        let outcome = process_page(&context, job).await;
        if context.outcomes.send(outcome).is_err() {
            break;
        }
    }

    tracing::debug!("Worker {} finished", worker_id);
}

/// Fetch, extract, store
async fn process_page<F: PageFetcher>(context: &WorkerContext<F>, job: PageJob) -> PageOutcome {
    let url = job.address.url.clone();

    let payload = match fetch_with_retry(context, &job.address).await {
        FetchResult::Success { payload, status } => {
            tracing::debug!("Fetched {} (HTTP {}, {} bytes)", url, status, payload.len());
            payload
        }
        FetchResult::Failure {
            kind,
            detail,
            status,
        } => {
            return PageOutcome {
                job,
                items_skipped: 0,
                result: Err(fetch_failure(url, kind, detail, status)),
            };
        }
    };

    let extraction = match extract(&payload, job.mode) {
        Ok(extraction) => extraction,
        Err(e) => {
            return PageOutcome {
                job,
                items_skipped: 0,
                result: Err(PageError::Parse {
                    url,
                    message: e.to_string(),
                }),
            }
        }
    };

    if extraction.skipped > 0 {
        tracing::warn!(
            "Skipped {} malformed items on {}",
            extraction.skipped,
            url
        );
    }

    let result = context
        .writer
        .append(&job.address.category, extraction.records)
        .await
        .map_err(PageError::from);

    PageOutcome {
        job,
        items_skipped: extraction.skipped,
        result,
    }
}

/// Maps a failed fetch onto a page error of the same kind
fn fetch_failure(url: String, kind: ErrorKind, detail: String, status: Option<u16>) -> PageError {
    match (kind, status) {
        (ErrorKind::Network, _) => PageError::Network { url, detail },
        (ErrorKind::Http, Some(status)) => PageError::Http { url, status },
        (ErrorKind::Parse, _) => PageError::Parse {
            url,
            message: detail,
        },
        (ErrorKind::Http, None) | (ErrorKind::Io, _) => PageError::Fetch { url, kind, detail },
    }
}

async fn fetch_with_retry<F: PageFetcher>(
    context: &WorkerContext<F>,
    address: &PageAddress,
) -> FetchResult {
    let mut attempt = 0;
    loop {
        let result = context.fetcher.fetch(address).await;
        if !result.is_retryable() || attempt >= context.max_retries || context.deadline_passed() {
            return result;
        }

        attempt += 1;
        tracing::debug!(
            "Retrying {} ({}/{}) after {:?}",
            address.url,
            attempt,
            context.max_retries,
            result
        );
        tokio::time::sleep(context.retry_delay).await;
    }
}
