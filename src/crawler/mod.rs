//! Crawler module for paginated listing harvesting
//!
//! This module contains the fetch-parse-persist pipeline:
//! - Page address generation for paginated listings
//! - HTTP fetching with a fixed header profile
//! - Record extraction from HTML listings and JSON feeds
//! - Overall crawl coordination over a bounded worker pool

mod address;
mod coordinator;
mod extractor;
mod fetcher;

pub use address::{PageAddress, PageTemplate};
pub use coordinator::{plan_pages, Coordinator, CrawlSettings, PageJob};
pub use extractor::{extract, BookRecord, ExtractError, ExtractMode, Extraction, QaRecord, Record};
pub use fetcher::{build_headers, build_http_client, fetch_url, FetchResult, HttpFetcher, PageFetcher};

use crate::config::Config;
use crate::output::CrawlReport;
use crate::SweepError;
use std::path::PathBuf;

/// Runs a complete crawl operation over HTTP
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Validate the configuration
/// 2. Build the HTTP client and category writer
/// 3. Fetch, extract and store every page on the worker pool
/// 4. Return the crawl report
pub async fn crawl(config: &Config, output_dir: impl Into<PathBuf>) -> Result<CrawlReport, SweepError> {
    Coordinator::with_http(config, output_dir)?.run().await
}
