use crate::crawler::ExtractMode;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Shelf-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub headers: HeaderProfile,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of workers fetching pages in parallel
    pub concurrency: u32,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for network failures and retryable HTTP statuses
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Global deadline for the whole crawl (seconds)
    #[serde(rename = "deadline-secs", default)]
    pub deadline_secs: Option<u64>,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Request headers sent with every page fetch
///
/// Values are forwarded verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderProfile {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(default)]
    pub referer: String,

    #[serde(default)]
    pub cookie: Option<String>,

    /// Sends `Connection: keep-alive` and keeps pooled connections
    #[serde(rename = "keep-alive", default)]
    pub keep_alive: bool,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Directory holding one JSON file per category
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// One paginated listing to harvest
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub mode: ExtractMode,

    /// First page URL, without pagination parameters
    pub base: String,

    /// Category name; derived from the base URL when absent
    #[serde(default)]
    pub category: Option<String>,

    /// Number of pages to fetch
    pub pages: u32,

    /// Items per page, used as the offset step
    #[serde(rename = "page-size")]
    pub page_size: u32,

    #[serde(rename = "offset-param", default)]
    pub offset_param: Option<String>,

    #[serde(rename = "limit-param", default)]
    pub limit_param: Option<String>,
}

impl SourceConfig {
    /// Query key carrying the page offset
    pub fn offset_param(&self) -> &str {
        match (&self.offset_param, self.mode) {
            (Some(param), _) => param,
            (None, ExtractMode::HtmlListing) => "start",
            (None, ExtractMode::JsonFeed) => "offset",
        }
    }

    /// Query key carrying the page size, if the source expects one
    pub fn limit_param(&self) -> Option<&str> {
        match (&self.limit_param, self.mode) {
            (Some(param), _) => Some(param),
            (None, ExtractMode::HtmlListing) => None,
            (None, ExtractMode::JsonFeed) => Some("limit"),
        }
    }
}
