//! Shelf-Sweep: a paginated listing harvester
//!
//! This crate fetches paginated listing pages (HTML book listings or JSON
//! question feeds), extracts structured records from them and merges the
//! records into one JSON file per category.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use std::fmt;
use thiserror::Error;

/// Main error type for Shelf-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These are the only fatal errors of a run: they are raised before any page
/// is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid header value for {name}: {message}")]
    InvalidHeader { name: String, message: String },
}

/// Classification of a single page failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Connection refused, DNS failure, timeout, truncated body
    Network,
    /// Non-2xx HTTP status
    Http,
    /// Payload did not match the expected HTML/JSON shape
    Parse,
    /// Persisting the extracted records failed
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Http => "http",
            Self::Parse => "parse",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one page task
///
/// Page errors never abort a crawl; the coordinator counts them in the
/// report and moves on.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Network error for {url}: {detail}")]
    Network { url: String, detail: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Failed to store records: {0}")]
    Io(#[from] storage::StorageError),

    /// Fetch failure without a more specific variant, such as an `Io`
    /// failure reported by a custom fetcher
    #[error("{kind} failure for {url}: {detail}")]
    Fetch {
        url: String,
        kind: ErrorKind,
        detail: String,
    },
}

impl PageError {
    /// Returns the error class used for report counters
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Http { .. } => ErrorKind::Http,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Io(_) => ErrorKind::Io,
            Self::Fetch { kind, .. } => *kind,
        }
    }
}

/// Result type alias for Shelf-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{BookRecord, ExtractMode, PageAddress, QaRecord, Record};
pub use output::CrawlReport;
pub use state::CrawlPhase;
pub use storage::CategoryWriter;
