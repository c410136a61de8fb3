//! Storage module for persisting extracted records
//!
//! Records are kept in one JSON file per category inside the output
//! directory:
//! - listing categories hold a JSON array of book objects
//! - feed categories hold a JSON object mapping question text to answer
//!
//! Every append rewrites the whole file through a temporary file and an
//! atomic rename, so a reader never observes a half-written document.

mod category_writer;

pub use category_writer::{CategoryWriter, WriteSummary};

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name suffix of every category file
pub const CATEGORY_SUFFIX: &str = ".json";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Permission denied for {}", .path.display())]
    PermissionDenied { path: PathBuf, source: io::Error },

    #[error("Disk full while writing {}", .path.display())]
    DiskFull { path: PathBuf, source: io::Error },

    #[error("IO error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Malformed category file {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Category '{category}' stores {stored} records and cannot take {incoming} records")]
    ShapeMismatch {
        category: String,
        stored: &'static str,
        incoming: &'static str,
    },

    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(unix)]
const ENOSPC: i32 = 28;
#[cfg(windows)]
const ENOSPC: i32 = 112; // ERROR_DISK_FULL
#[cfg(not(any(unix, windows)))]
const ENOSPC: i32 = -1;

impl StorageError {
    /// Wraps an IO error, keeping permission and disk-full failures distinct
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path, source }
        } else if source.raw_os_error() == Some(ENOSPC) {
            Self::DiskFull { path, source }
        } else {
            Self::Io { path, source }
        }
    }
}
