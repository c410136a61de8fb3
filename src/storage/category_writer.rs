//! Per-category JSON store with serialized writers
//!
//! Appends to the same category queue on that category's async mutex; appends
//! to different categories run independently.

use crate::crawler::{BookRecord, QaRecord, Record};
use crate::storage::{StorageError, StorageResult, CATEGORY_SUFFIX};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LockResult, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

/// On-disk content of one category file
#[derive(Debug)]
enum StoredCategory {
    Listing(Vec<BookRecord>),
    Feed(BTreeMap<String, String>),
}

impl StoredCategory {
    fn shape(&self) -> &'static str {
        match self {
            Self::Listing(_) => "listing",
            Self::Feed(_) => "feed",
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Listing(books) => books.len(),
            Self::Feed(answers) => answers.len(),
        }
    }

    fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Listing(books) => serde_json::to_value(books),
            Self::Feed(answers) => serde_json::to_value(answers),
        }
    }

    fn into_records(self) -> Vec<Record> {
        match self {
            Self::Listing(books) => books.into_iter().map(Record::Book).collect(),
            Self::Feed(answers) => answers
                .into_iter()
                .map(|(question, answer)| Record::Qa(QaRecord { question, answer }))
                .collect(),
        }
    }
}

fn incoming_shape(records: &[Record]) -> Option<&'static str> {
    let books = records.iter().filter(|r| matches!(r, Record::Book(_))).count();
    match books {
        0 => Some("feed"),
        n if n == records.len() => Some("listing"),
        _ => None,
    }
}

/// Writes extracted records into `<directory>/<category>.json`
///
/// The writer is shared between all crawl workers behind an `Arc`. It is the
/// only component that touches category files.
#[derive(Debug)]
pub struct CategoryWriter {
    directory: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    totals: Mutex<WriteSummary>,
}

/// Per-category record counts of one writer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Records handed to `append`; a feed answer replacing an existing
    /// question still counts
    pub written: BTreeMap<String, u64>,

    /// Records in the category file after the last append
    pub stored: BTreeMap<String, u64>,
}

impl CategoryWriter {
    /// Creates a writer, creating the output directory if it is absent
    pub fn new(directory: impl Into<PathBuf>) -> StorageResult<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| StorageError::from_io(&directory, e))?;

        Ok(Self {
            directory,
            locks: Mutex::new(HashMap::new()),
            totals: Mutex::new(WriteSummary::default()),
        })
    }

    /// Path of the file holding a category
    pub fn path_for(&self, category: &str) -> PathBuf {
        self.directory.join(format!("{}{}", category, CATEGORY_SUFFIX))
    }

    fn lock_for(&self, category: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = recover(self.locks.lock());
        locks
            .entry(category.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Merges `records` into the category's stored sequence
    ///
    /// Returns the number of records appended by this call. An empty slice
    /// leaves the file untouched.
    pub async fn append(&self, category: &str, records: Vec<Record>) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let count = records.len();
        let lock = self.lock_for(category);
        let _guard = lock.lock().await;

        let path = self.path_for(category);
        let directory = self.directory.clone();
        let category_name = category.to_string();

        let total = tokio::task::spawn_blocking(move || {
            merge_and_replace(&directory, &path, &category_name, records)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;

        {
            let mut totals = recover(self.totals.lock());
            *totals.written.entry(category.to_string()).or_insert(0) += count as u64;
            totals.stored.insert(category.to_string(), total as u64);
        }

        tracing::debug!(
            category = category,
            appended = count,
            stored = total,
            "Category file updated"
        );

        Ok(count)
    }

    /// Loads every record stored for a category
    ///
    /// A category that was never written reads as empty.
    pub async fn read(&self, category: &str) -> StorageResult<Vec<Record>> {
        let lock = self.lock_for(category);
        let _guard = lock.lock().await;

        let path = self.path_for(category);
        tokio::task::spawn_blocking(move || -> StorageResult<Vec<Record>> {
            Ok(load(&path)?
                .map(StoredCategory::into_records)
                .unwrap_or_default())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Records appended and stored per category by this writer
    ///
    /// Waits for in-flight appends so that the snapshot reflects every
    /// completed write.
    pub async fn flush(&self) -> WriteSummary {
        let locks: Vec<_> = recover(self.locks.lock()).values().cloned().collect();
        for lock in locks {
            let _guard = lock.lock().await;
        }

        recover(self.totals.lock()).clone()
    }
}

fn recover<'a, T>(result: LockResult<MutexGuard<'a, T>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(PoisonError::into_inner)
}

fn load(path: &Path) -> StorageResult<Option<StoredCategory>> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::from_io(path, e)),
    };

    let serialization = |source: serde_json::Error| StorageError::Serialization {
        path: path.to_path_buf(),
        source,
    };

    let value: Value = serde_json::from_slice(&content).map_err(serialization)?;
    let stored = match value {
        Value::Array(_) => StoredCategory::Listing(serde_json::from_value(value).map_err(serialization)?),
        Value::Object(_) => StoredCategory::Feed(serde_json::from_value(value).map_err(serialization)?),
        other => {
            return Err(serialization(serde::de::Error::custom(format!(
                "expected array or object, found {}",
                other
            ))))
        }
    };

    Ok(Some(stored))
}

fn merge_and_replace(
    directory: &Path,
    path: &Path,
    category: &str,
    records: Vec<Record>,
) -> StorageResult<usize> {
    let incoming = incoming_shape(&records).ok_or_else(|| StorageError::ShapeMismatch {
        category: category.to_string(),
        stored: "single-kind",
        incoming: "mixed",
    })?;

    let mut stored = match load(path)? {
        Some(stored) => stored,
        None if incoming == "listing" => StoredCategory::Listing(Vec::new()),
        None => StoredCategory::Feed(BTreeMap::new()),
    };

    if stored.shape() != incoming {
        return Err(StorageError::ShapeMismatch {
            category: category.to_string(),
            stored: stored.shape(),
            incoming,
        });
    }

    match &mut stored {
        StoredCategory::Listing(books) => books.extend(records.into_iter().filter_map(|r| match r {
            Record::Book(book) => Some(book),
            Record::Qa(_) => None,
        })),
        StoredCategory::Feed(answers) => {
            for record in records {
                if let Record::Qa(qa) = record {
                    answers.insert(qa.question, qa.answer);
                }
            }
        }
    }

    let value = stored.to_value().map_err(|source| StorageError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomically(directory, path, &value)?;

    Ok(stored.len())
}

fn write_atomically(directory: &Path, path: &Path, value: &Value) -> StorageResult<()> {
    let mut temp = NamedTempFile::new_in(directory).map_err(|e| StorageError::from_io(directory, e))?;
    let temp_path = temp.path().to_path_buf();

    {
        let mut out = io::BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut out, value).map_err(|source| {
            StorageError::Serialization {
                path: temp_path.clone(),
                source,
            }
        })?;
        out.flush().map_err(|e| StorageError::from_io(&temp_path, e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| StorageError::from_io(&temp_path, e))?;

    temp.persist(path)
        .map_err(|e| StorageError::from_io(path, e.error))?;
    Ok(())
}
