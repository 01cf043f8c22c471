//! Append-only JSON-lines journal.
//!
//! Each call to [`Journal::log`] appends one record to the journal file and mirrors
//! it to the console through `tracing`. Write failures are reported on the console
//! and otherwise ignored: the request being logged always proceeds.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    pub data: Option<Value>,
}

#[derive(Clone)]
pub struct Journal {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl Journal {
    /// The file and its directory are created lazily on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Journal {
            inner: Arc::new(Inner {
                path: path.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn info(&self, message: &str, data: Option<Value>) {
        self.log(Level::Info, message, data)
    }

    pub fn warn(&self, message: &str, data: Option<Value>) {
        self.log(Level::Warn, message, data)
    }

    pub fn error(&self, message: &str, data: Option<Value>) {
        self.log(Level::Error, message, data)
    }

    pub fn log(&self, level: Level, message: &str, data: Option<Value>) {
        let record = LogRecord {
            timestamp: timestamp(),
            level,
            message: message.to_string(),
            data,
        };

        mirror(&record);

        if let Err(err) = self.append(&record) {
            tracing::warn!(
                path = %self.inner.path.display(),
                "failed to write journal record: {}",
                err
            );
        }
    }

    fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut guard = self
            .inner
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if guard.is_none() {
            *guard = Some(open_append(&self.inner.path)?);
        }

        let result = match guard.as_mut() {
            Some(file) => file.write_all(line.as_bytes()),
            None => Ok(()),
        };
        if result.is_err() {
            // Reopen on the next record in case the file was moved or removed.
            *guard = None;
        }
        result
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn mirror(record: &LogRecord) {
    let pretty = record
        .data
        .as_ref()
        .and_then(|data| serde_json::to_string_pretty(data).ok());

    match (record.level, pretty) {
        (Level::Info, None) => tracing::info!("{}", record.message),
        (Level::Info, Some(data)) => tracing::info!("{}\n{}", record.message, data),
        (Level::Warn, None) => tracing::warn!("{}", record.message),
        (Level::Warn, Some(data)) => tracing::warn!("{}\n{}", record.message, data),
        (Level::Error, None) => tracing::error!("{}", record.message),
        (Level::Error, Some(data)) => tracing::error!("{}\n{}", record.message, data),
    }
}

/// Read every record back from a journal file.
///
/// The server itself only appends; this is for operator tooling and tests that
/// inspect the journal. Blank lines are skipped, a corrupt line is an
/// `InvalidData` error.
pub fn read_records(path: impl AsRef<Path>) -> std::io::Result<Vec<LogRecord>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(std::io::Error::from))
        .collect()
}
