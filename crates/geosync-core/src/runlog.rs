//! Run log.
//!
//! Each line is `MM-DD-YYYY hh:mm:ss AM/PM: message`, written and flushed
//! immediately so a crashed run still leaves its trail. Every line is also
//! forwarded to the `log` facade.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDateTime};
use log::{Level, log};
use serde::Deserialize;

use crate::error::{IoResultExt, Result, SyncError};

const TIMESTAMP_FORMAT: &str = "%m-%d-%Y %I:%M:%S %p";

/// `log` target that run log lines are forwarded under.
pub const RUN_TARGET: &str = "geosync::run";

/// How an existing log file is treated when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Start a fresh file each run.
    #[default]
    Overwrite,
    /// Keep history across runs.
    Append,
}

/// Formats one log line.
#[must_use]
pub fn format_line(timestamp: NaiveDateTime, message: &str) -> String {
    format!("{}: {message}", timestamp.format(TIMESTAMP_FORMAT))
}

/// In-memory log target, mostly for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    /// Lines written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let bytes = match self.bytes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Append-only log for one pipeline run.
pub struct RunLog {
    path: PathBuf,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog").field("path", &self.path).finish()
    }
}

impl RunLog {
    /// Opens the log file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, mode: LogMode) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            LogMode::Overwrite => options.write(true).truncate(true),
            LogMode::Append => options.append(true),
        };
        let file = options.open(path).with_path(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            sink: Mutex::new(Box::new(file)),
        })
    }

    /// Log that writes into memory; read it back through the returned buffer.
    #[must_use]
    pub fn in_memory() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let log = Self {
            path: PathBuf::from("<memory>"),
            sink: Mutex::new(Box::new(buffer.clone())),
        };
        (log, buffer)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes an informational line.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] when the line cannot be written.
    pub fn info(&self, message: impl AsRef<str>) -> Result<()> {
        self.write(Level::Info, message.as_ref())
    }

    /// Writes a warning line.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] when the line cannot be written.
    pub fn warn(&self, message: impl AsRef<str>) -> Result<()> {
        self.write(Level::Warn, message.as_ref())
    }

    /// Writes an error line.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] when the line cannot be written.
    pub fn error(&self, message: impl AsRef<str>) -> Result<()> {
        self.write(Level::Error, message.as_ref())
    }

    fn write(&self, level: Level, message: &str) -> Result<()> {
        log!(target: RUN_TARGET, level, "{message}");
        let line = format_line(Local::now().naive_local(), message);
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| SyncError::io(&self.path, io::Error::other("run log poisoned")))?;
        writeln!(sink, "{line}")
            .and_then(|()| sink.flush())
            .with_path(&self.path)
    }
}

/// Timestamp of the run start, as written in the first log line.
#[must_use]
pub fn started_banner(started: DateTime<Local>, pipeline: &str) -> String {
    format!(
        "Pipeline '{pipeline}' started {}",
        started.format("%A, %B %-d, %Y")
    )
}
