//! Append-only event log with a rotation policy
//!
//! Every accepted event becomes one line: `[<receive time>] <raw event>`.
//! Rotation happens inside [`EventLog::append`] under the same lock as the
//! write, so the check and the append can never interleave with another
//! connection's entry.

use crate::errors::{AppError, AppResult};
use crate::shared::config::{EventLogConfig, RotationStrategy};
use crate::shared::protocol::TIMESTAMP_FORMAT;
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// One persisted entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub received_at: DateTime<Local>,
    pub raw: String,
}

impl LogEntry {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            received_at: Local::now(),
            raw: raw.into(),
        }
    }

    /// Render as a single newline-terminated line
    pub fn render(&self) -> String {
        // a stray line break would split one entry into two
        let raw = self.raw.trim().replace(['\r', '\n'], " ");
        format!("[{}] {}\n", self.received_at.format(TIMESTAMP_FORMAT), raw)
    }
}

/// File-backed log bounded by size or line count
pub struct EventLog {
    path: PathBuf,
    strategy: RotationStrategy,
    max_bytes: u64,
    max_lines: usize,
    lock: Mutex<()>,
}

impl EventLog {
    /// Open (creating if needed) the log file described by `config`
    pub fn open(config: &EventLogConfig) -> AppResult<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io_with_source(parent, "create log directory", e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .map_err(|e| AppError::io_with_source(&config.path, "open event log", e))?;

        info!(
            "Event log at {} ({:?} rotation)",
            config.path.display(),
            config.strategy
        );

        Ok(Self {
            path: config.path.clone(),
            strategy: config.strategy,
            max_bytes: config.max_bytes,
            max_lines: config.max_lines.max(1),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotate if the policy demands it, then append `entry`
    pub fn append(&self, entry: &LogEntry) -> AppResult<()> {
        let line = entry.render();
        // a poisoned lock only means another append panicked; the file is still usable
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match self.strategy {
            RotationStrategy::Size => self.append_size_bounded(&line),
            RotationStrategy::Lines => self.append_line_bounded(&line),
        }
    }

    fn append_size_bounded(&self, line: &str) -> AppResult<()> {
        let current_size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(AppError::persistence_with_source(&self.path, "stat", e)),
        };

        let mut options = OpenOptions::new();
        options.create(true);
        if current_size >= self.max_bytes {
            debug!(
                "Event log reached {} bytes (limit {}), truncating",
                current_size, self.max_bytes
            );
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        let mut file = options
            .open(&self.path)
            .map_err(|e| AppError::persistence_with_source(&self.path, "open", e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| AppError::persistence_with_source(&self.path, "append entry", e))?;
        Ok(())
    }

    fn append_line_bounded(&self, line: &str) -> AppResult<()> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(AppError::persistence_with_source(&self.path, "read", e)),
        };

        let lines: Vec<&str> = existing.lines().collect();
        if lines.len() < self.max_lines {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| AppError::persistence_with_source(&self.path, "open", e))?;
            return file
                .write_all(line.as_bytes())
                .map_err(|e| AppError::persistence_with_source(&self.path, "append entry", e));
        }

        debug!(
            "Event log holds {} lines (limit {}), dropping oldest",
            lines.len(),
            self.max_lines
        );
        let keep_from = lines.len() - (self.max_lines - 1);
        let mut rewritten = String::with_capacity(existing.len());
        for kept in &lines[keep_from..] {
            rewritten.push_str(kept);
            rewritten.push('\n');
        }
        rewritten.push_str(line);

        fs::write(&self.path, rewritten)
            .map_err(|e| AppError::persistence_with_source(&self.path, "rewrite rotated log", e))
    }
}
