// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing job log.
//
// Separate from `tracing`: these are the short human-readable lines an
// operator reads in the control panel ("打印成功：... -> Zebra ..."), not
// diagnostics.  The file is bounded to the most recent lines and starts empty
// on every launch.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tracing::{info, warn};

use silentprint_core::error::Result;

/// Destination for job log lines.
pub trait LogSink: Send + Sync {
    /// Record one line.  Never fails the caller.
    fn append(&self, line: &str);

    /// The most recent lines, oldest first.
    fn recent(&self) -> Vec<String>;

    /// Drop every recorded line.
    fn clear(&self);
}

/// Default number of lines kept in the log file.
pub const LOG_MAX_LINES: usize = 100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stamp(line: &str) -> String {
    format!("{} {line}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
}

/// A bounded log file plus an in-memory copy for the operator view.
pub struct FileLogSink {
    path: PathBuf,
    max_lines: usize,
    lines: Mutex<VecDeque<String>>,
}

impl FileLogSink {
    /// Create (truncating) the log file.
    pub fn create(path: impl AsRef<Path>, max_lines: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, b"")?;
        info!(path = %path.display(), max_lines, "job log cleared");
        Ok(Self {
            path,
            max_lines: max_lines.max(1),
            lines: Mutex::new(VecDeque::with_capacity(max_lines)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn append(&self, line: &str) {
        let mut lines = lock(&self.lines);
        lines.push_back(stamp(line));
        while lines.len() > self.max_lines {
            lines.pop_front();
        }

        // Written under the lock so concurrent jobs never interleave.
        self.write_out(&lines);
    }

    fn recent(&self) -> Vec<String> {
        lock(&self.lines).iter().cloned().collect()
    }

    fn clear(&self) {
        let mut lines = lock(&self.lines);
        lines.clear();
        self.write_out(&lines);
        info!(path = %self.path.display(), "job log cleared by operator");
    }
}

impl FileLogSink {
    fn write_out(&self, lines: &VecDeque<String>) {
        let mut contents = String::new();
        for line in lines {
            contents.push_str(line);
            contents.push('\n');
        }
        if let Err(e) = fs::write(&self.path, contents) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "job log write failed; check that the log directory is writable"
            );
        }
    }
}

/// Unbounded in-memory sink.
#[derive(Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.lines).iter().any(|line| line.contains(needle))
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, line: &str) {
        lock(&self.lines).push(stamp(line));
    }

    fn recent(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    fn clear(&self) {
        lock(&self.lines).clear();
    }
}
