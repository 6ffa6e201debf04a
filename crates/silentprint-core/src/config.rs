// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, Result};

/// File name of the converter looked up next to the service binary.
pub const DEFAULT_CONVERTER_NAME: &str = "PDFtoPrinter.exe";

/// Persistent service settings, stored as `config.json` in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address both listeners bind to. Loopback keeps the service local.
    pub bind_addr: String,
    /// Port for the HTTP endpoint (`POST /print`).
    pub http_port: u16,
    /// Port for the WebSocket channel; pages connect to `ws://localhost:<port>`.
    pub ws_port: u16,
    /// Cache directory; `None` means `<data dir>/pdf_cache`.
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of PDFs retained in the cache.
    pub max_cache: usize,
    /// Converter executable; `None` means `PDFtoPrinter.exe` beside the binary.
    pub converter_path: Option<PathBuf>,
    /// Hard limit on a single converter run.
    pub exec_timeout_secs: u64,
    /// Limit on fetching a remote PDF.
    pub download_timeout_secs: u64,
    /// Job log file; `None` means `<data dir>/print.log`.
    pub log_file: Option<PathBuf>,
    /// Number of lines the job log file keeps.
    pub log_max_lines: usize,
    /// Run cache eviction after downloads too, not only after local copies.
    pub evict_after_download: bool,
    /// Pin the printer list instead of asking the operating system.
    pub printers: Option<PinnedPrinters>,
}

/// A fixed printer set, for hosts without a usable enumeration tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedPrinters {
    pub names: Vec<String>,
    pub default: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            http_port: 12345,
            ws_port: 12346,
            cache_dir: None,
            max_cache: 5,
            converter_path: None,
            exec_timeout_secs: 60,
            download_timeout_secs: 30,
            log_file: None,
            log_max_lines: 100,
            evict_after_download: true,
            printers: None,
        }
    }
}

impl ServiceConfig {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_cache == 0 {
            return Err(PrintError::Internal("max_cache must be at least 1".into()));
        }
        if self.exec_timeout_secs == 0 || self.download_timeout_secs == 0 {
            return Err(PrintError::Internal("timeouts must be non-zero".into()));
        }
        if self.http_port == self.ws_port {
            return Err(PrintError::Internal(format!(
                "http_port and ws_port are both {}",
                self.http_port
            )));
        }
        Ok(())
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn cache_dir_in(&self, data_dir: &Path) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("pdf_cache"))
    }

    pub fn log_file_in(&self, data_dir: &Path) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| data_dir.join("print.log"))
    }

    /// Converter location: explicit setting, else beside the running binary.
    pub fn converter_path(&self) -> PathBuf {
        if let Some(path) = &self.converter_path {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default()
            .join(DEFAULT_CONVERTER_NAME)
    }
}
