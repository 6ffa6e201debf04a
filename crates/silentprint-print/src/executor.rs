// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Drives the external PDF-to-printer converter.
//
// Contract: `<exe> <pdf path> <printer name> /s"100x150"`.  The printer name
// may be empty, in which case the converter prints to its own default.
// stdout and stderr are captured; the process gets a hard timeout and is
// killed when it expires.  There is no partial success: every run ends in
// exactly one of the outcomes produced by `classify_exit`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use silentprint_core::error::{PrintError, Result};
use silentprint_core::types::paper_size_flag;

use crate::admission::{AdmissionController, AdmissionTicket};

/// Builds the error for a stderr that matched a rule.
type StderrRule = (&'static str, fn(String) -> PrintError);

fn corrupt_input(stderr: String) -> PrintError {
    PrintError::CorruptInput { stderr }
}

/// Substrings (matched case-insensitively) that identify known converter
/// failures.  Checked in order; the first match wins.
pub const STDERR_RULES: &[StderrRule] = &[
    ("invalid", corrupt_input),
    ("corrupt", corrupt_input),
];

/// Classify a finished converter run.
///
/// | exit     | stderr                     | outcome            |
/// |----------|----------------------------|--------------------|
/// | 0        | blank                      | `Ok(stdout)`       |
/// | any      | matches a `STDERR_RULES`   | rule's error       |
/// | non-zero | blank                      | `NoDefaultPrinter` |
/// | any      | other non-blank text       | `ExecutionFailed`  |
pub fn classify_exit(success: bool, stdout: &str, stderr: &str) -> Result<String> {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        return if success {
            Ok(stdout.to_owned())
        } else {
            Err(PrintError::NoDefaultPrinter)
        };
    }

    let lowered = stderr.to_lowercase();
    for (needle, build) in STDERR_RULES {
        if lowered.contains(needle) {
            return Err(build(stderr.to_owned()));
        }
    }
    Err(PrintError::ExecutionFailed {
        stderr: stderr.to_owned(),
    })
}

/// The converter binary and its per-run time limit.
#[derive(Debug, Clone)]
pub struct PrintExecutor {
    exe: PathBuf,
    timeout: Duration,
}

impl PrintExecutor {
    pub fn new(exe: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            exe: exe.into(),
            timeout,
        }
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Print `pdf` on `printer`.  Returns the converter's stdout on success.
    ///
    /// Requires the job's admission ticket; `busy` is raised for the
    /// lifetime of the child process.
    #[instrument(skip_all, fields(pdf = %pdf.display(), printer = %printer))]
    pub async fn run(
        &self,
        admission: &AdmissionController,
        ticket: &AdmissionTicket,
        pdf: &Path,
        printer: &str,
    ) -> Result<String> {
        if !self.exe.is_file() {
            warn!(exe = %self.exe.display(), "print converter is missing");
            return Err(PrintError::MissingExecutable {
                path: self.exe.clone(),
            });
        }

        let _busy = admission.busy(ticket);

        let child = Command::new(&self.exe)
            .arg(pdf)
            .arg(printer)
            .arg(paper_size_flag())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PrintError::MissingExecutable {
                        path: self.exe.clone(),
                    }
                } else {
                    warn!(error = %e, "print converter could not be started");
                    PrintError::LaunchFailed(e)
                }
            })?;

        debug!(pid = ?child.id(), "print converter started");

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(PrintError::LaunchFailed)?,
            Err(_) => {
                warn!(secs = self.timeout.as_secs(), "print converter timed out, killed");
                return Err(PrintError::ExecutionTimeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let outcome = classify_exit(output.status.success(), &stdout, &stderr);
        match &outcome {
            Ok(_) => info!(status = %output.status, "print converter finished"),
            Err(e) => warn!(status = %output.status, error = %e, "print converter failed"),
        }
        outcome
    }
}
