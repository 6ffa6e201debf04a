// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Installed-printer enumeration.
//
// The operating system owns the printer list; this module only asks for it.
// Results are never cached: every job re-queries, because printers come and
// go between jobs.  Implementations are blocking and are called from the
// blocking thread pool.

use std::process::Command;

use tracing::{debug, warn};

use silentprint_core::config::PinnedPrinters;
use silentprint_core::error::{PrintError, Result};

/// Source of the live printer set and the system default.
pub trait PrinterEnumerator: Send + Sync {
    /// Names of all installed printers.
    fn list_printers(&self) -> Result<Vec<String>>;

    /// Name of the system default printer.
    fn default_printer(&self) -> Result<String>;
}

/// Asks the operating system's print subsystem.
///
/// Unix hosts go through CUPS (`lpstat`); Windows hosts through PowerShell's
/// print-management cmdlets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrinters;

impl PrinterEnumerator for SystemPrinters {
    fn list_printers(&self) -> Result<Vec<String>> {
        let printers = list_printers_native()?;
        debug!(count = printers.len(), "enumerated printers");
        Ok(printers)
    }

    fn default_printer(&self) -> Result<String> {
        default_printer_native()
    }
}

#[cfg(not(windows))]
fn list_printers_native() -> Result<Vec<String>> {
    let stdout = run_tool("lpstat", &["-e"])?;
    Ok(parse_lines(&stdout))
}

#[cfg(not(windows))]
fn default_printer_native() -> Result<String> {
    let stdout = run_tool("lpstat", &["-d"])?;
    parse_lpstat_default(&stdout)
        .ok_or_else(|| PrintError::Enumeration("no system default destination".into()))
}

#[cfg(windows)]
fn list_printers_native() -> Result<Vec<String>> {
    let stdout = run_tool(
        "powershell",
        &[
            "-NoProfile",
            "-Command",
            "Get-Printer | Select-Object -ExpandProperty Name",
        ],
    )?;
    Ok(parse_lines(&stdout))
}

#[cfg(windows)]
fn default_printer_native() -> Result<String> {
    let stdout = run_tool(
        "powershell",
        &[
            "-NoProfile",
            "-Command",
            "(Get-CimInstance -ClassName Win32_Printer -Filter 'Default=TRUE').Name",
        ],
    )?;
    parse_lines(&stdout)
        .into_iter()
        .next()
        .ok_or_else(|| PrintError::Enumeration("no default printer configured".into()))
}

/// Run an enumeration tool and return its stdout.
fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| PrintError::Enumeration(format!("{program}: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // lpstat exits non-zero with "No destinations added" on empty systems.
        if stdout.trim().is_empty() {
            warn!(program, status = %output.status, stderr = %stderr.trim(), "enumeration tool failed");
            return Err(PrintError::Enumeration(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
    }
    Ok(stdout)
}

/// One printer name per non-blank line.
fn parse_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `lpstat -d` output: `system default destination: NAME`.
#[cfg_attr(windows, allow(dead_code))]
fn parse_lpstat_default(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (_, name) = line.split_once("destination:")?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_owned())
    })
}

/// A fixed printer set.  Used when the config pins the list, and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPrinters {
    names: Vec<String>,
    default: Option<String>,
}

impl StaticPrinters {
    pub fn new<I, S>(names: I, default: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            default: default.map(String::from),
        }
    }
}

impl From<PinnedPrinters> for StaticPrinters {
    fn from(pinned: PinnedPrinters) -> Self {
        Self {
            names: pinned.names,
            default: pinned.default,
        }
    }
}

impl PrinterEnumerator for StaticPrinters {
    fn list_printers(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }

    fn default_printer(&self) -> Result<String> {
        self.default
            .clone()
            .ok_or_else(|| PrintError::Enumeration("no default printer configured".into()))
    }
}
