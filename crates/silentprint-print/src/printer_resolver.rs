// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Turns a client's printer hint into the name handed to the converter.
//
// Resolution order:
//   1. no hint                          -> system default
//   2. blank hint                       -> system default
//   3. hint that is really a paper-size
//      flag (`/papersize=`, `/s=`)      -> warn, discard, system default
//   4. anything else                    -> literal name, must be installed
//
// When the system default cannot be determined the name is left empty and
// the converter picks a printer itself.

use tracing::{info, warn};

use silentprint_core::error::{PrintError, Result};
use silentprint_core::types::{PrinterOrigin, ResolvedPrinter};

use crate::printers::PrinterEnumerator;

/// Prefixes that mark a paper-size argument sent in the printer field.
pub const PAPER_SIZE_FLAG_PREFIXES: [&str; 2] = ["/papersize=", "/s="];

/// Whether a hint is a misplaced paper-size flag (case-insensitive).
pub fn is_paper_size_flag(hint: &str) -> bool {
    let lower = hint.to_lowercase();
    PAPER_SIZE_FLAG_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Resolve the effective printer for one job.
pub fn resolve_printer(
    hint: Option<&str>,
    printers: &dyn PrinterEnumerator,
) -> Result<ResolvedPrinter> {
    let Some(hint) = hint.map(str::trim) else {
        return Ok(system_default(printers, "no printer requested"));
    };

    if hint.is_empty() {
        return Ok(system_default(printers, "blank printer requested"));
    }

    if is_paper_size_flag(hint) {
        warn!(hint = ?hint, "client sent a paper-size flag as the printer name, ignoring it");
        return Ok(system_default(printers, "paper-size flag discarded"));
    }

    let installed = printers.list_printers()?;
    if !installed.iter().any(|name| name == hint) {
        warn!(printer = %hint, installed = installed.len(), "requested printer is not installed");
        return Err(PrintError::UnknownPrinter(hint.to_owned()));
    }

    Ok(ResolvedPrinter {
        name: hint.to_owned(),
        origin: PrinterOrigin::Requested,
    })
}

fn system_default(printers: &dyn PrinterEnumerator, reason: &str) -> ResolvedPrinter {
    match printers.default_printer() {
        Ok(name) => {
            info!(printer = ?name, reason, "using system default printer");
            ResolvedPrinter {
                name,
                origin: PrinterOrigin::SystemDefault,
            }
        }
        Err(e) => {
            warn!(error = %e, reason, "no system default printer, leaving the choice to the converter");
            ResolvedPrinter {
                name: String::new(),
                origin: PrinterOrigin::ToolDefault,
            }
        }
    }
}
