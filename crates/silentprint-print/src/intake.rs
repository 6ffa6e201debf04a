// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job intake: turn a transport payload into a validated request.
//
// Pure.  Nothing is downloaded, copied, or logged to the job log before
// validation completes, so a rejected payload leaves no trace on disk.
//
// Existing front ends send `pdfUrl` / `printerName`; both spellings are
// accepted alongside the canonical `pdfSource` / `printerHint`.

use serde_json::{Map, Value};

use silentprint_core::error::{PrintError, Result};
use silentprint_core::types::{PrintJobRequest, PrinterCommand};

/// Keys read for the PDF source, in priority order.
pub const SOURCE_KEYS: [&str; 3] = ["pdfUrl", "PdfUrl", "pdfSource"];

/// Keys read for the printer hint, in priority order.
pub const PRINTER_KEYS: [&str; 2] = ["printerName", "printerHint"];

/// What a payload asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intake {
    Job(PrintJobRequest),
    ListPrinters(PrinterCommand),
}

/// Normalize an already-decoded JSON payload.
pub fn from_json_value(payload: &Value) -> Result<Intake> {
    let Some(object) = payload.as_object() else {
        return Err(PrintError::MissingField("pdfSource"));
    };

    if let Some(command) = object
        .get("method")
        .and_then(Value::as_str)
        .and_then(PrinterCommand::parse)
    {
        return Ok(Intake::ListPrinters(command));
    }

    let pdf_source = match first_source(object) {
        None => return Err(PrintError::MissingField("pdfSource")),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(PrintError::InvalidArgumentType {
                field: "pdfSource",
                expected: "a string",
            });
        }
    };

    let printer_hint = match first_present(object, &PRINTER_KEYS) {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            return Err(PrintError::InvalidArgumentType {
                field: "printerHint",
                expected: "a string or null",
            });
        }
    };

    Ok(Intake::Job(PrintJobRequest {
        pdf_source,
        printer_hint,
    }))
}

/// Normalize a raw socket text frame.
///
/// Frames are either a bare printer-list command or a JSON object, possibly
/// percent-encoded by the sending page.
pub fn from_socket_message(raw: &str) -> Result<Intake> {
    if let Some(command) = PrinterCommand::parse(raw) {
        return Ok(Intake::ListPrinters(command));
    }

    let decoded = urlencoding::decode(raw).map(|s| s.into_owned()).ok();
    if let Some(command) = decoded.as_deref().and_then(PrinterCommand::parse) {
        return Ok(Intake::ListPrinters(command));
    }

    let value = decoded
        .as_deref()
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .or_else(|| serde_json::from_str::<Value>(raw).ok())
        .ok_or_else(|| PrintError::MalformedMessage(preview(raw)))?;

    from_json_value(&value)
}

/// First key whose value is present and not `null`.
fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

/// First source alias carrying a value.  Empty strings count as absent so
/// a blank `pdfUrl` falls through to `PdfUrl` and `pdfSource`.
fn first_source(object: &Map<String, Value>) -> Option<&Value> {
    SOURCE_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null() && value.as_str() != Some(""))
}

fn preview(raw: &str) -> String {
    const MAX: usize = 80;
    match raw.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}…", &raw[..cut]),
        None => raw.to_owned(),
    }
}
