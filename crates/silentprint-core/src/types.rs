// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the silentprint service.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Paper size forced on every job (width x height, millimetres).
pub const LABEL_PAPER_SIZE: &str = "100x150";

/// Flag prefix understood by the converter for the paper size.
pub const PAPER_SIZE_FLAG_PREFIX: &str = "/s";

/// The fixed paper-size argument passed to the converter: `/s"100x150"`.
pub fn paper_size_flag() -> String {
    format!("{PAPER_SIZE_FLAG_PREFIX}\"{LABEL_PAPER_SIZE}\"")
}

/// Unique identifier for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which front end a job arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Http,
    WebSocket,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::WebSocket => f.write_str("ws"),
        }
    }
}

/// A normalized print request, independent of the transport it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJobRequest {
    /// Remote URL (`http://`, `https://`) or local filesystem path.
    pub pdf_source: String,
    /// Client-supplied printer name; `None` means "use the default".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printer_hint: Option<String>,
}

impl PrintJobRequest {
    pub fn new(pdf_source: impl Into<String>) -> Self {
        Self {
            pdf_source: pdf_source.into(),
            printer_hint: None,
        }
    }

    pub fn with_printer(mut self, printer: impl Into<String>) -> Self {
        self.printer_hint = Some(printer.into());
        self
    }

    /// Whether the source points at a remote document.
    pub fn is_remote(&self) -> bool {
        is_remote_source(&self.pdf_source)
    }
}

/// `true` for sources that must be downloaded rather than copied.
pub fn is_remote_source(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Error taxonomy reported back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MissingField,
    InvalidArgumentType,
    DownloadFailed,
    LocalCopyFailed,
    UnknownPrinter,
    PrintingSuspended,
    MissingExecutable,
    ExecutionTimeout,
    LaunchFailed,
    CorruptInput,
    NoDefaultPrinter,
    ExecutionFailed,
    InternalError,
}

/// Overall outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// The response every job produces, success or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResult {
    pub status: ResultStatus,
    pub message: String,
    /// Local file the job used, whenever one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,
    /// Error kind; absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl PrintResult {
    pub fn ok(message: impl Into<String>, cache_path: Option<String>) -> Self {
        Self {
            status: ResultStatus::Ok,
            message: message.into(),
            cache_path,
            kind: None,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>, cache_path: Option<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            message: message.into(),
            cache_path,
            kind: Some(kind),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}

/// A PDF materialized in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub id: EntryId,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Path rendered for responses and log lines.
    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// An installed printer, as reported by the enumeration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrinterIdentity {
    pub name: String,
}

/// How the effective printer for a job was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterOrigin {
    /// The client named a printer and it exists.
    Requested,
    /// The system default printer.
    SystemDefault,
    /// No default could be determined; the converter picks one.
    ToolDefault,
}

/// Output of printer resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrinter {
    /// Printer name passed to the converter (may be empty).
    pub name: String,
    pub origin: PrinterOrigin,
}

impl ResolvedPrinter {
    /// Name for log lines; empty names read as the default printer.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            "默认打印机"
        } else {
            &self.name
        }
    }
}

/// Bare commands the socket transport answers without creating a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterCommand {
    GetPrinterList,
    GetPrinters,
}

impl PrinterCommand {
    /// Parse a command keyword (trimmed, case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "getprinterlist" => Some(Self::GetPrinterList),
            "get_printers" => Some(Self::GetPrinters),
            _ => None,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Self::GetPrinterList => "getprinterlist",
            Self::GetPrinters => "get_printers",
        }
    }
}

/// Reply to a printer-list command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterListing {
    pub method: String,
    pub status: ResultStatus,
    pub printers: Vec<String>,
    pub data: Vec<PrinterIdentity>,
}

impl PrinterListing {
    pub fn new(command: PrinterCommand, names: Vec<String>) -> Self {
        let data = names
            .iter()
            .map(|name| PrinterIdentity { name: name.clone() })
            .collect();
        Self {
            method: command.method_name().to_owned(),
            status: ResultStatus::Ok,
            printers: names,
            data,
        }
    }
}

/// Snapshot of the process-wide admission flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionState {
    pub allowed: bool,
    pub paused: bool,
    /// At least one job is running the converter. Advisory only.
    pub busy: bool,
}

impl AdmissionState {
    /// Startup state: accepting jobs, idle.
    pub const INITIAL: Self = Self {
        allowed: true,
        paused: false,
        busy: false,
    };

    pub fn accepts_jobs(&self) -> bool {
        self.allowed && !self.paused
    }

    pub fn light(&self) -> StatusLight {
        if !self.accepts_jobs() {
            StatusLight::Paused
        } else if self.busy {
            StatusLight::Printing
        } else {
            StatusLight::Running
        }
    }
}

impl Default for AdmissionState {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Presentation summary of the admission state (tray icon colour).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLight {
    /// Accepting jobs, nothing printing (green).
    Running,
    /// Paused or disabled (grey).
    Paused,
    /// A converter process is running (blinking).
    Printing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_size_flag_is_quoted() {
        assert_eq!(paper_size_flag(), "/s\"100x150\"");
    }

    #[test]
    fn remote_detection_is_prefix_based() {
        assert!(is_remote_source("https://x/test.pdf"));
        assert!(is_remote_source("http://10.0.0.2/label.pdf"));
        assert!(!is_remote_source("C:\\labels\\a.pdf"));
        assert!(!is_remote_source("/tmp/ftp://odd.pdf"));
    }

    #[test]
    fn print_result_serializes_camel_case_and_skips_empty_fields() {
        let ok = PrintResult::ok("done", None);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, serde_json::json!({"status": "ok", "message": "done"}));

        let err = PrintResult::error(
            ErrorKind::ExecutionTimeout,
            "timeout",
            Some("/cache/a.pdf".into()),
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["cachePath"], "/cache/a.pdf");
        assert_eq!(json["kind"], "ExecutionTimeout");
    }

    #[test]
    fn printer_command_parsing_is_case_insensitive() {
        assert_eq!(
            PrinterCommand::parse("  GetPrinterList \n"),
            Some(PrinterCommand::GetPrinterList)
        );
        assert_eq!(
            PrinterCommand::parse("get_printers"),
            Some(PrinterCommand::GetPrinters)
        );
        assert_eq!(PrinterCommand::parse("print"), None);
    }

    #[test]
    fn printer_listing_mirrors_names_into_data() {
        let listing = PrinterListing::new(
            PrinterCommand::GetPrinterList,
            vec!["Zebra".into(), "Office".into()],
        );
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["method"], "getprinterlist");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["printers"], serde_json::json!(["Zebra", "Office"]));
        assert_eq!(json["data"][1]["name"], "Office");
    }

    #[test]
    fn admission_light_reflects_flags() {
        let mut state = AdmissionState::INITIAL;
        assert_eq!(state.light(), StatusLight::Running);
        state.busy = true;
        assert_eq!(state.light(), StatusLight::Printing);
        state.paused = true;
        assert_eq!(state.light(), StatusLight::Paused);
        assert!(!state.accepts_jobs());
    }

    #[test]
    fn request_deserializes_optional_printer() {
        let req: PrintJobRequest =
            serde_json::from_str(r#"{"pdfSource": "/tmp/a.pdf"}"#).unwrap();
        assert_eq!(req, PrintJobRequest::new("/tmp/a.pdf"));
        assert!(!req.is_remote());
    }
}
