// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The job pipeline shared by every front end.
//
// admission -> source resolution -> printer resolution -> execution
//
// Each stage may fail; the first failure ends the job.  Whatever happens,
// the caller gets exactly one `PrintResult`, the job log gets one line, and
// tracing gets the structured details.  Jobs run in their own task so a
// panic anywhere inside becomes an `InternalError` result instead of taking
// the connection down.

use std::sync::{Arc, OnceLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use silentprint_core::error::{PrintError, Result};
use silentprint_core::human_errors::humanize_error;
use silentprint_core::types::{
    CacheEntry, ErrorKind, PrintJobRequest, PrintResult, PrinterCommand, PrinterListing,
    ResolvedPrinter, Transport, LABEL_PAPER_SIZE,
};

use crate::admission::AdmissionController;
use crate::cache::CacheStore;
use crate::executor::PrintExecutor;
use crate::intake::{self, Intake};
use crate::log_sink::LogSink;
use crate::printer_resolver::resolve_printer;
use crate::printers::PrinterEnumerator;
use crate::source::SourceResolver;

/// What a front end sends back for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Job(PrintResult),
    Printers(PrinterListing),
}

impl Reply {
    /// Error kind, if this reply reports a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Job(result) => result.kind,
            Self::Printers(_) => None,
        }
    }
}

/// Everything a job needs.  Share behind an `Arc`.
pub struct JobPipeline {
    admission: Arc<AdmissionController>,
    source: SourceResolver,
    printers: Arc<dyn PrinterEnumerator>,
    executor: PrintExecutor,
    log: Arc<dyn LogSink>,
}

impl JobPipeline {
    pub fn new(
        admission: Arc<AdmissionController>,
        source: SourceResolver,
        printers: Arc<dyn PrinterEnumerator>,
        executor: PrintExecutor,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            admission,
            source,
            printers,
            executor,
            log,
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.source.cache()
    }

    /// Handle a decoded JSON payload (HTTP body).
    pub async fn submit_payload(self: &Arc<Self>, payload: &Value, transport: Transport) -> Reply {
        self.dispatch(intake::from_json_value(payload), transport).await
    }

    /// Handle a raw socket frame.
    pub async fn submit_message(self: &Arc<Self>, frame: &str, transport: Transport) -> Reply {
        self.dispatch(intake::from_socket_message(frame), transport).await
    }

    /// Route a normalized intake to a job or a printer listing.
    pub async fn dispatch(self: &Arc<Self>, intake: Result<Intake>, transport: Transport) -> Reply {
        match intake {
            Ok(Intake::Job(request)) => Reply::Job(self.submit(request, transport).await),
            Ok(Intake::ListPrinters(command)) => match self.list_printers(command).await {
                Ok(listing) => Reply::Printers(listing),
                Err(e) => {
                    warn!(%transport, error = %e, "printer enumeration failed");
                    self.log.append(&format!("获取打印机列表失败({transport})：{e}"));
                    Reply::Job(PrintResult::error(e.kind(), humanize_error(&e).render(), None))
                }
            },
            Err(e) => {
                let message = humanize_error(&e).render();
                warn!(%transport, error = %e, "request rejected at intake");
                self.log.append(&format!("请求无效({transport})：{message}"));
                Reply::Job(PrintResult::error(e.kind(), message, None))
            }
        }
    }

    /// Run one print job to completion.
    pub async fn submit(self: &Arc<Self>, request: PrintJobRequest, transport: Transport) -> PrintResult {
        let pipeline = Arc::clone(self);
        let source = request.pdf_source.clone();
        // Set once the PDF is committed, so an aborted job still reports it.
        let committed = Arc::new(OnceLock::<String>::new());
        let job_committed = Arc::clone(&committed);

        match tokio::spawn(async move { pipeline.run(request, transport, &job_committed).await }).await {
            Ok(result) => result,
            Err(join_error) => {
                let err = PrintError::Internal(format!("print job aborted: {join_error}"));
                let cache_path = committed.get().cloned();
                error!(%transport, source = %source, error = %err, "print job panicked");
                self.log.append(&format!(
                    "打印失败({transport})：{source}，错误：{err} 缓存:{}",
                    cache_path.as_deref().unwrap_or("-"),
                ));
                PrintResult::error(err.kind(), humanize_error(&err).render(), cache_path)
            }
        }
    }

    /// The live printer set, for the list commands.
    pub async fn list_printers(&self, command: PrinterCommand) -> Result<PrinterListing> {
        let printers = Arc::clone(&self.printers);
        let names = tokio::task::spawn_blocking(move || printers.list_printers())
            .await
            .map_err(|e| PrintError::Internal(format!("printer enumeration task failed: {e}")))??;
        Ok(PrinterListing::new(command, names))
    }

    /// Cached PDFs, newest first, for operator review.
    pub async fn cache_entries(&self) -> Result<Vec<CacheEntry>> {
        let cache = Arc::clone(self.cache());
        tokio::task::spawn_blocking(move || cache.entries())
            .await
            .map_err(|e| PrintError::Internal(format!("cache scan task failed: {e}")))?
    }

    #[instrument(skip_all, fields(transport = %transport, source = %request.pdf_source))]
    async fn run(
        &self,
        request: PrintJobRequest,
        transport: Transport,
        committed: &OnceLock<String>,
    ) -> PrintResult {
        let ticket = match self.admission.admit() {
            Ok(ticket) => ticket,
            Err(e) => return self.fail(&request, transport, None, None, e),
        };

        let entry = match self.source.resolve(&request.pdf_source).await {
            Ok(entry) => entry,
            Err(e) => return self.fail(&request, transport, None, None, e),
        };
        let _ = committed.set(entry.display_path());

        let printer = match self.resolve_printer(request.printer_hint.clone()).await {
            Ok(printer) => printer,
            Err(e) => return self.fail(&request, transport, Some(&entry), None, e),
        };

        info!(
            printer = %printer.label(),
            origin = ?printer.origin,
            cache = %entry.path.display(),
            "running print converter"
        );

        match self
            .executor
            .run(&self.admission, &ticket, &entry.path, &printer.name)
            .await
        {
            Ok(stdout) => {
                let cache_path = entry.display_path();
                self.log.append(&format!(
                    "打印成功({transport})：{} -> {} 纸张:{LABEL_PAPER_SIZE} 缓存:{cache_path}",
                    request.pdf_source,
                    printer.label(),
                ));
                info!(cache = %cache_path, "print job succeeded");
                let stdout = stdout.trim();
                let message = if stdout.is_empty() { "打印成功" } else { stdout };
                PrintResult::ok(message, Some(cache_path))
            }
            Err(e) => self.fail(&request, transport, Some(&entry), Some(&printer), e),
        }
    }

    async fn resolve_printer(&self, hint: Option<String>) -> Result<ResolvedPrinter> {
        let printers = Arc::clone(&self.printers);
        tokio::task::spawn_blocking(move || resolve_printer(hint.as_deref(), printers.as_ref()))
            .await
            .map_err(|e| PrintError::Internal(format!("printer resolution task failed: {e}")))?
    }

    fn fail(
        &self,
        request: &PrintJobRequest,
        transport: Transport,
        entry: Option<&CacheEntry>,
        printer: Option<&ResolvedPrinter>,
        err: PrintError,
    ) -> PrintResult {
        let message = humanize_error(&err).render();
        let cache_path = entry.map(CacheEntry::display_path);

        warn!(
            kind = ?err.kind(),
            error = %err,
            cache = cache_path.as_deref().unwrap_or("-"),
            "print job failed"
        );
        self.log.append(&format!(
            "打印失败({transport})：{} -> {}，错误：{message} 缓存:{}",
            request.pdf_source,
            printer.map_or("-", ResolvedPrinter::label),
            cache_path.as_deref().unwrap_or("-"),
        ));

        PrintResult::error(err.kind(), message, cache_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, MAX_CACHE};
    use crate::log_sink::MemoryLogSink;
    use crate::printers::StaticPrinters;

    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        pipeline: Arc<JobPipeline>,
        log: Arc<MemoryLogSink>,
        cache_dir: TempDir,
        _tool_dir: TempDir,
    }

    impl Harness {
        fn build(exe: impl FnOnce(&Path) -> PathBuf, timeout: Duration) -> Self {
            Self::build_with(exe, timeout, Arc::new(office()), Arc::new(MemoryLogSink::new()))
        }

        fn build_with(
            exe: impl FnOnce(&Path) -> PathBuf,
            timeout: Duration,
            printers: Arc<dyn PrinterEnumerator>,
            log: Arc<MemoryLogSink>,
        ) -> Self {
            let sink: Arc<dyn LogSink> = log.clone();
            Self::assemble(exe, timeout, printers, log, sink)
        }

        /// `sink` is what the pipeline writes to; `log` is what tests inspect.
        fn assemble(
            exe: impl FnOnce(&Path) -> PathBuf,
            timeout: Duration,
            printers: Arc<dyn PrinterEnumerator>,
            log: Arc<MemoryLogSink>,
            sink: Arc<dyn LogSink>,
        ) -> Self {
            let cache_dir = tempfile::tempdir().unwrap();
            let tool_dir = tempfile::tempdir().unwrap();
            let cache = Arc::new(CacheStore::open(cache_dir.path(), MAX_CACHE).unwrap());
            let client = reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap();
            let pipeline = Arc::new(JobPipeline::new(
                Arc::new(AdmissionController::new()),
                SourceResolver::with_client(cache, client, true),
                printers,
                PrintExecutor::new(exe(tool_dir.path()), timeout),
                sink,
            ));
            Self {
                pipeline,
                log,
                cache_dir,
                _tool_dir: tool_dir,
            }
        }

        fn cached_files(&self) -> usize {
            std::fs::read_dir(self.cache_dir.path()).unwrap().count()
        }
    }

    fn office() -> StaticPrinters {
        StaticPrinters::new(["Zebra ZD420", "Office Laser"], Some("Office Laser"))
    }

    fn missing_tool(dir: &Path) -> PathBuf {
        dir.join("PDFtoPrinter.exe")
    }

    async fn submit(harness: &Harness, payload: Value) -> PrintResult {
        match harness.pipeline.submit_payload(&payload, Transport::Http).await {
            Reply::Job(result) => result,
            other => panic!("expected a job result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_source_creates_no_file() {
        let harness = Harness::build(missing_tool, Duration::from_secs(5));

        let result = submit(&harness, json!({"printerName": "Zebra ZD420"})).await;

        assert_eq!(result.kind, Some(ErrorKind::MissingField));
        assert_eq!(result.cache_path, None);
        assert_eq!(harness.cached_files(), 0);
        assert!(harness.log.contains("请求无效(http)"));
    }

    #[tokio::test]
    async fn wrong_field_type_is_rejected_before_side_effects() {
        let harness = Harness::build(missing_tool, Duration::from_secs(5));

        let result = submit(&harness, json!({"pdfUrl": 5, "printerName": "Zebra ZD420"})).await;

        assert_eq!(result.kind, Some(ErrorKind::InvalidArgumentType));
        assert_eq!(harness.cached_files(), 0);
    }

    #[tokio::test]
    async fn paused_service_refuses_without_touching_the_source() {
        let harness = Harness::build(missing_tool, Duration::from_secs(5));
        harness.pipeline.admission().pause();
        let result = submit(&harness, json!({"pdfSource": "/srv/labels/never-read.pdf"})).await;

        assert_eq!(result.kind, Some(ErrorKind::PrintingSuspended));
        assert!(result.message.contains("暂停"));
        assert_eq!(harness.cached_files(), 0);
    }

    #[tokio::test]
    async fn missing_converter_reports_remediation_and_cache_path() {
        let harness = Harness::build(missing_tool, Duration::from_secs(5));
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("a.pdf");
        std::fs::write(&src, b"%PDF-1.4").unwrap();

        let result = submit(&harness, json!({"pdfSource": src.to_str().unwrap()})).await;

        assert_eq!(result.kind, Some(ErrorKind::MissingExecutable));
        assert!(result.message.contains("PDFtoPrinter.exe"));
        assert!(result.message.contains("https://mendelson.org/pdftoprinter.html"));
        assert!(result.cache_path.is_some());
    }

    #[tokio::test]
    async fn printer_listing_comes_from_the_enumerator() {
        let harness = Harness::build(missing_tool, Duration::from_secs(5));

        let reply = harness
            .pipeline
            .submit_message("getprinterlist", Transport::WebSocket)
            .await;

        match reply {
            Reply::Printers(listing) => {
                assert_eq!(listing.printers, vec!["Zebra ZD420", "Office Laser"]);
                assert_eq!(listing.method, "getprinterlist");
            }
            other => panic!("expected a listing, got {other:?}"),
        }
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        use axum::routing::get;
        use axum::Router;

        fn script(body: impl Into<String>) -> impl FnOnce(&Path) -> PathBuf {
            let body = body.into();
            move |dir: &Path| {
                let path = dir.join("fake-converter.sh");
                std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
                let mut perms = std::fs::metadata(&path).unwrap().permissions();
                perms.set_mode(0o755);
                std::fs::set_permissions(&path, perms).unwrap();
                path
            }
        }

        /// Echoes its printer argument so tests can see what was chosen.
        fn echo_printer() -> impl FnOnce(&Path) -> PathBuf {
            script(r#"printf 'printed on [%s]' "$2""#)
        }

        async fn label_server() -> String {
            let router = Router::new().route("/label.pdf", get(|| async { "%PDF-1.4 label" }));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });
            format!("http://{addr}/label.pdf")
        }

        #[tokio::test]
        async fn remote_job_prints_end_to_end() {
            let harness = Harness::build(echo_printer(), Duration::from_secs(5));
            let url = label_server().await;

            let result = submit(&harness, json!({"pdfUrl": url, "printerName": "Zebra ZD420"})).await;

            assert!(result.is_ok(), "{result:?}");
            assert_eq!(result.message, "printed on [Zebra ZD420]");
            let cache_path = PathBuf::from(result.cache_path.unwrap());
            assert!(cache_path.starts_with(harness.cache_dir.path()));
            assert_eq!(std::fs::read(&cache_path).unwrap(), b"%PDF-1.4 label");
            assert!(harness.log.contains("打印成功(http)"));
            assert!(!harness.pipeline.admission().is_busy());
        }

        #[tokio::test]
        async fn paper_size_hint_falls_back_to_default_printer() {
            let harness = Harness::build(echo_printer(), Duration::from_secs(5));
            let url = label_server().await;

            let result = submit(&harness, json!({"pdfUrl": url, "printerName": "/papersize=A4"})).await;

            assert!(result.is_ok(), "{result:?}");
            assert_eq!(result.message, "printed on [Office Laser]");
        }

        #[tokio::test]
        async fn unknown_printer_never_runs_the_converter() {
            let marker = tempfile::tempdir().unwrap();
            let marker_file = marker.path().join("ran");
            let body = format!("touch '{}'", marker_file.display());
            let harness = Harness::build(script(body), Duration::from_secs(5));
            let url = label_server().await;

            let result = submit(&harness, json!({"pdfUrl": url, "printerName": "Ghost"})).await;

            assert_eq!(result.kind, Some(ErrorKind::UnknownPrinter));
            assert!(result.cache_path.is_some());
            assert!(!marker_file.exists());
        }

        #[tokio::test]
        async fn hung_converter_times_out() {
            let harness = Harness::build(script("sleep 30"), Duration::from_millis(300));
            let url = label_server().await;

            let result = submit(&harness, json!({"pdfUrl": url})).await;

            assert_eq!(result.kind, Some(ErrorKind::ExecutionTimeout));
            assert!(result.cache_path.is_some());
            assert!(!harness.pipeline.admission().is_busy());
        }

        #[tokio::test]
        async fn cache_stays_bounded_across_jobs() {
            let harness = Harness::build(echo_printer(), Duration::from_secs(5));
            let url = label_server().await;

            let mut paths = Vec::new();
            for _ in 0..(MAX_CACHE + 3) {
                let result = submit(&harness, json!({"pdfUrl": url})).await;
                paths.push(result.cache_path.unwrap());
            }

            assert_eq!(harness.cached_files(), MAX_CACHE);
            let unique: std::collections::HashSet<_> = paths.iter().collect();
            assert_eq!(unique.len(), paths.len());
        }

        #[tokio::test]
        async fn admitted_job_finishes_after_pause() {
            let harness = Harness::build(script("sleep 1; echo done"), Duration::from_secs(10));
            let url = label_server().await;

            let pipeline = Arc::clone(&harness.pipeline);
            let job = tokio::spawn(async move {
                pipeline
                    .submit(PrintJobRequest::new(url), Transport::WebSocket)
                    .await
            });
            let mut status = harness.pipeline.admission().subscribe();
            status.wait_for(|state| state.busy).await.unwrap();
            harness.pipeline.admission().pause();

            let result = job.await.unwrap();
            assert!(result.is_ok(), "{result:?}");
            assert_eq!(result.message, "done");
        }

        #[tokio::test]
        async fn overlapping_jobs_run_side_by_side() {
            let harness = Harness::build(
                script("case \"$2\" in Zebra*) sleep 2 ;; *) sleep 1 ;; esac; echo ok"),
                Duration::from_secs(10),
            );
            let url = label_server().await;
            let spawn_job = |printer: &str| {
                let pipeline = Arc::clone(&harness.pipeline);
                let request = PrintJobRequest::new(url.clone()).with_printer(printer);
                tokio::spawn(async move { pipeline.submit(request, Transport::Http).await })
            };

            let started = std::time::Instant::now();
            let short: Vec<_> = (0..3).map(|_| spawn_job("Office Laser")).collect();
            let long = spawn_job("Zebra ZD420");

            for job in short {
                let result = job.await.unwrap();
                assert!(result.is_ok(), "{result:?}");
            }
            // The two-second job is still running.
            assert!(harness.pipeline.admission().is_busy());

            let result = long.await.unwrap();
            assert!(result.is_ok(), "{result:?}");
            assert!(!harness.pipeline.admission().is_busy());

            // Run one after another these would take five seconds.
            let elapsed = started.elapsed();
            assert!(elapsed < Duration::from_millis(3500), "jobs ran serially: {elapsed:?}");
        }

        /// Panics when asked to record a successful print.
        struct FragileLog(Arc<MemoryLogSink>);

        impl LogSink for FragileLog {
            fn append(&self, line: &str) {
                if line.starts_with("打印成功") {
                    panic!("log volume vanished");
                }
                self.0.append(line);
            }

            fn recent(&self) -> Vec<String> {
                self.0.recent()
            }

            fn clear(&self) {
                self.0.clear();
            }
        }

        #[tokio::test]
        async fn job_panic_after_caching_keeps_cache_path() {
            let log = Arc::new(MemoryLogSink::new());
            let sink: Arc<dyn LogSink> = Arc::new(FragileLog(Arc::clone(&log)));
            let harness = Harness::assemble(
                echo_printer(),
                Duration::from_secs(5),
                Arc::new(office()),
                log,
                sink,
            );
            let url = label_server().await;

            let result = submit(&harness, json!({"pdfUrl": url})).await;

            assert_eq!(result.kind, Some(ErrorKind::InternalError));
            let cache_path = PathBuf::from(result.cache_path.expect("cache path survives the panic"));
            assert!(cache_path.starts_with(harness.cache_dir.path()));
            assert!(cache_path.exists());
            assert!(harness.log.contains("打印失败(http)"));
            assert!(!harness.pipeline.admission().is_busy());
        }

        /// Panics whenever the printer set is listed.
        struct Exploding;

        impl PrinterEnumerator for Exploding {
            fn list_printers(&self) -> Result<Vec<String>> {
                panic!("driver crashed");
            }

            fn default_printer(&self) -> Result<String> {
                Ok("Office Laser".into())
            }
        }

        #[tokio::test]
        async fn panics_become_internal_errors() {
            let harness = Harness::build_with(
                echo_printer(),
                Duration::from_secs(5),
                Arc::new(Exploding),
                Arc::new(MemoryLogSink::new()),
            );
            let url = label_server().await;

            let result = submit(&harness, json!({"pdfUrl": url, "printerName": "Zebra ZD420"})).await;

            assert_eq!(result.kind, Some(ErrorKind::InternalError));
            assert!(!harness.pipeline.admission().is_busy());
        }
    }
}
