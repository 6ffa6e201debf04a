// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// silentprint print engine: PDF cache, source and printer resolution, the
// converter driver, admission control, and the HTTP and WebSocket front ends
// that feed one shared job pipeline.

pub mod admission;
pub mod cache;
pub mod executor;
pub mod http_api;
pub mod intake;
pub mod log_sink;
pub mod pipeline;
pub mod printer_resolver;
pub mod printers;
pub mod source;
pub mod ws_api;

pub use admission::{AdmissionController, AdmissionTicket, BusyGuard};
pub use cache::{CacheStore, MAX_CACHE};
pub use executor::{classify_exit, PrintExecutor};
pub use intake::Intake;
pub use log_sink::{FileLogSink, LogSink, MemoryLogSink};
pub use pipeline::{JobPipeline, Reply};
pub use printers::{PrinterEnumerator, StaticPrinters, SystemPrinters};
pub use source::SourceResolver;
