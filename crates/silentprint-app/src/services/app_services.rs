// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: loads the config, builds the job pipeline, and runs
// the HTTP and WebSocket listeners until shutdown.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use silentprint_core::error::{PrintError, Result};
use silentprint_core::ServiceConfig;
use silentprint_print::log_sink::{FileLogSink, LogSink};
use silentprint_print::printers::{PrinterEnumerator, StaticPrinters, SystemPrinters};
use silentprint_print::{
    http_api, ws_api, AdmissionController, CacheStore, JobPipeline, PrintExecutor, SourceResolver,
};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";

/// Shown when a listener cannot bind; the usual cause is a second instance.
const PORT_IN_USE_HINT: &str = "端口被占用，请更换端口或关闭占用程序。重启软件后请按F5刷新打印网站。";

/// Everything the running service owns.
pub struct AppServices {
    config: ServiceConfig,
    pipeline: Arc<JobPipeline>,
}

impl AppServices {
    /// Initialise all services from the data directory.  Call once at startup.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        info!(path = %dir.display(), "initialising services");
        let config = load_config(&dir);
        Self::build(&dir, config)
    }

    /// Build the pipeline from an explicit config.
    pub fn build(data_dir: &Path, config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(CacheStore::open(config.cache_dir_in(data_dir), config.max_cache)?);

        // Starts empty on every launch.
        let log: Arc<dyn LogSink> = Arc::new(FileLogSink::create(
            config.log_file_in(data_dir),
            config.log_max_lines,
        )?);

        let printers: Arc<dyn PrinterEnumerator> = match config.printers.clone() {
            Some(pinned) => {
                info!(count = pinned.names.len(), "using pinned printer list");
                Arc::new(StaticPrinters::from(pinned))
            }
            None => Arc::new(SystemPrinters),
        };

        let converter = config.converter_path();
        if !converter.is_file() {
            warn!(path = %converter.display(), "print converter not found; jobs will fail until it is installed");
        }

        let source = SourceResolver::new(
            Arc::clone(&cache),
            config.download_timeout(),
            config.evict_after_download,
        )?;

        let pipeline = Arc::new(JobPipeline::new(
            Arc::new(AdmissionController::new()),
            source,
            printers,
            PrintExecutor::new(converter, config.exec_timeout()),
            log,
        ));

        info!(
            cache = %cache.dir().display(),
            max_cache = cache.max_entries(),
            "services initialised"
        );

        Ok(Self { config, pipeline })
    }

    /// Bind both listeners and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let http_addr = self.socket_addr(self.config.http_port)?;
        let ws_addr = self.socket_addr(self.config.ws_port)?;

        let http_listener = bind(http_addr, "HTTP").await?;
        let ws_listener = bind(ws_addr, "WebSocket").await?;

        self.pipeline.log().append(&format!(
            "服务已启动：HTTP {http_addr}，WebSocket {ws_addr}"
        ));
        tokio::spawn(report_status(Arc::clone(self.pipeline.admission())));

        let http = axum::serve(http_listener, http_api::router(Arc::clone(&self.pipeline)));
        let ws = axum::serve(ws_listener, ws_api::router(Arc::clone(&self.pipeline)));

        tokio::select! {
            result = http.into_future() => result?,
            result = ws.into_future() => result?,
            _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
        }

        info!("silentprint stopped");
        Ok(())
    }

    fn socket_addr(&self, port: u16) -> Result<SocketAddr> {
        format!("{}:{port}", self.config.bind_addr)
            .parse()
            .map_err(|e| PrintError::Internal(format!("invalid bind address {}: {e}", self.config.bind_addr)))
    }
}

async fn bind(addr: SocketAddr, label: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(%addr, "{label} listener ready");
            Ok(listener)
        }
        Err(e) => {
            error!(%addr, error = %e, hint = PORT_IN_USE_HINT, "{label} listener failed to start");
            Err(PrintError::Io(e))
        }
    }
}

/// Follow admission changes for the status indicator.
async fn report_status(admission: Arc<AdmissionController>) {
    let mut changes = admission.subscribe();
    while changes.changed().await.is_ok() {
        let state = *changes.borrow_and_update();
        debug!(
            allowed = state.allowed,
            paused = state.paused,
            busy = state.busy,
            light = ?state.light(),
            "admission state changed"
        );
    }
}

/// Read `config.json`, falling back to defaults when absent or unreadable.
fn load_config(data_dir: &Path) -> ServiceConfig {
    let path = data_dir.join(CONFIG_FILE);
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(_) => {
            debug!(path = %path.display(), "no config file, using defaults");
            return ServiceConfig::default();
        }
    };
    match serde_json::from_str(&data) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config file is invalid, using defaults");
            ServiceConfig::default()
        }
    }
}
