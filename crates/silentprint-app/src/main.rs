// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// silentprint: local silent-print service.
//
// Entry point. Initialises logging and backend services, then serves the
// HTTP and WebSocket front ends until Ctrl-C.

mod services;

use std::process::ExitCode;

use services::app_services::AppServices;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "silentprint starting");

    let services = match AppServices::init() {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "service initialisation failed");
            return ExitCode::FAILURE;
        }
    };

    match services.serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "silentprint exited with an error");
            ExitCode::FAILURE
        }
    }
}
