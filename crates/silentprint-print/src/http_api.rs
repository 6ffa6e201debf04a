// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP front end.
//
//   POST /print               submit a job (JSON body), reply is a PrintResult
//   GET  /printers            installed printers
//   POST /control/start       enable printing
//   POST /control/pause       pause printing
//   GET  /control/status      admission snapshot
//   GET  /control/log         recent job log lines
//   POST /control/log/clear   empty the job log
//   GET  /control/cache       cached PDFs, newest first
//
// Pages on other origins call this service directly, so CORS is permissive.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::debug;

use silentprint_core::error::PrintError;
use silentprint_core::human_errors::humanize_error;
use silentprint_core::types::{
    AdmissionState, ErrorKind, PrintResult, PrinterCommand, StatusLight, Transport,
};

use crate::pipeline::{JobPipeline, Reply};

/// Shared handler state.
pub type ApiState = Arc<JobPipeline>;

/// Build the router with every route mounted.
pub fn router(pipeline: ApiState) -> Router {
    Router::new()
        .route("/print", post(print))
        .route("/printers", get(printers))
        .route("/control/start", post(start))
        .route("/control/pause", post(pause))
        .route("/control/status", get(status))
        .route("/control/log", get(log))
        .route("/control/log/clear", post(clear_log))
        .route("/control/cache", get(cache))
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// HTTP status for a failed job.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MissingField | ErrorKind::InvalidArgumentType => StatusCode::BAD_REQUEST,
        ErrorKind::PrintingSuspended => StatusCode::FORBIDDEN,
        ErrorKind::UnknownPrinter => StatusCode::NOT_FOUND,
        ErrorKind::DownloadFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::ExecutionTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::CorruptInput => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NoDefaultPrinter => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::LocalCopyFailed
        | ErrorKind::MissingExecutable
        | ErrorKind::LaunchFailed
        | ErrorKind::ExecutionFailed
        | ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = self.error_kind().map_or(StatusCode::OK, status_for);
        (status, Json(self)).into_response()
    }
}

async fn print(State(pipeline): State<ApiState>, body: Bytes) -> Reply {
    let intake = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => crate::intake::from_json_value(&payload),
        Err(e) => {
            debug!(error = %e, "print request body is not JSON");
            Err(PrintError::MalformedMessage(e.to_string()))
        }
    };
    pipeline.dispatch(intake, Transport::Http).await
}

async fn printers(State(pipeline): State<ApiState>) -> Reply {
    let intake = Ok(crate::intake::Intake::ListPrinters(PrinterCommand::GetPrinters));
    pipeline.dispatch(intake, Transport::Http).await
}

/// Admission snapshot plus its presentation summary.
#[derive(Debug, Serialize)]
struct StatusBody {
    #[serde(flatten)]
    state: AdmissionState,
    light: StatusLight,
}

impl From<AdmissionState> for StatusBody {
    fn from(state: AdmissionState) -> Self {
        Self {
            state,
            light: state.light(),
        }
    }
}

async fn start(State(pipeline): State<ApiState>) -> Json<StatusBody> {
    let state = pipeline.admission().start();
    pipeline.log().append("已开始打印");
    Json(state.into())
}

async fn pause(State(pipeline): State<ApiState>) -> Json<StatusBody> {
    let state = pipeline.admission().pause();
    pipeline.log().append("已暂停打印");
    Json(state.into())
}

async fn status(State(pipeline): State<ApiState>) -> Json<StatusBody> {
    Json(pipeline.admission().status().into())
}

async fn log(State(pipeline): State<ApiState>) -> Json<Vec<String>> {
    Json(pipeline.log().recent())
}

async fn clear_log(State(pipeline): State<ApiState>) -> Json<Vec<String>> {
    pipeline.log().clear();
    Json(pipeline.log().recent())
}

async fn cache(State(pipeline): State<ApiState>) -> Response {
    match pipeline.cache_entries().await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            let result = PrintResult::error(e.kind(), humanize_error(&e).render(), None);
            Reply::Job(result).into_response()
        }
    }
}
