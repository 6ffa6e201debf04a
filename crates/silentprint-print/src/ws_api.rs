// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// WebSocket front end.
//
// Any path upgrades.  Each text frame is one request: a bare printer-list
// command or a (possibly percent-encoded) JSON job.  Each reply is one JSON
// text frame.  The read loop never waits on a job; every frame is handled on
// its own task and replies go out through a single writer task, so a long
// print does not block `getprinterlist` on the same connection.  Replies to
// concurrent jobs may therefore arrive out of order.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use silentprint_core::types::Transport;

use crate::pipeline::JobPipeline;

/// Outbound frames buffered per connection.
const OUTBOUND_BUFFER: usize = 64;

/// Build the socket router.
pub fn router(pipeline: Arc<JobPipeline>) -> Router {
    Router::new().fallback(upgrade).with_state(pipeline)
}

async fn upgrade(ws: WebSocketUpgrade, State(pipeline): State<Arc<JobPipeline>>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, pipeline))
}

async fn serve_socket(socket: WebSocket, pipeline: Arc<JobPipeline>) {
    info!("websocket client connected");
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                debug!("websocket client gone, dropping replies");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    warn!(len = bytes.len(), "ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong are answered by axum.
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
        };

        let pipeline = Arc::clone(&pipeline);
        let outbound = outbound_tx.clone();
        tokio::spawn(async move {
            let reply = pipeline.submit_message(&text, Transport::WebSocket).await;
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if outbound.send(json).await.is_err() {
                        debug!("connection closed before the reply was ready");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode websocket reply"),
            }
        });
    }

    info!("websocket client disconnected");
}
