//! HTTP front end of the chat pipeline.
//!
//! `POST /api/chat` takes a JSON chat request and answers with a stream of
//! server-sent events, one frame per pipeline event. `GET /health` reports
//! that the server is up.

#[macro_use]
extern crate tracing;

mod config;

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{Method, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures_util::stream;
use keri_chat_core::conversation::ChatRequest;
use keri_chat_core::event::ChatEvent;
use keri_chat_core::wire::{EVENT_STREAM_CONTENT_TYPE, encode_frame};
use keri_chat_core::{Pipeline, PipelineError};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

pub use config::ServerConfig;

/// Creates the application routes.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(pipeline)
}

/// Serves the application on `listener` until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    pipeline: Arc<Pipeline>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on http://{addr}");
    }
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn handle_chat(
    State(pipeline): State<Arc<Pipeline>>,
    body: Bytes,
) -> Response {
    let (tx, rx) = mpsc::unbounded_channel();

    match serde_json::from_slice::<ChatRequest>(&body) {
        Ok(request) => {
            tokio::spawn(async move {
                // The receiver goes away with the response body, which
                // means the client has disconnected.
                select! {
                    _ = pipeline.run(request, &tx) => {}
                    _ = tx.closed() => {
                        debug!("client disconnected, request aborted");
                    }
                }
            });
        }
        Err(err) => {
            warn!("malformed chat request: {err}");
            let err = PipelineError::BadRequest(format!("invalid request: {err}"));
            tx.send(err.to_event()).ok();
        }
    }

    event_stream(rx)
}

fn event_stream(rx: mpsc::UnboundedReceiver<ChatEvent>) -> Response {
    let frames = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        trace!("sending {event:?}");
        Some((Ok::<_, Infallible>(encode_frame(&event)), rx))
    });

    (
        [
            (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
