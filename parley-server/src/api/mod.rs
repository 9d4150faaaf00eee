//! HTTP routers for the two services.
//!
//! | Service       | Route               |
//! |---------------|---------------------|
//! | synthesis     | `GET /health`, `POST /synthesize` |
//! | transcription | `GET /health`, `POST /transcribe` |
//!
//! Anything else, including a known path with the wrong method, is a bare 404.

pub mod synthesis;
pub mod transcription;

use std::any::Any;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Synthesis,
    Transcription,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Synthesis => "Parley TTS Server",
            Service::Transcription => "Parley STT Server",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub default_model: String,
}

pub fn synthesis_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(synthesis::health).fallback(not_found))
        .route("/synthesize", post(synthesis::synthesize).fallback(not_found))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(synthesis_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn transcription_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(transcription::health).fallback(not_found))
        .route("/transcribe", post(transcription::transcribe).fallback(not_found))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(transcription_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn synthesis_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::internal(Service::Synthesis, panic_message(&*panic)).into_response()
}

fn transcription_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::internal(Service::Transcription, panic_message(&*panic)).into_response()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

/// Parse a request document, reporting failures in the service's error shape.
fn parse_body<T: DeserializeOwned>(service: Service, body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::malformed(service, e.to_string()))
}

/// Request-level permit; a closed semaphore means the service is going away.
async fn permit(
    state: &AppState,
    service: Service,
) -> Result<tokio::sync::SemaphorePermit<'_>, ApiError> {
    state
        .acquire_permit()
        .await
        .map_err(|_| ApiError::internal(service, "service is shutting down"))
}
