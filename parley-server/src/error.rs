//! Transport-level errors.
//!
//! Engine failures are ordinary 200 results; only requests the engines never
//! saw (unparseable body, panicking handler, closed semaphore) end up here.
//! The body keeps the shape of the service's result document so clients can
//! parse every response the same way.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_core::{SynthesisResult, TranscriptionResult};
use tracing::{error, warn};

use crate::api::Service;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub service: Service,
    pub message: String,
}

impl ApiError {
    /// The body could not be read as the service's request document.
    pub fn malformed(service: Service, msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            service,
            message: msg.into(),
        }
    }

    pub fn internal(service: Service, msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            service,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(service = self.service.name(), error = %self.message, "request failed");
        } else {
            warn!(service = self.service.name(), error = %self.message, "request rejected");
        }
        match self.service {
            Service::Synthesis => {
                (self.status, Json(SynthesisResult::malformed(self.message))).into_response()
            }
            Service::Transcription => {
                (self.status, Json(TranscriptionResult::malformed(self.message))).into_response()
            }
        }
    }
}
