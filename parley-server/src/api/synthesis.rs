use std::path::PathBuf;

use axum::{body::Bytes, extract::State, Json};
use parley_core::SynthesisResult;
use serde::Deserialize;

use crate::api::{parse_body, permit, HealthResponse, Service};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /synthesize` body.
#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    /// Missing text is treated as empty and rejected by the engine.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: Service::Synthesis.name(),
        default_model: state.synthesis.config().default_tts_model.clone(),
    })
}

pub async fn synthesize(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SynthesisResult>, ApiError> {
    let request: SynthesizeRequest = parse_body(Service::Synthesis, &body)?;
    let _permit = permit(&state, Service::Synthesis).await?;

    let config = state.synthesis.config();
    let model = request
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&config.default_tts_model);
    let output_dir = request
        .output_dir
        .as_deref()
        .unwrap_or(&config.default_output_dir);

    let result = state
        .synthesis
        .synthesize(&request.text, model, output_dir)
        .await;
    Ok(Json(result))
}
