use std::path::PathBuf;

use axum::{body::Bytes, extract::State, Json};
use parley_core::TranscriptionResult;
use serde::{Deserialize, Deserializer};

use crate::api::{parse_body, permit, HealthResponse, Service};
use crate::error::ApiError;
use crate::state::AppState;

/// `POST /transcribe` body.
#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    /// Missing path is treated as empty and reported as not found.
    #[serde(default)]
    pub audio_path: PathBuf,
    #[serde(default)]
    pub model: Option<String>,
    /// Absent: use the configured default. `null`: skip the language check.
    #[serde(default, deserialize_with = "present")]
    pub language: Option<Option<String>>,
}

/// Distinguishes `"language": null` (`Some(None)`) from a missing field (`None`).
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: Service::Transcription.name(),
        default_model: state.transcription.config().default_stt_model.clone(),
    })
}

pub async fn transcribe(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TranscriptionResult>, ApiError> {
    let request: TranscribeRequest = parse_body(Service::Transcription, &body)?;
    let _permit = permit(&state, Service::Transcription).await?;

    let config = state.transcription.config();
    let model = request
        .model
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&config.default_stt_model);
    let expected = match &request.language {
        None => config.default_language.as_deref(),
        Some(explicit) => explicit.as_deref(),
    };

    let result = state
        .transcription
        .transcribe(&request.audio_path, model, expected)
        .await;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parley_core::inference::stub::StubSynthesizer;
    use parley_core::{normalize, SpeechSynthesizer};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::api::test_support::{json_body, post_json, state};
    use crate::api::transcription_router;

    fn clip(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("clip.wav");
        let bytes = StubSynthesizer::new("stub")
            .synthesize(&normalize("a short clip").unwrap())
            .unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn language_field_distinguishes_missing_from_null() {
        let missing: TranscribeRequest =
            serde_json::from_str(r#"{"audio_path": "/a.wav"}"#).unwrap();
        assert_eq!(missing.language, None);

        let null: TranscribeRequest =
            serde_json::from_str(r#"{"audio_path": "/a.wav", "language": null}"#).unwrap();
        assert_eq!(null.language, Some(None));

        let fr: TranscribeRequest =
            serde_json::from_str(r#"{"audio_path": "/a.wav", "language": "fr"}"#).unwrap();
        assert_eq!(fr.language, Some(Some("fr".into())));
    }

    #[tokio::test]
    async fn transcribes_with_default_language() {
        let dir = tempfile::tempdir().unwrap();
        let audio = clip(dir.path());
        let app = transcription_router(state(dir.path(), "en"));

        let body = json!({ "audio_path": &audio }).to_string();
        let (status, json) =
            json_body(app.oneshot(post_json("/transcribe", body)).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["text"], "hello from the stub");
        assert_eq!(json["language"], "en");
        assert_eq!(json["segments"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_language_checks_default_and_null_skips_it() {
        let dir = tempfile::tempdir().unwrap();
        let audio = clip(dir.path());
        let app = transcription_router(state(dir.path(), "fr"));

        let body = json!({ "audio_path": &audio }).to_string();
        let (status, json) = json_body(
            app.clone()
                .oneshot(post_json("/transcribe", body))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert_eq!(json["language"], "fr");
        assert!(json["text"].is_null());

        let body = json!({ "audio_path": &audio, "language": null }).to_string();
        let (_, json) =
            json_body(app.oneshot(post_json("/transcribe", body)).await.unwrap()).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["language"], "fr");
    }

    #[tokio::test]
    async fn missing_audio_is_a_200_failure() {
        let dir = tempfile::tempdir().unwrap();
        let app = transcription_router(state(dir.path(), "en"));

        let body = json!({ "audio_path": "/nonexistent/path" }).to_string();
        let (status, json) =
            json_body(app.oneshot(post_json("/transcribe", body)).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["error"], "Audio file not found: /nonexistent/path");
        assert_eq!(json["error_code"], "audio_not_found");
    }

    #[tokio::test]
    async fn missing_audio_path_is_an_empty_path() {
        let dir = tempfile::tempdir().unwrap();
        let app = transcription_router(state(dir.path(), "en"));

        let (status, json) = json_body(
            app.oneshot(post_json("/transcribe", r#"{"language": "en"}"#))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "audio_not_found");
        assert_eq!(json["error"], "Audio file not found: ");
    }

    #[tokio::test]
    async fn malformed_body_keeps_transcription_shape() {
        let dir = tempfile::tempdir().unwrap();
        let app = transcription_router(state(dir.path(), "en"));

        let (status, json) = json_body(
            app.oneshot(post_json("/transcribe", r#"{"audio_path": 42"#))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert!(json["text"].is_null());
        assert!(json["language"].is_null());
    }

    #[tokio::test]
    async fn health_and_unknown_routes() {
        let dir = tempfile::tempdir().unwrap();
        let app = transcription_router(state(dir.path(), "en"));

        let (status, json) = json_body(
            app.clone()
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["default_model"], "tiny.en");
        assert_eq!(json["service"], "Parley STT Server");

        let response = app
            .oneshot(post_json("/synthesize", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
