//! JSON result documents returned by the two services.
//!
//! Field names and null-ness are part of the contract with existing clients:
//!
//! ```text
//! synthesis ok    {success, audio_path, file_size, model, device, cached}
//! synthesis err   {success:false, error, error_code, audio_path:null, language_unsupported?}
//! transcribe ok   {success, text, language, segments:[{start,end,text}]}
//! transcribe err  {success:false, error, error_code, text:null, language}
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpeechError;
use crate::inference::Segment;
use crate::registry::Device;

/// `device` value reported for cache hits.
pub const CACHED_DEVICE: &str = "cached";

// ---------------------------------------------------------------------------
// Synthesis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SynthesisResult {
    Success(SynthesisSuccess),
    Failure(SynthesisFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisSuccess {
    pub success: bool,
    pub audio_path: String,
    pub file_size: u64,
    pub model: String,
    /// `"cpu"`, `"cuda"` or [`CACHED_DEVICE`].
    pub device: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisFailure {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub audio_path: Option<String>,
    /// Present only for normalization failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_unsupported: Option<bool>,
}

impl SynthesisResult {
    pub fn synthesized(path: &Path, file_size: u64, model: &str, device: Device) -> Self {
        Self::success(path, file_size, model, device.as_str(), false)
    }

    pub fn cached(path: &Path, file_size: u64, model: &str) -> Self {
        Self::success(path, file_size, model, CACHED_DEVICE, true)
    }

    fn success(path: &Path, file_size: u64, model: &str, device: &str, cached: bool) -> Self {
        SynthesisResult::Success(SynthesisSuccess {
            success: true,
            audio_path: path.to_string_lossy().into_owned(),
            file_size,
            model: model.to_string(),
            device: device.to_string(),
            cached,
        })
    }

    pub fn from_error(err: &SpeechError) -> Self {
        let language_unsupported = match err {
            SpeechError::EmptyInput => Some(false),
            SpeechError::UnsupportedLanguage => Some(true),
            _ => None,
        };
        SynthesisResult::Failure(SynthesisFailure {
            success: false,
            error: err.to_string(),
            error_code: Some(err.code().to_string()),
            audio_path: None,
            language_unsupported,
        })
    }

    /// Body for requests that never reached the engine.
    pub fn malformed(message: impl Into<String>) -> Self {
        SynthesisResult::Failure(SynthesisFailure {
            success: false,
            error: message.into(),
            error_code: None,
            audio_path: None,
            language_unsupported: None,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisResult::Success(_))
    }

    pub fn audio_path(&self) -> Option<&str> {
        match self {
            SynthesisResult::Success(ok) => Some(&ok.audio_path),
            SynthesisResult::Failure(_) => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, SynthesisResult::Success(ok) if ok.cached)
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            SynthesisResult::Success(_) => None,
            SynthesisResult::Failure(err) => err.error_code.as_deref(),
        }
    }
}

impl From<Result<SynthesisResult, SpeechError>> for SynthesisResult {
    fn from(result: Result<SynthesisResult, SpeechError>) -> Self {
        result.unwrap_or_else(|e| SynthesisResult::from_error(&e))
    }
}

// ---------------------------------------------------------------------------
// Transcription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptionResult {
    Success(TranscriptionSuccess),
    Failure(TranscriptionFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionSuccess {
    pub success: bool,
    pub text: String,
    pub language: String,
    /// Timeline order, exactly as the recognizer produced them.
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionFailure {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub text: Option<String>,
    /// Detected language when inference got that far.
    pub language: Option<String>,
}

impl TranscriptionResult {
    pub fn transcribed(text: String, language: String, segments: Vec<Segment>) -> Self {
        TranscriptionResult::Success(TranscriptionSuccess {
            success: true,
            text,
            language,
            segments,
        })
    }

    pub fn from_error(err: &SpeechError) -> Self {
        let language = match err {
            SpeechError::LanguageMismatch { detected, .. } => Some(detected.clone()),
            _ => None,
        };
        TranscriptionResult::Failure(TranscriptionFailure {
            success: false,
            error: err.to_string(),
            error_code: Some(err.code().to_string()),
            text: None,
            language,
        })
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        TranscriptionResult::Failure(TranscriptionFailure {
            success: false,
            error: message.into(),
            error_code: None,
            text: None,
            language: None,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TranscriptionResult::Success(_))
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            TranscriptionResult::Success(ok) => Some(&ok.language),
            TranscriptionResult::Failure(err) => err.language.as_deref(),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            TranscriptionResult::Success(_) => None,
            TranscriptionResult::Failure(err) => err.error_code.as_deref(),
        }
    }
}

impl From<Result<TranscriptionResult, SpeechError>> for TranscriptionResult {
    fn from(result: Result<TranscriptionResult, SpeechError>) -> Self {
        result.unwrap_or_else(|e| TranscriptionResult::from_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn synthesis_success_serializes_flat() {
        let ok = SynthesisResult::synthesized(
            &PathBuf::from("tts_output/tts_a_b.wav"),
            1024,
            "tts_models/en/ljspeech/tacotron2-DDC",
            Device::Accelerator,
        );
        let json = serde_json::to_value(&ok).expect("serialize synthesis result");
        assert_eq!(json["success"], true);
        assert_eq!(json["audio_path"], "tts_output/tts_a_b.wav");
        assert_eq!(json["file_size"], 1024);
        assert_eq!(json["device"], "cuda");
        assert_eq!(json["cached"], false);

        let hit = SynthesisResult::cached(&PathBuf::from("x.wav"), 3, "m");
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["device"], "cached");
        assert_eq!(json["cached"], true);
    }

    #[test]
    fn language_flag_only_on_normalization_failures() {
        let unsupported = serde_json::to_value(SynthesisResult::from_error(
            &SpeechError::UnsupportedLanguage,
        ))
        .unwrap();
        assert_eq!(unsupported["success"], false);
        assert_eq!(unsupported["language_unsupported"], true);
        assert!(unsupported["audio_path"].is_null());
        assert_eq!(unsupported["error_code"], "unsupported_language");

        let empty = serde_json::to_value(SynthesisResult::from_error(&SpeechError::EmptyInput))
            .unwrap();
        assert_eq!(empty["language_unsupported"], false);

        let missing =
            serde_json::to_value(SynthesisResult::from_error(&SpeechError::ArtifactNotProduced))
                .unwrap();
        assert!(missing.get("language_unsupported").is_none());
        assert_eq!(missing["error"], "Audio file was not created");
    }

    #[test]
    fn malformed_body_has_exactly_three_fields() {
        let json = serde_json::to_value(SynthesisResult::malformed("bad json")).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(json["error"], "bad json");
        assert!(json["audio_path"].is_null());
    }

    #[test]
    fn mismatch_echoes_detected_language() {
        let err = SpeechError::LanguageMismatch {
            detected: "fr".into(),
            expected: "en".into(),
        };
        let result = TranscriptionResult::from_error(&err);
        assert_eq!(result.language(), Some("fr"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["text"].is_null());
        assert_eq!(json["language"], "fr");
        assert_eq!(json["error_code"], "language_mismatch");
    }

    #[test]
    fn results_round_trip_through_untagged_enums() {
        let ok = TranscriptionResult::transcribed(
            "hello".into(),
            "en".into(),
            vec![Segment {
                start: 0.0,
                end: 1.25,
                text: "hello".into(),
            }],
        );
        let raw = serde_json::to_string(&ok).unwrap();
        let back: TranscriptionResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, ok);

        let fail = SynthesisResult::from_error(&SpeechError::EmptyInput);
        let raw = serde_json::to_string(&fail).unwrap();
        let back: SynthesisResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, fail);
    }
}
