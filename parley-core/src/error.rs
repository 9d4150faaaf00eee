use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors produced by parley-core.
///
/// Every engine boundary returns `Result<_, SpeechError>`; the wire result
/// types in [`crate::protocol`] are built from these exactly once.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Text is empty after cleaning")]
    EmptyInput,

    #[error("TTS is only available for English text. Please use English language.")]
    UnsupportedLanguage,

    #[error("Audio file not found: {}", path.display())]
    AudioNotFound { path: PathBuf },

    #[error(
        "Detected language '{detected}' does not match required language '{expected}'. Please speak in English."
    )]
    LanguageMismatch { detected: String, expected: String },

    #[error("failed to load model {key}: {reason}")]
    LoadError { key: String, reason: String },

    #[error("Audio file was not created")]
    ArtifactNotProduced,

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpeechError {
    /// Stable machine-readable class, sent as `error_code`.
    pub fn code(&self) -> &'static str {
        match self {
            SpeechError::EmptyInput => "empty_input",
            SpeechError::UnsupportedLanguage => "unsupported_language",
            SpeechError::AudioNotFound { .. } => "audio_not_found",
            SpeechError::LanguageMismatch { .. } => "language_mismatch",
            SpeechError::LoadError { .. } => "load_error",
            SpeechError::ArtifactNotProduced => "artifact_not_produced",
            SpeechError::Timeout(_) => "timeout",
            SpeechError::InternalError(_) | SpeechError::Io(_) | SpeechError::Other(_) => {
                "internal_error"
            }
        }
    }

    /// Terminal, user-facing conditions that retrying the same request cannot fix.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SpeechError::EmptyInput
                | SpeechError::UnsupportedLanguage
                | SpeechError::AudioNotFound { .. }
                | SpeechError::LanguageMismatch { .. }
        )
    }

    pub(crate) fn load(key: impl ToString, reason: impl ToString) -> Self {
        SpeechError::LoadError {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_messages_keep_existing_wording() {
        assert_eq!(SpeechError::EmptyInput.to_string(), "Text is empty after cleaning");
        assert_eq!(
            SpeechError::LanguageMismatch {
                detected: "fr".into(),
                expected: "en".into(),
            }
            .to_string(),
            "Detected language 'fr' does not match required language 'en'. Please speak in English."
        );
        assert_eq!(
            SpeechError::AudioNotFound {
                path: PathBuf::from("/tmp/missing.wav")
            }
            .to_string(),
            "Audio file not found: /tmp/missing.wav"
        );
    }

    #[test]
    fn io_errors_report_as_internal() {
        let err = SpeechError::from(std::io::Error::other("disk full"));
        assert_eq!(err.code(), "internal_error");
        assert!(!err.is_terminal());
        assert!(SpeechError::UnsupportedLanguage.is_terminal());
    }
}
