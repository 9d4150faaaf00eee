//! Synthesis and transcription engines.
//!
//! ## Request flow
//!
//! ```text
//! SynthesisEngine::synthesize(raw, model, dir)
//!     normalize ─► CacheKey ─► lookup ──hit──► cached result (no model access)
//!                                  └─miss─► registry.get_or_load ─► spawn_blocking(synthesize)
//!                                              ─► cache.store ─► result
//!
//! TranscriptionEngine::transcribe(path, model, expected)
//!     exists? ─► registry.get_or_load ─► spawn_blocking(transcribe) ─► language check ─► result
//! ```
//!
//! Both engines are `Send + Sync` and are shared behind an `Arc` by the
//! server. Everything past validation runs under [`EngineConfig::request_timeout`].

pub mod synthesis;
pub mod transcription;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use synthesis::SynthesisEngine;
pub use transcription::TranscriptionEngine;

pub const DEFAULT_TTS_MODEL: &str = "tts_models/en/ljspeech/tacotron2-DDC";
pub const DEFAULT_STT_MODEL: &str = "tiny.en";
pub const DEFAULT_OUTPUT_DIR: &str = "tts_output";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Language reported when the recognizer does not name one.
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Configuration shared by both engines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTS model used when a request names none.
    pub default_tts_model: String,
    /// STT model used when a request names none.
    pub default_stt_model: String,
    /// Artifact directory used when a request names none.
    pub default_output_dir: PathBuf,
    /// Expected language when a transcription request omits the field.
    /// `None` disables the check for such requests.
    pub default_language: Option<String>,
    /// Upper bound for one request past validation (load + inference + store).
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_tts_model: DEFAULT_TTS_MODEL.into(),
            default_stt_model: DEFAULT_STT_MODEL.into(),
            default_output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            default_language: Some(DEFAULT_LANGUAGE.into()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Per-engine counters, logged at shutdown.
#[derive(Debug, Default)]
pub struct EngineDiagnostics {
    pub requests: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
    pub inference_calls: AtomicUsize,
    pub inference_errors: AtomicUsize,
    pub rejected: AtomicUsize,
    pub timeouts: AtomicUsize,
}

impl EngineDiagnostics {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            inference_calls: self.inference_calls.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineDiagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub requests: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub inference_calls: usize,
    pub inference_errors: usize,
    /// Requests failing validation (empty text, unsupported language,
    /// missing audio, language mismatch).
    pub rejected: usize,
    pub timeouts: usize,
}
