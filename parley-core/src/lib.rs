//! # parley-core
//!
//! Engine for the local speech sidecar: text-to-speech with a content-addressed
//! artifact cache, and speech-to-text with an expected-language gate.
//!
//! ## Architecture
//!
//! ```text
//! raw text ─► text::normalize ─► cache::CacheKey ─► ContentCache (hit → done)
//!                                                        │ miss
//!                                    ModelRegistry::get_or_load (single-flight)
//!                                                        │
//!                                  SpeechSynthesizer::synthesize (spawn_blocking)
//!                                                        │
//!                                         ContentCache::store (temp + rename)
//!
//! audio path ─► ModelRegistry::get_or_load ─► SpeechRecognizer::transcribe ─► language gate
//! ```
//!
//! Engines return wire-ready [`protocol`] results; errors are [`SpeechError`]s
//! until that last step.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod cache;
pub mod engine;
pub mod error;
pub mod inference;
pub mod protocol;
pub mod registry;
pub mod text;

// Convenience re-exports for downstream crates
pub use cache::{CacheKey, ContentCache};
pub use engine::{
    DiagnosticsSnapshot, EngineConfig, EngineDiagnostics, SynthesisEngine, TranscriptionEngine,
};
pub use error::{Result, SpeechError};
pub use inference::{
    RecognizerHandle, RecognizerLoader, Recognition, Segment, SpeechRecognizer,
    SpeechSynthesizer, SynthesizerHandle, SynthesizerLoader,
};
pub use protocol::{SynthesisResult, TranscriptionResult};
pub use registry::{Device, DevicePreference, ModelKey, ModelRegistry};
pub use text::{normalize, NormalizedText};
