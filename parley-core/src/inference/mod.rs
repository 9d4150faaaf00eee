//! Inference backend abstraction.
//!
//! The engines never see a concrete model. They talk to two traits:
//!
//! - [`SpeechSynthesizer`]: normalized text → audio bytes (WAV)
//! - [`SpeechRecognizer`]: audio file (+ optional language hint) → [`Recognition`]
//!
//! and obtain instances through a loader ([`SynthesizerLoader`] /
//! [`RecognizerLoader`]) that the [`ModelRegistry`](crate::registry::ModelRegistry)
//! calls at most once per key.
//!
//! `&mut self` on the inference methods expresses that real backends are
//! stateful and not reentrant. Every call is therefore serialised through the
//! handle's `parking_lot::Mutex`; callers on different handles run in parallel.

#[cfg(feature = "backend-command")]
pub mod command;
#[cfg(feature = "backend-stub")]
pub mod stub;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::registry::ModelKey;
use crate::text::NormalizedText;

/// Contract for text-to-speech backends.
pub trait SpeechSynthesizer: Send + 'static {
    /// One-time warm-up after load (dummy inference, cache priming).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Render `text` to a complete audio file image (WAV bytes).
    ///
    /// An empty vector means the engine silently produced nothing.
    fn synthesize(&mut self, text: &NormalizedText) -> Result<Vec<u8>>;
}

/// Contract for speech-to-text backends.
pub trait SpeechRecognizer: Send + 'static {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transcribe the audio file at `audio`.
    ///
    /// `language` is a hint; the backend reports what it actually detected.
    fn transcribe(&mut self, audio: &Path, language: Option<&str>) -> Result<Recognition>;
}

/// Raw recognizer output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    /// Detected language code, if the backend knows it.
    pub language: Option<String>,
    /// Segments in audio-timeline order.
    pub segments: Vec<Segment>,
}

/// A timed piece of transcript. Offsets are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

/// Thread-safe reference-counted handle to a loaded synthesizer.
#[derive(Clone)]
pub struct SynthesizerHandle(pub Arc<Mutex<dyn SpeechSynthesizer>>);

impl SynthesizerHandle {
    pub fn new<M: SpeechSynthesizer>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for SynthesizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesizerHandle").finish_non_exhaustive()
    }
}

/// Thread-safe reference-counted handle to a loaded recognizer.
#[derive(Clone)]
pub struct RecognizerHandle(pub Arc<Mutex<dyn SpeechRecognizer>>);

impl RecognizerHandle {
    pub fn new<M: SpeechRecognizer>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for RecognizerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerHandle").finish_non_exhaustive()
    }
}

/// Builds synthesizers for a [`ModelKey`]. Runs on the blocking pool.
pub trait SynthesizerLoader: Send + Sync + 'static {
    fn load(&self, key: &ModelKey) -> Result<SynthesizerHandle>;
}

/// Builds recognizers for a [`ModelKey`]. Runs on the blocking pool.
pub trait RecognizerLoader: Send + Sync + 'static {
    fn load(&self, key: &ModelKey) -> Result<RecognizerHandle>;
}

impl<F> SynthesizerLoader for F
where
    F: Fn(&ModelKey) -> Result<SynthesizerHandle> + Send + Sync + 'static,
{
    fn load(&self, key: &ModelKey) -> Result<SynthesizerHandle> {
        self(key)
    }
}

impl<F> RecognizerLoader for F
where
    F: Fn(&ModelKey) -> Result<RecognizerHandle> + Send + Sync + 'static,
{
    fn load(&self, key: &ModelKey) -> Result<RecognizerHandle> {
        self(key)
    }
}
