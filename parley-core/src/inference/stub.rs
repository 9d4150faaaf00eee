//! Stub backends: deterministic stand-ins for real inference engines.
//!
//! Used in development and tests so the whole HTTP → engine → cache path can
//! run without model weights:
//! - synthesis renders a short sine tone whose length follows the text;
//! - recognition reads the WAV header and reports one segment spanning the
//!   clip with a fixed transcript.

use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, SpeechError};
use crate::inference::{
    RecognizerHandle, RecognizerLoader, Recognition, Segment, SpeechRecognizer,
    SpeechSynthesizer, SynthesizerHandle, SynthesizerLoader,
};
use crate::registry::ModelKey;
use crate::text::NormalizedText;

pub const STUB_SAMPLE_RATE: u32 = 22_050;
const MS_PER_CHAR: u32 = 60;
const MIN_DURATION_MS: u32 = 200;
const MAX_DURATION_MS: u32 = 30_000;
const TONE_HZ: f32 = 220.0;
const AMPLITUDE: f32 = 0.2;

/// Tone generator standing in for a TTS model.
pub struct StubSynthesizer {
    model: String,
}

impl StubSynthesizer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

impl SpeechSynthesizer for StubSynthesizer {
    fn warm_up(&mut self) -> Result<()> {
        debug!(model = %self.model, "StubSynthesizer::warm_up (no-op)");
        Ok(())
    }

    fn synthesize(&mut self, text: &NormalizedText) -> Result<Vec<u8>> {
        let duration_ms = (text.char_count() as u32)
            .saturating_mul(MS_PER_CHAR)
            .clamp(MIN_DURATION_MS, MAX_DURATION_MS);
        let n_samples = (STUB_SAMPLE_RATE as u64 * duration_ms as u64 / 1000) as usize;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: STUB_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(44 + n_samples * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
            for i in 0..n_samples {
                let t = i as f32 / STUB_SAMPLE_RATE as f32;
                let sample = (2.0 * PI * TONE_HZ * t).sin() * AMPLITUDE;
                writer
                    .write_sample((sample * i16::MAX as f32) as i16)
                    .map_err(wav_error)?;
            }
            writer.finalize().map_err(wav_error)?;
        }
        Ok(cursor.into_inner())
    }
}

/// Recognizer that reports a fixed transcript over the clip's duration.
pub struct StubRecognizer {
    transcript: String,
    language: String,
}

impl StubRecognizer {
    pub fn new(transcript: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            language: language.into(),
        }
    }
}

impl SpeechRecognizer for StubRecognizer {
    fn transcribe(&mut self, audio: &Path, language: Option<&str>) -> Result<Recognition> {
        let reader = hound::WavReader::open(audio).map_err(wav_error)?;
        let spec = reader.spec();
        let frames = reader.duration() as f64;
        let seconds = if spec.sample_rate == 0 {
            0.0
        } else {
            frames / spec.sample_rate as f64
        };
        debug!(
            audio = ?audio,
            seconds,
            hint = ?language,
            "StubRecognizer::transcribe"
        );

        Ok(Recognition {
            text: format!(" {}", self.transcript),
            language: Some(self.language.clone()),
            segments: vec![Segment {
                start: 0.0,
                end: seconds,
                text: format!(" {}", self.transcript),
            }],
        })
    }
}

/// Loader for [`StubSynthesizer`]s.
#[derive(Debug, Clone, Default)]
pub struct StubSynthesizerLoader;

impl SynthesizerLoader for StubSynthesizerLoader {
    fn load(&self, key: &ModelKey) -> Result<SynthesizerHandle> {
        Ok(SynthesizerHandle::new(StubSynthesizer::new(key.name())))
    }
}

/// Loader for [`StubRecognizer`]s.
#[derive(Debug, Clone)]
pub struct StubRecognizerLoader {
    pub transcript: String,
    pub language: String,
}

impl Default for StubRecognizerLoader {
    fn default() -> Self {
        Self {
            transcript: "stub transcript".into(),
            language: "en".into(),
        }
    }
}

impl RecognizerLoader for StubRecognizerLoader {
    fn load(&self, _key: &ModelKey) -> Result<RecognizerHandle> {
        Ok(RecognizerHandle::new(StubRecognizer::new(
            self.transcript.clone(),
            self.language.clone(),
        )))
    }
}

fn wav_error(err: hound::Error) -> SpeechError {
    SpeechError::InternalError(format!("wav: {err}"))
}
