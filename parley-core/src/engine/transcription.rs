use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::engine::{EngineConfig, EngineDiagnostics, UNKNOWN_LANGUAGE};
use crate::error::{Result, SpeechError};
use crate::inference::{RecognizerHandle, RecognizerLoader, Segment};
use crate::protocol::TranscriptionResult;
use crate::registry::{Device, ModelRegistry};

/// Audio file → transcript, with an optional expected-language gate.
pub struct TranscriptionEngine {
    config: EngineConfig,
    registry: ModelRegistry<RecognizerHandle>,
    loader: Arc<dyn RecognizerLoader>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl TranscriptionEngine {
    pub fn new(config: EngineConfig, device: Device, loader: impl RecognizerLoader) -> Self {
        Self::with_loader(config, device, Arc::new(loader))
    }

    pub fn with_loader(
        config: EngineConfig,
        device: Device,
        loader: Arc<dyn RecognizerLoader>,
    ) -> Self {
        Self {
            config,
            registry: ModelRegistry::new(device),
            loader,
            diagnostics: Arc::new(EngineDiagnostics::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry<RecognizerHandle> {
        &self.registry
    }

    pub fn diagnostics(&self) -> Arc<EngineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Transcribe `audio` with `model`.
    ///
    /// With `expected_language` set, a different detected language fails the
    /// request and the detected code is echoed back.
    pub async fn transcribe(
        &self,
        audio: &Path,
        model: &str,
        expected_language: Option<&str>,
    ) -> TranscriptionResult {
        let result = self.try_transcribe(audio, model, expected_language).await;
        if let Err(e) = &result {
            if e.is_terminal() {
                EngineDiagnostics::bump(&self.diagnostics.rejected);
                debug!(model, audio = ?audio, error = %e, "transcription rejected");
            } else {
                warn!(model, audio = ?audio, error = %e, code = e.code(), "transcription failed");
            }
        }
        result.into()
    }

    pub async fn try_transcribe(
        &self,
        audio: &Path,
        model: &str,
        expected_language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        EngineDiagnostics::bump(&self.diagnostics.requests);

        if !audio.exists() {
            return Err(SpeechError::AudioNotFound {
                path: audio.to_path_buf(),
            });
        }
        let expected = expected_language.filter(|lang| !lang.is_empty());

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.recognize(audio.to_path_buf(), model, expected))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                EngineDiagnostics::bump(&self.diagnostics.timeouts);
                Err(SpeechError::Timeout(timeout))
            }
        }
    }

    /// Load (and warm up) `model` ahead of the first request.
    pub async fn preload(&self, model: &str) -> Result<()> {
        self.handle(model).await.map(|_| ())
    }

    async fn handle(&self, model: &str) -> Result<RecognizerHandle> {
        let loader = Arc::clone(&self.loader);
        self.registry
            .get_or_load(self.registry.key(model), move |key| {
                let handle = loader.load(key)?;
                handle.0.lock().warm_up()?;
                Ok(handle)
            })
            .await
    }

    async fn recognize(
        &self,
        audio: PathBuf,
        model: &str,
        expected: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let handle = self.handle(model).await?;

        EngineDiagnostics::bump(&self.diagnostics.inference_calls);
        let started = Instant::now();
        let hint = expected.map(str::to_owned);
        let recognition = tokio::task::spawn_blocking(move || {
            handle.0.lock().transcribe(&audio, hint.as_deref())
        })
        .await
        .map_err(|e| SpeechError::InternalError(format!("transcription task failed: {e}")))
        .and_then(|r| r)
        .inspect_err(|_| EngineDiagnostics::bump(&self.diagnostics.inference_errors))?;

        let detected = recognition
            .language
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        if let Some(expected) = expected {
            if detected != expected {
                return Err(SpeechError::LanguageMismatch {
                    detected,
                    expected: expected.to_string(),
                });
            }
        }

        let segments: Vec<Segment> = recognition
            .segments
            .into_iter()
            .map(|seg| Segment {
                text: seg.text.trim().to_string(),
                ..seg
            })
            .collect();

        info!(
            model,
            language = %detected,
            segments = segments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transcribed"
        );
        Ok(TranscriptionResult::transcribed(
            recognition.text.trim().to_string(),
            detected,
            segments,
        ))
    }
}

impl std::fmt::Debug for TranscriptionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::inference::{Recognition, SpeechRecognizer};
    use crate::protocol::TranscriptionSuccess;
    use crate::registry::ModelKey;

    /// Returns a scripted recognition and records the hint it was given.
    struct ScriptedRecognizer {
        recognition: Recognition,
        hints: Arc<parking_lot::Mutex<Vec<Option<String>>>>,
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn transcribe(&mut self, _audio: &Path, language: Option<&str>) -> Result<Recognition> {
            self.hints.lock().push(language.map(str::to_owned));
            Ok(self.recognition.clone())
        }
    }

    struct Harness {
        engine: TranscriptionEngine,
        loads: Arc<AtomicUsize>,
        hints: Arc<parking_lot::Mutex<Vec<Option<String>>>>,
        dir: tempfile::TempDir,
    }

    fn harness(recognition: Recognition) -> Harness {
        let loads = Arc::new(AtomicUsize::new(0));
        let hints = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (l, h) = (Arc::clone(&loads), Arc::clone(&hints));
        let engine = TranscriptionEngine::new(
            EngineConfig::default(),
            Device::Cpu,
            move |_: &ModelKey| {
                l.fetch_add(1, Ordering::SeqCst);
                Ok(RecognizerHandle::new(ScriptedRecognizer {
                    recognition: recognition.clone(),
                    hints: Arc::clone(&h),
                }))
            },
        );
        Harness {
            engine,
            loads,
            hints,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn recognition(language: Option<&str>) -> Recognition {
        Recognition {
            text: "  Hello there.  ".into(),
            language: language.map(str::to_owned),
            segments: vec![
                Segment {
                    start: 0.0,
                    end: 0.8,
                    text: " Hello".into(),
                },
                Segment {
                    start: 0.8,
                    end: 1.4,
                    text: " there. ".into(),
                },
            ],
        }
    }

    fn audio_file(dir: &Path) -> PathBuf {
        let path = dir.join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        path
    }

    #[tokio::test]
    async fn matching_language_returns_trimmed_transcript() {
        let h = harness(recognition(Some("en")));
        let audio = audio_file(h.dir.path());

        let result = h.engine.transcribe(&audio, "tiny.en", Some("en")).await;
        let TranscriptionSuccess {
            text,
            language,
            segments,
            ..
        } = match result {
            TranscriptionResult::Success(ok) => ok,
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!(text, "Hello there.");
        assert_eq!(language, "en");
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["Hello", "there."]);
        assert_eq!(segments[1].start, 0.8);
        assert_eq!(h.hints.lock().as_slice(), [Some("en".to_string())]);
    }

    #[tokio::test]
    async fn mismatch_echoes_detected_language() {
        let h = harness(recognition(Some("fr")));
        let audio = audio_file(h.dir.path());

        let result = h.engine.transcribe(&audio, "tiny.en", Some("en")).await;
        assert!(!result.is_success());
        assert_eq!(result.error_code(), Some("language_mismatch"));
        assert_eq!(result.language(), Some("fr"));
        assert_eq!(h.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_expected_language_skips_the_check() {
        let h = harness(recognition(None));
        let audio = audio_file(h.dir.path());

        let result = h.engine.transcribe(&audio, "tiny", None).await;
        assert!(result.is_success());
        assert_eq!(result.language(), Some(UNKNOWN_LANGUAGE));
        assert_eq!(h.hints.lock().as_slice(), [None]);
    }

    #[tokio::test]
    async fn missing_audio_never_loads_a_model() {
        let h = harness(recognition(Some("en")));

        let result = h
            .engine
            .transcribe(Path::new("/nonexistent/path.wav"), "tiny.en", Some("en"))
            .await;
        assert_eq!(result.error_code(), Some("audio_not_found"));
        assert_eq!(h.loads.load(Ordering::SeqCst), 0);
        assert_eq!(h.engine.registry().load_count(), 0);
    }

    #[tokio::test]
    async fn model_is_loaded_once_across_requests() {
        let h = harness(recognition(Some("en")));
        let audio = audio_file(h.dir.path());

        for _ in 0..3 {
            assert!(h.engine.transcribe(&audio, "tiny.en", Some("en")).await.is_success());
        }
        assert_eq!(h.loads.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.diagnostics().snapshot().inference_calls, 3);
    }
}
