use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ContentCache};
use crate::engine::{EngineConfig, EngineDiagnostics};
use crate::error::{Result, SpeechError};
use crate::inference::{SynthesizerHandle, SynthesizerLoader};
use crate::protocol::SynthesisResult;
use crate::registry::{Device, ModelRegistry};
use crate::text::{self, NormalizedText};

/// Text → cached audio artifact.
pub struct SynthesisEngine {
    config: EngineConfig,
    registry: ModelRegistry<SynthesizerHandle>,
    loader: Arc<dyn SynthesizerLoader>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl SynthesisEngine {
    pub fn new(config: EngineConfig, device: Device, loader: impl SynthesizerLoader) -> Self {
        Self::with_loader(config, device, Arc::new(loader))
    }

    pub fn with_loader(
        config: EngineConfig,
        device: Device,
        loader: Arc<dyn SynthesizerLoader>,
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

    pub fn registry(&self) -> &ModelRegistry<SynthesizerHandle> {
        &self.registry
    }

    pub fn diagnostics(&self) -> Arc<EngineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Synthesize `raw` with `model` into `output_dir`.
    ///
    /// Never fails: every error is folded into a failure result.
    pub async fn synthesize(&self, raw: &str, model: &str, output_dir: &Path) -> SynthesisResult {
        let result = self.try_synthesize(raw, model, output_dir).await;
        if let Err(e) = &result {
            if e.is_terminal() {
                EngineDiagnostics::bump(&self.diagnostics.rejected);
                debug!(model, error = %e, "synthesis rejected");
            } else {
                warn!(model, error = %e, code = e.code(), "synthesis failed");
            }
        }
        result.into()
    }

    pub async fn try_synthesize(
        &self,
        raw: &str,
        model: &str,
        output_dir: &Path,
    ) -> Result<SynthesisResult> {
        EngineDiagnostics::bump(&self.diagnostics.requests);

        let text = text::normalize(raw)?;
        let cache = ContentCache::new(output_dir);
        cache.ensure_dir()?;
        let key = ContentCache::key(&text, model);

        if let Some(hit) = cache.lookup(&key) {
            EngineDiagnostics::bump(&self.diagnostics.cache_hits);
            debug!(model, path = ?hit.path, "synthesis cache hit");
            return Ok(SynthesisResult::cached(&hit.path, hit.size, model));
        }
        EngineDiagnostics::bump(&self.diagnostics.cache_misses);

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.render(text, model, &cache, &key)).await {
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

    async fn handle(&self, model: &str) -> Result<SynthesizerHandle> {
        let loader = Arc::clone(&self.loader);
        self.registry
            .get_or_load(self.registry.key(model), move |key| {
                let handle = loader.load(key)?;
                handle.0.lock().warm_up()?;
                Ok(handle)
            })
            .await
    }

    async fn render(
        &self,
        text: NormalizedText,
        model: &str,
        cache: &ContentCache,
        key: &CacheKey,
    ) -> Result<SynthesisResult> {
        let handle = self.handle(model).await?;

        EngineDiagnostics::bump(&self.diagnostics.inference_calls);
        let started = Instant::now();
        let chars = text.char_count();
        let bytes = tokio::task::spawn_blocking(move || handle.0.lock().synthesize(&text))
            .await
            .map_err(|e| SpeechError::InternalError(format!("synthesis task failed: {e}")))
            .and_then(|r| r)
            .inspect_err(|_| EngineDiagnostics::bump(&self.diagnostics.inference_errors))?;

        if bytes.is_empty() {
            return Err(SpeechError::ArtifactNotProduced);
        }
        let artifact = cache.store(key, &bytes)?;
        if artifact.size == 0 || !artifact.path.is_file() {
            return Err(SpeechError::ArtifactNotProduced);
        }

        info!(
            model,
            chars,
            bytes = artifact.size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "synthesized"
        );
        Ok(SynthesisResult::synthesized(
            &artifact.path,
            artifact.size,
            model,
            self.registry.device(),
        ))
    }
}

impl std::fmt::Debug for SynthesisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
