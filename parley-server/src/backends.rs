//! Backend selection from settings.

use std::sync::Arc;

use parley_core::inference::command::{
    resolve_program, CommandRecognizerLoader, CommandSynthesizerLoader,
};
use parley_core::inference::stub::{StubRecognizerLoader, StubSynthesizerLoader};
use parley_core::{RecognizerLoader, SynthesizerLoader};
use tracing::{info, warn};

use crate::settings::{BackendKind, ServerSettings};

pub fn synthesizer_loader(settings: &ServerSettings) -> Arc<dyn SynthesizerLoader> {
    match settings.tts_backend() {
        BackendKind::Stub => {
            info!("TTS backend: stub");
            Arc::new(StubSynthesizerLoader)
        }
        BackendKind::Command => {
            check_program("TTS", &settings.tts_program);
            Arc::new(command_synthesizer(settings))
        }
    }
}

pub fn recognizer_loader(settings: &ServerSettings) -> Arc<dyn RecognizerLoader> {
    match settings.stt_backend() {
        BackendKind::Stub => {
            info!("STT backend: stub");
            Arc::new(StubRecognizerLoader::default())
        }
        BackendKind::Command => {
            check_program("STT", &settings.stt_program);
            Arc::new(command_recognizer(settings))
        }
    }
}

/// Inference children are killed once a request's deadline has passed.
fn command_synthesizer(settings: &ServerSettings) -> CommandSynthesizerLoader {
    CommandSynthesizerLoader {
        program: settings.tts_program.clone(),
        model_cache_dir: settings.model_cache_dir.clone(),
        timeout: Some(settings.request_timeout()),
    }
}

fn command_recognizer(settings: &ServerSettings) -> CommandRecognizerLoader {
    CommandRecognizerLoader {
        program: settings.stt_program.clone(),
        model_cache_dir: settings.model_cache_dir.clone(),
        timeout: Some(settings.request_timeout()),
    }
}

/// Startup hint only; a missing program surfaces as a load error per request.
fn check_program(side: &str, program: &str) {
    match resolve_program(program) {
        Some(path) => info!(program = ?path, "{side} backend: command"),
        None => warn!("{side} program '{program}' not found on PATH; requests will fail until it is installed"),
    }
}
