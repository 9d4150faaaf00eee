//! Parley speech sidecar: synthesis and transcription HTTP services.

use std::future::IntoFuture;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod backends;
mod error;
mod settings;
mod state;

use parley_core::{Device, DiagnosticsSnapshot, SynthesisEngine, TranscriptionEngine};
use settings::{load_settings, settings_path};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info,parley_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Parley starting");

    let path = settings_path();
    let mut settings = load_settings(&path);
    settings.apply_env_overrides();
    settings.normalize();
    info!(
        settings_path = ?path,
        host = %settings.host,
        tts_port = settings.tts_port,
        stt_port = settings.stt_port,
        output_dir = ?settings.output_dir,
        tts_backend = %settings.tts_backend,
        stt_backend = %settings.stt_backend,
        "settings loaded"
    );

    // ── Engines ───────────────────────────────────────────────────────────
    let device = Device::probe(settings.device_preference());
    let config = settings.to_engine_config();
    let synthesis = Arc::new(SynthesisEngine::with_loader(
        config.clone(),
        device,
        backends::synthesizer_loader(&settings),
    ));
    let transcription = Arc::new(TranscriptionEngine::with_loader(
        config,
        device,
        backends::recognizer_loader(&settings),
    ));

    if settings.preload {
        preload(&synthesis, &transcription).await;
    }

    // ── Listeners ─────────────────────────────────────────────────────────
    let tts_addr = format!("{}:{}", settings.host, settings.tts_port);
    let stt_addr = format!("{}:{}", settings.host, settings.stt_port);
    let tts_listener = TcpListener::bind(&tts_addr).await?;
    let stt_listener = TcpListener::bind(&stt_addr).await?;

    let tts_app = api::synthesis_router(AppState::new(
        Arc::clone(&synthesis),
        Arc::clone(&transcription),
        settings.max_concurrent_requests,
    ));
    let stt_app = api::transcription_router(AppState::new(
        Arc::clone(&synthesis),
        Arc::clone(&transcription),
        settings.max_concurrent_requests,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!("TTS service listening on http://{tts_addr}");
    info!("STT service listening on http://{stt_addr}");
    let tts_server = axum::serve(tts_listener, tts_app)
        .with_graceful_shutdown(wait_for(shutdown_rx.clone()));
    let stt_server =
        axum::serve(stt_listener, stt_app).with_graceful_shutdown(wait_for(shutdown_rx));

    info!("Server ready. Press Ctrl+C to stop.");
    tokio::try_join!(tts_server.into_future(), stt_server.into_future())?;

    log_diagnostics("synthesis", synthesis.diagnostics().snapshot());
    log_diagnostics("transcription", transcription.diagnostics().snapshot());
    info!(
        tts_models = ?synthesis.registry().loaded_keys(),
        stt_models = ?transcription.registry().loaded_keys(),
        "Parley stopped"
    );
    Ok(())
}

/// Load the default models up front. Failures are left for the first request.
async fn preload(synthesis: &SynthesisEngine, transcription: &TranscriptionEngine) {
    let tts_model = synthesis.config().default_tts_model.clone();
    let stt_model = transcription.config().default_stt_model.clone();
    let (tts, stt) = tokio::join!(
        synthesis.preload(&tts_model),
        transcription.preload(&stt_model)
    );
    if let Err(e) = tts {
        warn!(model = %tts_model, error = %e, "TTS preload failed; loading on first use");
    }
    if let Err(e) = stt {
        warn!(model = %stt_model, error = %e, "STT preload failed; loading on first use");
    }
}

fn log_diagnostics(engine: &str, snap: DiagnosticsSnapshot) {
    info!(
        engine,
        requests = snap.requests,
        cache_hits = snap.cache_hits,
        cache_misses = snap.cache_misses,
        inference_calls = snap.inference_calls,
        inference_errors = snap.inference_errors,
        rejected = snap.rejected,
        timeouts = snap.timeouts,
        "engine diagnostics"
    );
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
