//! Shared handler state.

use std::sync::Arc;

use parley_core::{SynthesisEngine, TranscriptionEngine};
use tokio::sync::{AcquireError, Semaphore, SemaphorePermit};

/// Engines plus the per-service concurrency limit.
///
/// Each service gets its own `AppState` (and so its own semaphore); the
/// engines behind the `Arc`s are shared.
#[derive(Clone)]
pub struct AppState {
    pub synthesis: Arc<SynthesisEngine>,
    pub transcription: Arc<TranscriptionEngine>,
    /// Bounds engine requests in flight on this service.
    pub request_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        synthesis: Arc<SynthesisEngine>,
        transcription: Arc<TranscriptionEngine>,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            synthesis,
            transcription,
            request_semaphore: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        }
    }

    /// Acquire a permit for one engine request.
    pub async fn acquire_permit(&self) -> Result<SemaphorePermit<'_>, AcquireError> {
        self.request_semaphore.acquire().await
    }
}
