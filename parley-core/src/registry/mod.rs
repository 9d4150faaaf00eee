//! Model registry: loads each model at most once and shares it.
//!
//! ## Single-flight
//!
//! ```text
//! get_or_load(key) ─► slots.lock(): entry(key).or_default()   (short critical section)
//!                      └─► OnceCell::get_or_try_init(load)    (per key, outside the map lock)
//! ```
//!
//! The first caller for a key runs the loader on the blocking pool; everyone
//! else asking for that key waits on the same cell and gets the same handle.
//! Different keys never contend beyond the map insert. A failed load leaves
//! the cell empty, so the next request retries.
//!
//! The load runs in its own task, so a caller that gives up (timeout, client
//! disconnect) does not abort a load other callers are waiting on.

pub mod device;

use std::collections::HashMap;
use std::fmt;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{Result, SpeechError};

pub use device::{Device, DevicePreference};

/// Identifies one loaded model instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    name: String,
    device: Device,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, device: Device) -> Self {
        Self {
            name: name.into(),
            device,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.device)
    }
}

type Slot<H> = Arc<OnceCell<H>>;

/// Concurrency-safe map from [`ModelKey`] to a loaded handle `H`.
///
/// `H` is a cheap-to-clone shared handle (see
/// [`SynthesizerHandle`](crate::inference::SynthesizerHandle)). Handles are
/// never evicted.
pub struct ModelRegistry<H> {
    device: Device,
    slots: Mutex<HashMap<ModelKey, Slot<H>>>,
    loads: Arc<AtomicUsize>,
}

impl<H> ModelRegistry<H>
where
    H: Clone + Send + Sync + 'static,
{
    pub fn new(device: Device) -> Self {
        Self {
            device,
            slots: Mutex::new(HashMap::new()),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The process-wide device every key from [`Self::key`] is bound to.
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn key(&self, model: &str) -> ModelKey {
        ModelKey::new(model, self.device)
    }

    /// Return the handle for `key`, running `loader` if nobody has loaded it yet.
    ///
    /// # Errors
    /// [`SpeechError::LoadError`] if the loader fails or panics. Nothing is
    /// cached on failure.
    pub async fn get_or_load<F>(&self, key: ModelKey, loader: F) -> Result<H>
    where
        F: FnOnce(&ModelKey) -> Result<H> + Send + 'static,
    {
        let cell = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        if let Some(handle) = cell.get() {
            return Ok(handle.clone());
        }

        let loads = Arc::clone(&self.loads);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            cell.get_or_try_init(|| load_blocking(task_key, loader, loads))
                .await
                .cloned()
        });

        task.await
            .map_err(|e| SpeechError::load(&key, format!("load task failed: {e}")))?
    }

    /// Handle for `key` if it has finished loading.
    pub fn get(&self, key: &ModelKey) -> Option<H> {
        self.slots.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Keys with a loaded handle, sorted for stable logging.
    pub fn loaded_keys(&self) -> Vec<ModelKey> {
        let mut keys: Vec<ModelKey> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        keys
    }

    /// Number of successful loads since start.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl<H> fmt::Debug for ModelRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("device", &self.device)
            .field("slots", &self.slots.lock().len())
            .finish_non_exhaustive()
    }
}

async fn load_blocking<H, F>(key: ModelKey, loader: F, loads: Arc<AtomicUsize>) -> Result<H>
where
    H: Send + 'static,
    F: FnOnce(&ModelKey) -> Result<H> + Send + 'static,
{
    info!(model = %key, "loading model");
    let started = Instant::now();
    let blocking_key = key.clone();

    let loaded = tokio::task::spawn_blocking(move || loader(&blocking_key))
        .await
        .map_err(|e| SpeechError::load(&key, format!("loader panicked: {e}")))?;

    match loaded {
        Ok(handle) => {
            loads.fetch_add(1, Ordering::Relaxed);
            info!(
                model = %key,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "model loaded"
            );
            Ok(handle)
        }
        Err(err @ SpeechError::LoadError { .. }) => {
            warn!(model = %key, error = %err, "model load failed");
            Err(err)
        }
        Err(other) => {
            warn!(model = %key, error = %other, "model load failed");
            Err(SpeechError::load(&key, other))
        }
    }
}
