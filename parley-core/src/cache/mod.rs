//! Filesystem-backed, content-addressed artifact cache.
//!
//! An artifact's existence at its derived path *is* the cache entry; there is
//! no index. File names are
//!
//! ```text
//! tts_<md5(model id)[..8]>_<md5(normalized text)>.wav
//! ```
//!
//! and must stay byte-for-byte stable so caches survive restarts and can be
//! shared with other processes. Writes go to a temp file in the same
//! directory and are renamed into place, so readers never see partial audio.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use md5::{Digest, Md5};
use tracing::debug;

use crate::error::{Result, SpeechError};
use crate::text::NormalizedText;

const ARTIFACT_PREFIX: &str = "tts";
const ARTIFACT_EXT: &str = "wav";
const MODEL_HASH_HEX_LEN: usize = 8;

/// Deterministic fingerprint of `(normalized text, model id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    model_hash: String,
    text_hash: String,
}

impl CacheKey {
    pub fn new(text: &NormalizedText, model_id: &str) -> Self {
        Self::from_parts(text.as_str(), model_id)
    }

    fn from_parts(text: &str, model_id: &str) -> Self {
        let mut model_hash = md5_hex(model_id.as_bytes());
        model_hash.truncate(MODEL_HASH_HEX_LEN);
        Self {
            model_hash,
            text_hash: md5_hex(text.as_bytes()),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{ARTIFACT_PREFIX}_{}_{}.{ARTIFACT_EXT}",
            self.model_hash, self.text_hash
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.model_hash, self.text_hash)
    }
}

fn md5_hex(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// A cached artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
}

/// Content cache rooted at one output directory.
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn key(text: &NormalizedText, model_id: &str) -> CacheKey {
        CacheKey::new(text, model_id)
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Create the output directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Returns the artifact for `key`, or `None` on a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<Artifact> {
        let path = self.path_for(key);
        let meta = fs::metadata(&path).ok()?;
        if !meta.is_file() {
            return None;
        }
        debug!(path = ?path, size = meta.len(), "cache hit");
        Some(Artifact {
            path,
            size: meta.len(),
        })
    }

    /// Atomically persist `bytes` as the artifact for `key`.
    ///
    /// Concurrent stores of the same key are fine: each writes its own temp
    /// file and the last rename wins.
    pub fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<Artifact> {
        self.ensure_dir()?;
        let path = self.path_for(key);

        let mut tmp = tempfile::Builder::new()
            .prefix(".parley-")
            .suffix(".part")
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| SpeechError::Io(e.error))?;

        let size = fs::metadata(&path)?.len();
        debug!(path = ?path, size, "artifact stored");
        Ok(Artifact { path, size })
    }
}
