//! Server settings (JSON file in the data directory, then `PARLEY_*` overrides).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use parley_core::engine::{
    DEFAULT_LANGUAGE, DEFAULT_OUTPUT_DIR, DEFAULT_STT_MODEL, DEFAULT_TTS_MODEL,
};
use parley_core::inference::command::{DEFAULT_STT_PROGRAM, DEFAULT_TTS_PROGRAM};
use parley_core::{DevicePreference, EngineConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_TTS_PORT: u16 = 8765;
pub const DEFAULT_STT_PORT: u16 = 8766;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub tts_port: u16,
    pub stt_port: u16,
    pub output_dir: PathBuf,
    /// `auto`, `cpu` or `cuda`.
    pub device: String,
    /// `command` or `stub`.
    pub tts_backend: String,
    pub stt_backend: String,
    pub tts_program: String,
    pub stt_program: String,
    pub default_tts_model: String,
    pub default_stt_model: String,
    /// Expected language for transcription requests that omit one.
    pub default_language: Option<String>,
    pub model_cache_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
    pub preload: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            tts_port: DEFAULT_TTS_PORT,
            stt_port: DEFAULT_STT_PORT,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            device: "auto".into(),
            tts_backend: "command".into(),
            stt_backend: "command".into(),
            tts_program: DEFAULT_TTS_PROGRAM.into(),
            stt_program: DEFAULT_STT_PROGRAM.into(),
            default_tts_model: DEFAULT_TTS_MODEL.into(),
            default_stt_model: DEFAULT_STT_MODEL.into(),
            default_language: Some(DEFAULT_LANGUAGE.into()),
            model_cache_dir: None,
            request_timeout_secs: 300,
            max_concurrent_requests: 100,
            preload: false,
        }
    }
}

/// Which inference implementation backs a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Command,
    Stub,
}

impl BackendKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stub" | "fake" | "dev" => BackendKind::Stub,
            _ => BackendKind::Command,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Command => "command",
            BackendKind::Stub => "stub",
        }
    }
}

impl ServerSettings {
    pub fn normalize(&mut self) {
        let defaults = ServerSettings::default();

        self.host = non_empty(&self.host).unwrap_or(defaults.host);
        if self.tts_port == 0 {
            self.tts_port = defaults.tts_port;
        }
        if self.stt_port == 0 {
            self.stt_port = defaults.stt_port;
        }
        if self.output_dir.as_os_str().is_empty() {
            self.output_dir = defaults.output_dir;
        }
        self.device = normalize_device(&self.device);
        self.tts_backend = BackendKind::parse(&self.tts_backend).as_str().into();
        self.stt_backend = BackendKind::parse(&self.stt_backend).as_str().into();
        self.tts_program = non_empty(&self.tts_program).unwrap_or(defaults.tts_program);
        self.stt_program = non_empty(&self.stt_program).unwrap_or(defaults.stt_program);
        self.default_tts_model =
            non_empty(&self.default_tts_model).unwrap_or(defaults.default_tts_model);
        self.default_stt_model =
            non_empty(&self.default_stt_model).unwrap_or(defaults.default_stt_model);
        self.default_language = self
            .default_language
            .as_deref()
            .and_then(non_empty)
            .map(|lang| lang.to_ascii_lowercase());
        self.model_cache_dir = self
            .model_cache_dir
            .take()
            .filter(|dir| !dir.as_os_str().is_empty());
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 3_600);
        self.max_concurrent_requests = self.max_concurrent_requests.clamp(1, 10_000);
    }

    /// Apply `PARLEY_*` environment variables on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("PARLEY_HOST") {
            self.host = host;
        }
        if let Some(port) = parse_var(&lookup, "PARLEY_TTS_PORT", self.tts_port) {
            self.tts_port = port;
        }
        if let Some(port) = parse_var(&lookup, "PARLEY_STT_PORT", self.stt_port) {
            self.stt_port = port;
        }
        if let Some(dir) = lookup("PARLEY_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(device) = lookup("PARLEY_DEVICE") {
            self.device = device;
        }
        if let Some(backend) = lookup("PARLEY_TTS_BACKEND") {
            self.tts_backend = backend;
        }
        if let Some(backend) = lookup("PARLEY_STT_BACKEND") {
            self.stt_backend = backend;
        }
        if let Some(dir) = lookup("PARLEY_MODEL_CACHE_DIR") {
            self.model_cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = parse_var(
            &lookup,
            "PARLEY_REQUEST_TIMEOUT_SECS",
            self.request_timeout_secs,
        ) {
            self.request_timeout_secs = secs;
        }
        if let Some(max) = parse_var(
            &lookup,
            "PARLEY_MAX_CONCURRENT_REQUESTS",
            self.max_concurrent_requests,
        ) {
            self.max_concurrent_requests = max;
        }
        if let Some(raw) = lookup("PARLEY_PRELOAD") {
            self.preload = matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    pub fn device_preference(&self) -> DevicePreference {
        DevicePreference::parse(&self.device)
    }

    pub fn tts_backend(&self) -> BackendKind {
        BackendKind::parse(&self.tts_backend)
    }

    pub fn stt_backend(&self) -> BackendKind {
        BackendKind::parse(&self.stt_backend)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_tts_model: self.default_tts_model.clone(),
            default_stt_model: self.default_stt_model.clone(),
            default_output_dir: self.output_dir.clone(),
            default_language: self.default_language.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn normalize_device(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cpu" => "cpu".into(),
        "cuda" | "gpu" | "accelerator" => "cuda".into(),
        _ => "auto".into(),
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, current: T) -> Option<T>
where
    T: FromStr + std::fmt::Display,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Invalid {name}='{raw}', keeping {current}");
            None
        }
    }
}

/// `PARLEY_SETTINGS` if set, else the platform data directory.
pub fn settings_path() -> PathBuf {
    std::env::var_os("PARLEY_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path)
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Parley")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("parley")
            .join("settings.json")
    }
}

/// Read settings from `path`. A missing file yields defaults; an unreadable
/// one is reported and also yields defaults.
pub fn load_settings(path: &Path) -> ServerSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<ServerSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = ?path, error = %e, "invalid settings file, using defaults");
            ServerSettings::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ServerSettings::default(),
        Err(e) => {
            warn!(path = ?path, error = %e, "cannot read settings file, using defaults");
            ServerSettings::default()
        }
    };
    settings.normalize();
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("nope.json"));
        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.tts_port, 8765);
        assert_eq!(settings.stt_port, 8766);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"ttsPort": 9000, "device": "GPU", "defaultLanguage": " "}"#).unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.tts_port, 9000);
        assert_eq!(settings.stt_port, DEFAULT_STT_PORT);
        assert_eq!(settings.device, "cuda");
        assert_eq!(settings.default_language, None);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), ServerSettings::default());
    }

    #[test]
    fn env_overrides_apply_and_bad_numbers_are_ignored() {
        let mut settings = ServerSettings::default();
        settings.apply_overrides(overrides(&[
            ("PARLEY_TTS_PORT", "9100"),
            ("PARLEY_STT_PORT", "not-a-port"),
            ("PARLEY_TTS_BACKEND", "stub"),
            ("PARLEY_REQUEST_TIMEOUT_SECS", "0"),
            ("PARLEY_PRELOAD", "true"),
            ("PARLEY_MODEL_CACHE_DIR", "/var/cache/parley"),
        ]));
        settings.normalize();

        assert_eq!(settings.tts_port, 9100);
        assert_eq!(settings.stt_port, DEFAULT_STT_PORT);
        assert_eq!(settings.tts_backend(), BackendKind::Stub);
        assert_eq!(settings.stt_backend(), BackendKind::Command);
        assert_eq!(settings.request_timeout_secs, 1);
        assert!(settings.preload);
        assert_eq!(
            settings.model_cache_dir.as_deref(),
            Some(Path::new("/var/cache/parley"))
        );
    }

    #[test]
    fn engine_config_mirrors_settings() {
        let settings = ServerSettings {
            output_dir: PathBuf::from("/srv/audio"),
            request_timeout_secs: 42,
            ..ServerSettings::default()
        };
        let config = settings.to_engine_config();
        assert_eq!(config.default_output_dir, PathBuf::from("/srv/audio"));
        assert_eq!(config.request_timeout, Duration::from_secs(42));
        assert_eq!(config.default_tts_model, DEFAULT_TTS_MODEL);
        assert_eq!(config.default_language.as_deref(), Some("en"));
    }
}
