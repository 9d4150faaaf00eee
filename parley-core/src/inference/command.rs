//! Command backends: external inference programs run as child processes.
//!
//! | Side | Invocation |
//! |------|------------|
//! | TTS  | `<program> --text <t> --model_name <m> --out_path <tmp>/out.wav [--use_cuda true]` |
//! | STT  | `<program> <audio> --model <m> --output_format json --output_dir <tmp> --device <d> [--language <l>]` |
//!
//! The defaults (`tts`, `whisper`) match the Coqui TTS and openai-whisper
//! command lines. "Loading" a model only resolves the program on `PATH`; the
//! program itself pulls weights into the model cache directory on first use.
//!
//! A child that outlives its loader's `timeout` is killed, so a hung program
//! releases the handle instead of holding it for every later request.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SpeechError};
use crate::inference::{
    RecognizerHandle, RecognizerLoader, Recognition, Segment, SpeechRecognizer,
    SpeechSynthesizer, SynthesizerHandle, SynthesizerLoader,
};
use crate::registry::{Device, ModelKey};
use crate::text::NormalizedText;

pub const DEFAULT_TTS_PROGRAM: &str = "tts";
pub const DEFAULT_STT_PROGRAM: &str = "whisper";

/// Max stderr bytes carried into an error message.
const STDERR_TAIL: usize = 600;

/// How often a running child is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Synthesizer backed by an external TTS command.
pub struct CommandSynthesizer {
    program: PathBuf,
    model: String,
    device: Device,
    model_cache_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn synthesize(&mut self, text: &NormalizedText) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let out_path = scratch.path().join("out.wav");

        let mut cmd = Command::new(&self.program);
        cmd.arg("--text")
            .arg(text.as_str())
            .arg("--model_name")
            .arg(&self.model)
            .arg("--out_path")
            .arg(&out_path);
        if self.device.is_accelerator() {
            cmd.args(["--use_cuda", "true"]);
        }
        if let Some(dir) = &self.model_cache_dir {
            cmd.env("TTS_HOME", dir).env("XDG_CACHE_HOME", dir);
        }

        run(&mut cmd, &self.program, scratch.path(), self.timeout)?;

        // A zero exit code without an output file is reported as empty audio.
        match fs::read(&out_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Recognizer backed by an external STT command emitting whisper-style JSON.
pub struct CommandRecognizer {
    program: PathBuf,
    model: String,
    device: Device,
    model_cache_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

/// Subset of the whisper JSON result file.
#[derive(Debug, Deserialize)]
struct TranscriptFile {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<Segment>,
}

impl SpeechRecognizer for CommandRecognizer {
    fn transcribe(&mut self, audio: &Path, language: Option<&str>) -> Result<Recognition> {
        let scratch = tempfile::tempdir()?;

        let mut cmd = Command::new(&self.program);
        cmd.arg(audio)
            .arg("--model")
            .arg(&self.model)
            .args(["--output_format", "json"])
            .arg("--output_dir")
            .arg(scratch.path())
            .args(["--device", self.device.as_str()]);
        if let Some(lang) = language {
            cmd.args(["--language", lang]);
        }
        if !self.device.is_accelerator() {
            cmd.args(["--fp16", "False"]);
        }
        if let Some(dir) = &self.model_cache_dir {
            cmd.env("XDG_CACHE_HOME", dir);
        }

        run(&mut cmd, &self.program, scratch.path(), self.timeout)?;

        let stem = audio
            .file_stem()
            .unwrap_or_else(|| OsStr::new("audio"))
            .to_string_lossy();
        let json_path = scratch.path().join(format!("{stem}.json"));
        let raw = fs::read_to_string(&json_path).map_err(|e| {
            SpeechError::InternalError(format!(
                "transcript not produced at {}: {e}",
                json_path.display()
            ))
        })?;
        let parsed: TranscriptFile = serde_json::from_str(&raw)
            .map_err(|e| SpeechError::InternalError(format!("invalid transcript JSON: {e}")))?;

        Ok(Recognition {
            text: parsed.text,
            language: parsed.language,
            segments: parsed.segments,
        })
    }
}

/// Run `cmd` to completion, killing it once `timeout` has elapsed.
///
/// Stderr goes to a file in `scratch` so a chatty child never blocks on a
/// full pipe while we poll it.
fn run(cmd: &mut Command, program: &Path, scratch: &Path, timeout: Option<Duration>) -> Result<()> {
    let stderr_path = scratch.join("stderr.log");
    let stderr = fs::File::create(&stderr_path)?;
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(stderr);

    debug!(program = ?program, "spawning inference command");
    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| SpeechError::InternalError(format!("failed to run {}: {e}", program.display())))?;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    program = ?program,
                    timeout_ms = limit.as_millis() as u64,
                    "inference command timed out; killed"
                );
                return Err(SpeechError::Timeout(limit));
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    if !status.success() {
        let stderr = fs::read(&stderr_path).unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr);
        let tail = tail_chars(stderr.trim(), STDERR_TAIL);
        return Err(SpeechError::InternalError(format!(
            "{} exited with {status}: {tail}",
            program.display()
        )));
    }
    debug!(
        program = ?program,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "inference command finished"
    );
    Ok(())
}

fn tail_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Resolve `program` to an executable path: explicit paths are checked
/// directly, bare names are searched on `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Loader that binds a TTS command to a model key.
#[derive(Debug, Clone)]
pub struct CommandSynthesizerLoader {
    pub program: String,
    pub model_cache_dir: Option<PathBuf>,
    /// Deadline for one inference call; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for CommandSynthesizerLoader {
    fn default() -> Self {
        Self {
            program: DEFAULT_TTS_PROGRAM.into(),
            model_cache_dir: None,
            timeout: None,
        }
    }
}

impl SynthesizerLoader for CommandSynthesizerLoader {
    fn load(&self, key: &ModelKey) -> Result<SynthesizerHandle> {
        let program = resolve_program(&self.program)
            .ok_or_else(|| SpeechError::load(key, format!("{} not found on PATH", self.program)))?;
        info!(model = %key, program = ?program, "TTS command resolved");
        Ok(SynthesizerHandle::new(CommandSynthesizer {
            program,
            model: key.name().to_string(),
            device: key.device(),
            model_cache_dir: self.model_cache_dir.clone(),
            timeout: self.timeout,
        }))
    }
}

/// Loader that binds an STT command to a model key.
#[derive(Debug, Clone)]
pub struct CommandRecognizerLoader {
    pub program: String,
    pub model_cache_dir: Option<PathBuf>,
    /// Deadline for one inference call; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for CommandRecognizerLoader {
    fn default() -> Self {
        Self {
            program: DEFAULT_STT_PROGRAM.into(),
            model_cache_dir: None,
            timeout: None,
        }
    }
}

impl RecognizerLoader for CommandRecognizerLoader {
    fn load(&self, key: &ModelKey) -> Result<RecognizerHandle> {
        let program = resolve_program(&self.program)
            .ok_or_else(|| SpeechError::load(key, format!("{} not found on PATH", self.program)))?;
        info!(model = %key, program = ?program, "STT command resolved");
        Ok(RecognizerHandle::new(CommandRecognizer {
            program,
            model: key.name().to_string(),
            device: key.device(),
            model_cache_dir: self.model_cache_dir.clone(),
            timeout: self.timeout,
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    use crate::text::normalize;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn missing_program_is_a_load_error() {
        let loader = CommandSynthesizerLoader {
            program: "/definitely/not/here/tts".into(),
            model_cache_dir: None,
            timeout: None,
        };
        let err = loader
            .load(&ModelKey::new("m", Device::Cpu))
            .unwrap_err();
        assert_eq!(err.code(), "load_error");
    }

    #[test]
    fn synthesizer_reads_the_written_file() {
        let dir = tempfile::tempdir().unwrap();
        // Writes the text argument ($2) into the --out_path argument ($6).
        let script = write_script(dir.path(), "fake-tts", r#"printf '%s' "$2" > "$6""#);
        let loader = CommandSynthesizerLoader {
            program: script.to_string_lossy().into_owned(),
            model_cache_dir: None,
            timeout: None,
        };

        let handle = loader.load(&ModelKey::new("m", Device::Cpu)).unwrap();
        let bytes = handle
            .0
            .lock()
            .synthesize(&normalize("hello there").unwrap())
            .unwrap();
        assert_eq!(bytes, b"hello there");
    }

    #[test]
    fn synthesizer_without_output_returns_empty_audio() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "silent-tts", "exit 0");
        let loader = CommandSynthesizerLoader {
            program: script.to_string_lossy().into_owned(),
            model_cache_dir: None,
            timeout: None,
        };
        let handle = loader.load(&ModelKey::new("m", Device::Cpu)).unwrap();
        let bytes = handle.0.lock().synthesize(&normalize("hi").unwrap()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn failing_command_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "broken-tts", "echo 'CUDA out of memory' >&2; exit 3");
        let loader = CommandSynthesizerLoader {
            program: script.to_string_lossy().into_owned(),
            model_cache_dir: None,
            timeout: None,
        };
        let handle = loader.load(&ModelKey::new("m", Device::Cpu)).unwrap();
        let err = handle.0.lock().synthesize(&normalize("hi").unwrap()).unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"), "{err}");
    }

    #[test]
    fn recognizer_parses_whisper_json() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("take1.wav");
        fs::write(&audio, b"RIFF").unwrap();
        // $7 is the --output_dir value.
        let script = write_script(
            dir.path(),
            "fake-whisper",
            r#"cat > "$7/take1.json" <<'EOF'
{"text": " Bonjour.", "language": "fr", "segments": [{"id": 0, "start": 0.0, "end": 1.5, "text": " Bonjour."}]}
EOF"#,
        );
        let loader = CommandRecognizerLoader {
            program: script.to_string_lossy().into_owned(),
            model_cache_dir: None,
            timeout: None,
        };

        let handle = loader.load(&ModelKey::new("tiny", Device::Cpu)).unwrap();
        let rec = handle.0.lock().transcribe(&audio, Some("en")).unwrap();
        assert_eq!(rec.language.as_deref(), Some("fr"));
        assert_eq!(rec.text, " Bonjour.");
        assert_eq!(rec.segments.len(), 1);
        assert_eq!(rec.segments[0].end, 1.5);
    }

    fn still_running(pid_file: &Path) -> bool {
        let pid = fs::read_to_string(pid_file).unwrap();
        Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success()
    }

    #[test]
    fn hung_synthesizer_is_killed_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("tts.pid");
        let script = write_script(
            dir.path(),
            "hung-tts",
            &format!("echo $$ > '{}'\nexec sleep 3", pid_file.display()),
        );
        let loader = CommandSynthesizerLoader {
            program: script.to_string_lossy().into_owned(),
            model_cache_dir: None,
            timeout: Some(Duration::from_millis(300)),
        };
        let handle = loader.load(&ModelKey::new("m", Device::Cpu)).unwrap();

        let started = Instant::now();
        let err = handle.0.lock().synthesize(&normalize("hi").unwrap()).unwrap_err();
        assert_eq!(err.code(), "timeout");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!still_running(&pid_file), "child outlived its deadline");

        // The handle is free again straight away.
        assert!(handle.0.try_lock().is_some());
    }

    #[test]
    fn hung_recognizer_is_killed_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("clip.wav");
        fs::write(&audio, b"RIFF").unwrap();
        let pid_file = dir.path().join("stt.pid");
        let script = write_script(
            dir.path(),
            "hung-whisper",
            &format!("echo $$ > '{}'\nexec sleep 3", pid_file.display()),
        );
        let loader = CommandRecognizerLoader {
            program: script.to_string_lossy().into_owned(),
            model_cache_dir: None,
            timeout: Some(Duration::from_millis(300)),
        };
        let handle = loader.load(&ModelKey::new("tiny", Device::Cpu)).unwrap();

        let err = handle.0.lock().transcribe(&audio, None).unwrap_err();
        assert!(matches!(err, SpeechError::Timeout(_)), "{err}");
        assert!(!still_running(&pid_file));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("ééé", 3), "é");
    }
}
