//! Text normalization for synthesis input.
//!
//! ## Steps (order matters)
//!
//! ```text
//! trim → drop control chars + collapse whitespace → strip emoji
//!      → collapse + re-trim → empty? → script check → truncate (500 + "...")
//! ```
//!
//! Emoji are stripped before the script check and truncation happens after
//! it, so cutting the text can never move the non-Latin ratio.

pub mod script;

use std::fmt;

use crate::error::{Result, SpeechError};

pub use script::ScriptProfile;

/// Maximum normalized length in characters, before the ellipsis marker.
pub const MAX_TEXT_CHARS: usize = 500;

/// Appended when text is cut at [`MAX_TEXT_CHARS`].
pub const ELLIPSIS: &str = "...";

/// Code point ranges removed as emoji / pictographs.
///
/// `U+24C2..=U+1F251` also covers enclosed alphanumerics, CJK and Hangul,
/// so text written only in those scripts ends up empty.
const EMOJI_RANGES: &[(u32, u32)] = &[
    (0x1F600, 0x1F64F),
    (0x1F300, 0x1F5FF),
    (0x1F680, 0x1F6FF),
    (0x1F1E0, 0x1F1FF),
    (0x2702, 0x27B0),
    (0x24C2, 0x1F251),
];

/// Text that passed [`normalize`]: non-empty, single-spaced, emoji-free and
/// at most [`MAX_TEXT_CHARS`] characters plus [`ELLIPSIS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    script: ScriptProfile,
    truncated: bool,
}

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn script(&self) -> ScriptProfile {
        self.script
    }

    /// Whether the script check accepted the text. Always true for values
    /// built by [`normalize`]; kept so callers can log the classification.
    pub fn is_supported_language(&self) -> bool {
        self.script.is_supported()
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Clean `raw` for synthesis.
///
/// # Errors
/// - [`SpeechError::EmptyInput`] when nothing is left after cleaning.
/// - [`SpeechError::UnsupportedLanguage`] when 10 % or more of the letters
///   are non-Latin. Not retryable.
pub fn normalize(raw: &str) -> Result<NormalizedText> {
    let collapsed = collapse_whitespace(raw.trim());
    let without_emoji: String = collapsed.chars().filter(|c| !is_emoji(*c)).collect();
    let cleaned = collapse_whitespace(without_emoji.trim());

    if cleaned.is_empty() {
        return Err(SpeechError::EmptyInput);
    }

    let script = ScriptProfile::classify(&cleaned);
    if !script.is_supported() {
        return Err(SpeechError::UnsupportedLanguage);
    }

    let (text, truncated) = truncate_chars(cleaned, MAX_TEXT_CHARS);
    Ok(NormalizedText {
        text,
        script,
        truncated,
    })
}

/// Every whitespace run becomes one space; other control characters are dropped.
fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for c in input.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

fn is_emoji(c: char) -> bool {
    let cp = c as u32;
    EMOJI_RANGES
        .iter()
        .any(|&(start, end)| (start..=end).contains(&cp))
}

fn truncate_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut cut = text[..byte_idx].to_string();
            cut.push_str(ELLIPSIS);
            (cut, true)
        }
        None => (text, false),
    }
}
