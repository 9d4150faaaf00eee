//! Script classification over alphabetic characters.
//!
//! Only ASCII letters count as Latin. Everything else alphabetic (Cyrillic,
//! accented Latin, CJK that survives cleaning, ...) counts against the
//! supported ratio.

/// Share of non-Latin letters at or above which text is rejected.
pub const MAX_NON_LATIN_RATIO: f64 = 0.10;

const CYRILLIC: std::ops::RangeInclusive<char> = '\u{0400}'..='\u{04FF}';

/// Letter counts for a piece of text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptProfile {
    pub latin: usize,
    pub cyrillic: usize,
    pub other: usize,
}

impl ScriptProfile {
    pub fn classify(text: &str) -> Self {
        let mut profile = Self::default();
        for c in text.chars().filter(|c| c.is_alphabetic()) {
            if CYRILLIC.contains(&c) {
                profile.cyrillic += 1;
            } else if c.is_ascii() {
                profile.latin += 1;
            } else {
                profile.other += 1;
            }
        }
        profile
    }

    pub fn alphabetic(&self) -> usize {
        self.latin + self.cyrillic + self.other
    }

    pub fn non_latin_ratio(&self) -> f64 {
        let total = self.alphabetic();
        if total == 0 {
            return 0.0;
        }
        (self.cyrillic + self.other) as f64 / total as f64
    }

    /// Text with no letters at all (digits, punctuation) is supported.
    pub fn is_supported(&self) -> bool {
        self.non_latin_ratio() < MAX_NON_LATIN_RATIO
    }
}
