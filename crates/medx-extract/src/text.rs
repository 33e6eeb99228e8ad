//! Text normalization for phrase matching.
//!
//! Input is lowercased, every run of non-alphanumeric characters becomes a
//! single space, and `%` is kept as its own token. Phrases are normalized the
//! same way and matched on token boundaries, so `"dnr"` never matches inside
//! `"dnrx"` and `"end-of-life"` matches `"end of life"`.

/// Normalized, space-padded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    padded: String,
}

impl NormalizedText {
    pub fn new(raw: &str) -> Self {
        Self {
            padded: format!(" {} ", normalize(raw)),
        }
    }

    /// Whether `phrase` occurs on token boundaries.
    pub fn contains_phrase(&self, phrase: &str) -> bool {
        let needle = normalize(phrase);
        !needle.is_empty() && self.padded.contains(&format!(" {needle} "))
    }

    /// Whether any of `phrases` occurs.
    pub fn contains_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.contains_phrase(p))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.padded.split_whitespace()
    }
}

fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else if ch == '%' {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push('%');
            pending_space = true;
        } else {
            pending_space = true;
        }
    }
    out
}

/// First `max_chars` characters of the trimmed text, marked when cut.
pub fn excerpt(raw: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
