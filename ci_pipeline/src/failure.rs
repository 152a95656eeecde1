//! Failure fingerprinting and classification.
//!
//! A failed step's output is normalized and hashed so the same breakage
//! produces the same fingerprint across builds, even when line numbers,
//! durations or temp paths differ between runs.

use regex::Regex;
use std::sync::LazyLock;

use crate::pipeline::Phase;

static NUMERIC_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").unwrap());
static PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[a-zA-Z0-9_./-]+").unwrap());

/// Normalize failure text for fingerprinting: remove numbers, paths, whitespace.
pub fn normalize(text: &str) -> String {
    let text = NUMERIC_REGEX.replace_all(text, "N");
    let text = PATH_REGEX.replace_all(&text, "PATH");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Generate a fingerprint from normalized failure text.
pub fn fingerprint(normalized: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(normalized.as_bytes());
    hex::encode(&hash[..16])
}

/// Classify what kind of failure a step produced. The phase narrows it
/// down first: anything before `script` is an environment problem, not a
/// verdict about the code under test.
pub fn classify(phase: Phase, text: &str, timed_out: bool) -> &'static str {
    let lower = text.to_lowercase();
    if timed_out || lower.contains("timed out") {
        "timeout"
    } else if phase.is_setup() {
        "install"
    } else if lower.contains("flake8")
        || lower.contains("pylint")
        || lower.contains("lint")
        || lower.contains("would reformat")
    {
        "lint"
    } else if lower.contains("pytest")
        || lower.contains("assert")
        || lower.contains("test")
    {
        "test"
    } else {
        "script"
    }
}
