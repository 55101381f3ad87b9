//! Color input sanitization.
//!
//! Stored note colors are untrusted data: they reach inline style
//! declarations on page elements, so anything outside a strict allow-list
//! (hex, range-checked `rgb()`/`rgba()`, a fixed named set) silently falls
//! back to the default note color instead of propagating an error.

use crate::model::note::DEFAULT_NOTE_COLOR;
use once_cell::sync::Lazy;
use regex::Regex;

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid hex regex"));

static RGB_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgb\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)$")
        .expect("valid rgb regex")
});

static RGBA_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(0|1|0?\.\d+)\s*\)$")
        .expect("valid rgba regex")
});

const NAMED_COLORS: &[&str] = &[
    "yellow",
    "pink",
    "orange",
    "lightblue",
    "lightgreen",
    "lavender",
    "peachpuff",
    "white",
];

/// Returns `input` when it passes the allow-list, the default note color
/// otherwise. Never fails.
pub fn sanitize_color(input: &str) -> String {
    let trimmed = input.trim();
    if is_safe_color(trimmed) {
        trimmed.to_string()
    } else {
        DEFAULT_NOTE_COLOR.to_string()
    }
}

fn is_safe_color(value: &str) -> bool {
    if HEX_COLOR_RE.is_match(value) {
        return true;
    }
    if let Some(caps) = RGB_COLOR_RE.captures(value) {
        return channels_in_range(&caps, 3);
    }
    if let Some(caps) = RGBA_COLOR_RE.captures(value) {
        // The alpha group is range-limited by the regex itself.
        return channels_in_range(&caps, 3);
    }
    NAMED_COLORS.contains(&value)
}

fn channels_in_range(caps: &regex::Captures<'_>, count: usize) -> bool {
    (1..=count).all(|i| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .map(|v| v <= 255)
            .unwrap_or(false)
    })
}
