//! Engagement count parsing.
//!
//! X renders counters in a compact human form ("3.5K", "1M", "12,403").
//! [`parse_count`] turns those strings into integers and never fails.

/// Characters removed before parsing: thousands separators and the
/// middle-dot separator X places between metadata items.
const NOISE_CHARS: &[char] = &[',', '·'];

/// Suffix multipliers, checked in order. `Mn` must precede `M`.
///
/// `B` is multiplied by one thousand, not one billion: X uses it in some
/// locales as an alias for `K`.
const SUFFIXES: &[(&str, f64)] = &[
    ("K", 1_000.0),
    ("B", 1_000.0),
    ("Mn", 1_000_000.0),
    ("M", 1_000_000.0),
];

/// Parse a displayed count into a non-negative integer.
///
/// Empty, missing, negative and unparseable input all yield `0`.
#[must_use]
pub fn parse_count(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return 0;
    };

    let cleaned: String = raw.chars().filter(|c| !NOISE_CHARS.contains(c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0;
    }

    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = cleaned.strip_suffix(suffix) {
            return parse_decimal(number.trim()).map_or(0, |n| truncate(n * multiplier));
        }
    }

    // Exact integers first so large values keep full precision.
    if let Ok(n) = cleaned.parse::<u64>() {
        return n;
    }
    parse_decimal(cleaned).map_or(0, truncate)
}

/// Convenience wrapper for callers holding a plain `&str`.
#[must_use]
pub fn parse_count_str(raw: &str) -> u64 {
    parse_count(Some(raw))
}

fn parse_decimal(s: &str) -> Option<f64> {
    let value: f64 = s.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn truncate(value: f64) -> u64 {
    if value >= u64::MAX as f64 {
        u64::MAX
    } else {
        value.trunc() as u64
    }
}
