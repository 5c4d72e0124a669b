//! Text helpers for the 16-column character display.
//!
//! All functions are pure and easy to test in isolation.

use ots_core::hal::DISPLAY_COLS;

const THOUSAND: u64 = 1_000;
const MILLION: u64 = 1_000_000;
const BILLION: u64 = 1_000_000_000;

/// Format a troop count with one truncated decimal.
///
/// Returns values like `"950"`, `"2.5K"`, `"1.1M"`, `"3.0B"`.
pub fn format_count(count: u64) -> String {
    let scaled = |unit: u64, suffix: char| {
        format!("{}.{}{}", count / unit, (count % unit) / (unit / 10), suffix)
    };
    if count >= BILLION {
        scaled(BILLION, 'B')
    } else if count >= MILLION {
        scaled(MILLION, 'M')
    } else if count >= THOUSAND {
        scaled(THOUSAND, 'K')
    } else {
        count.to_string()
    }
}

/// Right-align `text` in a display row. Longer text is returned unchanged.
pub fn right_align(text: &str) -> String {
    format!("{text:>DISPLAY_COLS$}")
}

/// Left-align `text` in a display row, cutting anything past the last column.
pub fn left_align(text: &str) -> String {
    let cut: String = text.chars().take(DISPLAY_COLS).collect();
    format!("{cut:<DISPLAY_COLS$}")
}

/// `"cur / max"`, right-aligned.
pub fn troop_line(current: u64, max: u64) -> String {
    right_align(&format!("{} / {}", format_count(current), format_count(max)))
}

/// `"NN% (amount)"`, where amount is the share of `current` sent at `percent`.
pub fn attack_line(current: u64, percent: u8) -> String {
    let amount = current.saturating_mul(u64::from(percent)) / 100;
    left_align(&format!("{}% ({})", percent, format_count(amount)))
}
