// crates/reelqueue-app/src/helpers/format.rs
//
// CLI-layer string utilities that don't belong in reelqueue-core.
//
// Time and duration formatting lives in reelqueue_core::helpers::time; use
// those for anything involving seconds. This module holds what is purely
// about printing queue lines to a terminal.

/// Human-readable byte count with binary units.
///
/// ```
/// use reelqueue_app::helpers::format::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KiB");
/// assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.0 GiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Compression ratio as a signed percentage: "75.0% smaller" / "12.5% larger".
pub fn format_ratio(ratio: f64) -> String {
    if ratio >= 0.0 {
        format!("{ratio:.1}% smaller")
    } else {
        format!("{:.1}% larger", -ratio)
    }
}

/// Truncates `name` to at most `max_chars` characters, keeping the extension
/// visible and putting "…" in the middle. Used for the fixed-width name
/// column of queue status lines.
pub fn fit_name(name: &str, max_chars: usize) -> String {
    const ELLIPSIS: char = '…';
    let count = name.chars().count();
    if count <= max_chars {
        return name.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    // Keep the tail (extension) when there is room for it.
    let tail_len = name.rfind('.').map(|i| name[i..].chars().count()).unwrap_or(0);
    let budget = max_chars - 1;
    if tail_len == 0 || tail_len >= budget {
        return name.chars().take(budget).collect::<String>() + &ELLIPSIS.to_string();
    }
    let head: String = name.chars().take(budget - tail_len).collect();
    let tail: String = name.chars().skip(count - tail_len).collect();
    format!("{head}{ELLIPSIS}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_unchanged() {
        assert_eq!(fit_name("a.mov", 20), "a.mov");
    }

    #[test]
    fn zero_budget_returns_empty() {
        assert_eq!(fit_name("hello.mov", 0), "");
    }

    #[test]
    fn long_name_keeps_extension() {
        let out = fit_name("a_very_long_holiday_video.mov", 12);
        assert_eq!(out.chars().count(), 12);
        assert!(out.ends_with(".mov"));
        assert!(out.contains('…'));
    }

    #[test]
    fn no_extension_truncates_tail() {
        assert_eq!(fit_name("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn ratio_sign() {
        assert_eq!(format_ratio(75.0), "75.0% smaller");
        assert_eq!(format_ratio(-50.0), "50.0% larger");
    }

    #[test]
    fn bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MiB");
    }
}
