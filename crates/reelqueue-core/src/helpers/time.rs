// crates/reelqueue-core/src/helpers/time.rs
//
// Time helpers: human-readable durations for CLI lines and the trim range
// the crop/trim path edits.
//
// TrimRange has two minimum gaps. Handle drags move in small steps and use
// DRAG_GAP; a typed value is usually a coarse guess and uses INPUT_GAP.

use serde::{Deserialize, Serialize};

/// Minimum trim length (seconds) enforced while dragging a trim handle.
pub const DRAG_GAP: f64 = 0.1;
/// Minimum trim length (seconds) enforced for typed start/end values.
pub const INPUT_GAP: f64 = 0.5;

/// Format a duration in seconds as a compact human-readable string.
///
/// | Range         | Format       | Example   |
/// |---------------|--------------|-----------|
/// | ≥ 3600 s      | `H:MM:SS`    | `1:04:35` |
/// | ≥ 60 s        | `M:SS`       | `3:07`    |
/// | < 60 s        | `S.Xs`       | `4.2s`    |
///
/// ```
/// use reelqueue_core::helpers::time::format_duration;
/// assert_eq!(format_duration(4.2),    "4.2s");
/// assert_eq!(format_duration(187.0),  "3:07");
/// assert_eq!(format_duration(3875.0), "1:04:35");
/// ```
pub fn format_duration(secs: f64) -> String {
    if secs >= 3600.0 {
        format!(
            "{}:{:02}:{:02}",
            secs as u64 / 3600,
            (secs as u64 % 3600) / 60,
            secs as u64 % 60,
        )
    } else if secs >= 60.0 {
        format!("{}:{:02}", secs as u64 / 60, secs as u64 % 60)
    } else {
        format!("{secs:.1}s")
    }
}

// ── Trim range ────────────────────────────────────────────────────────────────

/// Kept section of the input, in seconds.
///
/// Holds `0 ≤ start`, `end ≤ duration` and `end - start ≥ gap` after every
/// mutation, where `gap` is whichever of [`DRAG_GAP`]/[`INPUT_GAP`] the
/// caller passes. If the input is shorter than the gap the range is the
/// whole input.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end:   f64,
}

impl TrimRange {
    pub fn full(duration: f64) -> Self {
        Self { start: 0.0, end: duration.max(0.0) }
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }

    /// True when the range covers the whole input.
    pub fn is_full(&self, duration: f64) -> bool {
        self.start <= f64::EPSILON && (duration - self.end).abs() <= 1e-6
    }

    /// Move the start, keeping at least `gap` before the end.
    ///
    /// ```
    /// use reelqueue_core::helpers::time::{TrimRange, DRAG_GAP};
    /// let mut t = TrimRange::full(10.0);
    /// t.set_start(9.99, DRAG_GAP, 10.0);
    /// assert!((t.start - 9.9).abs() < 1e-9);
    /// ```
    pub fn set_start(&mut self, start: f64, gap: f64, duration: f64) {
        let duration = duration.max(0.0);
        self.end = self.end.clamp(0.0, duration);
        let upper = (self.end - gap).max(0.0);
        self.start = finite_or(start, self.start).clamp(0.0, upper);
        self.restore_gap(gap, duration);
    }

    /// Move the end, keeping at least `gap` after the start.
    pub fn set_end(&mut self, end: f64, gap: f64, duration: f64) {
        let duration = duration.max(0.0);
        self.start = self.start.clamp(0.0, duration);
        let lower = (self.start + gap).min(duration);
        self.end = finite_or(end, self.end).clamp(lower, duration);
        self.restore_gap(gap, duration);
    }

    /// Shift the whole range by `delta`, keeping its length.
    pub fn shift(&mut self, delta: f64, duration: f64) {
        let len = self.len().clamp(0.0, duration.max(0.0));
        self.start = (self.start + finite_or(delta, 0.0)).clamp(0.0, (duration - len).max(0.0));
        self.end = self.start + len;
    }

    // When one side was pinned against 0 or the duration there may be less
    // than `gap` left; push the other side out.
    fn restore_gap(&mut self, gap: f64, duration: f64) {
        if self.len() >= gap {
            return;
        }
        if duration <= gap {
            *self = Self::full(duration);
        } else if self.start + gap <= duration {
            self.end = self.start + gap;
        } else {
            self.end = duration;
            self.start = duration - gap;
        }
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}
