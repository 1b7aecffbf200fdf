// crates/reelqueue-core/src/job.rs
//
// Queue data model. A QueueItem is created by JobStore::add, mutated only by
// the store's transition methods and removed by explicit remove/clear.
// Progress and completed results live beside the items, keyed by the same id.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::SettingsOverride;
use crate::protocol::EditSpec;

/// Most items the queue holds at once.
pub const MAX_QUEUE_ITEMS: usize = 10;
/// Largest accepted input, 2 GiB.
pub const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

// ── Input ─────────────────────────────────────────────────────────────────────

/// Read-only handle on an input file. Name and size are captured when the
/// file is added; the worker opens `path` itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
}

impl InputFile {
    /// Stat `path` and build the handle.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, size: meta.len(), path: path.to_path_buf() })
    }
}

// ── Item ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Cancelled)
    }

    /// Statuses that count for duplicate detection.
    pub fn is_active(self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Processing)
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemStatus::Pending    => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed  => "completed",
            ItemStatus::Failed     => "failed",
            ItemStatus::Cancelled  => "cancelled",
        }
    }
}

/// What the worker does with the input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum JobKind {
    /// Re-encode to MP4 with the resolved preset and resolution cap.
    #[default]
    Convert,
    /// Re-encode with a pixel crop and/or trim applied.
    Crop(EditSpec),
}

impl JobKind {
    fn suffix(&self) -> &'static str {
        match self {
            JobKind::Convert => "_converted",
            JobKind::Crop(_) => "_cropped",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id:                Uuid,
    pub input:             InputFile,
    pub kind:              JobKind,
    pub status:            ItemStatus,
    pub error:             Option<String>,
    pub output_size:       Option<u64>,
    pub compression_ratio: Option<f64>,
    pub settings:          Option<SettingsOverride>,
    pub added_at:          SystemTime,
    pub started_at:        Option<SystemTime>,
    pub completed_at:      Option<SystemTime>,
}

impl QueueItem {
    pub fn new(input: InputFile, kind: JobKind) -> Self {
        Self {
            id:                Uuid::new_v4(),
            input,
            kind,
            status:            ItemStatus::Pending,
            error:             None,
            output_size:       None,
            compression_ratio: None,
            settings:          None,
            added_at:          SystemTime::now(),
            started_at:        None,
            completed_at:      None,
        }
    }

    pub fn output_name(&self) -> String {
        output_name(&self.input.name, &self.kind)
    }

    /// Back to a fresh pending item. Used by retry.
    pub fn reset(&mut self) {
        self.status            = ItemStatus::Pending;
        self.error             = None;
        self.output_size       = None;
        self.compression_ratio = None;
        self.started_at        = None;
        self.completed_at      = None;
    }
}

/// `<stem>_converted.mp4` or `<stem>_cropped.mp4`.
///
/// ```
/// use reelqueue_core::job::{output_name, JobKind};
/// assert_eq!(output_name("holiday.mov", &JobKind::Convert), "holiday_converted.mp4");
/// assert_eq!(output_name("archive.tar.webm", &JobKind::Convert), "archive.tar_converted.mp4");
/// assert_eq!(output_name("noext", &JobKind::Convert), "noext_converted.mp4");
/// ```
pub fn output_name(input_name: &str, kind: &JobKind) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{stem}{}.mp4", kind.suffix())
}

// ── Progress / results ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressInfo {
    /// 0.0..=1.0
    pub fraction:        f64,
    pub bytes_processed: u64,
    pub elapsed:         Duration,
    pub remaining:       Option<Duration>,
}

impl ProgressInfo {
    /// Build from a progress event; `remaining` is extrapolated linearly.
    pub fn estimate(fraction: f64, bytes_processed: u64, elapsed: Duration) -> Self {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        let remaining = (fraction > 0.0)
            .then(|| elapsed.as_secs_f64() * (1.0 - fraction) / fraction)
            .filter(|s| s.is_finite())
            .map(Duration::from_secs_f64);
        Self { fraction, bytes_processed, elapsed, remaining }
    }
}

/// Where the output bytes ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputPayload {
    /// Whole file moved out of the worker in `Done`.
    Buffer(Vec<u8>),
    /// Written by a streaming sink.
    Streamed { path: PathBuf },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletedResult {
    pub output_name:       String,
    pub input_size:        u64,
    pub output_size:       u64,
    pub compression_ratio: f64,
    pub payload:           OutputPayload,
    pub completed_at:      SystemTime,
    /// Set when auto-download wrote the result somewhere.
    pub delivered_to:      Option<PathBuf>,
}

/// Percentage saved: `(input - output) / input × 100`. Negative when the
/// output grew; 0 for an empty input.
///
/// ```
/// use reelqueue_core::job::compression_ratio;
/// assert_eq!(compression_ratio(1000, 250), 75.0);
/// assert_eq!(compression_ratio(1000, 1500), -50.0);
/// assert_eq!(compression_ratio(0, 10), 0.0);
/// ```
pub fn compression_ratio(input_size: u64, output_size: u64) -> f64 {
    if input_size == 0 {
        return 0.0;
    }
    (input_size as f64 - output_size as f64) / input_size as f64 * 100.0
}
