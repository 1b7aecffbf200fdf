// crates/reelqueue-core/src/protocol.rs
//
// Types that flow across the channels between the app (ChannelClient) and the
// media worker. Plain data only: no threads, no ffmpeg.
//
// Every job-scoped message carries the job id string of the submission that
// produced it. That id is the only correlation key on the wire.
//
// Event order for one job:
//   buffer mode:  Progress* → Done{Buffer}                  (terminal)
//   stream mode:  (Progress | StreamChunk)* → Done{Stream}
//                 → StreamChunk? → StreamComplete            (terminal)
//   any mode:     ... → Error | Canceled                     (terminal)
// Warning may appear anywhere before the terminal event.

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::helpers::geometry::PixelRect;
use crate::helpers::time::TrimRange;
use crate::job::InputFile;

/// Unique per submission. A retried queue item gets a fresh one.
pub type JobId = String;

pub const MIME_MP4: &str = "video/mp4";

// ── Requests (app → worker) ───────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum WorkerRequest {
    Convert(ConvertRequest),
    Cancel { job_id: JobId },
    /// Stop the control thread. In-flight encodes see their cancel flag set.
    Shutdown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConvertRequest {
    pub job_id: JobId,
    pub input:  InputFile,
    pub output: OutputSpec,
    pub sink:   SinkMode,
    pub edit:   Option<EditSpec>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Container {
    Mp4,
}

impl Container {
    pub fn mime(self) -> &'static str {
        match self {
            Container::Mp4 => MIME_MP4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSpec {
    pub container:     Container,
    /// Preset name, carried for logging. The bitrates below are authoritative.
    pub preset:        String,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    /// Cap on the larger output dimension; aspect ratio is preserved.
    pub max_dimension: Option<u32>,
    pub include_audio: bool,
    /// Name the worker reports back in `Done`.
    pub filename:      String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkMode {
    /// Whole output moved back in `Done`.
    #[default]
    Buffer,
    /// Output arrives as ordered `StreamChunk`s followed by `StreamComplete`.
    Stream,
}

/// Crop/trim applied by the worker before scaling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EditSpec {
    pub crop: Option<PixelRect>,
    pub trim: Option<TrimRange>,
}

impl EditSpec {
    pub fn is_identity(&self) -> bool {
        self.crop.is_none() && self.trim.is_none()
    }
}

// ── Events (worker → app) ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_encode_video: bool,
    pub can_encode_audio: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DoneResult {
    Buffer { payload: Vec<u8>, mime: String, filename: String },
    Stream { mime: String, filename: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    Ready,
    Capabilities(Capabilities),
    Progress       { job_id: JobId, fraction: f64, bytes_written: u64 },
    Warning        { job_id: JobId, message: String },
    Error          { job_id: JobId, error: JobError },
    Done           { job_id: JobId, result: DoneResult },
    Canceled       { job_id: JobId },
    StreamChunk    { job_id: JobId, bytes: Vec<u8>, position: u64 },
    StreamComplete { job_id: JobId, total_bytes: u64 },
}

impl WorkerEvent {
    /// The job this event belongs to, `None` for worker-scoped events.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            WorkerEvent::Ready | WorkerEvent::Capabilities(_) => None,
            WorkerEvent::Progress       { job_id, .. }
            | WorkerEvent::Warning      { job_id, .. }
            | WorkerEvent::Error        { job_id, .. }
            | WorkerEvent::Done         { job_id, .. }
            | WorkerEvent::Canceled     { job_id }
            | WorkerEvent::StreamChunk  { job_id, .. }
            | WorkerEvent::StreamComplete { job_id, .. } => Some(job_id),
        }
    }

    /// Short name for log lines. Avoids dumping chunk payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Ready             => "ready",
            WorkerEvent::Capabilities(_)   => "capabilities",
            WorkerEvent::Progress { .. }   => "progress",
            WorkerEvent::Warning { .. }    => "warning",
            WorkerEvent::Error { .. }      => "error",
            WorkerEvent::Done { .. }       => "done",
            WorkerEvent::Canceled { .. }   => "canceled",
            WorkerEvent::StreamChunk { .. } => "stream-chunk",
            WorkerEvent::StreamComplete { .. } => "stream-complete",
        }
    }
}

/// What a probe learns about an input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration:  f64,
    pub width:     u32,
    pub height:    u32,
    pub has_video: bool,
    pub has_audio: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_accessor() {
        let e = WorkerEvent::Canceled { job_id: "j1".into() };
        assert_eq!(e.job_id(), Some("j1"));
        assert_eq!(WorkerEvent::Ready.job_id(), None);
        let e = WorkerEvent::StreamComplete { job_id: "j2".into(), total_bytes: 9 };
        assert_eq!(e.job_id(), Some("j2"));
    }

    #[test]
    fn identity_edit() {
        assert!(EditSpec::default().is_identity());
        let e = EditSpec { trim: Some(TrimRange { start: 1.0, end: 2.0 }), crop: None };
        assert!(!e.is_identity());
    }
}
