// crates/reelqueue-media/src/codec.rs
//
// The codec seam. Everything that actually decodes or encodes sits behind
// `Codec`; the worker only knows how to call it on a thread, feed it a cancel
// flag and collect the bytes it writes.
//
// A codec reports through `EncodeControl`:
//   is_cancelled()  poll between encode steps, return JobError::Cancelled
//   report()        fraction done + output bytes so far (made monotonic here)
//   warn()          soft problems that do not fail the job
//
// Output goes to the `&mut dyn Write` the worker passes in; the worker decides
// whether that becomes one buffer or a stream of chunks.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use reelqueue_core::error::JobError;
use reelqueue_core::protocol::{Capabilities, ConvertRequest, JobId, MediaInfo, WorkerEvent};

pub trait Codec: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError>;

    /// Encode `req.input` per `req.output`/`req.edit` into `out`. Blocking;
    /// the worker runs it on a dedicated thread.
    fn transcode(
        &self,
        req: &ConvertRequest,
        ctl: &mut EncodeControl<'_>,
        out: &mut dyn Write,
    ) -> Result<(), JobError>;
}

// ── EncodeControl ─────────────────────────────────────────────────────────────

pub struct EncodeControl<'a> {
    job_id:        &'a JobId,
    cancel:        &'a AtomicBool,
    tx:            &'a Sender<WorkerEvent>,
    last_fraction: f64,
    last_bytes:    u64,
}

impl<'a> EncodeControl<'a> {
    pub fn new(job_id: &'a JobId, cancel: &'a AtomicBool, tx: &'a Sender<WorkerEvent>) -> Self {
        Self { job_id, cancel, tx, last_fraction: 0.0, last_bytes: 0 }
    }

    pub fn job_id(&self) -> &str {
        self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once the flag is set. Lets codecs write `ctl.check()?`.
    pub fn check(&self) -> Result<(), JobError> {
        if self.is_cancelled() { Err(JobError::Cancelled) } else { Ok(()) }
    }

    /// Neither value ever goes backwards on the wire.
    pub fn report(&mut self, fraction: f64, bytes_so_far: u64) {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        self.last_fraction = self.last_fraction.max(fraction);
        self.last_bytes    = self.last_bytes.max(bytes_so_far);
        let _ = self.tx.send(WorkerEvent::Progress {
            job_id:        self.job_id.clone(),
            fraction:      self.last_fraction,
            bytes_written: self.last_bytes,
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(job = %self.job_id, "{message}");
        let _ = self.tx.send(WorkerEvent::Warning { job_id: self.job_id.clone(), message });
    }
}

// ── UnavailableCodec ──────────────────────────────────────────────────────────

/// Stand-in when the binary was built without an encoder. Reports no
/// capabilities, so every submission fails the capability gate with
/// UnsupportedEnvironment before anything is sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCodec;

impl Codec for UnavailableCodec {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, JobError> {
        debug!(path = %path.display(), "probe without a codec");
        Err(JobError::UnsupportedEnvironment("built without a media codec (enable the `ffmpeg` feature)".into()))
    }

    fn transcode(
        &self,
        _req: &ConvertRequest,
        _ctl: &mut EncodeControl<'_>,
        _out: &mut dyn Write,
    ) -> Result<(), JobError> {
        Err(JobError::NoEncodableCodec("no encoder compiled in".into()))
    }
}

// ── Output dimensions ─────────────────────────────────────────────────────────

/// Fit `width`×`height` under a cap on the larger side, keeping the aspect
/// ratio. Both results are even and at least 2 (YUV420P).
///
/// ```
/// use reelqueue_media::codec::fit_dimensions;
/// assert_eq!(fit_dimensions(3840, 2160, Some(1920)), (1920, 1080));
/// assert_eq!(fit_dimensions(1080, 1920, Some(1280)), (720, 1280));
/// assert_eq!(fit_dimensions(640, 480, Some(1920)), (640, 480));
/// assert_eq!(fit_dimensions(641, 481, None), (640, 480));
/// ```
pub fn fit_dimensions(width: u32, height: u32, max_dimension: Option<u32>) -> (u32, u32) {
    let even = |v: f64| (((v / 2.0).round() as u32) * 2).max(2);
    let (w, h) = (width.max(1) as f64, height.max(1) as f64);
    match max_dimension {
        Some(cap) if w.max(h) > cap as f64 => {
            let scale = cap as f64 / w.max(h);
            (even(w * scale).min(cap & !1), even(h * scale).min(cap & !1))
        }
        _ => ((width & !1).max(2), (height & !1).max(2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn progress_never_goes_backwards() {
        let (tx, rx) = unbounded();
        let id: JobId = "j".into();
        let cancel = AtomicBool::new(false);
        let mut ctl = EncodeControl::new(&id, &cancel, &tx);
        ctl.report(0.5, 100);
        ctl.report(0.4, 50);
        ctl.report(f64::NAN, 200);
        let got: Vec<(f64, u64)> = rx
            .try_iter()
            .filter_map(|e| match e {
                WorkerEvent::Progress { fraction, bytes_written, .. } => Some((fraction, bytes_written)),
                _ => None,
            })
            .collect();
        assert_eq!(got, vec![(0.5, 100), (0.5, 100), (0.5, 200)]);
    }

    #[test]
    fn check_reports_cancel() {
        let (tx, _rx) = unbounded();
        let id: JobId = "j".into();
        let cancel = AtomicBool::new(false);
        let ctl = EncodeControl::new(&id, &cancel, &tx);
        assert!(ctl.check().is_ok());
        cancel.store(true, Ordering::Relaxed);
        assert_eq!(ctl.check(), Err(JobError::Cancelled));
    }

    #[test]
    fn unavailable_codec_has_no_capabilities() {
        let caps = UnavailableCodec.capabilities();
        assert!(!caps.can_encode_video && !caps.can_encode_audio);
        assert!(matches!(
            UnavailableCodec.probe(Path::new("x.mp4")),
            Err(JobError::UnsupportedEnvironment(_))
        ));
    }

    #[test]
    fn fit_never_exceeds_cap() {
        for (w, h) in [(1920, 1080), (1081, 1921), (5000, 10), (10, 5000), (854, 480)] {
            for cap in [1920, 1280, 854] {
                let (ow, oh) = fit_dimensions(w, h, Some(cap));
                assert!(ow.max(oh) <= cap, "{w}x{h} cap {cap} → {ow}x{oh}");
                assert_eq!(ow % 2, 0);
                assert_eq!(oh % 2, 0);
            }
        }
    }
}
