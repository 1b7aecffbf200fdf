// crates/reelqueue-media/src/testing.rs
//
// Scripted codec for tests that drive the real MediaWorker threads. Built for
// this crate's tests and, through the `testing` feature, for reelqueue-app's.
//
// Input names steer the outcome:
//   "boom"     → panics inside transcode (worker crash)
//   "novideo"  → JobError::NoVideoTrack
//   "broken"   → JobError::Unknown
//   anything else → `size` bytes of output in 64 KiB steps

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use reelqueue_core::error::JobError;
use reelqueue_core::protocol::{Capabilities, ConvertRequest, MediaInfo};

use crate::codec::{Codec, EncodeControl};

const STEP: usize = 64 * 1024;

pub struct Scripted {
    size:  usize,
    delay: Duration,
    caps:  Capabilities,
    seen:  Arc<Mutex<Vec<ConvertRequest>>>,
}

impl Scripted {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            delay: Duration::ZERO,
            caps:  Capabilities { can_encode_video: true, can_encode_audio: true },
            seen:  Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep between steps so a test can pause or cancel mid-encode.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_caps(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Every request transcode was called with, in order.
    pub fn seen(&self) -> Arc<Mutex<Vec<ConvertRequest>>> {
        Arc::clone(&self.seen)
    }
}

impl Codec for Scripted {
    fn name(&self) -> &str { "scripted" }

    fn capabilities(&self) -> Capabilities { self.caps }

    fn probe(&self, _path: &Path) -> Result<MediaInfo, JobError> {
        Ok(MediaInfo { duration: 10.0, width: 1920, height: 1080, has_video: true, has_audio: true })
    }

    fn transcode(&self, req: &ConvertRequest, ctl: &mut EncodeControl<'_>, out: &mut dyn Write) -> Result<(), JobError> {
        self.seen.lock().push(req.clone());
        match req.input.name.as_str() {
            "boom"    => panic!("scripted codec exploded"),
            "novideo" => return Err(JobError::NoVideoTrack),
            "broken"  => return Err(JobError::unknown("scripted failure")),
            _ => {}
        }
        let mut written = 0;
        while written < self.size {
            ctl.check()?;
            let n = STEP.min(self.size - written);
            out.write_all(&vec![0x5A; n])?;
            written += n;
            ctl.report(written as f64 / self.size as f64, written as u64);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
        Ok(())
    }
}
