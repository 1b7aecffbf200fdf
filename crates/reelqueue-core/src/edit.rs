// crates/reelqueue-core/src/edit.rs
//
// EditSession: the per-edit state of the crop/trim path.
//
// Holds the loaded input, what the probe learned about it, the crop region,
// the trim range and the aspect lock. Loading another input resets all of it
// and releases the previous preview resource before the new one is stored.
// The session never touches the codec; the caller probes and hands the
// MediaInfo in.

use crate::helpers::geometry::{
    aspect_ratio_value, crop_to_pixels, drag_constrained, set_aspect_ratio, AspectRatio,
    CropRegion, FrameSize, Handle,
};
use crate::helpers::time::{TrimRange, DRAG_GAP, INPUT_GAP};
use crate::job::InputFile;
use crate::protocol::{EditSpec, MediaInfo};

/// Something expensive held for previewing the loaded input (decoded frame
/// cache, temp file). Released explicitly when superseded.
pub trait PreviewResource: Send {
    fn release(&mut self);
}

/// How a trim value was entered. Decides the minimum gap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimInput {
    Drag,
    Typed,
}

impl TrimInput {
    fn gap(self) -> f64 {
        match self {
            TrimInput::Drag  => DRAG_GAP,
            TrimInput::Typed => INPUT_GAP,
        }
    }
}

struct Loaded {
    input:   InputFile,
    info:    MediaInfo,
    preview: Option<Box<dyn PreviewResource>>,
}

pub struct EditSession {
    loaded: Option<Loaded>,
    region: CropRegion,
    trim:   TrimRange,
    aspect: AspectRatio,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            loaded: None,
            region: CropRegion::FULL,
            trim:   TrimRange::full(0.0),
            aspect: AspectRatio::Free,
        }
    }

    /// Load a new input. Crop goes back to the full frame, trim to the full
    /// duration, aspect to free.
    pub fn load(&mut self, input: InputFile, info: MediaInfo, preview: Option<Box<dyn PreviewResource>>) {
        self.release_preview();
        self.region = CropRegion::FULL;
        self.trim   = TrimRange::full(info.duration);
        self.aspect = AspectRatio::Free;
        self.loaded = Some(Loaded { input, info, preview });
    }

    /// Drop the loaded input and its preview.
    pub fn unload(&mut self) {
        self.release_preview();
        self.loaded = None;
        self.region = CropRegion::FULL;
        self.trim   = TrimRange::full(0.0);
        self.aspect = AspectRatio::Free;
    }

    fn release_preview(&mut self) {
        if let Some(mut preview) = self.loaded.as_mut().and_then(|l| l.preview.take()) {
            preview.release();
        }
    }

    pub fn input(&self) -> Option<&InputFile> {
        self.loaded.as_ref().map(|l| &l.input)
    }

    pub fn info(&self) -> Option<MediaInfo> {
        self.loaded.as_ref().map(|l| l.info)
    }

    pub fn region(&self) -> CropRegion { self.region }
    pub fn trim(&self) -> TrimRange { self.trim }
    pub fn aspect(&self) -> AspectRatio { self.aspect }

    fn frame(&self) -> FrameSize {
        self.loaded
            .as_ref()
            .map(|l| FrameSize::new(l.info.width, l.info.height))
            .unwrap_or(FrameSize::new(1, 1))
    }

    fn duration(&self) -> f64 {
        self.loaded.as_ref().map(|l| l.info.duration).unwrap_or(0.0)
    }

    // ── Crop ──────────────────────────────────────────────────────────────────

    pub fn set_aspect(&mut self, aspect: AspectRatio) {
        self.aspect = aspect;
        self.region = set_aspect_ratio(self.region, aspect, self.frame());
    }

    /// One pointer delta through `handle`, honouring the aspect lock.
    pub fn drag(&mut self, handle: Handle, dx: f64, dy: f64) {
        self.region = drag_constrained(
            self.region,
            handle,
            dx,
            dy,
            aspect_ratio_value(self.aspect),
            self.frame(),
        );
    }

    /// Replace the region outright (typed values), then re-apply the lock.
    pub fn set_region(&mut self, region: CropRegion) {
        let region = CropRegion::new(region.x, region.y, region.width, region.height);
        self.region = set_aspect_ratio(region, self.aspect, self.frame());
    }

    pub fn reset_crop(&mut self) {
        self.region = set_aspect_ratio(CropRegion::FULL, self.aspect, self.frame());
    }

    // ── Trim ──────────────────────────────────────────────────────────────────

    pub fn set_trim_start(&mut self, secs: f64, how: TrimInput) {
        let dur = self.duration();
        self.trim.set_start(secs, how.gap(), dur);
    }

    pub fn set_trim_end(&mut self, secs: f64, how: TrimInput) {
        let dur = self.duration();
        self.trim.set_end(secs, how.gap(), dur);
    }

    pub fn shift_trim(&mut self, delta: f64) {
        let dur = self.duration();
        self.trim.shift(delta, dur);
    }

    // ── Output ────────────────────────────────────────────────────────────────

    /// Crop in pixels and trim, each `None` when it would change nothing.
    pub fn edit_spec(&self) -> EditSpec {
        let crop = (!self.region.is_full()).then(|| crop_to_pixels(self.region, self.frame()));
        let trim = (!self.trim.is_full(self.duration())).then_some(self.trim);
        EditSpec { crop, trim }
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        self.release_preview();
    }
}
