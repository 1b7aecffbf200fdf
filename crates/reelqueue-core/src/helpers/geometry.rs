// crates/reelqueue-core/src/helpers/geometry.rs
//
// Crop geometry: a unit-square-normalised rectangle edited through eight drag
// handles plus a move, an optional aspect-ratio lock solved in pixel space,
// and conversion to an even-aligned pixel rect for the encoder.
//
// Everything here is a pure function over `Copy` values. The edit session
// (`crate::edit`) owns the current region and calls into these.
//
// Coordinate system:
//   x grows right, y grows down, (0,0) is the top-left of the frame and
//   (1,1) the bottom-right. A region is valid when
//     0 ≤ x, 0 ≤ y, width ≥ MIN_CROP_SIZE, height ≥ MIN_CROP_SIZE,
//     x + width ≤ 1, y + height ≤ 1.

use serde::{Deserialize, Serialize};

/// Smallest normalised width/height a region may shrink to.
pub const MIN_CROP_SIZE: f64 = 0.05;

/// Tolerance used when comparing normalised edges against the unit square.
const EPS: f64 = 1e-9;

// ── Aspect ratio presets ──────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    Free,
    SixteenNine,    // 16:9  landscape video
    NineSixteen,    // 9:16  stories / shorts
    FourThree,      // 4:3   classic TV
    ThreeFour,      // 3:4   portrait photo
    OneOne,         // 1:1   square
    FourFive,       // 4:5   portrait feed
    TwentyOneNine,  // 21:9  ultrawide
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Free,
        AspectRatio::SixteenNine,
        AspectRatio::NineSixteen,
        AspectRatio::FourThree,
        AspectRatio::ThreeFour,
        AspectRatio::OneOne,
        AspectRatio::FourFive,
        AspectRatio::TwentyOneNine,
    ];

    /// Accepts `free`, `16:9`, `16/9` and friends.
    pub fn parse(s: &str) -> Option<Self> {
        let norm = s.trim().replace('/', ":").to_ascii_lowercase();
        Self::ALL.into_iter().find(|ar| aspect_ratio_key(*ar) == norm)
    }
}

/// Numeric width-to-height ratio (in pixels), `None` for a free crop.
///
/// ```
/// use reelqueue_core::helpers::geometry::{aspect_ratio_value, AspectRatio};
/// let r = aspect_ratio_value(AspectRatio::SixteenNine).unwrap();
/// assert!((r - 16.0 / 9.0).abs() < 1e-12);
/// assert!(aspect_ratio_value(AspectRatio::Free).is_none());
/// ```
pub fn aspect_ratio_value(ar: AspectRatio) -> Option<f64> {
    match ar {
        AspectRatio::Free          => None,
        AspectRatio::SixteenNine   => Some(16.0 / 9.0),
        AspectRatio::NineSixteen   => Some(9.0  / 16.0),
        AspectRatio::FourThree     => Some(4.0  / 3.0),
        AspectRatio::ThreeFour     => Some(3.0  / 4.0),
        AspectRatio::OneOne        => Some(1.0),
        AspectRatio::FourFive      => Some(4.0  / 5.0),
        AspectRatio::TwentyOneNine => Some(21.0 / 9.0),
    }
}

/// Short human-readable label, shown by the CLI `crop` summary.
pub fn aspect_ratio_label(ar: AspectRatio) -> &'static str {
    match ar {
        AspectRatio::Free          => "Free",
        AspectRatio::SixteenNine   => "16:9 (Landscape)",
        AspectRatio::NineSixteen   => "9:16 (Portrait / Stories)",
        AspectRatio::FourThree     => "4:3 (Classic TV)",
        AspectRatio::ThreeFour     => "3:4 (Portrait photo)",
        AspectRatio::OneOne        => "1:1 (Square)",
        AspectRatio::FourFive      => "4:5 (Portrait feed)",
        AspectRatio::TwentyOneNine => "21:9 (Ultrawide)",
    }
}

fn aspect_ratio_key(ar: AspectRatio) -> &'static str {
    match ar {
        AspectRatio::Free          => "free",
        AspectRatio::SixteenNine   => "16:9",
        AspectRatio::NineSixteen   => "9:16",
        AspectRatio::FourThree     => "4:3",
        AspectRatio::ThreeFour     => "3:4",
        AspectRatio::OneOne        => "1:1",
        AspectRatio::FourFive      => "4:5",
        AspectRatio::TwentyOneNine => "21:9",
    }
}

// ── Types ─────────────────────────────────────────────────────────────────────

/// Source frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width:  u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Normalised crop rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x:      f64,
    pub y:      f64,
    pub width:  f64,
    pub height: f64,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self::FULL
    }
}

impl CropRegion {
    pub const FULL: CropRegion = CropRegion { x: 0.0, y: 0.0, width: 1.0, height: 1.0 };

    /// Build a region from arbitrary numbers, clamped into validity.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        clamp_region(CropRegion { x, y, width, height })
    }

    pub fn right(&self) -> f64 { self.x + self.width }
    pub fn bottom(&self) -> f64 { self.y + self.height }

    pub fn is_valid(&self) -> bool {
        self.x >= -EPS
            && self.y >= -EPS
            && self.width  >= MIN_CROP_SIZE - EPS
            && self.height >= MIN_CROP_SIZE - EPS
            && self.right()  <= 1.0 + EPS
            && self.bottom() <= 1.0 + EPS
    }

    pub fn is_full(&self) -> bool {
        self.x.abs() < EPS
            && self.y.abs() < EPS
            && (self.width  - 1.0).abs() < EPS
            && (self.height - 1.0).abs() < EPS
    }

    /// Pixel-space width / height of this region on `frame`.
    pub fn pixel_ratio(&self, frame: FrameSize) -> f64 {
        (self.width * frame.width as f64) / (self.height * frame.height as f64)
    }
}

/// The eight resize handles plus the body drag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Handle {
    Nw, Ne, Sw, Se,
    N, S, E, W,
    Move,
}

impl Handle {
    fn moves_left(self)   -> bool { matches!(self, Handle::Nw | Handle::Sw | Handle::W) }
    fn moves_right(self)  -> bool { matches!(self, Handle::Ne | Handle::Se | Handle::E) }
    fn moves_top(self)    -> bool { matches!(self, Handle::Nw | Handle::Ne | Handle::N) }
    fn moves_bottom(self) -> bool { matches!(self, Handle::Sw | Handle::Se | Handle::S) }
}

/// Even-aligned pixel rectangle handed to the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub left:   u32,
    pub top:    u32,
    pub width:  u32,
    pub height: u32,
}

// ── Free-form edits ───────────────────────────────────────────────────────────

/// Translate by (dx, dy), keeping the size and staying inside the unit square.
pub fn move_region(r: CropRegion, dx: f64, dy: f64) -> CropRegion {
    CropRegion {
        x: (r.x + dx).clamp(0.0, (1.0 - r.width).max(0.0)),
        y: (r.y + dy).clamp(0.0, (1.0 - r.height).max(0.0)),
        ..r
    }
}

/// Resize from one edge. The opposite edge stays where it is.
///
/// `Handle::E`/`W` read `dx`, `Handle::N`/`S` read `dy`. Corner and move
/// handles are forwarded to [`drag`].
pub fn resize_edge(r: CropRegion, handle: Handle, dx: f64, dy: f64) -> CropRegion {
    match handle {
        Handle::E | Handle::W | Handle::N | Handle::S => {
            let mut out = r;
            if handle.moves_left() || handle.moves_right() {
                let (x, w) = resize_axis(r.x, r.width, dx, handle.moves_left());
                out.x = x;
                out.width = w;
            } else {
                let (y, h) = resize_axis(r.y, r.height, dy, handle.moves_top());
                out.y = y;
                out.height = h;
            }
            out
        }
        _ => drag(r, handle, dx, dy),
    }
}

/// Resize from a corner. The diagonally opposite corner stays where it is.
pub fn resize_corner(r: CropRegion, handle: Handle, dx: f64, dy: f64) -> CropRegion {
    match handle {
        Handle::Nw | Handle::Ne | Handle::Sw | Handle::Se => {
            let (x, w) = resize_axis(r.x, r.width,  dx, handle.moves_left());
            let (y, h) = resize_axis(r.y, r.height, dy, handle.moves_top());
            CropRegion { x, y, width: w, height: h }
        }
        _ => drag(r, handle, dx, dy),
    }
}

/// Apply one pointer delta (normalised units) to `r` through `handle`.
pub fn drag(r: CropRegion, handle: Handle, dx: f64, dy: f64) -> CropRegion {
    match handle {
        Handle::Move                                  => move_region(r, dx, dy),
        Handle::N | Handle::S | Handle::E | Handle::W => resize_edge(r, handle, dx, dy),
        Handle::Nw | Handle::Ne | Handle::Sw | Handle::Se => resize_corner(r, handle, dx, dy),
    }
}

/// One axis of a resize. `from_start` means the low edge (left/top) is the one
/// being dragged, so the high edge is the anchor. Returns (position, size).
fn resize_axis(pos: f64, size: f64, delta: f64, from_start: bool) -> (f64, f64) {
    if from_start {
        let anchor = pos + size;
        let new_size = (size - delta).clamp(MIN_CROP_SIZE, anchor.max(MIN_CROP_SIZE));
        ((anchor - new_size).max(0.0), new_size)
    } else {
        let new_size = (size + delta).clamp(MIN_CROP_SIZE, (1.0 - pos).max(MIN_CROP_SIZE));
        (pos, new_size)
    }
}

// ── Aspect-ratio constraint ───────────────────────────────────────────────────

/// Shrink `r` until its pixel-space ratio on `frame` equals `ratio`, keeping
/// the corner opposite `handle` fixed.
///
/// Edge handles anchor the corner diagonal to the dragged edge: `N` keeps the
/// bottom-left, `S` and `E` keep the top-left, `W` keeps the top-right.
/// `Move` keeps the top-left.
///
/// If the shrunk size would fall under `MIN_CROP_SIZE` on either axis, both
/// axes grow together to the smallest size that satisfies the ratio and the
/// minimum, so the ratio survives the final clamp.
pub fn constrain_aspect(r: CropRegion, ratio: f64, frame: FrameSize, handle: Handle) -> CropRegion {
    if !(ratio.is_finite() && ratio > 0.0) || frame.width == 0 || frame.height == 0 {
        return clamp_region(r);
    }

    // Ratio expressed in normalised units: width_n / height_n.
    let k = ratio * frame.height as f64 / frame.width as f64;

    let (mut w, mut h) = (r.width, r.height);
    if r.pixel_ratio(frame) > ratio {
        w = h * k;
    } else {
        h = w / k;
    }

    // Feasible heights for w = k·h with both sides in [MIN, 1].
    let h_min = MIN_CROP_SIZE.max(MIN_CROP_SIZE / k);
    let h_max = 1.0_f64.min(1.0 / k);
    if h_min <= h_max {
        h = h.clamp(h_min, h_max);
        w = h * k;
    }

    // Reposition around the anchor corner.
    let anchor_right  = handle.moves_left();
    let anchor_bottom = matches!(handle, Handle::Nw | Handle::Ne | Handle::N);
    let x = if anchor_right  { r.right()  - w } else { r.x };
    let y = if anchor_bottom { r.bottom() - h } else { r.y };

    clamp_region(CropRegion { x, y, width: w, height: h })
}

/// Lock a region to `ar` (no-op for `Free`). Anchors the top-left corner.
pub fn set_aspect_ratio(r: CropRegion, ar: AspectRatio, frame: FrameSize) -> CropRegion {
    match aspect_ratio_value(ar) {
        Some(ratio) => constrain_aspect(r, ratio, frame, Handle::Se),
        None        => r,
    }
}

/// [`drag`] followed by [`constrain_aspect`] when a ratio is locked.
pub fn drag_constrained(
    r:      CropRegion,
    handle: Handle,
    dx:     f64,
    dy:     f64,
    ratio:  Option<f64>,
    frame:  FrameSize,
) -> CropRegion {
    let free = drag(r, handle, dx, dy);
    match ratio {
        Some(ratio) if handle != Handle::Move => constrain_aspect(free, ratio, frame, handle),
        _ => free,
    }
}

/// Size into [MIN, 1], then position into [0, 1 - size].
fn clamp_region(r: CropRegion) -> CropRegion {
    let width  = sanitize(r.width,  1.0).clamp(MIN_CROP_SIZE, 1.0);
    let height = sanitize(r.height, 1.0).clamp(MIN_CROP_SIZE, 1.0);
    CropRegion {
        x: sanitize(r.x, 0.0).clamp(0.0, 1.0 - width),
        y: sanitize(r.y, 0.0).clamp(0.0, 1.0 - height),
        width,
        height,
    }
}

fn sanitize(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}

// ── Pixel conversion ──────────────────────────────────────────────────────────

/// Round to the nearest even integer (YUV420P needs even dimensions/offsets).
fn round_even(v: f64) -> u32 {
    ((v.max(0.0) / 2.0).round() * 2.0) as u32
}

/// Convert a normalised region to an even-aligned pixel rect inside `frame`.
///
/// Width and height are at least 2 and never run past the frame edge given
/// the rounded left/top. An axis under 2 px is taken whole.
///
/// ```
/// use reelqueue_core::helpers::geometry::{crop_to_pixels, CropRegion, FrameSize};
/// let px = crop_to_pixels(CropRegion::FULL, FrameSize::new(1920, 1080));
/// assert_eq!((px.left, px.top, px.width, px.height), (0, 0, 1920, 1080));
/// ```
pub fn crop_to_pixels(r: CropRegion, frame: FrameSize) -> PixelRect {
    let fw = frame.width  as f64;
    let fh = frame.height as f64;

    let (left,  width)  = pixel_axis(r.x, r.width,  fw, frame.width);
    let (top,   height) = pixel_axis(r.y, r.height, fh, frame.height);
    PixelRect { left, top, width, height }
}

fn pixel_axis(pos: f64, size: f64, frame_f: f64, frame_px: u32) -> (u32, u32) {
    // Largest even length that fits in the frame.
    let even_frame = frame_px & !1;
    if even_frame < 2 {
        // No even length fits; take the whole axis.
        return (0, frame_px);
    }
    let mut start = round_even(pos * frame_f);
    if start + 2 > even_frame {
        start = even_frame - 2;
    }
    let max_len = (even_frame - start) & !1;
    let len = round_even(size * frame_f).clamp(2, max_len);
    (start, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HD: FrameSize = FrameSize { width: 1920, height: 1080 };
    const HANDLES: [Handle; 9] = [
        Handle::Nw, Handle::Ne, Handle::Sw, Handle::Se,
        Handle::N, Handle::S, Handle::E, Handle::W, Handle::Move,
    ];

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Deterministic spread of deltas: small, large, negative, overshooting.
    fn deltas() -> Vec<(f64, f64)> {
        let steps = [-1.5, -0.4, -0.07, -0.01, 0.0, 0.013, 0.2, 0.6, 2.0];
        steps.iter().flat_map(|&dx| steps.iter().map(move |&dy| (dx, dy))).collect()
    }

    fn starts() -> Vec<CropRegion> {
        vec![
            CropRegion::FULL,
            CropRegion::new(0.25, 0.25, 0.5, 0.5),
            CropRegion::new(0.0, 0.9, 0.3, 0.1),
            CropRegion::new(0.95, 0.95, 0.05, 0.05),
            CropRegion::new(0.1, 0.0, 0.05, 1.0),
        ]
    }

    #[test]
    fn move_keeps_size_and_stays_inside() {
        let r = CropRegion::new(0.2, 0.2, 0.5, 0.4);
        let m = move_region(r, 0.9, -0.9);
        assert!(approx(m.width, 0.5) && approx(m.height, 0.4));
        assert!(approx(m.x, 0.5));
        assert!(approx(m.y, 0.0));
    }

    #[test]
    fn east_edge_anchors_left() {
        let r = CropRegion::new(0.2, 0.2, 0.5, 0.5);
        let out = resize_edge(r, Handle::E, 0.1, 0.3);
        assert!(approx(out.x, 0.2));
        assert!(approx(out.width, 0.6));
        assert_eq!(out.y, r.y);
        assert_eq!(out.height, r.height);
    }

    #[test]
    fn west_edge_anchors_right_and_clamps_min() {
        let r = CropRegion::new(0.2, 0.2, 0.5, 0.5);
        let out = resize_edge(r, Handle::W, 0.9, 0.0);
        assert!(approx(out.width, MIN_CROP_SIZE));
        assert!(approx(out.right(), 0.7));
    }

    #[test]
    fn north_edge_clamps_to_anchor_offset() {
        let r = CropRegion::new(0.2, 0.3, 0.5, 0.5);
        let out = resize_edge(r, Handle::N, 0.0, -5.0);
        assert!(approx(out.y, 0.0));
        assert!(approx(out.height, 0.8));
    }

    #[test]
    fn corner_anchors_opposite_corner() {
        let r = CropRegion::new(0.2, 0.2, 0.5, 0.5);
        let out = resize_corner(r, Handle::Nw, -0.1, -0.1);
        assert!(approx(out.right(), 0.7));
        assert!(approx(out.bottom(), 0.7));
        assert!(approx(out.width, 0.6));
        assert!(approx(out.height, 0.6));
    }

    #[test]
    fn every_drag_produces_a_valid_region() {
        for start in starts() {
            for &h in &HANDLES {
                for (dx, dy) in deltas() {
                    let out = drag(start, h, dx, dy);
                    assert!(out.is_valid(), "{h:?} {dx},{dy} from {start:?} → {out:?}");
                }
            }
        }
    }

    #[test]
    fn locked_ratio_survives_any_resize() {
        for ar in AspectRatio::ALL {
            let Some(ratio) = aspect_ratio_value(ar) else { continue };
            for frame in [HD, FrameSize::new(1080, 1920), FrameSize::new(640, 480)] {
                for start in starts() {
                    let locked = set_aspect_ratio(start, ar, frame);
                    assert!((locked.pixel_ratio(frame) - ratio).abs() < 1e-6, "{ar:?} lock {locked:?}");
                    for &h in &HANDLES {
                        for (dx, dy) in deltas() {
                            let out = drag_constrained(locked, h, dx, dy, Some(ratio), frame);
                            assert!(out.is_valid(), "{ar:?} {h:?} → {out:?}");
                            assert!(
                                (out.pixel_ratio(frame) - ratio).abs() < 1e-6,
                                "{ar:?} {h:?} {dx},{dy} → ratio {}",
                                out.pixel_ratio(frame),
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn full_frame_sixteen_nine_is_unchanged() {
        let out = set_aspect_ratio(CropRegion::FULL, AspectRatio::SixteenNine, HD);
        assert!(approx(out.width, 1.0));
        assert!(approx(out.height, 1.0));
    }

    #[test]
    fn full_frame_square_shrinks_width() {
        let out = set_aspect_ratio(CropRegion::FULL, AspectRatio::OneOne, HD);
        assert!(approx(out.height, 1.0));
        assert!(approx(out.width, 1080.0 / 1920.0));
        let px = crop_to_pixels(out, HD);
        assert_eq!((px.width, px.height), (1080, 1080));
    }

    #[test]
    fn constraint_keeps_opposite_corner() {
        let r = CropRegion::new(0.1, 0.1, 0.8, 0.4);
        let out = constrain_aspect(r, 1.0, HD, Handle::Nw);
        assert!(approx(out.right(), 0.9));
        assert!(approx(out.bottom(), 0.5));

        let out = constrain_aspect(r, 1.0, HD, Handle::Sw);
        assert!(approx(out.right(), 0.9));
        assert!(approx(out.y, 0.1));

        let out = constrain_aspect(r, 1.0, HD, Handle::N);
        assert!(approx(out.x, 0.1));
        assert!(approx(out.bottom(), 0.5));
    }

    #[test]
    fn pixels_are_even_and_inside_frame() {
        let frames = [HD, FrameSize::new(1281, 721), FrameSize::new(34, 20), FrameSize::new(3840, 2160)];
        for frame in frames {
            for start in starts() {
                for &h in &HANDLES {
                    for (dx, dy) in deltas() {
                        let px = crop_to_pixels(drag(start, h, dx, dy), frame);
                        assert_eq!(px.width % 2, 0);
                        assert_eq!(px.height % 2, 0);
                        assert!(px.width >= 2 && px.height >= 2);
                        assert!(px.left + px.width <= frame.width, "{px:?} in {frame:?}");
                        assert!(px.top + px.height <= frame.height, "{px:?} in {frame:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn pixel_rounding_goes_to_nearest_even() {
        let px = crop_to_pixels(CropRegion::new(0.1, 0.1, 0.5, 0.5), FrameSize::new(1001, 1001));
        // 100.1 → 100, 500.5 → 500
        assert_eq!(px.left, 100);
        assert_eq!(px.width, 500);
    }

    #[test]
    fn sub_two_pixel_frame_stays_inside() {
        let px = crop_to_pixels(CropRegion::new(0.2, 0.0, 0.5, 1.0), FrameSize::new(1, 720));
        assert_eq!((px.left, px.width), (0, 1));
        assert_eq!((px.top, px.height), (0, 720));

        let px = crop_to_pixels(CropRegion::FULL, FrameSize::new(0, 0));
        assert_eq!((px.width, px.height), (0, 0));

        let px = crop_to_pixels(CropRegion::new(0.9, 0.9, 0.1, 0.1), FrameSize::new(3, 3));
        assert_eq!((px.left, px.width), (0, 2));
    }

    #[test]
    fn aspect_labels() {
        assert_eq!(aspect_ratio_label(AspectRatio::SixteenNine), "16:9 (Landscape)");
        assert_eq!(aspect_ratio_label(AspectRatio::OneOne), "1:1 (Square)");
        assert_eq!(aspect_ratio_label(AspectRatio::Free), "Free");
    }

    #[test]
    fn aspect_parse() {
        assert_eq!(AspectRatio::parse("16:9"), Some(AspectRatio::SixteenNine));
        assert_eq!(AspectRatio::parse("4/5"), Some(AspectRatio::FourFive));
        assert_eq!(AspectRatio::parse("FREE"), Some(AspectRatio::Free));
        assert_eq!(AspectRatio::parse("5:4"), None);
    }
}
