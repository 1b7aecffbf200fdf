// crates/reelqueue-media/src/helpers/yuv.rs
//
// YUV420P plane utilities for the crop path.
//
// The crop rect arrives already even-aligned (left, top, width, height are
// all even), so the chroma planes are cropped at exactly half those values
// with no rounding.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video as VideoFrame;

use reelqueue_core::helpers::geometry::PixelRect;

/// Copy the `rect` region of a YUV420P frame into a new, tightly sized frame.
///
/// `rect` must lie inside `src` (crop_to_pixels guarantees this for the
/// frame size it was given; the caller re-clamps against the decoded size).
pub fn crop_yuv420p(src: &VideoFrame, rect: PixelRect) -> VideoFrame {
    let mut dst = VideoFrame::new(Pixel::YUV420P, rect.width, rect.height);

    let (x, y) = (rect.left as usize, rect.top as usize);
    let (w, h) = (rect.width as usize, rect.height as usize);

    copy_plane(src, &mut dst, 0, x,     y,     w,     h);
    copy_plane(src, &mut dst, 1, x / 2, y / 2, w / 2, h / 2);
    copy_plane(src, &mut dst, 2, x / 2, y / 2, w / 2, h / 2);

    dst
}

fn copy_plane(src: &VideoFrame, dst: &mut VideoFrame, plane: usize, x: usize, y: usize, w: usize, h: usize) {
    let s_stride = src.stride(plane);
    let d_stride = dst.stride(plane);
    let s_data   = src.data(plane);
    let d_data   = dst.data_mut(plane);
    for row in 0..h {
        let so = (y + row) * s_stride + x;
        let d0 = row * d_stride;
        d_data[d0 .. d0 + w].copy_from_slice(&s_data[so .. so + w]);
    }
}

/// Clamp an even-aligned rect into a `width`×`height` frame, keeping it even.
pub fn clamp_rect(rect: PixelRect, width: u32, height: u32) -> PixelRect {
    let (fw, fh) = (width & !1, height & !1);
    let left   = rect.left.min(fw.saturating_sub(2)) & !1;
    let top    = rect.top.min(fh.saturating_sub(2)) & !1;
    let width  = (rect.width.min(fw - left) & !1).max(2);
    let height = (rect.height.min(fh - top) & !1).max(2);
    PixelRect { left, top, width, height }
}

/// Force 1:1 sample aspect ratio. swscale copies the source SAR onto its
/// output and there is no safe setter for it in ffmpeg-the-third 4.
pub fn set_square_pixels(frame: &mut VideoFrame) {
    unsafe {
        (*frame.as_mut_ptr()).sample_aspect_ratio = ffmpeg::ffi::AVRational { num: 1, den: 1 };
    }
}
