// crates/reelqueue-media/src/helpers/mod.rs
//
// FFmpeg implementation details of the encode pipeline. Not re-exported.

pub mod seek;
pub mod yuv;
