// crates/reelqueue-media/src/helpers/seek.rs
//
// Seek helper for the trim in-point.
//
// Seeks backwards (`..=seek_ts`) so the demuxer lands on the keyframe before
// the target; the encoder's PTS filter drops the pre-roll. A forward seek
// would land on the next keyframe and lose every frame up to it.
//
// A target of 0 skips the seek: the demuxer already starts there, and
// avformat_seek_file(max_ts=0) fails with EPERM on some platforms.

use ffmpeg_the_third as ffmpeg;
use tracing::warn;

/// Seek `ictx` to `target_secs`. Returns `false` when the seek failed; the
/// caller then decodes from the start and relies on its PTS filter.
pub fn seek_to_secs(ictx: &mut ffmpeg::format::context::Input, target_secs: f64) -> bool {
    if target_secs <= 0.0 {
        return true;
    }

    let seek_ts = (target_secs * ffmpeg::ffi::AV_TIME_BASE as f64) as i64;
    match ictx.seek(seek_ts, ..=seek_ts) {
        Ok(()) => true,
        Err(e) => {
            warn!("seek to {target_secs:.3}s failed: {e}, decoding from the start");
            false
        }
    }
}
