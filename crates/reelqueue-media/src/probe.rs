// crates/reelqueue-media/src/probe.rs
//
// In-process FFmpeg probing: duration, video dimensions, which tracks exist.

use std::path::Path;

use tracing::debug;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;

use reelqueue_core::error::JobError;
use reelqueue_core::protocol::MediaInfo;

pub fn probe_media(path: &Path) -> Result<MediaInfo, JobError> {
    let ctx = input(path)
        .map_err(|e| JobError::UnsupportedInputFormat(format!("{}: {e}", path.display())))?;

    let mut info = MediaInfo {
        duration:  ctx.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64,
        has_audio: ctx.streams().best(Type::Audio).is_some(),
        ..MediaInfo::default()
    };

    if let Some(stream) = ctx.streams().best(Type::Video) {
        info.has_video = true;
        let (w, h) = unsafe {
            let p = stream.parameters().as_ptr();
            ((*p).width as u32, (*p).height as u32)
        };
        info.width  = w;
        info.height = h;
    }

    // Container without a duration: fall back to the stream's own.
    if info.duration <= 0.0 {
        if let Some(stream) = ctx.streams().best(Type::Video)
            .or_else(|| ctx.streams().best(Type::Audio))
        {
            let d = stream.duration() as f64 * f64::from(stream.time_base());
            info.duration = d.max(0.0);
        }
    }

    debug!(
        path = %path.display(),
        duration = info.duration,
        width = info.width,
        height = info.height,
        audio = info.has_audio,
        "probed"
    );
    Ok(info)
}
