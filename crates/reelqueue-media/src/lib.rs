// crates/reelqueue-media/src/lib.rs
//
// The isolated execution context. Talks to reelqueue-app through channels
// only (see worker.rs); never touches the queue.
//
// To add a new codec backend:
//   1. Implement `Codec` in a new module
//   2. Gate it behind a cargo feature if it needs system libraries
//   3. Return it from `default_codec`

pub mod chunk;
pub mod codec;
pub mod worker;

#[cfg(feature = "ffmpeg")]
pub mod encode;
#[cfg(feature = "ffmpeg")]
pub mod probe;
#[cfg(feature = "ffmpeg")]
mod helpers;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

pub use codec::{Codec, EncodeControl, UnavailableCodec};
pub use worker::{MediaWorker, MediaWorkerFactory, WorkerFactory, WorkerLink};

/// The best codec this build has. Falls back to `UnavailableCodec` when
/// FFmpeg is compiled out or fails to initialise.
pub fn default_codec() -> Arc<dyn Codec> {
    #[cfg(feature = "ffmpeg")]
    {
        match encode::FfmpegCodec::new() {
            Ok(codec) => return Arc::new(codec),
            Err(e) => tracing::error!("FFmpeg unavailable: {e:#}"),
        }
    }
    Arc::new(UnavailableCodec)
}
