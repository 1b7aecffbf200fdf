// crates/reelqueue-core/src/error.rs
//
// Error taxonomy shared by the media worker, the channel client and the
// orchestrator. `JobError` travels inside `WorkerEvent::Error`, so it is plain
// data (Clone + serde) rather than wrapping io/ffmpeg error sources.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single job did not produce output.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobError {
    /// Host cannot encode video at all. Fatal, raised before submission.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("no encodable codec: {0}")]
    NoEncodableCodec(String),

    #[error("input has no video track")]
    NoVideoTrack,

    #[error("unsupported input format: {0}")]
    UnsupportedInputFormat(String),

    /// The execution context died. Every outstanding job gets this.
    #[error("media worker crashed: {0}")]
    ChannelCrashed(String),

    #[error("stream write failed: {0}")]
    StreamWriteFailed(String),

    /// User-initiated. Never stored as a failure.
    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Unknown(String),
}

impl JobError {
    pub fn unknown<T: Into<String>>(msg: T) -> Self {
        Self::Unknown(msg.into())
    }

    pub fn crashed<T: Into<String>>(msg: T) -> Self {
        Self::ChannelCrashed(msg.into())
    }

    pub fn stream_write<T: Into<String>>(msg: T) -> Self {
        Self::StreamWriteFailed(msg.into())
    }

    /// Errors that make every following job fail the same way. The
    /// orchestrator stops its loop on these instead of moving on.
    pub fn stops_queue(&self) -> bool {
        matches!(self, JobError::UnsupportedEnvironment(_) | JobError::ChannelCrashed(_))
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        Self::Unknown(format!("IO error: {err}"))
    }
}

/// Rejections from the queue's mutation API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is full ({max} items)")]
    QueueFull { max: usize },

    #[error("'{name}' is {size} bytes, over the {max} byte limit")]
    FileTooLarge { name: String, size: u64, max: u64 },

    #[error("'{name}' is already queued")]
    Duplicate { name: String },

    #[error("no queue item with that id")]
    NotFound,

    #[error("item is processing")]
    Processing,

    #[error("only failed or cancelled items can be retried")]
    NotRetryable,

    /// `mark_processing` on an item that is no longer pending.
    #[error("item is not pending")]
    NotPending,
}

pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_channel_scoped_errors_stop_the_queue() {
        assert!(JobError::crashed("x").stops_queue());
        assert!(JobError::UnsupportedEnvironment("no h264".into()).stops_queue());
        assert!(!JobError::NoVideoTrack.stops_queue());
        assert!(!JobError::Cancelled.stops_queue());
        assert!(!JobError::stream_write("disk full").stops_queue());
    }

    #[test]
    fn messages_are_readable() {
        assert_eq!(JobError::Cancelled.to_string(), "cancelled");
        assert_eq!(JobError::unknown("boom").to_string(), "boom");
        let e = QueueError::FileTooLarge { name: "a.mov".into(), size: 10, max: 5 };
        assert!(e.to_string().contains("a.mov"));
    }
}
