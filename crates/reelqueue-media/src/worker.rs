// crates/reelqueue-media/src/worker.rs
//
// MediaWorker: the isolated execution context. Reached only through the two
// channels in `WorkerLink`; nothing else is shared with the caller.
//
// Threads:
//   control thread: emits Ready then Capabilities, then serves WorkerRequests.
//                    Owns the per-job cancel flags.
//   encode threads: one per Convert. Runs Codec::transcode into a ChunkWriter
//                    and sends the job's terminal events.
//
// Crash model: a panicking codec is caught on its encode thread and reported
// to the control thread, which cancels everything else and exits. Once the
// last encode thread is gone the event channel disconnects, and that
// disconnect is what the client treats as a crash.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use reelqueue_core::error::JobError;
use reelqueue_core::protocol::{ConvertRequest, JobId, WorkerEvent, WorkerRequest};

use crate::chunk::ChunkWriter;
use crate::codec::{Codec, EncodeControl};

/// Capacity of the event channel. Stream chunks are 1 MiB, so this also bounds
/// how far an encode can run ahead of a slow consumer.
const EVENT_CAPACITY: usize = 64;
const REQUEST_CAPACITY: usize = 64;

/// The caller's end of a running worker.
pub struct WorkerLink {
    pub requests: Sender<WorkerRequest>,
    pub events:   Receiver<WorkerEvent>,
}

/// Builds a fresh worker. The client calls this again after a crash.
pub trait WorkerFactory: Send + Sync + 'static {
    fn spawn(&self) -> WorkerLink;
}

impl<F> WorkerFactory for F
where
    F: Fn() -> WorkerLink + Send + Sync + 'static,
{
    fn spawn(&self) -> WorkerLink {
        self()
    }
}

/// Spawns a `MediaWorker` around a shared codec.
pub struct MediaWorkerFactory {
    codec: Arc<dyn Codec>,
}

impl MediaWorkerFactory {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }
}

impl WorkerFactory for MediaWorkerFactory {
    fn spawn(&self) -> WorkerLink {
        MediaWorker::spawn(Arc::clone(&self.codec))
    }
}

type CancelMap = Arc<Mutex<HashMap<JobId, Arc<AtomicBool>>>>;

// ── MediaWorker ───────────────────────────────────────────────────────────────

pub struct MediaWorker {
    codec:    Arc<dyn Codec>,
    tx:       Sender<WorkerEvent>,
    /// Per-job cancel flags. Inserted before the encode thread starts, removed
    /// by the encode thread when it is done.
    cancels:  CancelMap,
    crash_tx: Sender<String>,
}

impl MediaWorker {
    pub fn spawn(codec: Arc<dyn Codec>) -> WorkerLink {
        let (req_tx, req_rx)     = bounded::<WorkerRequest>(REQUEST_CAPACITY);
        let (event_tx, event_rx) = bounded::<WorkerEvent>(EVENT_CAPACITY);
        let (crash_tx, crash_rx) = bounded::<String>(4);

        let worker = MediaWorker {
            codec,
            tx: event_tx,
            cancels: Arc::new(Mutex::new(HashMap::new())),
            crash_tx,
        };

        let spawned = thread::Builder::new()
            .name("media-worker".into())
            .spawn(move || worker.run(req_rx, crash_rx));
        if let Err(e) = spawned {
            // Worker and its Sender were dropped with the closure; the client
            // sees a disconnected channel and handles it as a crash.
            error!("could not start media worker thread: {e}");
        }

        WorkerLink { requests: req_tx, events: event_rx }
    }

    fn run(self, requests: Receiver<WorkerRequest>, crashes: Receiver<String>) {
        let caps = self.codec.capabilities();
        info!(codec = self.codec.name(), video = caps.can_encode_video, audio = caps.can_encode_audio, "media worker ready");
        if self.tx.send(WorkerEvent::Ready).is_err()
            || self.tx.send(WorkerEvent::Capabilities(caps)).is_err()
        {
            return;
        }

        loop {
            select! {
                recv(requests) -> msg => match msg {
                    Ok(WorkerRequest::Convert(req)) => self.start_job(req),
                    Ok(WorkerRequest::Cancel { job_id }) => self.cancel_job(&job_id),
                    Ok(WorkerRequest::Shutdown) => {
                        debug!("media worker shutting down");
                        self.cancel_all();
                        return;
                    }
                    Err(_) => {
                        debug!("request channel closed, media worker exiting");
                        self.cancel_all();
                        return;
                    }
                },
                recv(crashes) -> msg => {
                    let why = msg.unwrap_or_else(|_| "unknown".into());
                    error!("media worker crashed: {why}");
                    self.cancel_all();
                    return;
                }
            }
        }
    }

    fn start_job(&self, req: ConvertRequest) {
        let job_id = req.job_id.clone();
        let cancel = Arc::new(AtomicBool::new(false));

        // Register before spawning so a Cancel that arrives right behind the
        // Convert always finds the flag.
        if self.cancels.lock().insert(job_id.clone(), Arc::clone(&cancel)).is_some() {
            warn!(job = %job_id, "duplicate job id, previous encode can no longer be cancelled");
        }

        let codec    = Arc::clone(&self.codec);
        let tx       = self.tx.clone();
        let cancels  = Arc::clone(&self.cancels);
        let crash_tx = self.crash_tx.clone();

        let spawned = thread::Builder::new()
            .name(format!("encode-{job_id}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_job(codec.as_ref(), &req, &cancel, &tx)
                }));
                cancels.lock().remove(&req.job_id);
                if let Err(payload) = outcome {
                    let why = panic_message(payload.as_ref());
                    let _ = crash_tx.send(format!("encode of job {} panicked: {why}", req.job_id));
                }
            });

        if let Err(e) = spawned {
            self.cancels.lock().remove(&job_id);
            let _ = self.tx.send(WorkerEvent::Error {
                job_id,
                error: JobError::unknown(format!("could not start encode thread: {e}")),
            });
        }
    }

    fn cancel_job(&self, job_id: &str) {
        match self.cancels.lock().get(job_id) {
            Some(flag) => {
                debug!(job = %job_id, "cancel requested");
                flag.store(true, Ordering::Relaxed);
            }
            None => debug!(job = %job_id, "cancel for unknown or finished job"),
        }
    }

    fn cancel_all(&self) {
        for flag in self.cancels.lock().values() {
            flag.store(true, Ordering::Relaxed);
        }
    }
}

// ── Encode thread body ────────────────────────────────────────────────────────

fn run_job(codec: &dyn Codec, req: &ConvertRequest, cancel: &AtomicBool, tx: &Sender<WorkerEvent>) {
    let job_id = &req.job_id;
    info!(
        job = %job_id,
        input = %req.input.name,
        preset = %req.output.preset,
        video_bitrate = req.output.video_bitrate,
        audio = req.output.include_audio,
        sink = ?req.sink,
        "encode started"
    );

    let mut writer = ChunkWriter::new(job_id.clone(), req.sink, tx.clone());
    let result = {
        let mut ctl = EncodeControl::new(job_id, cancel, tx);
        codec.transcode(req, &mut ctl, &mut writer)
    };

    // A cancel that lands after the codec returned still wins: the caller
    // already asked for this job to go away.
    let cancelled = cancel.load(Ordering::Relaxed);
    let terminal = match result {
        Ok(()) if !cancelled => {
            match writer.finish(req.output.container.mime(), &req.output.filename) {
                Ok(total) => {
                    info!(job = %job_id, bytes = total, "encode finished");
                    return;
                }
                Err(e) => {
                    // Event channel is gone; nobody is listening.
                    debug!(job = %job_id, "dropping result: {e}");
                    return;
                }
            }
        }
        Ok(()) | Err(JobError::Cancelled) => WorkerEvent::Canceled { job_id: job_id.clone() },
        Err(_) if cancelled => WorkerEvent::Canceled { job_id: job_id.clone() },
        Err(error) => {
            warn!(job = %job_id, "encode failed: {error}");
            WorkerEvent::Error { job_id: job_id.clone(), error }
        }
    };
    if matches!(terminal, WorkerEvent::Canceled { .. }) {
        info!(job = %job_id, "encode cancelled");
    }
    let _ = tx.send(terminal);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use reelqueue_core::job::InputFile;
    use reelqueue_core::protocol::{Capabilities, Container, DoneResult, OutputSpec, SinkMode};

    use crate::chunk::CHUNK_SIZE;
    use crate::testing::Scripted;

    fn request(job_id: &str, name: &str, sink: SinkMode) -> WorkerRequest {
        WorkerRequest::Convert(ConvertRequest {
            job_id: job_id.into(),
            input: InputFile { name: name.into(), size: 10, path: PathBuf::from(name) },
            output: OutputSpec {
                container:     Container::Mp4,
                preset:        "medium".into(),
                video_bitrate: 5_000_000,
                audio_bitrate: 128_000,
                max_dimension: None,
                include_audio: true,
                filename:      "out.mp4".into(),
            },
            sink,
            edit: None,
        })
    }

    fn spawn(size: usize, delay: Duration) -> WorkerLink {
        let link = MediaWorker::spawn(Arc::new(Scripted::new(size).with_delay(delay)));
        assert_eq!(link.events.recv_timeout(Duration::from_secs(5)).unwrap(), WorkerEvent::Ready);
        assert!(matches!(
            link.events.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerEvent::Capabilities(Capabilities { can_encode_video: true, .. })
        ));
        link
    }

    fn collect_until_terminal(link: &WorkerLink, stream: bool) -> Vec<WorkerEvent> {
        let mut out = Vec::new();
        loop {
            let ev = link.events.recv_timeout(Duration::from_secs(10)).unwrap();
            let done = match &ev {
                WorkerEvent::Error { .. } | WorkerEvent::Canceled { .. } => true,
                WorkerEvent::Done { .. } => !stream,
                WorkerEvent::StreamComplete { .. } => true,
                _ => false,
            };
            out.push(ev);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn buffer_job_returns_payload() {
        let link = spawn(200_000, Duration::ZERO);
        link.requests.send(request("j1", "a.mov", SinkMode::Buffer)).unwrap();
        let events = collect_until_terminal(&link, false);
        match events.last().unwrap() {
            WorkerEvent::Done { job_id, result: DoneResult::Buffer { payload, mime, .. } } => {
                assert_eq!(job_id, "j1");
                assert_eq!(payload.len(), 200_000);
                assert_eq!(mime, "video/mp4");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stream_job_sequence() {
        let size = CHUNK_SIZE * 2 + 12_345;
        let link = spawn(size, Duration::ZERO);
        link.requests.send(request("s1", "big.mov", SinkMode::Stream)).unwrap();
        let events = collect_until_terminal(&link, true);

        let mut last_bytes = 0;
        let mut expected_pos = 0u64;
        let mut saw_done = false;
        for ev in &events {
            match ev {
                WorkerEvent::Progress { bytes_written, .. } => {
                    assert!(*bytes_written >= last_bytes);
                    last_bytes = *bytes_written;
                }
                WorkerEvent::StreamChunk { position, bytes, .. } => {
                    assert_eq!(*position, expected_pos);
                    expected_pos += bytes.len() as u64;
                }
                WorkerEvent::Done { result, .. } => {
                    assert!(matches!(result, DoneResult::Stream { .. }));
                    saw_done = true;
                }
                WorkerEvent::StreamComplete { total_bytes, .. } => {
                    assert!(saw_done, "StreamComplete before Done");
                    assert_eq!(*total_bytes, size as u64);
                    assert_eq!(expected_pos, size as u64);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn cancel_stops_running_job() {
        let link = spawn(64 * 1024 * 200, Duration::from_millis(5));
        link.requests.send(request("c1", "long.mov", SinkMode::Buffer)).unwrap();
        // Wait for the encode to be underway.
        loop {
            if let WorkerEvent::Progress { .. } = link.events.recv_timeout(Duration::from_secs(5)).unwrap() {
                break;
            }
        }
        link.requests.send(WorkerRequest::Cancel { job_id: "c1".into() }).unwrap();
        let events = collect_until_terminal(&link, false);
        assert_eq!(events.last(), Some(&WorkerEvent::Canceled { job_id: "c1".into() }));
    }

    #[test]
    fn codec_error_is_job_scoped() {
        let link = spawn(1000, Duration::ZERO);
        link.requests.send(request("e1", "novideo", SinkMode::Buffer)).unwrap();
        let events = collect_until_terminal(&link, false);
        assert_eq!(
            events.last(),
            Some(&WorkerEvent::Error { job_id: "e1".into(), error: JobError::NoVideoTrack })
        );
        // Worker is still alive.
        link.requests.send(request("e2", "ok.mov", SinkMode::Buffer)).unwrap();
        assert!(matches!(collect_until_terminal(&link, false).last(), Some(WorkerEvent::Done { .. })));
    }

    #[test]
    fn panic_disconnects_the_channel() {
        let link = spawn(1000, Duration::ZERO);
        link.requests.send(request("p1", "boom", SinkMode::Buffer)).unwrap();
        loop {
            match link.events.recv_timeout(Duration::from_secs(10)) {
                Ok(ev) => panic!("no event expected after a crash, got {ev:?}"),
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => panic!("worker did not exit"),
            }
        }
    }

    #[test]
    fn shutdown_ends_the_worker() {
        let link = spawn(1000, Duration::ZERO);
        link.requests.send(WorkerRequest::Shutdown).unwrap();
        assert!(matches!(
            link.events.recv_timeout(Duration::from_secs(5)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
    }
}
