// crates/reelqueue-app/src/orchestrator.rs
//
// Orchestrator: pulls pending items off the JobStore one at a time and drives
// each through the ChannelClient.
//
//   Idle ──start──▶ Running ──pause──▶ Paused ──resume──▶ Running
//     ▲                │
//     └── exhausted ───┘   (also on dispose, or an error that stops the queue)
//
// start/pause/resume/cancel_current only flip flags, notify the condvar or
// forward a Cancel; they never wait on the job. The pull loop runs on its own
// thread and parks on the condvar while paused. Pausing lets the in-flight
// job finish; the next item is not taken until resume.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reelqueue_core::error::{JobError, QueueError};
use reelqueue_core::job::{compression_ratio, CompletedResult, JobKind, OutputPayload, ProgressInfo, QueueItem};
use reelqueue_core::protocol::{ConvertRequest, Container, DoneResult, JobId, OutputSpec, SinkMode};
use reelqueue_core::settings::GlobalSettings;

use crate::client::{ChannelClient, JobHandle, JobUpdate};
use crate::sink::{free_path, FileSink, SequentialWriter};
use crate::store::{JobStore, RunState};

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Where stream sinks write and where auto-download saves buffer results.
    pub output_dir:             PathBuf,
    /// Inputs at least this large run in stream mode.
    pub stream_threshold_bytes: u64,
    /// How long a cancelled job may take to acknowledge before it is abandoned.
    pub cancel_timeout:         Duration,
    /// Longest silence tolerated from a running job.
    pub job_timeout:            Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_dir:             PathBuf::from("."),
            stream_threshold_bytes: 256 * 1024 * 1024,
            cancel_timeout:         Duration::from_secs(5),
            job_timeout:            Duration::from_secs(300),
        }
    }
}

// ── Control block ─────────────────────────────────────────────────────────────

struct Current {
    item_id:          Uuid,
    job_id:           JobId,
    cancel_requested: bool,
}

#[derive(Default)]
struct Control {
    state:        RunState,
    paused:       bool,
    disposed:     bool,
    loop_running: bool,
    current:      Option<Current>,
}

struct Shared {
    store:   Arc<JobStore>,
    client:  Arc<ChannelClient>,
    config:  OrchestratorConfig,
    control: Mutex<Control>,
    resumed: Condvar,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Shared {
    fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }
}

/// How one job ended, before it is written back to the store.
enum Outcome {
    Buffer(Vec<u8>),
    Streamed { path: PathBuf, size: u64 },
    Cancelled,
    Failed(JobError),
}

enum Flow {
    Continue,
    Stop,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct Orchestrator {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn init(store: Arc<JobStore>, client: Arc<ChannelClient>, config: OrchestratorConfig) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            shared: Arc::new(Shared {
                store,
                client,
                config,
                control: Mutex::new(Control::default()),
                resumed: Condvar::new(),
                wake_tx,
                wake_rx,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.shared.control.lock().state
    }

    /// Queue item of the job in flight.
    pub fn current_item(&self) -> Option<Uuid> {
        self.shared.control.lock().current.as_ref().map(|c| c.item_id)
    }

    /// Spawn the pull loop. `false` when nothing is pending, the loop is
    /// already running, or the orchestrator has been disposed.
    pub fn start(&self) -> bool {
        let mut ctl = self.shared.control.lock();
        if ctl.disposed || ctl.loop_running || !self.shared.store.has_pending() {
            return false;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("orchestrator".into())
            .spawn(move || run_loop(&shared));
        match spawned {
            Ok(handle) => {
                ctl.loop_running = true;
                ctl.paused       = false;
                ctl.state        = RunState::Running;
                self.shared.store.publish_run_state(RunState::Running);
                drop(ctl);
                info!("queue started");
                // A previous loop has already left run_loop; dropping its
                // handle just detaches the finished thread.
                *self.worker.lock() = Some(handle);
                true
            }
            Err(e) => {
                error!("could not start orchestrator thread: {e}");
                false
            }
        }
    }

    /// Stop taking new items after the current one. `false` when not running.
    pub fn pause(&self) -> bool {
        let mut ctl = self.shared.control.lock();
        if !ctl.loop_running || ctl.paused {
            return false;
        }
        ctl.paused = true;
        ctl.state  = RunState::Paused;
        self.shared.store.publish_run_state(RunState::Paused);
        info!("queue paused");
        true
    }

    pub fn resume(&self) -> bool {
        let mut ctl = self.shared.control.lock();
        if !ctl.paused {
            return false;
        }
        ctl.paused = false;
        if ctl.loop_running {
            ctl.state = RunState::Running;
            self.shared.store.publish_run_state(RunState::Running);
        }
        drop(ctl);
        self.shared.resumed.notify_all();
        info!("queue resumed");
        true
    }

    /// Cancel the job in flight. The item ends up `cancelled` once the worker
    /// acknowledges or `cancel_timeout` passes. `false` when idle.
    pub fn cancel_current(&self) -> bool {
        let job_id = {
            let mut ctl = self.shared.control.lock();
            let Some(cur) = ctl.current.as_mut() else { return false };
            cur.cancel_requested = true;
            cur.job_id.clone()
        };
        info!(job = %job_id, "cancel requested");
        self.shared.client.cancel(&job_id);
        self.shared.wake();
        true
    }

    /// Stop the loop, cancelling any job in flight, and join the thread.
    pub fn dispose(&self) {
        let job_id = {
            let mut ctl = self.shared.control.lock();
            if ctl.disposed {
                return;
            }
            ctl.disposed = true;
            ctl.current.as_mut().map(|c| {
                c.cancel_requested = true;
                c.job_id.clone()
            })
        };
        if let Some(job_id) = job_id {
            self.shared.client.cancel(&job_id);
        }
        self.shared.resumed.notify_all();
        self.shared.wake();

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("orchestrator thread panicked");
            }
        }
        debug!("orchestrator disposed");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ── Pull loop ─────────────────────────────────────────────────────────────────

fn run_loop(shared: &Shared) {
    let mut stopped = false;
    loop {
        {
            let mut ctl = shared.control.lock();
            while ctl.paused && !ctl.disposed {
                shared.resumed.wait(&mut ctl);
            }
            if ctl.disposed {
                break;
            }
        }

        if let Some(item) = shared.store.next_pending() {
            if let Flow::Stop = process(shared, item) {
                stopped = true;
                break;
            }
            continue;
        }

        // Re-check under the control lock so an item added just now with a
        // start() that saw loop_running is not stranded.
        let ctl = shared.control.lock();
        if !ctl.disposed && shared.store.has_pending() {
            continue;
        }
        break;
    }

    let mut ctl = shared.control.lock();
    ctl.loop_running = false;
    ctl.paused       = false;
    ctl.state        = RunState::Idle;
    shared.store.publish_run_state(RunState::Idle);
    if stopped {
        warn!("queue stopped");
    } else {
        info!("queue idle");
    }
}

fn process(shared: &Shared, item: QueueItem) -> Flow {
    // The transition and `current` move together under the control lock, so
    // cancel_current never sees a processing item it cannot reach.
    let job_id = Uuid::new_v4().to_string();
    let item = {
        let mut ctl = shared.control.lock();
        match shared.store.mark_processing(item.id) {
            Ok(item) => {
                ctl.current = Some(Current { item_id: item.id, job_id: job_id.clone(), cancel_requested: false });
                item
            }
            // Removed, cleared or retried out from under us since the loop
            // looked; the next pending item is still fair game.
            Err(e @ (QueueError::NotFound | QueueError::NotPending)) => {
                debug!(id = %item.id, "skipping item: {e}");
                return Flow::Continue;
            }
            Err(e) => {
                error!(id = %item.id, "could not start item: {e}");
                return Flow::Stop;
            }
        }
    };

    let settings = shared.store.settings().merged(item.settings.as_ref());
    let sink = if item.input.size >= shared.config.stream_threshold_bytes {
        SinkMode::Stream
    } else {
        SinkMode::Buffer
    };
    let req = build_request(&item, &settings, sink, job_id.clone());
    info!(id = %item.id, job = %job_id, name = %item.input.name, preset = settings.quality.label(), ?sink, "job started");

    let outcome = run_job(shared, &item, req);
    shared.control.lock().current = None;
    finish(shared, &item, &settings, outcome)
}

fn build_request(item: &QueueItem, settings: &GlobalSettings, sink: SinkMode, job_id: JobId) -> ConvertRequest {
    let rates = settings.quality.bitrates();
    ConvertRequest {
        job_id,
        input:  item.input.clone(),
        output: OutputSpec {
            container:     Container::Mp4,
            preset:        settings.quality.label().to_string(),
            video_bitrate: rates.video,
            audio_bitrate: rates.audio,
            max_dimension: settings.resolution.max_dimension(),
            include_audio: true,
            filename:      item.output_name(),
        },
        sink,
        edit: match &item.kind {
            JobKind::Convert => None,
            JobKind::Crop(edit) => Some(*edit).filter(|e| !e.is_identity()),
        },
    }
}

fn run_job(shared: &Shared, item: &QueueItem, req: ConvertRequest) -> Outcome {
    let mut writer = match req.sink {
        SinkMode::Buffer => None,
        SinkMode::Stream => {
            let dest = free_path(&shared.config.output_dir, &req.output.filename);
            match FileSink::create(&dest) {
                Ok(sink) => Some(SequentialWriter::new(Box::new(sink))),
                Err(e) => return Outcome::Failed(JobError::stream_write(format!("{}: {e}", dest.display()))),
            }
        }
    };

    let handle = match shared.client.submit(req) {
        Ok(handle) => handle,
        Err(e) => {
            if let Some(w) = writer.take() {
                w.abort();
            }
            return Outcome::Failed(e);
        }
    };

    let outcome = pump(shared, item, &handle, &mut writer);
    if let Some(w) = writer.take() {
        w.abort();
    }
    outcome
}

/// Consume one job's updates until it reaches a terminal state, times out or
/// is abandoned after an unanswered cancel.
fn pump(shared: &Shared, item: &QueueItem, handle: &JobHandle, writer: &mut Option<SequentialWriter>) -> Outcome {
    let started = Instant::now();
    let mut last_activity = started;
    let mut cancel_deadline: Option<Instant> = None;

    loop {
        if cancel_deadline.is_none() {
            let ctl = shared.control.lock();
            let requested = ctl.disposed || ctl.current.as_ref().is_some_and(|c| c.cancel_requested);
            drop(ctl);
            if requested {
                // Again here: a cancel that landed before submit reached a
                // worker that did not know the job yet.
                shared.client.cancel(&handle.job_id);
                cancel_deadline = Some(Instant::now() + shared.config.cancel_timeout);
            }
        }
        let deadline = cancel_deadline.unwrap_or(last_activity + shared.config.job_timeout);
        let wait = deadline.saturating_duration_since(Instant::now());

        select! {
            recv(handle.updates) -> msg => {
                let Ok(update) = msg else {
                    return Outcome::Failed(JobError::crashed("job channel closed without a result"));
                };
                last_activity = Instant::now();
                match update {
                    JobUpdate::Progress { fraction, bytes_written } => {
                        let info = ProgressInfo::estimate(fraction, bytes_written, started.elapsed());
                        shared.store.update_progress(item.id, info);
                    }
                    JobUpdate::Warning(message) => warn!(id = %item.id, "{message}"),
                    JobUpdate::Chunk { bytes, position } => match writer.as_mut() {
                        Some(w) => {
                            if let Err(e) = w.write_chunk(&bytes, position) {
                                shared.client.cancel(&handle.job_id);
                                shared.client.abandon(&handle.job_id);
                                return Outcome::Failed(e);
                            }
                        }
                        None => warn!(id = %item.id, "stream chunk for a buffer job ignored"),
                    },
                    JobUpdate::Done(DoneResult::Buffer { payload, .. }) => return Outcome::Buffer(payload),
                    JobUpdate::Done(DoneResult::Stream { .. }) => {
                        debug!(job = %handle.job_id, "stream done, waiting for completion");
                    }
                    JobUpdate::StreamComplete { total_bytes } => {
                        let Some(w) = writer.take() else {
                            return Outcome::Failed(JobError::unknown("stream completion for a buffer job"));
                        };
                        return match w.finish(total_bytes) {
                            Ok(path) => Outcome::Streamed { path, size: total_bytes },
                            Err(e) => Outcome::Failed(e),
                        };
                    }
                    JobUpdate::Failed(JobError::Cancelled) | JobUpdate::Canceled => return Outcome::Cancelled,
                    JobUpdate::Failed(e) => return Outcome::Failed(e),
                }
            }
            recv(shared.wake_rx) -> _ => {}
            default(wait) => {
                shared.client.abandon(&handle.job_id);
                if cancel_deadline.is_some() {
                    warn!(job = %handle.job_id, "cancel not acknowledged, job abandoned");
                    return Outcome::Cancelled;
                }
                shared.client.cancel(&handle.job_id);
                warn!(job = %handle.job_id, "no activity for {:?}, job abandoned", shared.config.job_timeout);
                return Outcome::Failed(JobError::unknown(format!(
                    "no response from media worker for {:?}",
                    shared.config.job_timeout
                )));
            }
        }
    }
}

fn finish(shared: &Shared, item: &QueueItem, settings: &GlobalSettings, outcome: Outcome) -> Flow {
    let store = &shared.store;
    let written = match outcome {
        Outcome::Cancelled => {
            info!(id = %item.id, "job cancelled");
            log_store_err(store.mark_cancelled(item.id));
            return Flow::Continue;
        }
        Outcome::Failed(e) => {
            warn!(id = %item.id, "job failed: {e}");
            log_store_err(store.mark_failed(item.id, e.to_string()));
            return if e.stops_queue() { Flow::Stop } else { Flow::Continue };
        }
        Outcome::Buffer(payload) => {
            let delivered_to = if settings.auto_download {
                let dest = free_path(&shared.config.output_dir, &item.output_name());
                match FileSink::save(&dest, &payload) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(id = %item.id, path = %dest.display(), "could not save result: {e}");
                        None
                    }
                }
            } else {
                None
            };
            (payload.len() as u64, OutputPayload::Buffer(payload), delivered_to)
        }
        Outcome::Streamed { path, size } => (size, OutputPayload::Streamed { path: path.clone() }, Some(path)),
    };

    let (output_size, payload, delivered_to) = written;
    let ratio = compression_ratio(item.input.size, output_size);
    info!(id = %item.id, bytes = output_size, ratio, "job completed");
    let delivered = delivered_to.is_some();
    log_store_err(store.mark_completed(item.id, CompletedResult {
        output_name:       item.output_name(),
        input_size:        item.input.size,
        output_size,
        compression_ratio: ratio,
        payload,
        completed_at:      SystemTime::now(),
        delivered_to,
    }));

    if delivered && settings.remove_after_download {
        log_store_err(store.remove(item.id));
    }
    Flow::Continue
}

fn log_store_err(res: reelqueue_core::error::QueueResult<()>) {
    if let Err(e) = res {
        error!("store rejected transition: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use reelqueue_core::job::{InputFile, ItemStatus};
    use reelqueue_core::protocol::{Capabilities, WorkerEvent, WorkerRequest};
    use reelqueue_core::settings::{QualityPreset, SettingsOverride};
    use reelqueue_media::testing::Scripted;
    use reelqueue_media::{MediaWorker, WorkerFactory, WorkerLink};

    use crate::client::ClientConfig;
    use crate::store::StoreEvent;

    const WAIT: Duration = Duration::from_secs(20);

    struct Rig {
        store: Arc<JobStore>,
        orch:  Orchestrator,
        seen:  Arc<Mutex<Vec<ConvertRequest>>>,
        dir:   tempfile::TempDir,
    }

    fn rig(codec: Scripted, settings: GlobalSettings, threshold: u64) -> Rig {
        let seen = codec.seen();
        let codec = Arc::new(codec);
        let factory = move || MediaWorker::spawn(codec.clone());
        Rig { seen, ..rig_with(Arc::new(factory), settings, threshold) }
    }

    fn rig_with(factory: Arc<dyn WorkerFactory>, settings: GlobalSettings, threshold: u64) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let client = ChannelClient::spawn(
            factory,
            ClientConfig { restart_delay: Duration::from_millis(50), capability_timeout: Duration::from_secs(5) },
        ).unwrap();
        let store = Arc::new(JobStore::new(settings));
        let orch = Orchestrator::init(Arc::clone(&store), Arc::new(client), OrchestratorConfig {
            output_dir:             dir.path().to_path_buf(),
            stream_threshold_bytes: threshold,
            cancel_timeout:         Duration::from_secs(5),
            job_timeout:            Duration::from_secs(30),
        });
        Rig { store, orch, seen: Arc::new(Mutex::new(Vec::new())), dir }
    }

    /// Worker that streams `head`, sends Done, then holds the tail chunk and
    /// StreamComplete back until `gate` fires. `done` hears when Done is out.
    fn gated_stream_worker(head: Vec<u8>, tail: Vec<u8>, gate: Receiver<()>, done: Sender<()>) -> WorkerLink {
        let (req_tx, req_rx) = bounded::<WorkerRequest>(8);
        let (tx, events) = bounded::<WorkerEvent>(16);
        thread::spawn(move || {
            let caps = Capabilities { can_encode_video: true, can_encode_audio: true };
            if tx.send(WorkerEvent::Ready).is_err() || tx.send(WorkerEvent::Capabilities(caps)).is_err() {
                return;
            }
            while let Ok(msg) = req_rx.recv() {
                let req = match msg {
                    WorkerRequest::Convert(req) => req,
                    WorkerRequest::Cancel { .. } => continue,
                    WorkerRequest::Shutdown => return,
                };
                let job_id = req.job_id;
                let total = (head.len() + tail.len()) as u64;
                let _ = tx.send(WorkerEvent::StreamChunk { job_id: job_id.clone(), bytes: head.clone(), position: 0 });
                let _ = tx.send(WorkerEvent::Done {
                    job_id: job_id.clone(),
                    result: DoneResult::Stream { mime: "video/mp4".into(), filename: req.output.filename },
                });
                let _ = done.send(());
                if gate.recv().is_err() {
                    return;
                }
                let _ = tx.send(WorkerEvent::StreamChunk { job_id: job_id.clone(), bytes: tail.clone(), position: head.len() as u64 });
                let _ = tx.send(WorkerEvent::StreamComplete { job_id, total_bytes: total });
            }
        });
        WorkerLink { requests: req_tx, events }
    }

    fn input(name: &str, size: u64) -> InputFile {
        InputFile { name: name.into(), size, path: PathBuf::from(name) }
    }

    fn wait_idle(rx: &Receiver<StoreEvent>) {
        loop {
            match rx.recv_timeout(WAIT).unwrap() {
                StoreEvent::RunState(RunState::Idle) => return,
                _ => continue,
            }
        }
    }

    fn wait_status(rx: &Receiver<StoreEvent>, want: Uuid, status: ItemStatus) {
        loop {
            if let StoreEvent::StatusChanged { id, status: s, .. } = rx.recv_timeout(WAIT).unwrap() {
                if id == want && s == status {
                    return;
                }
            }
        }
    }

    #[test]
    fn start_without_pending_is_noop() {
        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        assert!(!r.orch.start());
        assert_eq!(r.orch.run_state(), RunState::Idle);
    }

    #[test]
    fn single_job_completes_with_ratio() {
        let r = rig(Scripted::new(250), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let id = r.store.add(input("clip.mov", 1000), JobKind::Convert).unwrap();
        assert!(r.orch.start());
        wait_idle(&rx);

        let item = r.store.item(id).unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.output_size, Some(250));
        assert_eq!(item.compression_ratio, Some(75.0));
        let done = r.store.completed(id).unwrap();
        assert_eq!(done.output_name, "clip_converted.mp4");
        let saved = r.dir.path().join("clip_converted.mp4");
        assert_eq!(done.delivered_to.as_deref(), Some(saved.as_path()));
        assert_eq!(std::fs::read(saved).unwrap().len(), 250);
        assert_eq!(r.orch.run_state(), RunState::Idle);
    }

    #[test]
    fn preset_drives_request_bitrates() {
        let settings = GlobalSettings { quality: QualityPreset::Low, auto_download: false, ..GlobalSettings::default() };
        let r = rig(Scripted::new(10), settings, u64::MAX);
        let rx = r.store.subscribe();
        let a = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        let b = r.store.add(input("b.mov", 10), JobKind::Convert).unwrap();
        r.store.set_override(b, Some(SettingsOverride { quality: Some(QualityPreset::High), ..Default::default() })).unwrap();
        r.orch.start();
        wait_idle(&rx);

        let seen = r.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!((seen[0].output.video_bitrate, seen[0].output.audio_bitrate), (2_000_000, 96_000));
        assert_eq!((seen[1].output.video_bitrate, seen[1].output.audio_bitrate), (10_000_000, 192_000));
        assert_ne!(seen[0].job_id, seen[1].job_id);
        assert!(r.store.completed(a).unwrap().delivered_to.is_none());
        assert!(!r.dir.path().join("a_converted.mp4").exists());
    }

    #[test]
    fn cancel_current_moves_to_next_item() {
        let r = rig(Scripted::new(50 * 1024 * 1024).with_delay(Duration::from_millis(5)), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let f1 = r.store.add(input("f1.mov", 10), JobKind::Convert).unwrap();
        let f2 = r.store.add(input("f2.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();

        // Wait for real progress on F1 before cancelling.
        loop {
            if let StoreEvent::Progress { id, .. } = rx.recv_timeout(WAIT).unwrap() {
                if id == f1 { break; }
            }
        }
        assert_eq!(r.orch.current_item(), Some(f1));
        assert!(r.orch.cancel_current());
        wait_status(&rx, f1, ItemStatus::Cancelled);
        wait_status(&rx, f2, ItemStatus::Processing);
        assert_eq!(r.store.item(f1).unwrap().status, ItemStatus::Cancelled);
        assert!(r.store.item(f1).unwrap().error.is_none());

        r.orch.cancel_current();
        wait_idle(&rx);
        assert_eq!(r.store.processing_count(), 0);
    }

    #[test]
    fn job_failure_does_not_stop_queue() {
        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let bad = r.store.add(input("novideo", 10), JobKind::Convert).unwrap();
        let good = r.store.add(input("good.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_idle(&rx);

        let bad = r.store.item(bad).unwrap();
        assert_eq!(bad.status, ItemStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("input has no video track"));
        assert_eq!(r.store.item(good).unwrap().status, ItemStatus::Completed);
    }

    #[test]
    fn worker_crash_stops_queue() {
        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let boom = r.store.add(input("boom", 10), JobKind::Convert).unwrap();
        let next = r.store.add(input("next.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_idle(&rx);

        let boom = r.store.item(boom).unwrap();
        assert_eq!(boom.status, ItemStatus::Failed);
        assert!(boom.error.unwrap().contains("crashed"));
        assert_eq!(r.store.item(next).unwrap().status, ItemStatus::Pending);

        // Worker is rebuilt; a manual start picks the queue back up.
        assert!(r.orch.start());
        wait_idle(&rx);
        assert_eq!(r.store.item(next).unwrap().status, ItemStatus::Completed);
    }

    #[test]
    fn pause_holds_next_item_until_resume() {
        let r = rig(Scripted::new(2 * 1024 * 1024).with_delay(Duration::from_millis(10)), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let a = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        let b = r.store.add(input("b.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_status(&rx, a, ItemStatus::Processing);
        assert!(r.orch.pause());
        assert_eq!(r.orch.run_state(), RunState::Paused);

        // In-flight job finishes; the next one waits.
        wait_status(&rx, a, ItemStatus::Completed);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(r.store.item(b).unwrap().status, ItemStatus::Pending);
        assert_eq!(r.store.processing_count(), 0);

        assert!(r.orch.resume());
        wait_idle(&rx);
        assert_eq!(r.store.item(a).unwrap().status, ItemStatus::Completed);
        assert_eq!(r.store.item(b).unwrap().status, ItemStatus::Completed);
        assert_eq!(r.seen.lock().len(), 2);
    }

    #[test]
    fn large_input_streams_into_output_dir() {
        let size = 3 * 1024 * 1024 + 17;
        let r = rig(Scripted::new(size), GlobalSettings::default(), 1024);
        let rx = r.store.subscribe();
        let id = r.store.add(input("big.mov", 10 * 1024 * 1024), JobKind::Convert).unwrap();
        r.orch.start();
        wait_idle(&rx);

        assert_eq!(r.seen.lock()[0].sink, SinkMode::Stream);
        let done = r.store.completed(id).unwrap();
        let path = r.dir.path().join("big_converted.mp4");
        assert_eq!(done.payload, OutputPayload::Streamed { path: path.clone() });
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size as u64);
        assert!(!Path::new(&format!("{}.part", path.display())).exists());
    }

    #[test]
    fn remove_after_download_drops_item_but_keeps_result() {
        let settings = GlobalSettings { remove_after_download: true, ..GlobalSettings::default() };
        let r = rig(Scripted::new(10), settings, u64::MAX);
        let rx = r.store.subscribe();
        let id = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_idle(&rx);
        assert!(r.store.item(id).is_none());
        assert!(r.store.completed(id).is_some());
    }

    #[test]
    fn crop_job_sends_edit() {
        use reelqueue_core::helpers::geometry::PixelRect;
        use reelqueue_core::protocol::EditSpec;

        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let edit = EditSpec { crop: Some(PixelRect { left: 0, top: 0, width: 1080, height: 1080 }), trim: None };
        r.store.add(input("c.mov", 10), JobKind::Crop(edit)).unwrap();
        r.orch.start();
        wait_idle(&rx);
        let seen = r.seen.lock();
        assert_eq!(seen[0].edit, Some(edit));
        assert_eq!(seen[0].output.filename, "c_cropped.mp4");
    }

    #[test]
    fn dispose_cancels_in_flight_job() {
        let r = rig(Scripted::new(50 * 1024 * 1024).with_delay(Duration::from_millis(5)), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let id = r.store.add(input("long.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_status(&rx, id, ItemStatus::Processing);
        r.orch.dispose();
        assert_eq!(r.store.item(id).unwrap().status, ItemStatus::Cancelled);
        assert_eq!(r.orch.run_state(), RunState::Idle);
        assert!(!r.orch.start());
    }

    #[test]
    fn removed_item_is_skipped_without_stopping() {
        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        let a = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        let b = r.store.add(input("b.mov", 10), JobKind::Convert).unwrap();

        // The loop read `a`, then the user removed it before it started.
        let stale = r.store.next_pending().unwrap();
        assert_eq!(stale.id, a);
        r.store.remove(a).unwrap();
        assert!(matches!(process(&r.orch.shared, stale), Flow::Continue));
        assert_eq!(r.store.item(b).unwrap().status, ItemStatus::Pending);
        assert!(r.orch.current_item().is_none());
        assert!(r.seen.lock().is_empty());
    }

    #[test]
    fn item_no_longer_pending_is_skipped() {
        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        let a = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        let stale = r.store.next_pending().unwrap();
        r.store.mark_processing(a).unwrap();
        r.store.mark_cancelled(a).unwrap();
        assert!(matches!(process(&r.orch.shared, stale), Flow::Continue));
        assert_eq!(r.store.item(a).unwrap().status, ItemStatus::Cancelled);
    }

    #[test]
    fn second_processing_item_still_stops() {
        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        let a = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        let b = r.store.add(input("b.mov", 10), JobKind::Convert).unwrap();
        let stale = r.store.item(b).unwrap();
        r.store.mark_processing(a).unwrap();
        assert!(matches!(process(&r.orch.shared, stale), Flow::Stop));
        assert_eq!(r.store.item(b).unwrap().status, ItemStatus::Pending);
    }

    #[test]
    fn clear_during_run_keeps_loop_alive() {
        let r = rig(Scripted::new(2 * 1024 * 1024).with_delay(Duration::from_millis(10)), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let a = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        r.store.add(input("b.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_status(&rx, a, ItemStatus::Processing);
        assert_eq!(r.store.clear(), 1);

        // Added after the clear; the running loop must still reach it.
        let c = r.store.add(input("c.mov", 10), JobKind::Convert).unwrap();
        wait_idle(&rx);
        assert_eq!(r.store.item(a).unwrap().status, ItemStatus::Completed);
        assert_eq!(r.store.item(c).unwrap().status, ItemStatus::Completed);
    }

    #[test]
    fn cancel_reaches_item_as_soon_as_it_is_processing() {
        let r = rig(Scripted::new(50 * 1024 * 1024).with_delay(Duration::from_millis(5)), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let id = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_status(&rx, id, ItemStatus::Processing);
        assert_eq!(r.orch.current_item(), Some(id));
        assert!(r.orch.cancel_current());
        wait_status(&rx, id, ItemStatus::Cancelled);
        wait_idle(&rx);
    }

    #[test]
    fn stream_sink_closes_only_on_stream_complete() {
        let head = vec![0x11u8; 1000];
        let tail = vec![0x22u8; 234];
        let (gate_tx, gate_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let factory = {
            let (head, tail) = (head.clone(), tail.clone());
            move || gated_stream_worker(head.clone(), tail.clone(), gate_rx.clone(), done_tx.clone())
        };
        let r = rig_with(Arc::new(factory), GlobalSettings::default(), 0);
        let rx = r.store.subscribe();
        let id = r.store.add(input("big.mov", 4096), JobKind::Convert).unwrap();
        assert!(r.orch.start());

        // Done{Stream} is out but the tail is held back.
        done_rx.recv_timeout(WAIT).unwrap();
        thread::sleep(Duration::from_millis(200));
        let dest = r.dir.path().join("big_converted.mp4");
        let part = r.dir.path().join("big_converted.mp4.part");
        assert_eq!(r.store.item(id).unwrap().status, ItemStatus::Processing);
        assert!(part.exists());
        assert!(!dest.exists());

        gate_tx.send(()).unwrap();
        wait_status(&rx, id, ItemStatus::Completed);
        assert_eq!(std::fs::read(&dest).unwrap(), [head, tail].concat());
        assert!(!part.exists());
        let done = r.store.completed(id).unwrap();
        assert_eq!(done.output_size, 1234);
        assert_eq!(done.payload, OutputPayload::Streamed { path: dest });
    }

    #[test]
    fn same_output_name_gets_a_suffix() {
        let r = rig(Scripted::new(10), GlobalSettings::default(), u64::MAX);
        let rx = r.store.subscribe();
        let mov = r.store.add(input("a.mov", 10), JobKind::Convert).unwrap();
        let mkv = r.store.add(input("a.mkv", 10), JobKind::Convert).unwrap();
        r.orch.start();
        wait_idle(&rx);

        let first = r.dir.path().join("a_converted.mp4");
        let second = r.dir.path().join("a_converted (1).mp4");
        assert_eq!(r.store.completed(mov).unwrap().delivered_to, Some(first.clone()));
        assert_eq!(r.store.completed(mkv).unwrap().delivered_to, Some(second.clone()));
        assert!(first.exists() && second.exists());
    }
}
