// crates/reelqueue-app/src/client.rs
//
// ChannelClient: the app's only way into the media worker.
//
// A supervisor thread owns the worker link. It spawns a worker through the
// factory, routes every job-scoped WorkerEvent to the per-job channel that
// `submit` registered, and on disconnect fails every outstanding job with
// ChannelCrashed, forgets the capabilities, waits `restart_delay` and spawns
// a fresh worker.
//
// Record lifecycle (keyed by JobId):
//   submit       → inserted before the Convert request is sent
//   Error        → removed
//   Canceled     → removed
//   Done         → removed in buffer mode, kept in stream mode
//   StreamComplete → removed
//   abandon      → removed; later events for the id are dropped
//   crash        → all removed, each receives Failed(ChannelCrashed)

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use reelqueue_core::error::JobError;
use reelqueue_core::protocol::{
    Capabilities, ConvertRequest, DoneResult, JobId, SinkMode, WorkerEvent, WorkerRequest,
};
use reelqueue_media::WorkerFactory;

/// Per-job channel depth. Bounded so a slow consumer holds the worker back
/// instead of buffering a whole stream in memory.
const UPDATE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct ClientConfig {
    pub restart_delay:      Duration,
    pub capability_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            restart_delay:      Duration::from_secs(1),
            capability_timeout: Duration::from_secs(5),
        }
    }
}

/// What a submitter sees of its job.
#[derive(Clone, Debug, PartialEq)]
pub enum JobUpdate {
    Progress       { fraction: f64, bytes_written: u64 },
    Warning(String),
    Chunk          { bytes: Vec<u8>, position: u64 },
    Done(DoneResult),
    StreamComplete { total_bytes: u64 },
    Failed(JobError),
    Canceled,
}

impl JobUpdate {
    /// Last update the job will ever get, given its sink mode.
    pub fn is_terminal(&self, sink: SinkMode) -> bool {
        match self {
            JobUpdate::Failed(_) | JobUpdate::Canceled | JobUpdate::StreamComplete { .. } => true,
            JobUpdate::Done(_) => sink == SinkMode::Buffer,
            _ => false,
        }
    }
}

pub struct JobHandle {
    pub job_id:  JobId,
    pub sink:    SinkMode,
    pub updates: Receiver<JobUpdate>,
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct Record {
    tx:   Sender<JobUpdate>,
    sink: SinkMode,
}

#[derive(Default)]
struct LinkState {
    requests: Option<Sender<WorkerRequest>>,
    caps:     Option<Capabilities>,
    closed:   bool,
}

#[derive(Default)]
struct Shared {
    link:    Mutex<LinkState>,
    caps_cv: Condvar,
    records: Mutex<HashMap<JobId, Record>>,
}

impl Shared {
    fn route(&self, event: WorkerEvent) {
        let (job_id, update) = match event {
            WorkerEvent::Ready => {
                debug!("media worker ready");
                return;
            }
            WorkerEvent::Capabilities(caps) => {
                debug!(video = caps.can_encode_video, audio = caps.can_encode_audio, "capabilities");
                self.link.lock().caps = Some(caps);
                self.caps_cv.notify_all();
                return;
            }
            WorkerEvent::Progress { job_id, fraction, bytes_written } => {
                (job_id, JobUpdate::Progress { fraction, bytes_written })
            }
            WorkerEvent::Warning { job_id, message } => (job_id, JobUpdate::Warning(message)),
            WorkerEvent::Error { job_id, error } => (job_id, JobUpdate::Failed(error)),
            WorkerEvent::Done { job_id, result } => (job_id, JobUpdate::Done(result)),
            WorkerEvent::Canceled { job_id } => (job_id, JobUpdate::Canceled),
            WorkerEvent::StreamChunk { job_id, bytes, position } => {
                (job_id, JobUpdate::Chunk { bytes, position })
            }
            WorkerEvent::StreamComplete { job_id, total_bytes } => {
                (job_id, JobUpdate::StreamComplete { total_bytes })
            }
        };

        // Clone the sender out so a full per-job channel never blocks while
        // the record table is locked.
        let tx = {
            let mut records = self.records.lock();
            let Some(record) = records.get(&job_id) else {
                debug!(job = %job_id, "event for unknown or abandoned job dropped");
                return;
            };
            let tx = record.tx.clone();
            if update.is_terminal(record.sink) {
                records.remove(&job_id);
            }
            tx
        };
        if tx.send(update).is_err() {
            debug!(job = %job_id, "receiver gone, dropping record");
            self.records.lock().remove(&job_id);
        }
    }

    /// Fail every outstanding job and forget the worker.
    fn crashed(&self, why: &str) {
        {
            let mut link = self.link.lock();
            link.requests = None;
            link.caps = None;
        }
        let records: Vec<(JobId, Record)> = self.records.lock().drain().collect();
        if !records.is_empty() {
            warn!(jobs = records.len(), "failing outstanding jobs: {why}");
        }
        for (_, record) in records {
            let _ = record.tx.send(JobUpdate::Failed(JobError::crashed(why)));
        }
    }

    fn sender(&self) -> Option<Sender<WorkerRequest>> {
        self.link.lock().requests.clone()
    }
}

// ── ChannelClient ─────────────────────────────────────────────────────────────

pub struct ChannelClient {
    shared:      Arc<Shared>,
    config:      ClientConfig,
    shutdown_tx: Sender<()>,
    supervisor:  Mutex<Option<JoinHandle<()>>>,
}

impl ChannelClient {
    pub fn spawn(factory: Arc<dyn WorkerFactory>, config: ClientConfig) -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("channel-client".into())
            .spawn(move || supervise(factory.as_ref(), &thread_shared, &shutdown_rx, config.restart_delay))?;

        Ok(Self { shared, config, shutdown_tx, supervisor: Mutex::new(Some(handle)) })
    }

    /// Current capabilities, if the worker has reported them.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.shared.link.lock().caps
    }

    /// Block until capabilities are known, up to `capability_timeout`.
    pub fn wait_capabilities(&self) -> Option<Capabilities> {
        let deadline = Instant::now() + self.config.capability_timeout;
        let mut link = self.shared.link.lock();
        while link.caps.is_none() && !link.closed {
            if self.shared.caps_cv.wait_until(&mut link, deadline).timed_out() {
                break;
            }
        }
        link.caps
    }

    /// Register the job and send its Convert request.
    ///
    /// Refused with `UnsupportedEnvironment` when the worker cannot encode
    /// video. Without audio encoding the request goes out with
    /// `include_audio = false`.
    pub fn submit(&self, mut req: ConvertRequest) -> Result<JobHandle, JobError> {
        let caps = self.wait_capabilities().ok_or_else(|| {
            JobError::UnsupportedEnvironment(format!(
                "media worker reported no capabilities within {:?}",
                self.config.capability_timeout
            ))
        })?;
        if !caps.can_encode_video {
            return Err(JobError::UnsupportedEnvironment("no video encoder available".into()));
        }
        if !caps.can_encode_audio && req.output.include_audio {
            warn!(job = %req.job_id, "no audio encoder, output will be silent");
            req.output.include_audio = false;
        }

        let requests = self.shared.sender()
            .ok_or_else(|| JobError::crashed("media worker is not running"))?;

        let job_id = req.job_id.clone();
        let sink = req.sink;
        let (tx, rx) = bounded(UPDATE_CAPACITY);
        self.shared.records.lock().insert(job_id.clone(), Record { tx, sink });

        debug!(job = %job_id, input = %req.input.name, ?sink, "submit");
        if requests.send(WorkerRequest::Convert(req)).is_err() {
            self.shared.records.lock().remove(&job_id);
            return Err(JobError::crashed("media worker request channel closed"));
        }
        Ok(JobHandle { job_id, sink, updates: rx })
    }

    /// Ask the worker to stop a job. Never blocks.
    pub fn cancel(&self, job_id: &str) {
        let Some(requests) = self.shared.sender() else { return };
        match requests.try_send(WorkerRequest::Cancel { job_id: job_id.to_string() }) {
            Ok(()) => debug!(job = %job_id, "cancel sent"),
            Err(TrySendError::Full(_)) => warn!(job = %job_id, "request queue full, cancel dropped"),
            Err(TrySendError::Disconnected(_)) => debug!(job = %job_id, "cancel after worker exit"),
        }
    }

    /// Stop routing events for `job_id`. Its channel closes once the
    /// receiver side is dropped.
    pub fn abandon(&self, job_id: &str) {
        if self.shared.records.lock().remove(job_id).is_some() {
            debug!(job = %job_id, "abandoned");
        }
    }

    pub fn outstanding(&self) -> usize {
        self.shared.records.lock().len()
    }

    /// Shut the worker down and join the supervisor. Idempotent.
    pub fn shutdown(&self) {
        let Some(handle) = self.supervisor.lock().take() else { return };
        let _ = self.shutdown_tx.try_send(());
        if handle.join().is_err() {
            error!("channel client supervisor panicked");
        }
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Supervisor thread ─────────────────────────────────────────────────────────

fn supervise(factory: &dyn WorkerFactory, shared: &Shared, shutdown: &Receiver<()>, restart_delay: Duration) {
    loop {
        let link = factory.spawn();
        {
            let mut state = shared.link.lock();
            state.requests = Some(link.requests.clone());
            state.caps = None;
        }
        info!("media worker spawned");

        let stopping = loop {
            select! {
                recv(link.events) -> ev => match ev {
                    Ok(ev) => shared.route(ev),
                    Err(_) => break false,
                },
                recv(shutdown) -> _ => break true,
            }
        };

        if stopping {
            let _ = link.requests.try_send(WorkerRequest::Shutdown);
            shared.crashed("media worker shut down");
            let mut state = shared.link.lock();
            state.closed = true;
            drop(state);
            shared.caps_cv.notify_all();
            debug!("channel client stopped");
            return;
        }

        error!("media worker disconnected, restarting in {restart_delay:?}");
        shared.crashed("media worker disconnected");
        select! {
            recv(shutdown) -> _ => {
                shared.link.lock().closed = true;
                shared.caps_cv.notify_all();
                return;
            }
            default(restart_delay) => {}
        }
    }
}
