// crates/reelqueue-app/src/session.rs
//
// Session owns every runtime handle of one reelqueue run. The CLI holds one of
// these and talks to it through QueueCommands and StoreEvents, nothing else.
//
// Layout:
//   Session
//     ├── store: JobStore             queue, progress, results, settings
//     ├── client: ChannelClient       supervisor + media worker threads
//     └── orchestrator: Orchestrator  pull loop
//
// Teardown order in dispose(): orchestrator first (cancels the job in flight
// while the worker can still hear it), then the client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tracing::{debug, warn};
use uuid::Uuid;

use reelqueue_core::commands::QueueCommand;
use reelqueue_core::error::QueueResult;
use reelqueue_core::job::{InputFile, JobKind};
use reelqueue_media::WorkerFactory;

use crate::client::ChannelClient;
use crate::config::AppConfig;
use crate::orchestrator::Orchestrator;
use crate::store::{JobStore, StoreEvent};

/// One input the session refused, with the reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub path:   Option<PathBuf>,
    pub reason: String,
}

/// What a command did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandReport {
    /// Items created by AddFiles / AddCropJob.
    pub added:    Vec<Uuid>,
    pub rejected: Vec<Rejection>,
    /// False when the command was refused or had nothing to act on.
    pub applied:  bool,
}

impl CommandReport {
    fn from_result(res: QueueResult<()>) -> Self {
        match res {
            Ok(()) => Self { applied: true, ..Self::default() },
            Err(e) => Self {
                rejected: vec![Rejection { path: None, reason: e.to_string() }],
                ..Self::default()
            },
        }
    }

    fn flag(applied: bool) -> Self {
        Self { applied, ..Self::default() }
    }
}

pub struct Session {
    store:        Arc<JobStore>,
    client:       Arc<ChannelClient>,
    orchestrator: Orchestrator,
}

impl Session {
    pub fn init(config: &AppConfig, factory: Arc<dyn WorkerFactory>) -> Result<Self> {
        let store = Arc::new(JobStore::new(config.settings));
        let client = Arc::new(
            ChannelClient::spawn(factory, config.client()).context("starting channel client")?,
        );
        let orchestrator = Orchestrator::init(Arc::clone(&store), Arc::clone(&client), config.orchestrator());
        debug!("session ready");
        Ok(Self { store, client, orchestrator })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn process_command(&self, cmd: QueueCommand) -> CommandReport {
        match cmd {
            // ── Queue contents ───────────────────────────────────────────────
            QueueCommand::AddFiles(paths) => {
                let mut report = CommandReport::default();
                for path in paths {
                    self.add_one(&path, JobKind::Convert, &mut report);
                }
                report.applied = !report.added.is_empty();
                report
            }
            QueueCommand::AddCropJob { path, edit } => {
                let mut report = CommandReport::default();
                self.add_one(&path, JobKind::Crop(edit), &mut report);
                report.applied = !report.added.is_empty();
                report
            }
            QueueCommand::Remove(id) => CommandReport::from_result(self.store.remove(id)),
            QueueCommand::Retry(id)  => CommandReport::from_result(self.store.retry(id)),
            QueueCommand::Clear => {
                self.store.clear();
                CommandReport::flag(true)
            }

            // ── Settings ─────────────────────────────────────────────────────
            QueueCommand::SetOverride { id, settings } => {
                CommandReport::from_result(self.store.set_override(id, settings))
            }
            QueueCommand::UpdateSettings(settings) => {
                self.store.update_settings(settings);
                CommandReport::flag(true)
            }

            // ── Run control ──────────────────────────────────────────────────
            QueueCommand::Start         => CommandReport::flag(self.orchestrator.start()),
            QueueCommand::Pause         => CommandReport::flag(self.orchestrator.pause()),
            QueueCommand::Resume        => CommandReport::flag(self.orchestrator.resume()),
            QueueCommand::CancelCurrent => CommandReport::flag(self.orchestrator.cancel_current()),
        }
    }

    fn add_one(&self, path: &Path, kind: JobKind, report: &mut CommandReport) {
        let added = InputFile::from_path(path)
            .map_err(|e| e.to_string())
            .and_then(|input| self.store.add(input, kind).map_err(|e| e.to_string()));
        match added {
            Ok(id) => report.added.push(id),
            Err(reason) => {
                warn!(path = %path.display(), "rejected: {reason}");
                report.rejected.push(Rejection { path: Some(path.to_path_buf()), reason });
            }
        }
    }

    /// Stop the loop, then the worker. Idempotent.
    pub fn dispose(&self) {
        self.orchestrator.dispose();
        self.client.shutdown();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}
