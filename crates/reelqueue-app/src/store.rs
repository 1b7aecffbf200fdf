// crates/reelqueue-app/src/store.rs
//
// JobStore: the single source of truth for the queue.
//
// Everything sits behind one parking_lot Mutex. A status transition and its
// side effects (timestamps, progress removal, completed-result insertion)
// happen in one lock acquisition; the matching StoreEvents are published
// after the lock is released, so subscribers never observe a half-applied
// transition and never block a writer.
//
// Invariants held here:
//   - at most MAX_QUEUE_ITEMS items
//   - no two pending/processing items with the same (name, size)
//   - at most one item is Processing (mark_processing refuses a second)
//   - progress entries exist only for the Processing item

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use reelqueue_core::error::{QueueError, QueueResult};
use reelqueue_core::job::{
    CompletedResult, InputFile, ItemStatus, JobKind, ProgressInfo, QueueItem, MAX_FILE_BYTES,
    MAX_QUEUE_ITEMS,
};
use reelqueue_core::settings::{GlobalSettings, SettingsOverride};

// ── Events ────────────────────────────────────────────────────────────────────

/// Orchestrator run state, published through the store's event bus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Deltas published to subscribers. Completed results travel without their
/// payload; read them back with `JobStore::completed`.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    ItemAdded(QueueItem),
    StatusChanged { id: Uuid, status: ItemStatus, error: Option<String> },
    Progress { id: Uuid, info: ProgressInfo },
    Completed {
        id:                Uuid,
        output_name:       String,
        output_size:       u64,
        compression_ratio: f64,
        delivered_to:      Option<PathBuf>,
    },
    OverrideChanged { id: Uuid, settings: Option<SettingsOverride> },
    Removed(Uuid),
    Cleared { removed: usize },
    SettingsChanged(GlobalSettings),
    RunState(RunState),
}

// ── JobStore ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Inner {
    items:     Vec<QueueItem>,
    progress:  HashMap<Uuid, ProgressInfo>,
    completed: HashMap<Uuid, CompletedResult>,
    settings:  GlobalSettings,
}

impl Inner {
    fn find(&self, id: Uuid) -> QueueResult<usize> {
        self.items.iter().position(|i| i.id == id).ok_or(QueueError::NotFound)
    }

    /// Another pending/processing item with the same (name, size).
    fn has_active_twin(&self, input: &InputFile, except: Option<Uuid>) -> bool {
        self.items.iter().any(|i| {
            Some(i.id) != except
                && i.status.is_active()
                && i.input.name == input.name
                && i.input.size == input.size
        })
    }

    /// Index of `id` if it is the item currently processing.
    fn find_processing(&self, id: Uuid) -> QueueResult<usize> {
        let idx = self.find(id)?;
        if self.items[idx].status != ItemStatus::Processing {
            return Err(QueueError::NotPending);
        }
        Ok(idx)
    }
}

pub struct JobStore {
    inner:       Mutex<Inner>,
    subscribers: Mutex<Vec<Sender<StoreEvent>>>,
}

impl JobStore {
    pub fn new(settings: GlobalSettings) -> Self {
        Self {
            inner:       Mutex::new(Inner { settings, ..Inner::default() }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// New receiver for every event published from now on.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, events: Vec<StoreEvent>) {
        if events.is_empty() {
            return;
        }
        let mut subs = self.subscribers.lock();
        for ev in events {
            subs.retain(|tx| tx.send(ev.clone()).is_ok());
        }
    }

    pub fn publish_run_state(&self, state: RunState) {
        self.publish(vec![StoreEvent::RunState(state)]);
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn items(&self) -> Vec<QueueItem> {
        self.inner.lock().items.clone()
    }

    pub fn item(&self, id: Uuid) -> Option<QueueItem> {
        self.inner.lock().items.iter().find(|i| i.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn progress(&self, id: Uuid) -> Option<ProgressInfo> {
        self.inner.lock().progress.get(&id).copied()
    }

    pub fn completed(&self, id: Uuid) -> Option<CompletedResult> {
        self.inner.lock().completed.get(&id).cloned()
    }

    pub fn settings(&self) -> GlobalSettings {
        self.inner.lock().settings
    }

    pub fn has_pending(&self) -> bool {
        self.inner.lock().items.iter().any(|i| i.status == ItemStatus::Pending)
    }

    /// First pending item in queue order.
    pub fn next_pending(&self) -> Option<QueueItem> {
        self.inner.lock().items.iter().find(|i| i.status == ItemStatus::Pending).cloned()
    }

    pub fn processing_count(&self) -> usize {
        self.inner.lock().items.iter().filter(|i| i.status == ItemStatus::Processing).count()
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    pub fn add(&self, input: InputFile, kind: JobKind) -> QueueResult<Uuid> {
        let item = {
            let mut inner = self.inner.lock();
            if inner.items.len() >= MAX_QUEUE_ITEMS {
                return Err(QueueError::QueueFull { max: MAX_QUEUE_ITEMS });
            }
            if input.size > MAX_FILE_BYTES {
                return Err(QueueError::FileTooLarge { name: input.name, size: input.size, max: MAX_FILE_BYTES });
            }
            if inner.has_active_twin(&input, None) {
                return Err(QueueError::Duplicate { name: input.name });
            }
            let item = QueueItem::new(input, kind);
            inner.items.push(item.clone());
            item
        };
        debug!(id = %item.id, name = %item.input.name, "queued");
        let id = item.id;
        self.publish(vec![StoreEvent::ItemAdded(item)]);
        Ok(id)
    }

    /// Drop a non-processing item and its progress. A completed result stays
    /// readable until `clear`.
    pub fn remove(&self, id: Uuid) -> QueueResult<()> {
        {
            let mut inner = self.inner.lock();
            let idx = inner.find(id)?;
            if inner.items[idx].status == ItemStatus::Processing {
                return Err(QueueError::Processing);
            }
            inner.items.remove(idx);
            inner.progress.remove(&id);
        }
        self.publish(vec![StoreEvent::Removed(id)]);
        Ok(())
    }

    /// Drop every non-processing item with its progress and completed
    /// records. Returns how many items went.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut inner = self.inner.lock();
            let before = inner.items.len();
            inner.items.retain(|i| i.status == ItemStatus::Processing);
            let keep: Vec<Uuid> = inner.items.iter().map(|i| i.id).collect();
            inner.progress.retain(|id, _| keep.contains(id));
            inner.completed.retain(|id, _| keep.contains(id));
            before - inner.items.len()
        };
        self.publish(vec![StoreEvent::Cleared { removed }]);
        removed
    }

    /// Failed/cancelled → pending, with error, output and timestamps cleared.
    /// Refused when the same file has been queued again meanwhile.
    pub fn retry(&self, id: Uuid) -> QueueResult<()> {
        {
            let mut inner = self.inner.lock();
            let idx = inner.find(id)?;
            if !matches!(inner.items[idx].status, ItemStatus::Failed | ItemStatus::Cancelled) {
                return Err(QueueError::NotRetryable);
            }
            if inner.has_active_twin(&inner.items[idx].input, Some(id)) {
                return Err(QueueError::Duplicate { name: inner.items[idx].input.name.clone() });
            }
            inner.items[idx].reset();
            inner.completed.remove(&id);
        }
        self.publish(vec![StoreEvent::StatusChanged { id, status: ItemStatus::Pending, error: None }]);
        Ok(())
    }

    pub fn set_override(&self, id: Uuid, settings: Option<SettingsOverride>) -> QueueResult<()> {
        let settings = settings.filter(|s| !s.is_empty());
        {
            let mut inner = self.inner.lock();
            let idx = inner.find(id)?;
            inner.items[idx].settings = settings;
        }
        self.publish(vec![StoreEvent::OverrideChanged { id, settings }]);
        Ok(())
    }

    pub fn update_settings(&self, settings: GlobalSettings) {
        self.inner.lock().settings = settings;
        self.publish(vec![StoreEvent::SettingsChanged(settings)]);
    }

    // ── Transitions (orchestrator only) ───────────────────────────────────────

    /// Pending → processing. Refused while another item is processing.
    pub fn mark_processing(&self, id: Uuid) -> QueueResult<QueueItem> {
        let item = {
            let mut inner = self.inner.lock();
            let idx = inner.find(id)?;
            if inner.items.iter().any(|i| i.status == ItemStatus::Processing) {
                return Err(QueueError::Processing);
            }
            let item = &mut inner.items[idx];
            if item.status != ItemStatus::Pending {
                return Err(QueueError::NotPending);
            }
            item.status     = ItemStatus::Processing;
            item.started_at = Some(SystemTime::now());
            item.clone()
        };
        info!(id = %id, name = %item.input.name, "processing");
        self.publish(vec![StoreEvent::StatusChanged { id, status: ItemStatus::Processing, error: None }]);
        Ok(item)
    }

    /// Replace the progress entry of the processing item. Ignored otherwise.
    pub fn update_progress(&self, id: Uuid, info: ProgressInfo) {
        {
            let mut inner = self.inner.lock();
            if inner.find_processing(id).is_err() {
                return;
            }
            inner.progress.insert(id, info);
        }
        self.publish(vec![StoreEvent::Progress { id, info }]);
    }

    pub fn mark_completed(&self, id: Uuid, result: CompletedResult) -> QueueResult<()> {
        let event = {
            let mut inner = self.inner.lock();
            let idx = inner.find_processing(id)?;
            let item = &mut inner.items[idx];
            item.status            = ItemStatus::Completed;
            item.output_size       = Some(result.output_size);
            item.compression_ratio = Some(result.compression_ratio);
            item.completed_at      = Some(result.completed_at);
            item.error             = None;
            inner.progress.remove(&id);
            let event = StoreEvent::Completed {
                id,
                output_name:       result.output_name.clone(),
                output_size:       result.output_size,
                compression_ratio: result.compression_ratio,
                delivered_to:      result.delivered_to.clone(),
            };
            inner.completed.insert(id, result);
            event
        };
        self.publish(vec![
            StoreEvent::StatusChanged { id, status: ItemStatus::Completed, error: None },
            event,
        ]);
        Ok(())
    }

    pub fn mark_failed(&self, id: Uuid, message: impl Into<String>) -> QueueResult<()> {
        let message = message.into();
        self.finish(id, ItemStatus::Failed, Some(message))
    }

    pub fn mark_cancelled(&self, id: Uuid) -> QueueResult<()> {
        self.finish(id, ItemStatus::Cancelled, None)
    }

    fn finish(&self, id: Uuid, status: ItemStatus, error: Option<String>) -> QueueResult<()> {
        {
            let mut inner = self.inner.lock();
            let idx = inner.find_processing(id)?;
            let item = &mut inner.items[idx];
            item.status       = status;
            item.error        = error.clone();
            item.completed_at = Some(SystemTime::now());
            inner.progress.remove(&id);
        }
        self.publish(vec![StoreEvent::StatusChanged { id, status, error }]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reelqueue_core::job::OutputPayload;

    fn input(name: &str, size: u64) -> InputFile {
        InputFile { name: name.into(), size, path: PathBuf::from(name) }
    }

    fn store() -> JobStore {
        JobStore::new(GlobalSettings::default())
    }

    fn result(input_size: u64, output_size: u64) -> CompletedResult {
        CompletedResult {
            output_name:       "a_converted.mp4".into(),
            input_size,
            output_size,
            compression_ratio: reelqueue_core::job::compression_ratio(input_size, output_size),
            payload:           OutputPayload::Buffer(vec![0; output_size as usize]),
            completed_at:      SystemTime::now(),
            delivered_to:      None,
        }
    }

    #[test]
    fn queue_is_capped() {
        let s = store();
        for i in 0..MAX_QUEUE_ITEMS {
            s.add(input(&format!("{i}.mov"), 1), JobKind::Convert).unwrap();
        }
        assert_eq!(
            s.add(input("extra.mov", 1), JobKind::Convert),
            Err(QueueError::QueueFull { max: MAX_QUEUE_ITEMS })
        );
        assert_eq!(s.len(), MAX_QUEUE_ITEMS);
    }

    #[test]
    fn oversized_files_are_rejected() {
        let s = store();
        assert!(s.add(input("ok.mov", MAX_FILE_BYTES), JobKind::Convert).is_ok());
        assert!(matches!(
            s.add(input("big.mov", MAX_FILE_BYTES + 1), JobKind::Convert),
            Err(QueueError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn duplicates_only_among_active_items() {
        let s = store();
        let id = s.add(input("a.mov", 5), JobKind::Convert).unwrap();
        assert!(matches!(s.add(input("a.mov", 5), JobKind::Convert), Err(QueueError::Duplicate { .. })));
        // Same name, different size is fine.
        assert!(s.add(input("a.mov", 6), JobKind::Convert).is_ok());

        s.mark_processing(id).unwrap();
        assert!(matches!(s.add(input("a.mov", 5), JobKind::Convert), Err(QueueError::Duplicate { .. })));
        s.mark_failed(id, "boom").unwrap();
        assert!(s.add(input("a.mov", 5), JobKind::Convert).is_ok());
    }

    #[test]
    fn only_one_item_processing() {
        let s = store();
        let a = s.add(input("a.mov", 1), JobKind::Convert).unwrap();
        let b = s.add(input("b.mov", 1), JobKind::Convert).unwrap();
        s.mark_processing(a).unwrap();
        assert_eq!(s.mark_processing(b), Err(QueueError::Processing));
        assert_eq!(s.processing_count(), 1);
        s.mark_cancelled(a).unwrap();
        assert!(s.mark_processing(b).is_ok());
        assert_eq!(s.mark_processing(a), Err(QueueError::Processing));
    }

    #[test]
    fn completion_records_result_and_drops_progress() {
        let s = store();
        let id = s.add(input("a.mov", 1000), JobKind::Convert).unwrap();
        s.mark_processing(id).unwrap();
        s.update_progress(id, ProgressInfo::estimate(0.5, 10, Duration::from_secs(1)));
        assert!(s.progress(id).is_some());

        s.mark_completed(id, result(1000, 250)).unwrap();
        let item = s.item(id).unwrap();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.compression_ratio, Some(75.0));
        assert!(item.completed_at.is_some());
        assert!(s.progress(id).is_none());
        assert_eq!(s.completed(id).unwrap().output_size, 250);
    }

    #[test]
    fn progress_ignored_unless_processing() {
        let s = store();
        let id = s.add(input("a.mov", 1), JobKind::Convert).unwrap();
        s.update_progress(id, ProgressInfo::estimate(0.5, 10, Duration::from_secs(1)));
        assert!(s.progress(id).is_none());
    }

    #[test]
    fn remove_and_clear_keep_processing_item() {
        let s = store();
        let a = s.add(input("a.mov", 1), JobKind::Convert).unwrap();
        let b = s.add(input("b.mov", 1), JobKind::Convert).unwrap();
        let c = s.add(input("c.mov", 1), JobKind::Convert).unwrap();
        s.mark_processing(a).unwrap();

        assert_eq!(s.remove(a), Err(QueueError::Processing));
        s.remove(b).unwrap();
        assert_eq!(s.remove(b), Err(QueueError::NotFound));

        s.set_override(c, Some(SettingsOverride { quality: Some(reelqueue_core::settings::QualityPreset::High), ..Default::default() })).unwrap();
        assert_eq!(s.clear(), 1);
        let left = s.items();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, a);
    }

    #[test]
    fn retry_resets_failed_and_cancelled_only() {
        let s = store();
        let id = s.add(input("a.mov", 1), JobKind::Convert).unwrap();
        assert_eq!(s.retry(id), Err(QueueError::NotRetryable));
        s.mark_processing(id).unwrap();
        assert_eq!(s.retry(id), Err(QueueError::NotRetryable));
        s.mark_failed(id, "codec exploded").unwrap();
        assert_eq!(s.item(id).unwrap().error.as_deref(), Some("codec exploded"));

        s.retry(id).unwrap();
        let item = s.item(id).unwrap();
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.error.is_none() && item.started_at.is_none() && item.completed_at.is_none());
    }

    #[test]
    fn retry_refused_while_same_file_is_queued_again() {
        let s = store();
        let first = s.add(input("a.mov", 5), JobKind::Convert).unwrap();
        s.mark_processing(first).unwrap();
        s.mark_failed(first, "boom").unwrap();
        let again = s.add(input("a.mov", 5), JobKind::Convert).unwrap();

        assert!(matches!(s.retry(first), Err(QueueError::Duplicate { .. })));
        assert_eq!(s.item(first).unwrap().status, ItemStatus::Failed);

        s.remove(again).unwrap();
        s.retry(first).unwrap();
        assert_eq!(s.item(first).unwrap().status, ItemStatus::Pending);
    }

    #[test]
    fn empty_override_is_dropped() {
        let s = store();
        let id = s.add(input("a.mov", 1), JobKind::Convert).unwrap();
        s.set_override(id, Some(SettingsOverride::default())).unwrap();
        assert!(s.item(id).unwrap().settings.is_none());
    }

    #[test]
    fn events_follow_mutations() {
        let s = store();
        let rx = s.subscribe();
        let id = s.add(input("a.mov", 1), JobKind::Convert).unwrap();
        s.mark_processing(id).unwrap();
        s.mark_cancelled(id).unwrap();
        s.publish_run_state(RunState::Idle);

        let events: Vec<StoreEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], StoreEvent::ItemAdded(ref i) if i.id == id));
        assert_eq!(events[1], StoreEvent::StatusChanged { id, status: ItemStatus::Processing, error: None });
        assert_eq!(events[2], StoreEvent::StatusChanged { id, status: ItemStatus::Cancelled, error: None });
        assert_eq!(events[3], StoreEvent::RunState(RunState::Idle));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let s = store();
        let rx = s.subscribe();
        drop(rx);
        let _keep = s.subscribe();
        s.update_settings(GlobalSettings::default());
        assert_eq!(s.subscribers.lock().len(), 1);
    }
}
