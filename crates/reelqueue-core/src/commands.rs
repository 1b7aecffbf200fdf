// crates/reelqueue-core/src/commands.rs
//
// Every user action on the queue is expressed as a QueueCommand.
// The CLI emits these; Session::process_command applies them.
// Adding a new action = add a variant here + one match arm in session.rs.

use std::path::PathBuf;
use uuid::Uuid;

use crate::protocol::EditSpec;
use crate::settings::{GlobalSettings, SettingsOverride};

#[derive(Debug, Clone, PartialEq)]
pub enum QueueCommand {
    // ── Queue contents ───────────────────────────────────────────────────────
    /// Add each path as a Convert job. Rejected files are reported one by one
    /// and do not stop the rest from being added.
    AddFiles(Vec<PathBuf>),
    /// Add one crop/trim job built by an EditSession.
    AddCropJob { path: PathBuf, edit: EditSpec },
    /// Remove a non-processing item with its progress and override.
    Remove(Uuid),
    /// Reset a failed or cancelled item to pending.
    Retry(Uuid),
    /// Drop every non-processing item.
    Clear,

    // ── Settings ─────────────────────────────────────────────────────────────
    /// Replace (Some) or drop (None) one item's override.
    SetOverride { id: Uuid, settings: Option<SettingsOverride> },
    UpdateSettings(GlobalSettings),

    // ── Run control ──────────────────────────────────────────────────────────
    Start,
    Pause,
    Resume,
    CancelCurrent,
}
