// crates/reelqueue-core/src/lib.rs
//
// Plain data shared by reelqueue-media and reelqueue-app: settings, the queue
// model, the worker protocol, errors, commands, and the crop/trim geometry.
// No threads and no codec live here.

pub mod commands;
pub mod edit;
pub mod error;
pub mod job;
pub mod protocol;
pub mod settings;

pub mod helpers {
    pub mod geometry;
    pub mod time;
}
