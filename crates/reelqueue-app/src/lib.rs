// crates/reelqueue-app/src/lib.rs
//
// The app side of reelqueue: queue store, channel client, orchestrator and
// the session that wires them together. main.rs is a thin CLI over Session.
//
// Data flow:
//   QueueCommand ─▶ Session ─▶ JobStore ◀─ Orchestrator ─▶ ChannelClient ─▶ MediaWorker
//                                  │
//                                  └──▶ StoreEvent subscribers (CLI status lines)

pub mod client;
pub mod config;
pub mod orchestrator;
pub mod paths;
pub mod session;
pub mod sink;
pub mod store;

pub mod helpers {
    pub mod format;
    pub mod log;
}
