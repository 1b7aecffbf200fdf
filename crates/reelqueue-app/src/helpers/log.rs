// crates/reelqueue-app/src/helpers/log.rs
//
// Logging setup for the reelqueue binary.
//
// Everything logs through `tracing`. This installs the subscriber: stderr
// always, plus an append-only mirror in the OS temp directory when the config
// asks for it (useful when the CLI runs under a launcher that eats stderr).
//
// Level: RUST_LOG wins when set; otherwise `info`, or `debug` with -v.
//
// File: %TEMP%\reelqueue.log / $TMPDIR/reelqueue.log, no ANSI colours.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbose: bool, file: Option<&Path>) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    // A file that cannot be opened just means no mirror.
    let mirror = file
        .and_then(|p| OpenOptions::new().create(true).append(true).open(p).ok())
        .map(|f| fmt::layer().with_writer(Mutex::new(f)).with_ansi(false));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(mirror)
        .try_init();
}
