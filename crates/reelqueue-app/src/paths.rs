// crates/reelqueue-app/src/paths.rs
// Single source of truth for where ReelQueue reads config and writes logs.

use std::path::{Path, PathBuf};

/// `%APPDATA%\reelqueue\config.json` on Windows,
/// `$XDG_CONFIG_HOME/reelqueue/config.json` or `~/.config/reelqueue/config.json`
/// elsewhere.
pub fn config_file() -> PathBuf {
    #[cfg(target_os = "windows")]
    let base = std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir());
    #[cfg(not(target_os = "windows"))]
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|_| std::env::temp_dir());
    base.join("reelqueue").join("config.json")
}

/// Append-only log mirror in the OS temp directory.
pub fn log_file() -> PathBuf {
    std::env::temp_dir().join("reelqueue.log")
}

/// Configured output directory, else the current directory.
pub fn resolve_output_dir(configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
