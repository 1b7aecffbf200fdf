// crates/reelqueue-app/src/config.rs
//
// AppConfig: everything the session needs that is not per-item. Stored as
// JSON; every key is optional and falls back to its default, so an old or
// hand-trimmed file keeps loading. CLI flags are applied on top by main.rs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use reelqueue_core::settings::GlobalSettings;

use crate::client::ClientConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::paths;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub settings:               GlobalSettings,
    /// `None` → current directory.
    pub output_dir:             Option<PathBuf>,
    pub stream_threshold_bytes: u64,
    pub restart_delay_ms:       u64,
    pub cancel_timeout_ms:      u64,
    pub job_timeout_secs:       u64,
    pub capability_timeout_ms:  u64,
    /// Mirror logs into `reelqueue.log` in the temp directory.
    pub log_file:               bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings:               GlobalSettings::default(),
            output_dir:             None,
            stream_threshold_bytes: 256 * 1024 * 1024,
            restart_delay_ms:       1_000,
            cancel_timeout_ms:      5_000,
            job_timeout_secs:       300,
            capability_timeout_ms:  5_000,
            log_file:               false,
        }
    }
}

impl AppConfig {
    /// Load `explicit`, or the default config file if it exists. An explicit
    /// path that is missing is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let p = paths::config_file();
                if !p.exists() {
                    debug!(path = %p.display(), "no config file, using defaults");
                    return Ok(Self::default());
                }
                p
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            restart_delay:      Duration::from_millis(self.restart_delay_ms),
            capability_timeout: Duration::from_millis(self.capability_timeout_ms),
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            output_dir:             paths::resolve_output_dir(self.output_dir.as_deref()),
            stream_threshold_bytes: self.stream_threshold_bytes,
            cancel_timeout:         Duration::from_millis(self.cancel_timeout_ms),
            job_timeout:            Duration::from_secs(self.job_timeout_secs),
        }
    }
}
