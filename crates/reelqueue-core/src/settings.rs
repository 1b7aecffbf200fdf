// crates/reelqueue-core/src/settings.rs
//
// Process-wide conversion settings plus the per-item override that is merged
// on top of them when a job is dequeued.
//
// Both tables below (bitrates, resolution caps) are part of the wire contract
// with the media worker: a ConvertRequest carries the resolved numbers, not
// the preset names, so the worker never needs to know about presets.

use serde::{Deserialize, Serialize};

// ── Quality preset ────────────────────────────────────────────────────────────

/// Named quality tier. Maps to fixed video/audio bitrates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

/// Target bitrates in bits per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitrates {
    pub video: u32,
    pub audio: u32,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [QualityPreset::Low, QualityPreset::Medium, QualityPreset::High];

    /// ```
    /// use reelqueue_core::settings::QualityPreset;
    /// let b = QualityPreset::Low.bitrates();
    /// assert_eq!((b.video, b.audio), (2_000_000, 96_000));
    /// ```
    pub fn bitrates(self) -> Bitrates {
        match self {
            QualityPreset::Low    => Bitrates { video:  2_000_000, audio:  96_000 },
            QualityPreset::Medium => Bitrates { video:  5_000_000, audio: 128_000 },
            QualityPreset::High   => Bitrates { video: 10_000_000, audio: 192_000 },
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityPreset::Low    => "low",
            QualityPreset::Medium => "medium",
            QualityPreset::High   => "high",
        }
    }

    /// Inverse of [`label`](Self::label). Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label().eq_ignore_ascii_case(s.trim()))
    }
}

// ── Resolution cap ────────────────────────────────────────────────────────────

/// Upper bound on the larger output dimension. The worker keeps the aspect
/// ratio when it applies the cap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionCap {
    #[default]
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl ResolutionCap {
    pub const ALL: [ResolutionCap; 4] = [
        ResolutionCap::Original,
        ResolutionCap::P1080,
        ResolutionCap::P720,
        ResolutionCap::P480,
    ];

    /// Pixel length of the larger side, or `None` for no cap.
    pub fn max_dimension(self) -> Option<u32> {
        match self {
            ResolutionCap::Original => None,
            ResolutionCap::P1080    => Some(1920),
            ResolutionCap::P720     => Some(1280),
            ResolutionCap::P480     => Some(854),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResolutionCap::Original => "original",
            ResolutionCap::P1080    => "1080p",
            ResolutionCap::P720     => "720p",
            ResolutionCap::P480     => "480p",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label().eq_ignore_ascii_case(s.trim()))
    }
}

// ── Global settings + override ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub quality:               QualityPreset,
    pub resolution:            ResolutionCap,
    /// Save finished buffer results into the output directory automatically.
    pub auto_download:         bool,
    /// Drop the queue item once its result has been delivered.
    pub remove_after_download: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            quality:               QualityPreset::Medium,
            resolution:            ResolutionCap::Original,
            auto_download:         true,
            remove_after_download: false,
        }
    }
}

/// Per-item settings. Every present key wins over the global value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverride {
    pub quality:               Option<QualityPreset>,
    pub resolution:            Option<ResolutionCap>,
    pub auto_download:         Option<bool>,
    pub remove_after_download: Option<bool>,
}

impl SettingsOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl GlobalSettings {
    /// Resolve the effective settings for one job.
    ///
    /// Called at dequeue time, so a global change made while an item waits in
    /// the queue still applies to it unless the item overrides that key.
    pub fn merged(&self, ov: Option<&SettingsOverride>) -> GlobalSettings {
        let Some(ov) = ov else { return *self };
        GlobalSettings {
            quality:               ov.quality.unwrap_or(self.quality),
            resolution:            ov.resolution.unwrap_or(self.resolution),
            auto_download:         ov.auto_download.unwrap_or(self.auto_download),
            remove_after_download: ov.remove_after_download.unwrap_or(self.remove_after_download),
        }
    }
}
