use rtp_core::{ChangePolicy, Direction, PitchError, PitchModel, PitchSpace};
use rtp_devices::{SyncBackend, SyncChannel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid stimulus parameters: {0}")]
    Stimulus(#[from] PitchError),
    #[error("{0} list is empty")]
    Empty(&'static str),
    #[error("coherence {0} is outside (0, 1]")]
    Coherence(f64),
    #[error("duplicate {what} `{name}`")]
    Duplicate { what: &'static str, name: String },
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: String, value: f64 },
    #[error("{name} is not a usable number of seconds: {value}")]
    Seconds { name: String, value: f64 },
    #[error("button `{0}` is mapped to both increase and decrease")]
    AmbiguousButton(String),
    #[error("sync is enabled but {0}")]
    Sync(String),
}

/// Sync output mode. Digital toggles a line between 1 and 0; analog steps a
/// DAC between the calibrated pulse and zero levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SyncMode {
    Digital { line: u8 },
    Analog { dac: u8, pulse_volts: f64 },
}

impl SyncMode {
    pub fn channel(&self) -> SyncChannel {
        match *self {
            SyncMode::Digital { line } => SyncChannel::Digital(line),
            SyncMode::Analog { dac, .. } => SyncChannel::Analog(dac),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub backend: SyncBackend,
    pub mode: SyncMode,
    /// Pulses per trial, each recorded in its own TTL column.
    pub pulse_count: usize,
    /// Hold time on the pulse level before returning to zero.
    pub pulse_width_s: f64,
    /// Wait after the pulse train before the trial ends.
    pub settle_s: f64,
    /// Hold on the low level before the marker edge in ad-hoc mode.
    pub marker_low_s: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backend: SyncBackend::Simulated,
            mode: SyncMode::Analog {
                dac: 0,
                pulse_volts: 1.5,
            },
            pulse_count: 3,
            pulse_width_s: 0.0,
            settle_s: 0.5,
            marker_low_s: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    pub base_note: f64,
    pub num_tones: usize,
    pub space: PitchSpace,
    /// Half-open `[low, high)` step magnitude.
    pub change_range: [f64; 2],
    pub change_policy: ChangePolicy,
    pub tone_volume: f32,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            base_note: 440.0,
            num_tones: 10,
            space: PitchSpace::HalfSteps { low: -9, high: 63 },
            change_range: [2.0, 8.0],
            change_policy: ChangePolicy::Together,
            tone_volume: 1.0,
        }
    }
}

impl StimulusConfig {
    pub fn pitch_model(&self) -> Result<PitchModel, PitchError> {
        PitchModel::new(
            self.space,
            self.base_note,
            self.num_tones,
            (self.change_range[0], self.change_range[1]),
            self.change_policy,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Duration of one chord, which is also the response polling period.
    pub tone_step_s: f64,
    pub orient_s: f64,
    pub feedback_s: f64,
    /// Spin instead of sleeping while a chord plays.
    pub busy_wait: bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tone_step_s: 0.05,
            orient_s: 0.5,
            feedback_s: 1.5,
            busy_wait: false,
        }
    }
}

impl TimingConfig {
    pub fn tone_step(&self) -> Duration {
        Duration::from_secs_f64(self.tone_step_s)
    }

    pub fn orient(&self) -> Duration {
        Duration::from_secs_f64(self.orient_s)
    }

    pub fn feedback(&self) -> Duration {
        Duration::from_secs_f64(self.feedback_s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub name: String,
    pub response_time_limit_s: f64,
}

/// Partition of response buttons by the direction they report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonMap {
    pub increase: Vec<String>,
    pub decrease: Vec<String>,
}

impl Default for ButtonMap {
    fn default() -> Self {
        Self {
            increase: vec!["rshift".to_string(), "return".to_string()],
            decrease: vec!["lshift".to_string(), "up".to_string()],
        }
    }
}

impl ButtonMap {
    pub fn all(&self) -> Vec<String> {
        self.increase
            .iter()
            .chain(self.decrease.iter())
            .cloned()
            .collect()
    }

    pub fn classify(&self, button: &str) -> Option<Direction> {
        if self.increase.iter().any(|b| b == button) {
            Some(Direction::Increase)
        } else if self.decrease.iter().any(|b| b == button) {
            Some(Direction::Decrease)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    pub orient_volume: f32,
    pub correct_volume: f32,
    pub wrong_volume: f32,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            orient_volume: 1.0,
            correct_volume: 1.0,
            wrong_volume: 0.5,
        }
    }
}

/// Task configuration. Built once, validated, then shared read-only by every
/// component of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub send_sync: bool,
    pub sync: SyncConfig,
    pub play_orient_each_trial: bool,
    /// Play the orientation cue on the first trial of each block.
    pub cue_block_start: bool,
    /// Interleave trials of all blocks instead of running them blocked.
    pub shuffle_across_blocks: bool,
    /// Trials per (coherence, direction) cell in each block.
    pub repeats: usize,
    pub stimulus: StimulusConfig,
    pub timing: TimingConfig,
    pub blocks: Vec<BlockConfig>,
    pub coherences: Vec<f64>,
    pub directions: Vec<Direction>,
    pub buttons: ButtonMap,
    pub cues: CueConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            send_sync: true,
            sync: SyncConfig::default(),
            play_orient_each_trial: false,
            cue_block_start: true,
            shuffle_across_blocks: false,
            repeats: 25,
            stimulus: StimulusConfig::default(),
            timing: TimingConfig::default(),
            blocks: vec![
                BlockConfig {
                    name: "fast".to_string(),
                    response_time_limit_s: 10.0,
                },
                BlockConfig {
                    name: "slow".to_string(),
                    response_time_limit_s: 10.0,
                },
            ],
            coherences: vec![0.8, 0.4],
            directions: vec![Direction::Increase, Direction::Decrease],
            buttons: ButtonMap::default(),
            cues: CueConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Reads and validates `path`. A missing file yields the defaults; an
    /// unreadable or malformed file is an error, since running a different
    /// design than intended would corrupt the session.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            tracing::info!(path = %path.display(), "config not found, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stimulus.pitch_model()?;

        if self.blocks.is_empty() {
            return Err(ConfigError::Empty("block"));
        }
        if self.coherences.is_empty() {
            return Err(ConfigError::Empty("coherence"));
        }
        if self.directions.is_empty() {
            return Err(ConfigError::Empty("direction"));
        }
        if self.buttons.increase.is_empty() || self.buttons.decrease.is_empty() {
            return Err(ConfigError::Empty("response button"));
        }
        if self.repeats == 0 {
            return Err(ConfigError::NonPositive {
                name: "repeats".to_string(),
                value: 0.0,
            });
        }

        let mut names = HashSet::new();
        for block in &self.blocks {
            if !names.insert(block.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    what: "block",
                    name: block.name.clone(),
                });
            }
            positive(
                &format!("blocks.{}.response_time_limit_s", block.name),
                block.response_time_limit_s,
            )?;
        }

        if let Some(&c) = self.coherences.iter().find(|&&c| !(c > 0.0 && c <= 1.0)) {
            return Err(ConfigError::Coherence(c));
        }

        let mut seen = HashSet::new();
        for d in &self.directions {
            if !seen.insert(*d) {
                return Err(ConfigError::Duplicate {
                    what: "direction",
                    name: d.to_string(),
                });
            }
        }

        if let Some(b) = self
            .buttons
            .increase
            .iter()
            .find(|b| self.buttons.decrease.contains(b))
        {
            return Err(ConfigError::AmbiguousButton(b.clone()));
        }

        positive("timing.tone_step_s", self.timing.tone_step_s)?;
        positive("timing.orient_s", self.timing.orient_s)?;
        positive("timing.feedback_s", self.timing.feedback_s)?;

        // hold times are checked with sync off too
        seconds("sync.pulse_width_s", self.sync.pulse_width_s)?;
        seconds("sync.settle_s", self.sync.settle_s)?;
        seconds("sync.marker_low_s", self.sync.marker_low_s)?;

        if self.send_sync {
            if self.sync.pulse_count == 0 {
                return Err(ConfigError::Sync("pulse_count is 0".to_string()));
            }
            if let SyncMode::Analog { pulse_volts, .. } = self.sync.mode {
                if !(pulse_volts > 0.0 && pulse_volts.is_finite()) {
                    return Err(ConfigError::Sync(format!(
                        "analog pulse of {pulse_volts} V is not positive"
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn block(&self, name: &str) -> Option<&BlockConfig> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn response_time_limit_s(&self, block: &str) -> Option<f64> {
        self.block(block).map(|b| b.response_time_limit_s)
    }
}

/// Non-negative, finite and small enough for a `Duration`.
fn seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Seconds {
        name: name.to_string(),
        value,
    })
}

fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0) {
        return Err(ConfigError::NonPositive {
            name: name.to_string(),
            value,
        });
    }
    seconds(name, value).map(|_| ())
}
