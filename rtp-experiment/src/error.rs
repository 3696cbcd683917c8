use crate::config::ConfigError;
use rtp_core::TrialState;
use rtp_devices::DeviceError;
use thiserror::Error;

/// Failure while a single trial is running. Not retried: the trial is not
/// marked shown and the session stops.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("device failure during {state:?}: {source}")]
    Device {
        state: TrialState,
        #[source]
        source: DeviceError,
    },
    #[error("trial belongs to unknown block `{0}`")]
    UnknownBlock(String),
}

/// A persisted queue that cannot be resumed safely.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("snapshot is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("snapshot version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("trial {index} was shown after an unshown trial")]
    NonContiguous { index: usize },
    #[error("resume point {next} is past the end of a {len}-trial queue")]
    WatermarkPastEnd { next: usize, len: usize },
    #[error("snapshot records resume point {recorded} but its trials imply {computed}")]
    WatermarkMismatch { recorded: usize, computed: usize },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("trial {index} failed: {source}")]
    Trial {
        index: usize,
        #[source]
        source: TrialError,
    },
    #[error("cannot resume session: {0}")]
    Resume(#[from] ResumeError),
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode session snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Device(#[from] DeviceError),
}
