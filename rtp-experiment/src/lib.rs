//! Trial engine, session queue and persistence for the random tone pitch
//! task.

pub mod adhoc;
pub mod config;
pub mod engine;
pub mod error;
pub mod queue;
pub mod response;
pub mod session;
pub mod stimulus;
pub mod store;
pub mod sync;

pub use adhoc::{AdhocRecord, run_adhoc};
pub use config::{
    BlockConfig, ButtonMap, ConfigError, CueConfig, StimulusConfig, SyncConfig, SyncMode,
    TaskConfig, TimingConfig,
};
pub use engine::{Devices, TrialEngine};
pub use error::{ResumeError, SessionError, TrialError};
pub use queue::{QueueSnapshot, SNAPSHOT_VERSION, SessionQueue};
pub use response::ResponsePoller;
pub use session::{SessionSummary, run_session};
pub use stimulus::{ChordTiming, StimulusClock};
pub use store::{FileStore, MemoryStore, SNAPSHOT_FILE, SessionKey, SessionStore};
pub use sync::{SyncEmitter, SyncLevel, Transition};
