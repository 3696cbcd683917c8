//! Capability interfaces for the hardware around a trial: tone playback,
//! button polling and the sync output line. Real drivers live outside this
//! workspace; [`sim`] provides deterministic stand-ins.

pub mod error;
pub mod keys;
pub mod sim;
pub mod sync;
pub mod tone;

pub use error::DeviceError;
pub use keys::{KeyEvent, KeyInput};
pub use sync::{SyncBackend, SyncChannel, SyncLine, open_sync_line};
pub use tone::ToneOutput;
