use crate::DeviceError;
use crate::sim::RecordingSyncLine;
use rtp_timing::Timer;
use serde::{Deserialize, Serialize};

/// Output addressed by a sync transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncChannel {
    /// Flexible digital I/O line.
    Digital(u8),
    /// Analog DAC output.
    Analog(u8),
}

/// Digital or analog output used to mark trial events on an external
/// recording system.
pub trait SyncLine {
    /// Prepares `channel` for output, e.g. switches a digital line's
    /// direction.
    fn configure_output(&mut self, channel: SyncChannel) -> Result<(), DeviceError>;

    /// Converts a voltage into the device's raw level for `channel`, using
    /// the device calibration.
    fn calibrate(&self, channel: SyncChannel, volts: f64) -> Result<u16, DeviceError>;

    fn set_level(&mut self, channel: SyncChannel, value: u16) -> Result<(), DeviceError>;
}

impl<S: SyncLine + ?Sized> SyncLine for Box<S> {
    fn configure_output(&mut self, channel: SyncChannel) -> Result<(), DeviceError> {
        (**self).configure_output(channel)
    }

    fn calibrate(&self, channel: SyncChannel, volts: f64) -> Result<u16, DeviceError> {
        (**self).calibrate(channel, volts)
    }

    fn set_level(&mut self, channel: SyncChannel, value: u16) -> Result<(), DeviceError> {
        (**self).set_level(channel, value)
    }
}

/// Which sync device to open at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncBackend {
    #[default]
    Simulated,
    LabjackU3,
}

/// Opens the sync device for a session. The line is opened once and kept
/// for the whole session.
pub fn open_sync_line<T: Timer + 'static>(
    backend: SyncBackend,
    timer: T,
) -> Result<Box<dyn SyncLine + Send>, DeviceError> {
    match backend {
        SyncBackend::Simulated => {
            tracing::info!("using simulated sync line");
            Ok(Box::new(RecordingSyncLine::new(timer)))
        }
        SyncBackend::LabjackU3 => Err(DeviceError::Unavailable {
            device: "LabJack U3",
            reason: "no driver is linked into this build; check the connection or disable sync"
                .to_string(),
        }),
    }
}
