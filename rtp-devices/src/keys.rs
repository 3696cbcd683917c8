use crate::DeviceError;

/// A button-down observed since the last epoch reset.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub name: String,
    /// Key-down time relative to the epoch, seconds.
    pub down_s: f64,
    /// Reaction time measured by the device against the same epoch.
    pub rt: f64,
}

/// Keyboard or button box.
pub trait KeyInput {
    /// Restarts the device's RT clock.
    fn reset_epoch(&mut self) -> Result<(), DeviceError>;

    /// Drops buffered events.
    fn clear_buffer(&mut self) -> Result<(), DeviceError>;

    /// Drains events for `buttons` recorded since the previous poll, oldest
    /// first.
    fn poll(&mut self, buttons: &[String]) -> Result<Vec<KeyEvent>, DeviceError>;
}

impl<K: KeyInput + ?Sized> KeyInput for Box<K> {
    fn reset_epoch(&mut self) -> Result<(), DeviceError> {
        (**self).reset_epoch()
    }

    fn clear_buffer(&mut self) -> Result<(), DeviceError> {
        (**self).clear_buffer()
    }

    fn poll(&mut self, buttons: &[String]) -> Result<Vec<KeyEvent>, DeviceError> {
        (**self).poll(buttons)
    }
}
