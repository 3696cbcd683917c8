use rtp_devices::{DeviceError, KeyEvent, KeyInput};
use rtp_timing::Timer;

/// Per-trial view of the response device: one epoch per trial, reset
/// before the first sound is issued.
pub struct ResponsePoller<K: KeyInput, T: Timer> {
    input: K,
    timer: T,
    epoch_ns: u64,
}

impl<K: KeyInput, T: Timer> ResponsePoller<K, T> {
    pub fn new(input: K, timer: T) -> Self {
        let epoch_ns = timer.now_ns();
        Self {
            input,
            timer,
            epoch_ns,
        }
    }

    /// Restarts the RT clock and drops stale key events.
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        self.input.reset_epoch()?;
        self.input.clear_buffer()?;
        self.epoch_ns = self.timer.now_ns();
        Ok(())
    }

    /// Session-clock time of the last reset, seconds.
    pub fn epoch_s(&self) -> f64 {
        self.epoch_ns as f64 / 1e9
    }

    pub fn elapsed_s(&self) -> f64 {
        self.timer.elapsed(self.epoch_ns).as_secs_f64()
    }

    /// Events on `buttons` since the last poll, oldest first. Events on
    /// other keys are discarded.
    pub fn poll(&mut self, buttons: &[String]) -> Result<Vec<KeyEvent>, DeviceError> {
        let mut events = self.input.poll(buttons)?;
        events.retain(|e| buttons.contains(&e.name));
        Ok(events)
    }
}
