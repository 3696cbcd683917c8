use crate::config::{SyncConfig, SyncMode};
use rtp_devices::{DeviceError, SyncChannel, SyncLine};
use rtp_timing::Timer;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLevel {
    Pulse,
    Zero,
}

/// One level change followed by an optional hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub level: SyncLevel,
    pub hold: Duration,
}

impl Transition {
    pub fn to(level: SyncLevel) -> Self {
        Self {
            level,
            hold: Duration::ZERO,
        }
    }

    pub fn hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }
}

/// Drives the session's sync output. The device is opened once per session
/// and owned here for its whole lifetime.
pub struct SyncEmitter<S: SyncLine, T: Timer> {
    line: S,
    timer: T,
    channel: SyncChannel,
    pulse_value: u16,
    zero_value: u16,
    pulse_width: Duration,
    settle: Duration,
    marker_low: Duration,
}

impl<S: SyncLine, T: Timer> SyncEmitter<S, T> {
    /// Configures the channel and resolves the raw pulse and zero levels.
    /// Failures here happen before any trial and are fatal to the session.
    pub fn new(mut line: S, config: &SyncConfig, timer: T) -> Result<Self, DeviceError> {
        let channel = config.mode.channel();
        line.configure_output(channel)?;
        let (pulse_value, zero_value) = match config.mode {
            SyncMode::Digital { .. } => (1, 0),
            SyncMode::Analog { pulse_volts, .. } => (
                line.calibrate(channel, pulse_volts)?,
                line.calibrate(channel, 0.0)?,
            ),
        };
        tracing::debug!(?channel, pulse_value, zero_value, "sync line configured");
        Ok(Self {
            line,
            timer,
            channel,
            pulse_value,
            zero_value,
            pulse_width: Duration::from_secs_f64(config.pulse_width_s),
            settle: Duration::from_secs_f64(config.settle_s),
            marker_low: Duration::from_secs_f64(config.marker_low_s),
        })
    }

    pub fn channel(&self) -> SyncChannel {
        self.channel
    }

    /// Applies each transition in order and returns the session-clock time
    /// taken immediately before each write.
    pub fn emit(&mut self, transitions: &[Transition]) -> Result<Vec<f64>, DeviceError> {
        let mut stamps = Vec::with_capacity(transitions.len());
        for t in transitions {
            let value = match t.level {
                SyncLevel::Pulse => self.pulse_value,
                SyncLevel::Zero => self.zero_value,
            };
            stamps.push(self.timer.now_s());
            self.line.set_level(self.channel, value)?;
            if !t.hold.is_zero() {
                self.timer.sleep(t.hold);
            }
        }
        Ok(stamps)
    }

    /// `count` pulse/zero pairs. Returns the time of each pulse edge.
    pub fn pulse_train(&mut self, count: usize) -> Result<Vec<f64>, DeviceError> {
        let train: Vec<Transition> = (0..count)
            .flat_map(|_| {
                [
                    Transition::to(SyncLevel::Pulse).hold(self.pulse_width),
                    Transition::to(SyncLevel::Zero),
                ]
            })
            .collect();
        let stamps = self.emit(&train)?;
        Ok(stamps.into_iter().step_by(2).collect())
    }

    /// Single event marker. A digital line is pulled low, held, then raised;
    /// an analog line pulses and returns to zero. Returns the time of the
    /// marking edge.
    pub fn marker(&mut self) -> Result<f64, DeviceError> {
        match self.channel {
            SyncChannel::Digital(_) => {
                let stamps = self.emit(&[
                    Transition::to(SyncLevel::Zero).hold(self.marker_low),
                    Transition::to(SyncLevel::Pulse),
                ])?;
                Ok(stamps[1])
            }
            SyncChannel::Analog(_) => {
                let stamps = self.emit(&[
                    Transition::to(SyncLevel::Pulse).hold(self.pulse_width),
                    Transition::to(SyncLevel::Zero),
                ])?;
                Ok(stamps[0])
            }
        }
    }

    /// Waits out the post-train settle time.
    pub fn settle(&self) {
        if !self.settle.is_zero() {
            self.timer.sleep(self.settle);
        }
    }
}
