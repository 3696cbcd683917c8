use crate::DeviceError;
use rtp_core::Cue;
use std::time::Duration;

/// Tone playback. `play` starts a tone and returns without waiting for it;
/// the caller owns the timeline.
pub trait ToneOutput {
    /// Starts a pure tone and returns the device-reported stop time in
    /// seconds after the tone's start.
    fn play(&mut self, frequency_hz: f64, duration: Duration, volume: f32)
    -> Result<f64, DeviceError>;

    /// Starts a pre-recorded cue and returns its reported length in seconds.
    fn play_cue(&mut self, cue: Cue, duration: Duration, volume: f32) -> Result<f64, DeviceError>;
}

impl<A: ToneOutput + ?Sized> ToneOutput for Box<A> {
    fn play(
        &mut self,
        frequency_hz: f64,
        duration: Duration,
        volume: f32,
    ) -> Result<f64, DeviceError> {
        (**self).play(frequency_hz, duration, volume)
    }

    fn play_cue(&mut self, cue: Cue, duration: Duration, volume: f32) -> Result<f64, DeviceError> {
        (**self).play_cue(cue, duration, volume)
    }
}
