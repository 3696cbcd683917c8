use rtp_core::{Cue, PitchArray, Tuning};
use rtp_devices::{DeviceError, ToneOutput};
use rtp_timing::Timer;
use std::time::Duration;

/// Session-clock onset and offset of one played sound, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChordTiming {
    pub onset_s: f64,
    pub offset_s: f64,
}

/// Plays chords and cues on the shared session clock and blocks until each
/// has run its full duration.
pub struct StimulusClock<A: ToneOutput, T: Timer> {
    output: A,
    timer: T,
    tuning: Tuning,
    volume: f32,
}

impl<A: ToneOutput, T: Timer> StimulusClock<A, T> {
    pub fn new(output: A, timer: T, tuning: Tuning, volume: f32) -> Self {
        Self {
            output,
            timer,
            tuning,
            volume,
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Voices every tone of `cloud` at once and waits out `duration`. The
    /// offset comes from the first tone's reported stop time.
    pub fn play_chord(
        &mut self,
        cloud: &PitchArray,
        duration: Duration,
    ) -> Result<ChordTiming, DeviceError> {
        let onset_s = self.timer.now_s();
        let mut first_stop = None;
        for freq in self.tuning.frequencies(cloud) {
            let stop = self.output.play(freq, duration, self.volume)?;
            first_stop.get_or_insert(stop);
        }
        self.timer.sleep(duration);
        Ok(ChordTiming {
            onset_s,
            offset_s: onset_s + first_stop.unwrap_or(duration.as_secs_f64()),
        })
    }

    pub fn play_cue(
        &mut self,
        cue: Cue,
        duration: Duration,
        volume: f32,
    ) -> Result<ChordTiming, DeviceError> {
        let onset_s = self.timer.now_s();
        let stop = self.output.play_cue(cue, duration, volume)?;
        self.timer.sleep(duration);
        Ok(ChordTiming {
            onset_s,
            offset_s: onset_s + stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtp_core::PitchSpace;
    use rtp_devices::sim::SilentTones;
    use rtp_timing::SimulatedTimer;

    fn clock(tones: SilentTones, timer: SimulatedTimer) -> StimulusClock<SilentTones, SimulatedTimer> {
        let tuning = Tuning {
            space: PitchSpace::HalfSteps { low: -9, high: 63 },
            base_note: 440.0,
        };
        StimulusClock::new(tones, timer, tuning, 1.0)
    }

    #[test]
    fn chord_voices_every_tone_and_blocks() {
        let timer = SimulatedTimer::new();
        timer.advance(Duration::from_secs(2));
        let tones = SilentTones::new();
        let log = tones.log();
        let mut clock = clock(tones, timer.clone());

        let cloud = PitchArray::from_indices(vec![0.0, 12.0, -9.0]).unwrap();
        let t = clock.play_chord(&cloud, Duration::from_millis(50)).unwrap();

        assert_eq!(t.onset_s, 2.0);
        assert!((t.offset_s - 2.05).abs() < 1e-9);
        assert_eq!(timer.now_ns(), 2_050_000_000);
        let log = log.lock();
        assert_eq!(log.tones.len(), 3);
        assert_eq!(log.tones[0], 440.0);
        assert_eq!(log.tones[1], 880.0);
    }

    #[test]
    fn cue_uses_same_timing_contract() {
        let timer = SimulatedTimer::new();
        let tones = SilentTones::new();
        let log = tones.log();
        let mut clock = clock(tones, timer.clone());

        let t = clock
            .play_cue(Cue::Wrong, Duration::from_millis(1500), 0.5)
            .unwrap();
        assert_eq!(t.onset_s, 0.0);
        assert_eq!(t.offset_s, 1.5);
        assert_eq!(log.lock().cues, vec![(Cue::Wrong, 0.5)]);
    }

    #[test]
    fn device_failure_propagates() {
        let timer = SimulatedTimer::new();
        let mut clock = clock(SilentTones::failing_after(1), timer);
        let cloud = PitchArray::from_indices(vec![0.0, 1.0]).unwrap();
        assert!(clock.play_chord(&cloud, Duration::from_millis(50)).is_err());
    }
}
