//! Simulated devices. They keep no wall-clock state of their own: every
//! timestamp comes from the shared [`Timer`], so a [`SimulatedTimer`]
//! makes whole sessions deterministic.
//!
//! [`SimulatedTimer`]: rtp_timing::SimulatedTimer

use crate::keys::{KeyEvent, KeyInput};
use crate::sync::{SyncChannel, SyncLine};
use crate::tone::ToneOutput;
use crate::DeviceError;
use parking_lot::Mutex;
use rand::Rng;
use rtp_core::Cue;
use rtp_timing::Timer;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct ToneLog {
    /// Frequency of every tone started, in order.
    pub tones: Vec<f64>,
    pub cues: Vec<(Cue, f32)>,
}

/// Accepts every play command without producing sound and reports the
/// requested duration as the stop time.
#[derive(Debug, Default)]
pub struct SilentTones {
    log: Arc<Mutex<ToneLog>>,
    fail_after: Option<usize>,
    started: usize,
}

impl SilentTones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every play command after the first `n` tones.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn log(&self) -> Arc<Mutex<ToneLog>> {
        Arc::clone(&self.log)
    }

    fn check(&mut self) -> Result<(), DeviceError> {
        if self.fail_after.is_some_and(|n| self.started >= n) {
            return Err(DeviceError::Io {
                device: "audio",
                message: "simulated underrun".to_string(),
            });
        }
        self.started += 1;
        Ok(())
    }
}

impl ToneOutput for SilentTones {
    fn play(
        &mut self,
        frequency_hz: f64,
        duration: Duration,
        _volume: f32,
    ) -> Result<f64, DeviceError> {
        self.check()?;
        self.log.lock().tones.push(frequency_hz);
        Ok(duration.as_secs_f64())
    }

    fn play_cue(&mut self, cue: Cue, duration: Duration, volume: f32) -> Result<f64, DeviceError> {
        self.check()?;
        self.log.lock().cues.push((cue, volume));
        Ok(duration.as_secs_f64())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedPress {
    pub button: String,
    /// Seconds after the epoch reset.
    pub rt: f64,
}

impl ScriptedPress {
    pub fn new(button: impl Into<String>, rt: f64) -> Self {
        Self {
            button: button.into(),
            rt,
        }
    }
}

/// Button input driven by a per-trial script. Each epoch reset consumes the
/// next script entry; a press becomes visible once the clock passes its RT.
pub struct ScriptedKeys<T: Timer> {
    timer: T,
    script: VecDeque<Vec<ScriptedPress>>,
    pending: Vec<ScriptedPress>,
    epoch_ns: u64,
}

impl<T: Timer> ScriptedKeys<T> {
    pub fn new(timer: T, script: impl IntoIterator<Item = Vec<ScriptedPress>>) -> Self {
        Self {
            timer,
            script: script.into_iter().collect(),
            pending: Vec::new(),
            epoch_ns: 0,
        }
    }

    /// At most one press per trial; `None` withholds the response.
    pub fn single(timer: T, presses: impl IntoIterator<Item = Option<(&'static str, f64)>>) -> Self {
        Self::new(
            timer,
            presses
                .into_iter()
                .map(|p| p.map(|(b, rt)| vec![ScriptedPress::new(b, rt)]).unwrap_or_default()),
        )
    }

    fn elapsed_s(&self) -> f64 {
        self.timer.elapsed(self.epoch_ns).as_secs_f64()
    }
}

impl<T: Timer> KeyInput for ScriptedKeys<T> {
    fn reset_epoch(&mut self) -> Result<(), DeviceError> {
        self.epoch_ns = self.timer.now_ns();
        let mut next = self.script.pop_front().unwrap_or_default();
        next.sort_by(|a, b| a.rt.total_cmp(&b.rt));
        self.pending = next;
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<(), DeviceError> {
        let now = self.elapsed_s();
        self.pending.retain(|p| p.rt > now);
        Ok(())
    }

    fn poll(&mut self, buttons: &[String]) -> Result<Vec<KeyEvent>, DeviceError> {
        let now = self.elapsed_s();
        let wanted: HashSet<&str> = buttons.iter().map(String::as_str).collect();
        let mut events = Vec::new();
        self.pending.retain(|p| {
            if p.rt <= now && wanted.contains(p.button.as_str()) {
                events.push(KeyEvent {
                    name: p.button.clone(),
                    down_s: p.rt,
                    rt: p.rt,
                });
                false
            } else {
                true
            }
        });
        Ok(events)
    }
}

/// Presses a random requested button after a random delay, or withholds
/// the response with probability `miss_rate`. Used for unattended dry runs.
/// A NaN `miss_rate` counts as 0.
pub struct RandomResponder<T: Timer, R: Rng> {
    timer: T,
    rng: R,
    miss_rate: f64,
    rt_range: (f64, f64),
    epoch_ns: u64,
    planned_rt: Option<f64>,
}

impl<T: Timer, R: Rng> RandomResponder<T, R> {
    pub fn new(timer: T, rng: R, miss_rate: f64, rt_range: (f64, f64)) -> Self {
        let (lo, hi) = rt_range;
        Self {
            timer,
            rng,
            miss_rate: if miss_rate.is_nan() {
                0.0
            } else {
                miss_rate.clamp(0.0, 1.0)
            },
            rt_range: (lo.min(hi), hi.max(lo)),
            epoch_ns: 0,
            planned_rt: None,
        }
    }
}

impl<T: Timer, R: Rng> KeyInput for RandomResponder<T, R> {
    fn reset_epoch(&mut self) -> Result<(), DeviceError> {
        self.epoch_ns = self.timer.now_ns();
        let (lo, hi) = self.rt_range;
        self.planned_rt = if self.rng.random_bool(self.miss_rate) {
            None
        } else if lo < hi {
            Some(self.rng.random_range(lo..hi))
        } else {
            Some(lo)
        };
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn poll(&mut self, buttons: &[String]) -> Result<Vec<KeyEvent>, DeviceError> {
        let now = self.timer.elapsed(self.epoch_ns).as_secs_f64();
        match self.planned_rt {
            Some(rt) if rt <= now && !buttons.is_empty() => {
                self.planned_rt = None;
                let name = buttons[self.rng.random_range(0..buttons.len())].clone();
                Ok(vec![KeyEvent {
                    name,
                    down_s: rt,
                    rt,
                }])
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelWrite {
    pub channel: SyncChannel,
    pub value: u16,
    pub at_s: f64,
}

/// Sync line that records every level write. Analog calibration mimics an
/// 8-bit DAC spanning 0 to 5 V.
pub struct RecordingSyncLine<T: Timer> {
    timer: T,
    outputs: HashSet<SyncChannel>,
    writes: Arc<Mutex<Vec<LevelWrite>>>,
}

impl<T: Timer> RecordingSyncLine<T> {
    pub const DAC_FULL_SCALE_V: f64 = 5.0;

    pub fn new(timer: T) -> Self {
        Self {
            timer,
            outputs: HashSet::new(),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn writes(&self) -> Arc<Mutex<Vec<LevelWrite>>> {
        Arc::clone(&self.writes)
    }
}

impl<T: Timer> SyncLine for RecordingSyncLine<T> {
    fn configure_output(&mut self, channel: SyncChannel) -> Result<(), DeviceError> {
        self.outputs.insert(channel);
        Ok(())
    }

    fn calibrate(&self, channel: SyncChannel, volts: f64) -> Result<u16, DeviceError> {
        match channel {
            SyncChannel::Analog(_) => {
                let bits = (volts / Self::DAC_FULL_SCALE_V * 255.0).round();
                Ok(bits.clamp(0.0, 255.0) as u16)
            }
            SyncChannel::Digital(_) => Err(DeviceError::Unsupported {
                device: "simulated sync line",
                what: "voltage calibration on a digital line".to_string(),
            }),
        }
    }

    fn set_level(&mut self, channel: SyncChannel, value: u16) -> Result<(), DeviceError> {
        if let SyncChannel::Digital(line) = channel {
            if !self.outputs.contains(&channel) {
                return Err(DeviceError::Io {
                    device: "simulated sync line",
                    message: format!("digital line {line} is not configured as output"),
                });
            }
        }
        self.writes.lock().push(LevelWrite {
            channel,
            value,
            at_s: self.timer.now_s(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rtp_timing::SimulatedTimer;

    fn buttons(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scripted_press_appears_after_its_rt() {
        let timer = SimulatedTimer::new();
        let mut keys = ScriptedKeys::single(timer.clone(), [Some(("return", 0.8))]);
        let any = buttons(&["return", "up"]);

        timer.advance(Duration::from_secs(3));
        keys.reset_epoch().unwrap();
        keys.clear_buffer().unwrap();

        timer.advance(Duration::from_millis(500));
        assert!(keys.poll(&any).unwrap().is_empty());

        timer.advance(Duration::from_millis(400));
        let events = keys.poll(&any).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "return");
        assert_eq!(events[0].rt, 0.8);

        // drained
        assert!(keys.poll(&any).unwrap().is_empty());
    }

    #[test]
    fn scripted_keys_ignore_unrequested_buttons() {
        let timer = SimulatedTimer::new();
        let mut keys = ScriptedKeys::new(
            timer.clone(),
            [vec![ScriptedPress::new("space", 0.1), ScriptedPress::new("up", 0.2)]],
        );
        keys.reset_epoch().unwrap();
        timer.advance(Duration::from_secs(1));
        let events = keys.poll(&buttons(&["up"])).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "up");
    }

    #[test]
    fn each_reset_consumes_one_script_entry() {
        let timer = SimulatedTimer::new();
        let mut keys = ScriptedKeys::single(timer.clone(), [None, Some(("up", 0.1))]);
        let any = buttons(&["up"]);

        keys.reset_epoch().unwrap();
        timer.advance(Duration::from_secs(10));
        assert!(keys.poll(&any).unwrap().is_empty());

        keys.reset_epoch().unwrap();
        timer.advance(Duration::from_secs(1));
        assert_eq!(keys.poll(&any).unwrap().len(), 1);
    }

    #[test]
    fn random_responder_respects_miss_rate() {
        let timer = SimulatedTimer::new();
        let any = buttons(&["rshift", "lshift"]);

        let mut never = RandomResponder::new(timer.clone(), StdRng::seed_from_u64(1), 1.0, (0.2, 0.9));
        never.reset_epoch().unwrap();
        timer.advance(Duration::from_secs(5));
        assert!(never.poll(&any).unwrap().is_empty());

        let mut always = RandomResponder::new(timer.clone(), StdRng::seed_from_u64(1), 0.0, (0.2, 0.9));
        always.reset_epoch().unwrap();
        timer.advance(Duration::from_secs(1));
        let events = always.poll(&any).unwrap();
        assert_eq!(events.len(), 1);
        assert!((0.2..0.9).contains(&events[0].rt));
        assert!(any.contains(&events[0].name));
    }

    #[test]
    fn random_responder_treats_nan_miss_rate_as_zero() {
        let timer = SimulatedTimer::new();
        let any = buttons(&["return"]);
        let mut keys = RandomResponder::new(timer.clone(), StdRng::seed_from_u64(2), f64::NAN, (0.2, 0.9));
        keys.reset_epoch().unwrap();
        timer.advance(Duration::from_secs(1));
        assert_eq!(keys.poll(&any).unwrap().len(), 1);
    }

    #[test]
    fn silent_tones_fail_on_demand() {
        let mut tones = SilentTones::failing_after(2);
        tones.play(440.0, Duration::from_millis(50), 1.0).unwrap();
        tones.play_cue(Cue::Orient, Duration::from_millis(500), 1.0).unwrap();
        assert!(tones.play(440.0, Duration::from_millis(50), 1.0).is_err());
        let log = tones.log();
        assert_eq!(log.lock().tones, vec![440.0]);
        assert_eq!(log.lock().cues, vec![(Cue::Orient, 1.0)]);
    }

    #[test]
    fn analog_calibration_maps_volts_to_dac_bits() {
        let line = RecordingSyncLine::new(SimulatedTimer::new());
        assert_eq!(line.calibrate(SyncChannel::Analog(0), 0.0).unwrap(), 0);
        assert_eq!(line.calibrate(SyncChannel::Analog(0), 2.5).unwrap(), 128);
        assert_eq!(line.calibrate(SyncChannel::Analog(0), 9.0).unwrap(), 255);
        assert!(line.calibrate(SyncChannel::Digital(2), 1.0).is_err());
    }

    #[test]
    fn digital_writes_require_output_direction() {
        let timer = SimulatedTimer::new();
        let mut line = RecordingSyncLine::new(timer.clone());
        assert!(line.set_level(SyncChannel::Digital(2), 1).is_err());
        line.configure_output(SyncChannel::Digital(2)).unwrap();
        timer.advance(Duration::from_millis(10));
        line.set_level(SyncChannel::Digital(2), 1).unwrap();
        let writes = line.writes();
        let writes = writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].at_s, 0.01);
    }
}
