use crate::config::TaskConfig;
use crate::error::{SessionError, TrialError};
use crate::response::ResponsePoller;
use crate::stimulus::StimulusClock;
use crate::sync::SyncEmitter;
use rand::Rng;
use rtp_core::{Cue, Direction, Outcome, PitchModel, Trial, TrialState};
use rtp_devices::{DeviceError, KeyInput, SyncLine, ToneOutput};
use rtp_timing::Timer;
use tracing::{debug, info, warn};

/// Device handles for one session.
pub struct Devices<A, K, S> {
    pub tones: A,
    pub keys: K,
    /// Required when the configuration enables sync, ignored otherwise.
    pub sync: Option<S>,
}

/// Runs single trials from orientation cue to sync pulses. Owns every
/// device for the session; the trial list itself stays with the queue.
pub struct TrialEngine<A, K, S, T, R>
where
    A: ToneOutput,
    K: KeyInput,
    S: SyncLine,
    T: Timer,
    R: Rng,
{
    config: TaskConfig,
    model: PitchModel,
    buttons: Vec<String>,
    stimulus: StimulusClock<A, T>,
    poller: ResponsePoller<K, T>,
    sync: Option<SyncEmitter<S, T>>,
    rng: R,
    state: TrialState,
}

impl<A, K, S, T, R> TrialEngine<A, K, S, T, R>
where
    A: ToneOutput,
    K: KeyInput,
    S: SyncLine,
    T: Timer,
    R: Rng,
{
    /// Validates the configuration and prepares the devices. A missing or
    /// unusable sync device is fatal when sync is enabled.
    pub fn new(
        config: TaskConfig,
        devices: Devices<A, K, S>,
        timer: T,
        rng: R,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let model = config.stimulus.pitch_model().map_err(crate::ConfigError::from)?;

        let sync = match (config.send_sync, devices.sync) {
            (true, Some(line)) => Some(SyncEmitter::new(line, &config.sync, timer.clone())?),
            (true, None) => {
                return Err(DeviceError::Unavailable {
                    device: "sync line",
                    reason: "sync is enabled but no device was opened".to_string(),
                }
                .into());
            }
            (false, Some(_)) => {
                debug!("sync disabled, ignoring opened sync device");
                None
            }
            (false, None) => None,
        };

        Ok(Self {
            buttons: config.buttons.all(),
            stimulus: StimulusClock::new(
                devices.tones,
                timer.clone(),
                model.tuning(),
                config.stimulus.tone_volume,
            ),
            poller: ResponsePoller::new(devices.keys, timer),
            sync,
            model,
            config,
            rng,
            state: TrialState::Pending,
        })
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn timer(&self) -> &T {
        self.stimulus.timer()
    }

    fn enter(&mut self, state: TrialState) {
        debug!(from = ?self.state, to = ?state, "trial state");
        self.state = state;
    }

    fn limit_s(&self, trial: &Trial) -> Result<f64, TrialError> {
        self.config
            .response_time_limit_s(&trial.block)
            .ok_or_else(|| TrialError::UnknownBlock(trial.block.clone()))
    }

    fn orients(&self, opens_block: bool) -> bool {
        self.config.play_orient_each_trial
            || (opens_block && self.config.cue_block_start && !self.config.shuffle_across_blocks)
    }

    /// Runs `trial` to completion and fills in its observed fields. On error
    /// the trial is left unshown.
    pub fn run(&mut self, trial: &mut Trial, opens_block: bool) -> Result<Outcome, TrialError> {
        self.orient(trial, opens_block)?;
        self.present(trial)
    }

    /// Plays the orientation cue if this trial gets one.
    pub fn orient(&mut self, trial: &mut Trial, opens_block: bool) -> Result<(), TrialError> {
        self.state = TrialState::Pending;
        self.limit_s(trial)?;
        if self.orients(opens_block) {
            self.enter(TrialState::Orient);
            let cue = self
                .stimulus
                .play_cue(
                    Cue::Orient,
                    self.config.timing.orient(),
                    self.config.cues.orient_volume,
                )
                .map_err(failed_in(self.state))?;
            trial.orient_on_s = Some(cue.onset_s);
            trial.orient_off_s = Some(cue.offset_s);
        }
        Ok(())
    }

    /// Everything after the orientation cue: stimulus stream, response,
    /// feedback and sync pulses.
    pub fn present(&mut self, trial: &mut Trial) -> Result<Outcome, TrialError> {
        let limit_s = self.limit_s(trial)?;
        let timing = self.config.timing.clone();

        self.enter(TrialState::Arm);
        self.poller.reset().map_err(failed_in(self.state))?;
        trial.rt_epoch_s = Some(self.poller.epoch_s());
        let mut cloud = self.model.initial_cloud(&mut self.rng);
        let first = self
            .stimulus
            .play_chord(&cloud, timing.tone_step())
            .map_err(failed_in(self.state))?;
        trial.stim_on_s = Some(first.onset_s);
        let mut offset_s = first.offset_s;

        // Keys are only checked between chords.
        self.enter(TrialState::Stream);
        let mut events = Vec::new();
        while events.is_empty() && self.poller.elapsed_s() <= limit_s {
            self.model
                .step(&mut cloud, trial.direction, trial.coherence, &mut self.rng);
            offset_s = self
                .stimulus
                .play_chord(&cloud, timing.tone_step())
                .map_err(failed_in(self.state))?
                .offset_s;
            events = self.poller.poll(&self.buttons).map_err(failed_in(self.state))?;
        }
        trial.stim_off_s = Some(offset_s);

        let response = events
            .iter()
            .find_map(|e| self.config.buttons.classify(&e.name).map(|d| (e, d)));
        let outcome = match response {
            Some((event, choice)) => {
                self.enter(TrialState::Responded);
                trial.record_response(&event.name, choice, event.down_s, event.rt);
                if choice == trial.direction {
                    Outcome::Correct
                } else {
                    Outcome::Incorrect
                }
            }
            None => {
                self.enter(TrialState::TimedOut);
                trial.record_timeout();
                Outcome::TimedOut
            }
        };
        log_outcome(trial, outcome);

        self.enter(TrialState::Feedback);
        let cue = Cue::feedback(outcome);
        let volume = match cue {
            Cue::Correct => self.config.cues.correct_volume,
            _ => self.config.cues.wrong_volume,
        };
        let fb = self
            .stimulus
            .play_cue(cue, timing.feedback(), volume)
            .map_err(failed_in(self.state))?;
        trial.fb_on_s = Some(fb.onset_s);
        trial.fb_off_s = Some(fb.offset_s);

        if self.sync.is_some() {
            self.enter(TrialState::Sync);
            let count = self.config.sync.pulse_count;
            if let Some(sync) = self.sync.as_mut() {
                let stamps = sync
                    .pulse_train(count)
                    .map_err(failed_in(TrialState::Sync))?;
                for (i, t) in stamps.into_iter().enumerate() {
                    if !trial.set_ttl_sent(i, t) {
                        warn!(pulse = i + 1, "no column for sync pulse, timestamp dropped");
                    }
                }
                sync.settle();
            }
        }

        self.enter(TrialState::Done);
        trial.was_shown = true;
        Ok(outcome)
    }
}

fn failed_in(state: TrialState) -> impl FnOnce(DeviceError) -> TrialError {
    move |source| TrialError::Device { state, source }
}

fn log_outcome(trial: &Trial, outcome: Outcome) {
    let trend = match trial.direction {
        Direction::Increase => "increasing",
        Direction::Decrease => "decreasing",
    };
    match outcome {
        Outcome::TimedOut => info!(
            block = %trial.block,
            coherence = trial.coherence,
            "no response, pitch was {trend}"
        ),
        Outcome::Correct | Outcome::Incorrect => info!(
            block = %trial.block,
            coherence = trial.coherence,
            rt = trial.rt,
            button = trial.button_press.as_deref(),
            "{}! pitch is {trend}",
            if outcome == Outcome::Correct { "correct" } else { "incorrect" }
        ),
    }
}
