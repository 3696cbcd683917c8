use serde::{Deserialize, Serialize};
use std::fmt;

/// Ground-truth pitch trend of a trial, and the choice a response maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Increase => 1.0,
            Direction::Decrease => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trial state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Pending,
    Orient,
    Arm,
    Stream,
    Responded,
    TimedOut,
    Feedback,
    Sync,
    Done,
}

/// How a resolved trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
    TimedOut,
}

/// One attempt at the task: design fields fixed at queue build time, plus
/// everything observed while the trial ran.
///
/// Timestamps are seconds on the session clock. `button_press_s` and `rt`
/// are relative to the response epoch, whose session-clock time is kept in
/// `rt_epoch_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub block: String,
    #[serde(rename = "trialInBlock")]
    pub trial_in_block: usize,
    pub coherence: f64,
    pub direction: Direction,
    #[serde(rename = "orientOn_s")]
    pub orient_on_s: Option<f64>,
    #[serde(rename = "orientOff_s")]
    pub orient_off_s: Option<f64>,
    #[serde(rename = "stimOn_s")]
    pub stim_on_s: Option<f64>,
    #[serde(rename = "stimOff_s")]
    pub stim_off_s: Option<f64>,
    #[serde(rename = "buttonPress")]
    pub button_press: Option<String>,
    pub choice: Option<Direction>,
    pub correct: bool,
    pub error: bool,
    #[serde(rename = "buttonPress_s")]
    pub button_press_s: Option<f64>,
    #[serde(rename = "RT")]
    pub rt: Option<f64>,
    #[serde(rename = "rtEpoch_s")]
    pub rt_epoch_s: Option<f64>,
    #[serde(rename = "fbOn_s")]
    pub fb_on_s: Option<f64>,
    #[serde(rename = "fbOff_s")]
    pub fb_off_s: Option<f64>,
    #[serde(rename = "wasShown")]
    pub was_shown: bool,
    #[serde(rename = "TTL1sent_s")]
    pub ttl1_sent_s: Option<f64>,
    #[serde(rename = "TTL2sent_s")]
    pub ttl2_sent_s: Option<f64>,
    #[serde(rename = "TTL3sent_s")]
    pub ttl3_sent_s: Option<f64>,
}

impl Trial {
    pub fn new(
        block: impl Into<String>,
        trial_in_block: usize,
        coherence: f64,
        direction: Direction,
    ) -> Self {
        Self {
            block: block.into(),
            trial_in_block,
            coherence,
            direction,
            orient_on_s: None,
            orient_off_s: None,
            stim_on_s: None,
            stim_off_s: None,
            button_press: None,
            choice: None,
            correct: false,
            error: false,
            button_press_s: None,
            rt: None,
            rt_epoch_s: None,
            fb_on_s: None,
            fb_off_s: None,
            was_shown: false,
            ttl1_sent_s: None,
            ttl2_sent_s: None,
            ttl3_sent_s: None,
        }
    }

    /// Scores a trial that ended without a qualifying button event.
    /// Response fields stay unset.
    pub fn record_timeout(&mut self) {
        self.correct = false;
        self.error = true;
    }

    /// Scores the first qualifying button event against the trial direction.
    pub fn record_response(&mut self, button: &str, choice: Direction, down_s: f64, rt: f64) {
        let correct = choice == self.direction;
        self.button_press = Some(button.to_string());
        self.choice = Some(choice);
        self.button_press_s = Some(down_s);
        self.rt = Some(rt);
        self.correct = correct;
        self.error = !correct;
    }

    /// Stores the emission time of the `index`-th sync pulse. Only the first
    /// three pulses have columns; later ones are dropped.
    pub fn set_ttl_sent(&mut self, index: usize, t_s: f64) -> bool {
        let slot = match index {
            0 => &mut self.ttl1_sent_s,
            1 => &mut self.ttl2_sent_s,
            2 => &mut self.ttl3_sent_s,
            _ => return false,
        };
        *slot = Some(t_s);
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.correct || self.error
    }

    pub fn outcome(&self) -> Option<Outcome> {
        if !self.is_resolved() {
            None
        } else if self.choice.is_none() {
            Some(Outcome::TimedOut)
        } else if self.correct {
            Some(Outcome::Correct)
        } else {
            Some(Outcome::Incorrect)
        }
    }
}
