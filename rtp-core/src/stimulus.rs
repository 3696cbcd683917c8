use crate::trial::Outcome;
use serde::{Deserialize, Serialize};

/// Pre-recorded sounds played around the sound cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    Orient,
    Correct,
    Wrong,
}

impl Cue {
    /// Feedback cue for a resolved trial. Timeouts get the wrong cue.
    pub fn feedback(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Correct => Cue::Correct,
            Outcome::Incorrect | Outcome::TimedOut => Cue::Wrong,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Cue::Orient => "orient.wav",
            Cue::Correct => "correct.wav",
            Cue::Wrong => "wrong.wav",
        }
    }
}
