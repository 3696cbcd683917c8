pub mod pitch;
pub mod stimulus;
pub mod trial;

pub use pitch::{
    ChangePolicy, MAX_TONES, PitchArray, PitchError, PitchModel, PitchSpace, Tuning,
    coherent_count, index_to_frequency, linear_index_to_frequency,
};
pub use stimulus::Cue;
pub use trial::{Direction, Outcome, Trial, TrialState};
