//! Tone-index space of the sound cloud and its per-step evolution.
//!
//! A cloud is a short array of tone indices. Each time step the leading
//! `round(coherence * len)` indices move together in the trial direction and
//! every other index is redrawn from the legal range. Indices that leave the
//! range are redrawn too, never clamped, so the cloud does not pile up at the
//! edges.

use crate::trial::Direction;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on simultaneously voiced tones.
pub const MAX_TONES: usize = 10;

/// Equal-tempered frequency `x` half steps away from `base_note`.
pub fn index_to_frequency(x: f64, base_note: f64) -> f64 {
    base_note * 2f64.powf(x / 12.0)
}

/// Linear mapping used by the bounded index variant, `x` in `[-1, 1]`.
pub fn linear_index_to_frequency(x: f64, base_note: f64, hz_per_unit: f64) -> f64 {
    base_note + hz_per_unit * x
}

/// Number of leading tones that move coherently. Ties round to even.
pub fn coherent_count(coherence: f64, len: usize) -> usize {
    let raw = (coherence.clamp(0.0, 1.0) * len as f64).round_ties_even();
    (raw as usize).min(len)
}

#[derive(Debug, Error, PartialEq)]
pub enum PitchError {
    #[error("a sound cloud needs between 1 and {MAX_TONES} tones, got {0}")]
    ToneCount(usize),
    #[error("tone range [{low}, {high}] is empty")]
    EmptyToneRange { low: f64, high: f64 },
    #[error("change range [{low}, {high}) is empty")]
    EmptyChangeRange { low: f64, high: f64 },
    #[error("hz_per_unit must be positive, got {0}")]
    NonPositiveSlope(f64),
    #[error("base note must be positive, got {0}")]
    NonPositiveBase(f64),
}

/// Legal tone-index space and its index-to-frequency mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PitchSpace {
    /// Integer half steps in `[low, high]`, equal-tempered.
    HalfSteps { low: i32, high: i32 },
    /// Real indices in `[-1, 1]`, linear in frequency.
    Bounded { hz_per_unit: f64 },
}

impl PitchSpace {
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            PitchSpace::HalfSteps { low, high } => (low as f64, high as f64),
            PitchSpace::Bounded { .. } => (-1.0, 1.0),
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        let (low, high) = self.bounds();
        x >= low && x <= high
    }

    /// Uniform draw over the whole legal range.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match *self {
            PitchSpace::HalfSteps { low, high } => rng.random_range(low..=high) as f64,
            PitchSpace::Bounded { .. } => rng.random_range(-1.0..=1.0),
        }
    }

    /// Magnitude of one step, drawn from the half-open `[low, high)`.
    fn draw_change<R: Rng>(&self, rng: &mut R, (low, high): (f64, f64)) -> f64 {
        match self {
            PitchSpace::HalfSteps { .. } => {
                rng.random_range(low.ceil() as i64..high.ceil() as i64) as f64
            }
            PitchSpace::Bounded { .. } => rng.random_range(low..high),
        }
    }

    fn validate_change(&self, (low, high): (f64, f64)) -> Result<(), PitchError> {
        let empty = match self {
            PitchSpace::HalfSteps { .. } => low.ceil() >= high.ceil(),
            PitchSpace::Bounded { .. } => !(low < high),
        };
        if empty || low < 0.0 {
            return Err(PitchError::EmptyChangeRange { low, high });
        }
        Ok(())
    }
}

/// How coherent tones draw their step magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangePolicy {
    /// One magnitude per step, shared by every coherent tone.
    #[default]
    Together,
    /// An independent magnitude per coherent tone.
    Independent,
}

/// Pitch space plus reference note: enough to turn indices into Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub space: PitchSpace,
    pub base_note: f64,
}

impl Tuning {
    pub fn frequency(&self, x: f64) -> f64 {
        match self.space {
            PitchSpace::HalfSteps { .. } => index_to_frequency(x, self.base_note),
            PitchSpace::Bounded { hz_per_unit } => {
                linear_index_to_frequency(x, self.base_note, hz_per_unit)
            }
        }
    }

    pub fn frequencies(&self, cloud: &PitchArray) -> Vec<f64> {
        cloud.iter().map(|&x| self.frequency(x)).collect()
    }
}

/// Tone indices of the current sound cloud. Never empty, never longer
/// than [`MAX_TONES`].
#[derive(Debug, Clone, PartialEq)]
pub struct PitchArray {
    tones: Vec<f64>,
}

impl PitchArray {
    pub fn from_indices(tones: Vec<f64>) -> Result<Self, PitchError> {
        if tones.is_empty() || tones.len() > MAX_TONES {
            return Err(PitchError::ToneCount(tones.len()));
        }
        Ok(Self { tones })
    }

    pub fn len(&self) -> usize {
        self.tones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.tones
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.tones.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitchModel {
    tuning: Tuning,
    num_tones: usize,
    change_range: (f64, f64),
    policy: ChangePolicy,
}

impl PitchModel {
    pub fn new(
        space: PitchSpace,
        base_note: f64,
        num_tones: usize,
        change_range: (f64, f64),
        policy: ChangePolicy,
    ) -> Result<Self, PitchError> {
        if num_tones == 0 || num_tones > MAX_TONES {
            return Err(PitchError::ToneCount(num_tones));
        }
        if !(base_note > 0.0) {
            return Err(PitchError::NonPositiveBase(base_note));
        }
        match space {
            PitchSpace::HalfSteps { low, high } if low > high => {
                return Err(PitchError::EmptyToneRange {
                    low: low as f64,
                    high: high as f64,
                });
            }
            PitchSpace::Bounded { hz_per_unit } if !(hz_per_unit > 0.0) => {
                return Err(PitchError::NonPositiveSlope(hz_per_unit));
            }
            _ => {}
        }
        space.validate_change(change_range)?;
        Ok(Self {
            tuning: Tuning { space, base_note },
            num_tones,
            change_range,
            policy,
        })
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    pub fn space(&self) -> PitchSpace {
        self.tuning.space
    }

    pub fn num_tones(&self) -> usize {
        self.num_tones
    }

    /// Fresh random cloud of `num_tones` independent uniform draws.
    pub fn initial_cloud<R: Rng>(&self, rng: &mut R) -> PitchArray {
        let space = self.tuning.space;
        PitchArray {
            tones: (0..self.num_tones).map(|_| space.sample(rng)).collect(),
        }
    }

    /// Advances `cloud` by one time step and returns how many leading tones
    /// moved coherently.
    pub fn step<R: Rng>(
        &self,
        cloud: &mut PitchArray,
        direction: Direction,
        coherence: f64,
        rng: &mut R,
    ) -> usize {
        let space = self.tuning.space;
        let num_coherent = coherent_count(coherence, cloud.len());
        let sign = direction.sign();

        let shared = match self.policy {
            ChangePolicy::Together => Some(space.draw_change(rng, self.change_range)),
            ChangePolicy::Independent => None,
        };

        for (i, x) in cloud.tones.iter_mut().enumerate() {
            if i < num_coherent {
                let delta = match shared {
                    Some(d) => d,
                    None => space.draw_change(rng, self.change_range),
                };
                *x += sign * delta;
            } else {
                *x = space.sample(rng);
            }
        }

        for x in cloud.tones.iter_mut() {
            if !space.contains(*x) {
                *x = space.sample(rng);
            }
        }

        num_coherent
    }
}
