use crate::engine::TrialEngine;
use crate::error::SessionError;
use crate::queue::SessionQueue;
use crate::store::{SessionKey, SessionStore};
use rand::Rng;
use rtp_core::{Outcome, Trial};
use rtp_devices::{KeyInput, SyncLine, ToneOutput};
use rtp_timing::Timer;
use std::io;
use tracing::{error, info};

/// Totals over the shown trials of a queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub total: usize,
    pub shown: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub timeouts: usize,
    pub mean_rt_s: Option<f64>,
    pub min_rt_s: Option<f64>,
    pub max_rt_s: Option<f64>,
}

impl SessionSummary {
    pub fn from_trials(trials: &[Trial]) -> Self {
        let mut summary = Self {
            total: trials.len(),
            ..Self::default()
        };
        let mut rts = Vec::new();
        for trial in trials.iter().filter(|t| t.was_shown) {
            summary.shown += 1;
            match trial.outcome() {
                Some(Outcome::Correct) => summary.correct += 1,
                Some(Outcome::Incorrect) => summary.incorrect += 1,
                Some(Outcome::TimedOut) => summary.timeouts += 1,
                None => {}
            }
            rts.extend(trial.rt);
        }
        if !rts.is_empty() {
            summary.mean_rt_s = Some(rts.iter().sum::<f64>() / rts.len() as f64);
            summary.min_rt_s = rts.iter().copied().reduce(f64::min);
            summary.max_rt_s = rts.iter().copied().reduce(f64::max);
        }
        summary
    }

    /// Fraction of shown trials with any response.
    pub fn response_rate(&self) -> f64 {
        if self.shown == 0 {
            0.0
        } else {
            (self.correct + self.incorrect) as f64 / self.shown as f64
        }
    }
}

/// Runs trials `start..` of `queue`, persisting the whole queue after each
/// one. `on_block_start` is called on the first trial of each block in a
/// blocked design, after its orientation cue, e.g. to wait for the
/// participant.
///
/// A failing trial stops the session without being persisted, so the next
/// resume repeats it.
pub fn run_session<A, K, S, T, R, St, G>(
    engine: &mut TrialEngine<A, K, S, T, R>,
    queue: &mut SessionQueue,
    start: usize,
    store: &mut St,
    key: &SessionKey,
    mut on_block_start: G,
) -> Result<SessionSummary, SessionError>
where
    A: ToneOutput,
    K: KeyInput,
    S: SyncLine,
    T: Timer,
    R: Rng,
    St: SessionStore,
    G: FnMut(&Trial) -> io::Result<()>,
{
    let blocked = !engine.config().shuffle_across_blocks;

    for index in start..queue.len() {
        let Some(mut trial) = queue.get(index).cloned() else {
            break;
        };
        let opens_block = queue.opens_block(index);
        let gated = opens_block && blocked;
        if gated {
            info!(block = %trial.block, "block start");
        }

        info!(
            trial = index + 1,
            of = queue.len(),
            block = %trial.block,
            coherence = trial.coherence,
            direction = %trial.direction,
            "running trial"
        );
        let ran = match engine.orient(&mut trial, opens_block) {
            Ok(()) => {
                if gated {
                    on_block_start(&trial)?;
                }
                engine.present(&mut trial)
            }
            Err(e) => Err(e),
        };
        if let Err(source) = ran {
            error!(trial = index + 1, error = %source, "trial failed, stopping session");
            return Err(SessionError::Trial { index, source });
        }

        queue.complete(index, trial);
        queue.persist(store, key)?;
    }

    let summary = SessionSummary::from_trials(queue.trials());
    info!(
        shown = summary.shown,
        correct = summary.correct,
        incorrect = summary.incorrect,
        timeouts = summary.timeouts,
        mean_rt_s = summary.mean_rt_s,
        "session finished"
    );
    Ok(summary)
}
