use crate::config::TaskConfig;
use crate::error::{ResumeError, SessionError};
use crate::store::{SessionKey, SessionStore};
use rand::Rng;
use rand::seq::SliceRandom;
use rtp_core::Trial;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything persisted after a trial: the full trial list, the resume
/// point and the configuration the list was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub version: u32,
    pub next_trial: usize,
    pub config: TaskConfig,
    pub trials: Vec<Trial>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl QueueSnapshot {
    /// Parses a stored snapshot, checking the format version before the
    /// body so an old file reports a version error rather than a parse
    /// error.
    pub fn decode(bytes: &[u8]) -> Result<Self, ResumeError> {
        let header: VersionHeader = serde_json::from_slice(bytes)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(ResumeError::Version {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// The session's ordered trial list. Sole writer of the list: the engine
/// works on a copy of one trial and hands it back through [`complete`].
///
/// [`complete`]: SessionQueue::complete
#[derive(Debug, Clone, PartialEq)]
pub struct SessionQueue {
    config: TaskConfig,
    trials: Vec<Trial>,
}

impl SessionQueue {
    /// Full factorial of coherence × direction × repeats per block, each
    /// block shuffled on its own, blocks in random order, then optionally
    /// one shuffle across everything.
    pub fn build<R: Rng>(config: &TaskConfig, rng: &mut R) -> Self {
        let mut blocks: Vec<_> = config.blocks.iter().collect();
        blocks.shuffle(rng);

        let mut trials = Vec::with_capacity(
            blocks.len() * config.coherences.len() * config.directions.len() * config.repeats,
        );
        for block in blocks {
            let mut block_trials = Vec::new();
            for &coherence in &config.coherences {
                for &direction in &config.directions {
                    for _ in 0..config.repeats {
                        let n = block_trials.len() + 1;
                        block_trials.push(Trial::new(&block.name, n, coherence, direction));
                    }
                }
            }
            block_trials.shuffle(rng);
            trials.extend(block_trials);
        }

        if config.shuffle_across_blocks {
            trials.shuffle(rng);
        }

        Self {
            config: config.clone(),
            trials,
        }
    }

    /// Restores a persisted queue and returns it with the index of the
    /// first trial to run. Shown trials must form a prefix of the list.
    pub fn resume(snapshot: QueueSnapshot) -> Result<(Self, usize), ResumeError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ResumeError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let start = shown_prefix(&snapshot.trials)?;
        let len = snapshot.trials.len();
        if snapshot.next_trial > len {
            return Err(ResumeError::WatermarkPastEnd {
                next: snapshot.next_trial,
                len,
            });
        }
        if snapshot.next_trial != start {
            return Err(ResumeError::WatermarkMismatch {
                recorded: snapshot.next_trial,
                computed: start,
            });
        }

        Ok((
            Self {
                config: snapshot.config,
                trials: snapshot.trials,
            },
            start,
        ))
    }

    /// Loads the persisted queue for `key`, or builds and persists a fresh
    /// one. An existing queue is never regenerated.
    pub fn open<S: SessionStore, R: Rng>(
        store: &mut S,
        key: &SessionKey,
        config: &TaskConfig,
        rng: &mut R,
    ) -> Result<(Self, usize), SessionError> {
        match Self::load(&*store, key, config)? {
            Some(resumed) => Ok(resumed),
            None => Ok((Self::create(store, key, config, rng)?, 0)),
        }
    }

    /// Resumes the persisted queue for `key`, if there is one. The persisted
    /// configuration wins over `config`.
    pub fn load<S: SessionStore>(
        store: &S,
        key: &SessionKey,
        config: &TaskConfig,
    ) -> Result<Option<(Self, usize)>, SessionError> {
        let Some(bytes) = store.load(key)? else {
            return Ok(None);
        };
        let (queue, start) = match QueueSnapshot::decode(&bytes).and_then(Self::resume) {
            Ok(ok) => ok,
            Err(e) => {
                error!(subject = %key.subject, session = key.session, error = %e, "persisted session is inconsistent");
                return Err(e.into());
            }
        };
        if queue.config != *config {
            warn!(
                subject = %key.subject,
                session = key.session,
                "configuration differs from the persisted session, keeping the persisted trial list"
            );
        }
        info!(
            subject = %key.subject,
            session = key.session,
            start,
            total = queue.len(),
            "resuming session"
        );
        Ok(Some((queue, start)))
    }

    /// Builds a fresh queue and persists it before any trial runs.
    pub fn create<S: SessionStore, R: Rng>(
        store: &mut S,
        key: &SessionKey,
        config: &TaskConfig,
        rng: &mut R,
    ) -> Result<Self, SessionError> {
        let queue = Self::build(config, rng);
        info!(
            subject = %key.subject,
            session = key.session,
            total = queue.len(),
            "starting new session"
        );
        queue.persist(store, key)?;
        Ok(queue)
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn get(&self, index: usize) -> Option<&Trial> {
        self.trials.get(index)
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Index of the first trial not yet shown; `len()` when finished.
    pub fn next_unshown(&self) -> usize {
        self.trials
            .iter()
            .position(|t| !t.was_shown)
            .unwrap_or(self.trials.len())
    }

    /// Whether trial `index` is the first of a run of its block.
    pub fn opens_block(&self, index: usize) -> bool {
        match index {
            0 => !self.trials.is_empty(),
            i => match (self.trials.get(i - 1), self.trials.get(i)) {
                (Some(prev), Some(cur)) => prev.block != cur.block,
                _ => false,
            },
        }
    }

    /// Stores the executed copy of trial `index`.
    pub fn complete(&mut self, index: usize, trial: Trial) {
        if let Some(slot) = self.trials.get_mut(index) {
            *slot = trial;
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            version: SNAPSHOT_VERSION,
            next_trial: self.next_unshown(),
            config: self.config.clone(),
            trials: self.trials.clone(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SessionError> {
        serde_json::to_vec_pretty(&self.snapshot()).map_err(SessionError::Encode)
    }

    /// Writes the whole queue. Called after every trial, never batched.
    pub fn persist<S: SessionStore>(&self, store: &mut S, key: &SessionKey) -> Result<(), SessionError> {
        let bytes = self.encode()?;
        store.save(key, &bytes)?;
        Ok(())
    }
}

fn shown_prefix(trials: &[Trial]) -> Result<usize, ResumeError> {
    let prefix = trials.iter().take_while(|t| t.was_shown).count();
    match trials[prefix..].iter().position(|t| t.was_shown) {
        Some(offset) => Err(ResumeError::NonContiguous {
            index: prefix + offset,
        }),
        None => Ok(prefix),
    }
}
