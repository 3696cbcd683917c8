use crate::cli::{AdhocArgs, Cli, Command, ExportArgs, RunArgs, SessionArgs};
use crate::export;
use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rtp_core::Trial;
use rtp_devices::sim::{RandomResponder, SilentTones};
use rtp_devices::{SyncLine, open_sync_line};
use rtp_experiment::{
    Devices, FileStore, QueueSnapshot, ResponsePoller, SessionKey, SessionQueue, SessionStore,
    SyncEmitter, TaskConfig, TrialEngine, run_adhoc, run_session,
};
use rtp_timing::{HighPrecisionTimer, SimulatedTimer, Timer, calibrate_sleep};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Simulated participant reaction times, seconds.
const RESPONDER_RT_RANGE: (f64, f64) = (0.3, 2.5);
const CALIBRATION_SAMPLES: usize = 20;

pub fn dispatch(cli: Cli) -> Result<()> {
    let store = FileStore::new(&cli.data_dir);
    match cli.command {
        Command::Run(args) => run(args, store),
        Command::Export(args) => export_persisted(&args, &store),
        Command::Adhoc(args) => adhoc(args, store),
    }
}

fn load_config(path: &Path) -> Result<TaskConfig> {
    TaskConfig::load_or_default(path).with_context(|| format!("loading {}", path.display()))
}

/// Subject ID used when none is given: seconds since the Unix epoch.
fn default_subject() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("subj{secs}")
}

fn session_key(args: &SessionArgs, store: &FileStore) -> Result<SessionKey> {
    let subject = args.subject.clone().unwrap_or_else(default_subject);
    let session = match args.session {
        Some(n) => n,
        None => store
            .next_session(&subject)
            .with_context(|| format!("scanning sessions of {subject}"))?,
    };
    Ok(SessionKey::new(subject, session))
}

fn open_sync<T: Timer + 'static>(
    config: &TaskConfig,
    timer: &T,
) -> Result<Option<Box<dyn SyncLine + Send>>> {
    if !config.send_sync {
        info!("sync output disabled");
        return Ok(None);
    }
    let line = open_sync_line(config.sync.backend, timer.clone())
        .context("opening the sync device; check the connection or set send_sync = false")?;
    Ok(Some(line))
}

fn run(args: RunArgs, store: FileStore) -> Result<()> {
    let config = load_config(&args.session.config)?;
    if args.virtual_clock {
        run_with_timer(args, config, store, SimulatedTimer::new())
    } else {
        let timer = HighPrecisionTimer::new().with_busy_wait(config.timing.busy_wait);
        run_with_timer(args, config, store, timer)
    }
}

fn run_with_timer<T: Timer + 'static>(
    args: RunArgs,
    config: TaskConfig,
    mut store: FileStore,
    timer: T,
) -> Result<()> {
    let key = session_key(&args.session, &store)?;
    info!(subject = %key.subject, session = key.session, "session");

    // a resumed session runs on the configuration it was generated with
    let resumed =
        SessionQueue::load(&store, &key, &config).context("opening the session queue")?;
    let config = match &resumed {
        Some((queue, _)) => {
            let persisted = queue.config().clone();
            persisted
                .validate()
                .context("checking the persisted session configuration")?;
            persisted
        }
        None => config,
    };

    let stats = calibrate_sleep(&timer, config.timing.tone_step(), CALIBRATION_SAMPLES);
    info!(
        mean_overshoot_ms = stats.mean_overshoot_ns / 1e6,
        jitter_ms = stats.jitter_ns / 1e6,
        max_overshoot_ms = stats.max_overshoot_ns / 1e6,
        "tone step timing"
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let sync = open_sync(&config, &timer)?;
    warn!("no audio or keyboard driver linked, using silent tones and a simulated participant");
    let devices = Devices {
        tones: SilentTones::new(),
        keys: RandomResponder::new(
            timer.clone(),
            StdRng::seed_from_u64(rng.random()),
            args.miss_rate,
            RESPONDER_RT_RANGE,
        ),
        sync,
    };

    let (mut queue, start) = match resumed {
        Some(resumed) => resumed,
        None => {
            let queue = SessionQueue::create(&mut store, &key, &config, &mut rng)
                .context("creating the session queue")?;
            (queue, 0)
        }
    };
    let mut engine =
        TrialEngine::new(config, devices, timer, rng).context("preparing devices")?;

    let wait_blocks = args.wait_blocks;
    let summary = run_session(&mut engine, &mut queue, start, &mut store, &key, |trial| {
        block_gate(trial, wait_blocks)
    })
    .context("running the session")?;

    info!(
        shown = summary.shown,
        of = summary.total,
        response_rate = summary.response_rate(),
        mean_rt_s = summary.mean_rt_s,
        min_rt_s = summary.min_rt_s,
        max_rt_s = summary.max_rt_s,
        "results"
    );

    export::write_session(&store.session_dir(&key), queue.trials(), queue.config())
}

fn block_gate(trial: &Trial, wait: bool) -> io::Result<()> {
    if !wait {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    write!(out, "Press ENTER to start {} block", trial.block)?;
    out.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn export_persisted(args: &ExportArgs, store: &FileStore) -> Result<()> {
    let key = SessionKey::new(args.subject.clone(), args.session);
    let bytes = store
        .load(&key)?
        .with_context(|| format!("no persisted session at {}", store.snapshot_path(&key).display()))?;
    let snapshot = QueueSnapshot::decode(&bytes).context("reading the persisted session")?;
    if snapshot.next_trial < snapshot.trials.len() {
        warn!(
            shown = snapshot.next_trial,
            total = snapshot.trials.len(),
            "session is incomplete, exporting what was recorded"
        );
    }
    export::write_session(&store.session_dir(&key), &snapshot.trials, &snapshot.config)
}

fn adhoc(args: AdhocArgs, store: FileStore) -> Result<()> {
    let config = load_config(&args.session.config)?;
    if args.virtual_clock {
        adhoc_with_timer(args, config, store, SimulatedTimer::new())
    } else {
        adhoc_with_timer(args, config, store, HighPrecisionTimer::new())
    }
}

fn adhoc_with_timer<T: Timer + 'static>(
    args: AdhocArgs,
    config: TaskConfig,
    store: FileStore,
    timer: T,
) -> Result<()> {
    let key = session_key(&args.session, &store)?;
    let keys = RandomResponder::new(
        timer.clone(),
        StdRng::from_os_rng(),
        0.0,
        RESPONDER_RT_RANGE,
    );
    let mut poller = ResponsePoller::new(keys, timer.clone());
    let mut sync = match open_sync(&config, &timer)? {
        Some(line) => Some(SyncEmitter::new(line, &config.sync, timer.clone())?),
        None => None,
    };

    let records = run_adhoc(
        &mut poller,
        sync.as_mut(),
        &config.buttons,
        &timer,
        args.trials,
        Duration::from_millis(1),
    )?;

    let dir = store.session_dir(&key);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    export::write_adhoc(&dir.join(export::ADHOC_CSV), &records)
}
