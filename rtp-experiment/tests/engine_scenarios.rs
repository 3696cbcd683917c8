use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rtp_core::{Cue, Direction, Outcome, Trial, TrialState};
use rtp_devices::DeviceError;
use rtp_devices::sim::{LevelWrite, RecordingSyncLine, ScriptedKeys, SilentTones, ToneLog};
use rtp_experiment::{BlockConfig, Devices, SessionError, TaskConfig, TrialEngine, TrialError};
use rtp_timing::{SimulatedTimer, Timer};

type Engine = TrialEngine<
    SilentTones,
    ScriptedKeys<SimulatedTimer>,
    RecordingSyncLine<SimulatedTimer>,
    SimulatedTimer,
    StdRng,
>;

struct Rig {
    engine: Engine,
    timer: SimulatedTimer,
    tones: Arc<Mutex<ToneLog>>,
    writes: Arc<Mutex<Vec<LevelWrite>>>,
}

fn config(limit_s: f64) -> TaskConfig {
    TaskConfig {
        send_sync: false,
        cue_block_start: false,
        blocks: vec![BlockConfig {
            name: "test".to_string(),
            response_time_limit_s: limit_s,
        }],
        ..TaskConfig::default()
    }
}

fn rig(config: TaskConfig, tones: SilentTones, presses: Vec<Option<(&'static str, f64)>>) -> Rig {
    let timer = SimulatedTimer::new();
    let line = RecordingSyncLine::new(timer.clone());
    let writes = line.writes();
    let log = tones.log();
    let devices = Devices {
        tones,
        keys: ScriptedKeys::single(timer.clone(), presses),
        sync: Some(line),
    };
    let engine = TrialEngine::new(config, devices, timer.clone(), StdRng::seed_from_u64(11))
        .expect("engine");
    Rig {
        engine,
        timer,
        tones: log,
        writes,
    }
}

#[test]
fn full_coherence_increase_pressed_at_800ms_is_correct() {
    let mut rig = rig(config(10.0), SilentTones::new(), vec![Some(("return", 0.8))]);
    let mut trial = Trial::new("test", 1, 1.0, Direction::Increase);

    let outcome = rig.engine.run(&mut trial, true).unwrap();

    assert_eq!(outcome, Outcome::Correct);
    assert!(trial.correct && !trial.error);
    assert_eq!(trial.choice, Some(Direction::Increase));
    assert_eq!(trial.button_press.as_deref(), Some("return"));
    assert_eq!(trial.rt, Some(0.8));
    assert_eq!(trial.button_press_s, Some(0.8));
    assert!(trial.was_shown);
    assert_eq!(rig.engine.state(), TrialState::Done);

    // 16 chords of 10 tones, detected at the chord boundary at 0.8 s
    let log = rig.tones.lock();
    assert_eq!(log.tones.len(), 160);
    assert_eq!(log.cues, vec![(Cue::Correct, 1.0)]);
    assert_eq!(trial.stim_on_s, Some(0.0));
    assert!((trial.stim_off_s.unwrap() - 0.8).abs() < 1e-9);
    assert!((trial.fb_off_s.unwrap() - 2.3).abs() < 1e-9);
    assert!(trial.orient_on_s.is_none());
    assert!(trial.ttl1_sent_s.is_none());
}

#[test]
fn no_response_times_out_after_the_block_limit() {
    let mut rig = rig(config(5.0), SilentTones::new(), vec![None]);
    let mut trial = Trial::new("test", 1, 0.4, Direction::Decrease);

    let outcome = rig.engine.run(&mut trial, false).unwrap();

    assert_eq!(outcome, Outcome::TimedOut);
    assert!(!trial.correct && trial.error);
    assert!(trial.rt.is_none() && trial.choice.is_none() && trial.button_press.is_none());
    assert!(trial.button_press_s.is_none());
    assert!(trial.was_shown);

    let epoch = trial.rt_epoch_s.unwrap();
    assert!(trial.stim_off_s.unwrap() - epoch >= 5.0);
    assert!(trial.fb_on_s.unwrap() - epoch >= 5.0);
    assert_eq!(rig.tones.lock().cues, vec![(Cue::Wrong, 0.5)]);
}

#[test]
fn opposite_button_is_an_error() {
    let mut rig = rig(config(10.0), SilentTones::new(), vec![Some(("rshift", 0.3))]);
    let mut trial = Trial::new("test", 1, 0.8, Direction::Decrease);

    let outcome = rig.engine.run(&mut trial, false).unwrap();

    assert_eq!(outcome, Outcome::Incorrect);
    assert!(!trial.correct && trial.error);
    assert_eq!(trial.choice, Some(Direction::Increase));
    assert_eq!(trial.rt, Some(0.3));
}

#[test]
fn unmapped_keys_do_not_end_the_stream() {
    let mut rig = rig(config(1.0), SilentTones::new(), vec![Some(("space", 0.2))]);
    let mut trial = Trial::new("test", 1, 0.8, Direction::Increase);
    assert_eq!(rig.engine.run(&mut trial, false).unwrap(), Outcome::TimedOut);
}

#[test]
fn orientation_and_sync_pulses_are_stamped() {
    let mut cfg = config(10.0);
    cfg.send_sync = true;
    cfg.cue_block_start = true;
    let mut rig = rig(
        cfg,
        SilentTones::new(),
        vec![Some(("up", 0.2)), Some(("up", 0.2))],
    );

    let mut first = Trial::new("test", 1, 0.8, Direction::Decrease);
    rig.engine.run(&mut first, true).unwrap();
    assert_eq!(first.orient_on_s, Some(0.0));
    assert_eq!(first.orient_off_s, Some(0.5));
    assert_eq!(first.stim_on_s, Some(0.5));
    assert_eq!(first.rt_epoch_s, Some(0.5));

    let fb_off = first.fb_off_s.unwrap();
    let ttls = [first.ttl1_sent_s, first.ttl2_sent_s, first.ttl3_sent_s];
    assert!(ttls.iter().all(|t| t.is_some_and(|t| t >= fb_off - 1e-9)));
    assert_eq!(rig.writes.lock().len(), 6);
    // settle
    assert!(rig.timer.now_s() - ttls[2].unwrap() >= 0.5 - 1e-9);

    let mut second = Trial::new("test", 2, 0.8, Direction::Decrease);
    rig.engine.run(&mut second, false).unwrap();
    assert!(second.orient_on_s.is_none());
    assert_eq!(rig.writes.lock().len(), 12);
    assert_eq!(rig.tones.lock().cues[0].0, Cue::Orient);
}

#[test]
fn orientation_policy() {
    let mut each = config(10.0);
    each.play_orient_each_trial = true;
    let mut rig_each = rig(each, SilentTones::new(), vec![Some(("up", 0.1))]);
    let mut t = Trial::new("test", 1, 0.8, Direction::Decrease);
    rig_each.engine.run(&mut t, false).unwrap();
    assert!(t.orient_on_s.is_some());

    let mut shuffled = config(10.0);
    shuffled.cue_block_start = true;
    shuffled.shuffle_across_blocks = true;
    let mut rig_shuffled = rig(shuffled, SilentTones::new(), vec![Some(("up", 0.1))]);
    let mut t = Trial::new("test", 1, 0.8, Direction::Decrease);
    rig_shuffled.engine.run(&mut t, true).unwrap();
    assert!(t.orient_on_s.is_none());
}

#[test]
fn device_failure_mid_stream_leaves_trial_unshown() {
    let mut rig = rig(config(10.0), SilentTones::failing_after(25), vec![None]);
    let mut trial = Trial::new("test", 1, 0.8, Direction::Increase);

    let err = rig.engine.run(&mut trial, false).unwrap_err();

    assert!(matches!(
        err,
        TrialError::Device {
            state: TrialState::Stream,
            source: DeviceError::Io { .. }
        }
    ));
    assert!(!trial.was_shown);
    assert!(!trial.is_resolved());
}

#[test]
fn unknown_block_is_rejected_before_any_sound() {
    let mut rig = rig(config(10.0), SilentTones::new(), vec![None]);
    let mut trial = Trial::new("medium", 1, 0.8, Direction::Increase);
    assert!(matches!(
        rig.engine.run(&mut trial, false),
        Err(TrialError::UnknownBlock(b)) if b == "medium"
    ));
    assert!(rig.tones.lock().tones.is_empty());
}

#[test]
fn sync_enabled_without_device_is_fatal() {
    let timer = SimulatedTimer::new();
    let mut cfg = config(10.0);
    cfg.send_sync = true;
    let devices = Devices {
        tones: SilentTones::new(),
        keys: ScriptedKeys::single(timer.clone(), Vec::new()),
        sync: None::<RecordingSyncLine<SimulatedTimer>>,
    };
    let result = TrialEngine::new(cfg, devices, timer, StdRng::seed_from_u64(0));
    assert!(matches!(
        result.err(),
        Some(SessionError::Device(DeviceError::Unavailable { .. }))
    ));
}

#[test]
fn invalid_config_is_fatal() {
    let timer = SimulatedTimer::new();
    let mut cfg = config(10.0);
    cfg.coherences.clear();
    let devices = Devices {
        tones: SilentTones::new(),
        keys: ScriptedKeys::single(timer.clone(), Vec::new()),
        sync: None::<RecordingSyncLine<SimulatedTimer>>,
    };
    let result = TrialEngine::new(cfg, devices, timer, StdRng::seed_from_u64(0));
    assert!(matches!(result.err(), Some(SessionError::Config(_))));
}
