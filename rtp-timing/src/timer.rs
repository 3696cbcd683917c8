use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic session clock shared by every component that stamps time.
///
/// Clones must observe the same epoch, so stimulus, response and sync
/// timestamps stay comparable.
pub trait Timer: Clone + Send + Sync {
    /// Nanoseconds since the session epoch.
    fn now_ns(&self) -> u64;

    fn sleep(&self, d: Duration);

    /// Seconds since the session epoch.
    fn now_s(&self) -> f64 {
        self.now_ns() as f64 / 1e9
    }

    fn elapsed(&self, since_ns: u64) -> Duration {
        Duration::from_nanos(self.now_ns().saturating_sub(since_ns))
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationStats {
    pub samples: usize,
    pub requested_ns: f64,
    pub mean_overshoot_ns: f64,
    pub jitter_ns: f64,
    pub min_overshoot_ns: f64,
    pub max_overshoot_ns: f64,
}

/// Sleeps `samples` times for `quantum` and reports how far the actual
/// durations overshot the request.
pub fn calibrate_sleep<T: Timer>(timer: &T, quantum: Duration, samples: usize) -> CalibrationStats {
    let requested = quantum.as_nanos() as f64;
    let overshoots: Vec<f64> = (0..samples)
        .map(|_| {
            let start = timer.now_ns();
            timer.sleep(quantum);
            timer.elapsed(start).as_nanos() as f64 - requested
        })
        .collect();

    if overshoots.is_empty() {
        return CalibrationStats {
            samples: 0,
            requested_ns: requested,
            mean_overshoot_ns: 0.0,
            jitter_ns: 0.0,
            min_overshoot_ns: 0.0,
            max_overshoot_ns: 0.0,
        };
    }

    let n = overshoots.len() as f64;
    let mean = overshoots.iter().sum::<f64>() / n;
    let var = overshoots.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let min = overshoots.iter().copied().fold(f64::INFINITY, f64::min);
    let max = overshoots.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    tracing::debug!(
        samples,
        mean_overshoot_us = mean / 1e3,
        jitter_us = var.sqrt() / 1e3,
        "sleep calibration"
    );

    CalibrationStats {
        samples,
        requested_ns: requested,
        mean_overshoot_ns: mean,
        jitter_ns: var.sqrt(),
        min_overshoot_ns: min,
        max_overshoot_ns: max,
    }
}

/// Wall-clock timer backed by `Instant`, with a sleep that avoids the
/// coarse scheduler tick where the platform allows.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
    busy_wait: bool,
}

impl Timer for HighPrecisionTimer {
    fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn sleep(&self, d: Duration) {
        if self.busy_wait {
            self.spin_sleep(d)
        } else {
            self.high_precision_sleep(d)
        }
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            busy_wait: false,
        }
    }

    /// Spin instead of yielding to the scheduler while waiting.
    pub fn with_busy_wait(mut self, busy_wait: bool) -> Self {
        self.busy_wait = busy_wait;
        self
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    fn spin_sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // Resume with the remainder if a signal cuts the sleep short.
        loop {
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != EINTR {
                break;
            }
            req = rem;
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual clock for tests and dry runs. Time only moves when someone
/// sleeps or calls [`SimulatedTimer::advance`]; clones share the same clock.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTimer {
    now_ns: Arc<AtomicU64>,
}

impl SimulatedTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for SimulatedTimer {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
