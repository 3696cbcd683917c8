//! Bench check of the response buttons and sync line: wait for a press,
//! mark it on the sync output, repeat.

use crate::config::ButtonMap;
use crate::response::ResponsePoller;
use crate::sync::SyncEmitter;
use rtp_core::Direction;
use rtp_devices::{DeviceError, KeyInput, SyncLine};
use rtp_timing::Timer;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// One press and the marker sent for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdhocRecord {
    /// `right` for the increase buttons, `left` for the decrease buttons.
    #[serde(rename = "buttonPress")]
    pub side: String,
    /// Session-clock time of the key-down.
    #[serde(rename = "buttonPress_s")]
    pub button_press_s: f64,
    #[serde(rename = "TTLSent_s")]
    pub ttl_sent_s: Option<f64>,
}

/// Runs `trials` press/marker rounds. There is no response deadline: each
/// round polls every `poll_interval` until a mapped button goes down.
pub fn run_adhoc<K, S, T>(
    poller: &mut ResponsePoller<K, T>,
    mut sync: Option<&mut SyncEmitter<S, T>>,
    buttons: &ButtonMap,
    timer: &T,
    trials: usize,
    poll_interval: Duration,
) -> Result<Vec<AdhocRecord>, DeviceError>
where
    K: KeyInput,
    S: SyncLine,
    T: Timer,
{
    let wanted = buttons.all();
    let mut records = Vec::with_capacity(trials);

    for n in 0..trials {
        poller.reset()?;
        let (event, direction) = loop {
            let hit = poller
                .poll(&wanted)?
                .into_iter()
                .find_map(|e| buttons.classify(&e.name).map(|d| (e, d)));
            if let Some(hit) = hit {
                break hit;
            }
            timer.sleep(poll_interval);
        };

        let side = match direction {
            Direction::Increase => "right",
            Direction::Decrease => "left",
        };
        let ttl_sent_s = match sync.as_deref_mut() {
            Some(sync) => Some(sync.marker()?),
            None => None,
        };
        let record = AdhocRecord {
            side: side.to_string(),
            button_press_s: poller.epoch_s() + event.rt,
            ttl_sent_s,
        };
        info!(trial = n + 1, button = %event.name, side, "press");
        records.push(record);
    }
    Ok(records)
}
