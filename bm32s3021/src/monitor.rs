//! Polling task that watches the sensor and logs what it sees.

use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::hw_trait::{InputPin, SerialLink};
use crate::peripheral::bm32s3021::{Bm32s3021, IrState};
use crate::tracing::prelude::*;

/// Poll the sensor every `interval` until `running` is cancelled.
///
/// Hands the sensor back when stopped.
pub async fn task<L, P>(
    mut sensor: Bm32s3021<L, P>,
    interval: Duration,
    running: CancellationToken,
) -> Bm32s3021<L, P>
where
    L: SerialLink,
    P: InputPin,
{
    trace!("Task started.");

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_state: Option<IrState> = None;
    let mut last_int: Option<u8> = None;
    let mut link = LinkHealth::default();

    loop {
        tokio::select! {
            _ = running.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match sensor.read_ir_state().await {
            Ok(state) => {
                if link.answered() {
                    info!("Sensor answering again.");
                }
                for change in describe_changes(last_state.as_ref(), &state) {
                    info!("{}", change);
                }
                last_state = Some(state);
            }
            Err(e) if e.is_exchange_failure() => {
                if link.failed() {
                    warn!("Sensor stopped answering: {}", e);
                } else {
                    trace!("Status poll failed: {}", e);
                }
            }
            Err(e) => error!("Status poll failed: {}", e),
        }

        match sensor.int_level().await {
            Ok(level) if last_int != Some(level) => {
                debug!("INT {}", if level == 0 { "asserted" } else { "released" });
                last_int = Some(level);
            }
            Ok(_) => {}
            Err(e) => warn!("Reading INT failed: {}", e),
        }
    }

    trace!("Task stopped.");
    sensor
}

/// Tracks whether the sensor answers, so an outage is logged once.
#[derive(Debug, Default)]
struct LinkHealth {
    down: bool,
}

impl LinkHealth {
    /// Record a failed exchange; true if the link just went down.
    fn failed(&mut self) -> bool {
        !std::mem::replace(&mut self.down, true)
    }

    /// Record a good exchange; true if the link just came back.
    fn answered(&mut self) -> bool {
        std::mem::replace(&mut self.down, false)
    }
}

/// Human readable differences between two consecutive readings.
pub fn describe_changes(previous: Option<&IrState>, current: &IrState) -> Vec<String> {
    let mut changes = Vec::new();

    let calibrated_before = previous.is_some_and(|p| p.status.is_calibrated());
    if current.status.is_calibrated() && !calibrated_before {
        changes.push("Sensor calibrated".to_string());
    } else if !current.status.is_calibrated() && calibrated_before {
        changes.push("Sensor lost calibration".to_string());
    }

    let before = previous.map(|p| p.status.gestures()).unwrap_or_default();
    for gesture in current.status.gestures() {
        if !before.contains(&gesture) {
            changes.push(format!("Gesture: {:?}", gesture));
        }
    }

    if let Some(previous) = previous {
        if previous.gesture_count != current.gesture_count {
            changes.push(format!(
                "Slide count {} -> {}",
                previous.gesture_count, current.gesture_count
            ));
        }
    }

    changes
}
