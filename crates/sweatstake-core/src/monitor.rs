//! Presence monitoring against the gym geofence.
//!
//! A [`SessionMonitor`] polls the position source on a fixed cadence while a
//! workout window is armed and reports arrival exactly once. It never stops
//! on window end by itself; the escalation owner decides when monitoring is
//! over, because the penalty clock is independent of the geofencing clock.
//!
//! Manual check-in does not go through the poll loop at all:
//! [`manual_probe`] takes one immediate reading against the larger manual
//! radius and returns synchronously.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::{CheckInError, PositionError};
use crate::geo::{GeoPoint, Target};
use crate::position::{PositionFix, PositionSource};

/// Presence-check policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorPolicy {
    /// Cadence between automated polls (default: 5 minutes)
    pub poll_interval_ms: u64,
    /// Geofence radius for automated polling (default: 10 m)
    pub auto_radius_m: f64,
    /// Geofence radius for manual check-in; larger to tolerate GPS noise
    /// (default: 50 m)
    pub manual_radius_m: f64,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5 * 60 * 1000,
            auto_radius_m: 10.0,
            manual_radius_m: 50.0,
        }
    }
}

/// What the monitor reports to its owner.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// First confirmed reading inside the automated radius. Sent at most
    /// once per monitor; the poll task ends after sending it.
    Arrived { fix: PositionFix, distance_m: f64 },
    /// A poll failed and the tick was skipped.
    PollSkipped { error: PositionError },
}

/// Handle to a spawned presence monitor.
///
/// Stopping (or dropping) the handle cancels the poll task promptly; a read
/// in flight at that moment is discarded, never reported.
pub struct SessionMonitor {
    stop: watch::Sender<bool>,
}

impl SessionMonitor {
    /// Spawn a poll task watching `gym` with the automated radius. The
    /// first poll happens immediately.
    pub fn spawn(
        source: Arc<dyn PositionSource>,
        gym: GeoPoint,
        policy: MonitorPolicy,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let target = Target::new(gym, policy.auto_radius_m);

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(StdDuration::from_millis(policy.poll_interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }
                let reading = tokio::select! {
                    _ = stopped.changed() => break,
                    r = source.current_position() => r,
                };
                match reading {
                    Ok(fix) => {
                        let distance_m = target.distance_to(fix.point);
                        if target.contains(fix.point) {
                            let _ = events.send(MonitorEvent::Arrived { fix, distance_m }).await;
                            break;
                        }
                        debug!("not at the gym yet ({distance_m:.0} m away)");
                    }
                    Err(error) => {
                        warn!(%error, "position poll failed, skipping tick");
                        if events
                            .send(MonitorEvent::PollSkipped { error })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        Self { stop }
    }

    /// Cancel the poll task.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// A confirmed manual-probe reading inside the manual radius.
#[derive(Debug, Clone, Copy)]
pub struct ManualFix {
    pub fix: PositionFix,
    pub distance_m: f64,
}

/// One immediate read against the manual (lenient) radius.
///
/// Does not touch the poll cadence and performs no mutation; the caller
/// applies check-in side effects only after this returns `Ok`.
///
/// # Errors
/// [`CheckInError::Position`] when no reading could be obtained;
/// [`CheckInError::TooFar`] when the confirmed reading is outside the
/// manual radius.
pub async fn manual_probe(
    source: &dyn PositionSource,
    gym: GeoPoint,
    policy: &MonitorPolicy,
) -> Result<ManualFix, CheckInError> {
    let lenient = Target::new(gym, policy.manual_radius_m);
    let fix = source.current_position().await?;
    let distance_m = lenient.distance_to(fix.point);
    if !lenient.contains(fix.point) {
        return Err(CheckInError::TooFar {
            distance_m,
            radius_m: lenient.radius_m,
        });
    }
    Ok(ManualFix { fix, distance_m })
}
