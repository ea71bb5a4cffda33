//! Position sources: one-shot reads, cached policy wrapper, continuous
//! watch feed, and a scripted source for tests and demos.
//!
//! A [`PositionSource`] produces a single fallible reading and never retries
//! internally; retry policy belongs to the caller. Hosts wrap the raw
//! source in a [`CachedPositionSource`] which bounds each read by a timeout
//! and serves a recent fix instead of hitting the provider again.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::PositionError;
use crate::geo::GeoPoint;

/// One reading from a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Reported accuracy radius in meters.
    pub accuracy_m: f64,
    pub at: DateTime<Utc>,
}

/// An external, possibly-unreliable location provider.
#[async_trait::async_trait]
pub trait PositionSource: Send + Sync {
    /// Obtain one current reading. No internal retry, no internal timeout.
    async fn current_position(&self) -> Result<PositionFix, PositionError>;
}

/// Read-bounding policy for [`CachedPositionSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionPolicy {
    /// Abandon a read after this long (default: 10 seconds)
    pub read_timeout_ms: u64,
    /// Serve a cached fix while it is at most this old (default: 60 seconds)
    pub max_age_ms: u64,
}

impl Default for PositionPolicy {
    fn default() -> Self {
        Self {
            read_timeout_ms: 10 * 1000,
            max_age_ms: 60 * 1000,
        }
    }
}

/// Timeout-and-cache wrapper around any [`PositionSource`].
pub struct CachedPositionSource<S> {
    inner: S,
    policy: PositionPolicy,
    last: Mutex<Option<PositionFix>>,
}

impl<S: PositionSource> CachedPositionSource<S> {
    pub fn new(inner: S) -> Self {
        Self::with_policy(inner, PositionPolicy::default())
    }

    pub fn with_policy(inner: S, policy: PositionPolicy) -> Self {
        Self {
            inner,
            policy,
            last: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl<S: PositionSource> PositionSource for CachedPositionSource<S> {
    async fn current_position(&self) -> Result<PositionFix, PositionError> {
        let now = Utc::now();
        {
            let last = self.last.lock().await;
            if let Some(fix) = *last {
                let age_ms = (now - fix.at).num_milliseconds();
                if age_ms >= 0 && age_ms as u64 <= self.policy.max_age_ms {
                    return Ok(fix);
                }
            }
        }

        let timeout = StdDuration::from_millis(self.policy.read_timeout_ms);
        match tokio::time::timeout(timeout, self.inner.current_position()).await {
            Ok(Ok(fix)) => {
                *self.last.lock().await = Some(fix);
                Ok(fix)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PositionError::Timeout {
                waited_ms: self.policy.read_timeout_ms,
            }),
        }
    }
}

/// Handle for a continuous position feed. Dropping it stops the feed.
pub struct PositionWatch {
    rx: mpsc::Receiver<Result<PositionFix, PositionError>>,
    stop: watch::Sender<bool>,
}

impl PositionWatch {
    /// Next reading, or `None` once the feed has stopped.
    pub async fn next(&mut self) -> Option<Result<PositionFix, PositionError>> {
        self.rx.recv().await
    }

    /// Stop the feed explicitly.
    pub fn stop(self) {
        let _ = self.stop.send(true);
    }
}

/// Spawn a feed that re-reads `source` every `every` and delivers each
/// result independently. An in-flight read is abandoned when the handle
/// stops the feed.
pub fn watch_positions(source: Arc<dyn PositionSource>, every: StdDuration) -> PositionWatch {
    let (tx, rx) = mpsc::channel(16);
    let (stop, mut stopped) = watch::channel(false);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stopped.changed() => break,
                _ = ticker.tick() => {
                    let reading = tokio::select! {
                        _ = stopped.changed() => break,
                        r = source.current_position() => r,
                    };
                    if tx.send(reading).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    PositionWatch { rx, stop }
}

/// Source for hosts without a location provider. Every read reports
/// [`PositionError::Unsupported`]; arrival detection is effectively off
/// and check-ins need explicit coordinates.
pub struct UnsupportedPositionSource;

#[async_trait::async_trait]
impl PositionSource for UnsupportedPositionSource {
    async fn current_position(&self) -> Result<PositionFix, PositionError> {
        Err(PositionError::Unsupported)
    }
}

/// Deterministic scripted source for tests and the CLI demo mode.
///
/// Serves the current point (with optional accuracy jitter from a seedable
/// PCG generator) until moved; queued one-shot readings, fixes or errors,
/// are served first in order.
pub struct SimulatedPositionSource {
    state: Mutex<SimState>,
}

struct SimState {
    current: Result<GeoPoint, PositionError>,
    accuracy_m: f64,
    jitter_m: f64,
    queue: VecDeque<Result<PositionFix, PositionError>>,
    rng: Mcg128Xsl64,
}

impl SimulatedPositionSource {
    /// Entropy-seeded source standing at `start`.
    pub fn new(start: GeoPoint) -> Self {
        Self::build(start, Mcg128Xsl64::from_entropy())
    }

    /// Reproducible source standing at `start`.
    pub fn with_seed(start: GeoPoint, seed: u64) -> Self {
        Self::build(start, Mcg128Xsl64::seed_from_u64(seed))
    }

    fn build(start: GeoPoint, rng: Mcg128Xsl64) -> Self {
        Self {
            state: Mutex::new(SimState {
                current: Ok(start),
                accuracy_m: 5.0,
                jitter_m: 0.0,
                queue: VecDeque::new(),
                rng,
            }),
        }
    }

    /// Move the simulated device.
    pub async fn set_position(&self, point: GeoPoint) {
        self.state.lock().await.current = Ok(point);
    }

    /// Make every subsequent read fail with `error` until moved again.
    pub async fn set_failure(&self, error: PositionError) {
        self.state.lock().await.current = Err(error);
    }

    /// Scatter readings up to `jitter_m` meters around the current point.
    pub async fn set_jitter(&self, jitter_m: f64) {
        self.state.lock().await.jitter_m = jitter_m;
    }

    /// Queue a one-shot reading served before the current state.
    pub async fn push_reading(&self, reading: Result<PositionFix, PositionError>) {
        self.state.lock().await.queue.push_back(reading);
    }
}

#[async_trait::async_trait]
impl PositionSource for SimulatedPositionSource {
    async fn current_position(&self) -> Result<PositionFix, PositionError> {
        let mut state = self.state.lock().await;
        if let Some(queued) = state.queue.pop_front() {
            return queued;
        }
        let point = state.current.clone()?;
        let accuracy_m = state.accuracy_m;
        let point = if state.jitter_m > 0.0 {
            // Roughly 1e-5 degrees per meter at mid latitudes; close enough
            // for scattering test readings.
            let j = state.jitter_m;
            let dlat = state.rng.gen_range(-j..=j) * 1e-5;
            let dlng = state.rng.gen_range(-j..=j) * 1e-5;
            GeoPoint::new(point.lat + dlat, point.lng + dlng)
        } else {
            point
        };
        Ok(PositionFix {
            point,
            accuracy_m,
            at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gym() -> GeoPoint {
        GeoPoint::new(35.6812, 139.7671)
    }

    #[tokio::test]
    async fn simulated_source_serves_current_point() {
        let source = SimulatedPositionSource::with_seed(gym(), 7);
        let fix = source.current_position().await.unwrap();
        assert_eq!(fix.point, gym());

        source.set_failure(PositionError::PermissionDenied).await;
        assert_eq!(
            source.current_position().await.unwrap_err(),
            PositionError::PermissionDenied
        );
    }

    #[tokio::test]
    async fn queued_readings_come_first() {
        let source = SimulatedPositionSource::with_seed(gym(), 7);
        source
            .push_reading(Err(PositionError::Provider("no satellites".into())))
            .await;
        assert!(source.current_position().await.is_err());
        assert!(source.current_position().await.is_ok());
    }

    #[tokio::test]
    async fn jitter_stays_near_the_point() {
        let source = SimulatedPositionSource::with_seed(gym(), 42);
        source.set_jitter(3.0).await;
        for _ in 0..10 {
            let fix = source.current_position().await.unwrap();
            assert!(fix.point.distance_m(&gym()) < 10.0);
        }
    }

    #[tokio::test]
    async fn cache_serves_recent_fix_without_rereading() {
        let source = SimulatedPositionSource::with_seed(gym(), 7);
        let cached = CachedPositionSource::new(source);
        let first = cached.current_position().await.unwrap();

        // Move the device; the cached fix is still fresh, so the old point
        // is served.
        cached.inner.set_position(GeoPoint::new(0.0, 0.0)).await;
        let second = cached.current_position().await.unwrap();
        assert_eq!(first.point, second.point);
    }

    #[tokio::test]
    async fn cache_expires_by_age() {
        let source = SimulatedPositionSource::with_seed(gym(), 7);
        let stale = PositionFix {
            point: gym(),
            accuracy_m: 5.0,
            at: Utc::now() - chrono::Duration::seconds(120),
        };
        let cached = CachedPositionSource::new(source);
        *cached.last.lock().await = Some(stale);

        let fresh = cached.current_position().await.unwrap();
        assert!(fresh.at > stale.at);
    }

    struct NeverAnswers;

    #[async_trait::async_trait]
    impl PositionSource for NeverAnswers {
        async fn current_position(&self) -> Result<PositionFix, PositionError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn read_timeout_maps_to_position_error() {
        let cached = CachedPositionSource::with_policy(
            NeverAnswers,
            PositionPolicy {
                read_timeout_ms: 20,
                max_age_ms: 60_000,
            },
        );
        match cached.current_position().await {
            Err(PositionError::Timeout { waited_ms }) => assert_eq!(waited_ms, 20),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn watch_delivers_and_stops() {
        let source = Arc::new(SimulatedPositionSource::with_seed(gym(), 7));
        let mut feed = watch_positions(source.clone(), StdDuration::from_millis(5));
        let first = feed.next().await.expect("feed alive");
        assert!(first.is_ok());
        let second = feed.next().await.expect("feed alive");
        assert!(second.is_ok());
        feed.stop();
    }
}
