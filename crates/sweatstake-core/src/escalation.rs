//! The workout-day escalation state machine.
//!
//! One run tracks a single day's window from arming to a terminal outcome:
//!
//! ```text
//! AwaitingWindow --t0--> Active --t0+15m--> Warning1 --t0+30m--> CallPlaced
//!     --t0+45m--> Warning2 --t0+60m--> Penalized
//! ```
//!
//! `Arrived` moves any active stage to `Completed`; `Cancel` moves any
//! non-terminal stage to `Cancelled`. Ladder offsets are policy with the
//! defaults above.
//!
//! The machine owns no timers. Deadlines are absolute wall-clock instants
//! computed once from the window start, and [`EscalationRun::tick`] advances
//! through every deadline at or before `now` in order. A run evaluated
//! after a long process suspension therefore fires all missed actions
//! immediately, each exactly once, instead of silently skipping them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stage of a single day's escalation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStage {
    /// Waiting for the window to open
    AwaitingWindow,
    /// Window open, monitoring for arrival
    Active,
    /// First penalty-at-risk warning fired
    Warning1,
    /// Motivational call placed
    CallPlaced,
    /// Final penalty-at-risk warning fired
    Warning2,
    /// Arrived in time. Terminal.
    Completed,
    /// Window fully elapsed without arrival. Terminal.
    Penalized,
    /// Aborted by stop, logout, or a check-in outside this run. Terminal.
    Cancelled,
}

impl EscalationStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EscalationStage::Completed | EscalationStage::Penalized | EscalationStage::Cancelled
        )
    }
}

/// Ladder offsets measured from window start t0, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationLadder {
    /// First warning (default: 15 minutes)
    pub warn1_after_ms: u64,
    /// Motivational call (default: 30 minutes)
    pub call_after_ms: u64,
    /// Final warning (default: 45 minutes)
    pub warn2_after_ms: u64,
    /// Penalty (default: 60 minutes)
    pub penalize_after_ms: u64,
}

impl Default for EscalationLadder {
    fn default() -> Self {
        Self {
            warn1_after_ms: 15 * 60 * 1000,
            call_after_ms: 30 * 60 * 1000,
            warn2_after_ms: 45 * 60 * 1000,
            penalize_after_ms: 60 * 60 * 1000,
        }
    }
}

/// Side effects the owner must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationAction {
    /// Window opened: fire the initial reminder, start the monitor.
    Activate,
    /// Penalty-at-risk warning with the scheduled minutes left to check in.
    Warn { minutes_remaining: i64 },
    /// Place the motivational call (and its notice) exactly once.
    PlaceCall { minutes_remaining: i64 },
    /// Window elapsed: apply the penalty, stop the monitor.
    Penalize,
}

/// One day's escalation run.
///
/// Pure state: the owner calls [`tick`](Self::tick) with the current wall
/// clock and executes the returned actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRun {
    stage: EscalationStage,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    warn1_at: DateTime<Utc>,
    call_at: DateTime<Utc>,
    warn2_at: DateTime<Utc>,
    penalize_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl EscalationRun {
    /// Run with the default ladder.
    pub fn new(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self::with_ladder(window_start, window_end, &EscalationLadder::default())
    }

    /// Run with a custom ladder. Deadlines are fixed here, once.
    pub fn with_ladder(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        ladder: &EscalationLadder,
    ) -> Self {
        let at = |ms: u64| window_start + Duration::milliseconds(ms as i64);
        Self {
            stage: EscalationStage::AwaitingWindow,
            window_start,
            window_end,
            warn1_at: at(ladder.warn1_after_ms),
            call_at: at(ladder.call_after_ms),
            warn2_at: at(ladder.warn2_after_ms),
            penalize_at: at(ladder.penalize_after_ms),
            completed_at: None,
        }
    }

    pub fn stage(&self) -> EscalationStage {
        self.stage
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_end
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// The next deadline this run is waiting on, if any.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match self.stage {
            EscalationStage::AwaitingWindow => Some(self.window_start),
            EscalationStage::Active => Some(self.warn1_at),
            EscalationStage::Warning1 => Some(self.call_at),
            EscalationStage::CallPlaced => Some(self.warn2_at),
            EscalationStage::Warning2 => Some(self.penalize_at),
            _ => None,
        }
    }

    /// Advance through every deadline at or before `now`, in stage order.
    ///
    /// Each action is produced at most once per run. Terminal stages
    /// produce nothing.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<EscalationAction> {
        let mut actions = Vec::new();
        loop {
            let action = match self.stage {
                EscalationStage::AwaitingWindow if now >= self.window_start => {
                    self.stage = EscalationStage::Active;
                    EscalationAction::Activate
                }
                EscalationStage::Active if now >= self.warn1_at => {
                    self.stage = EscalationStage::Warning1;
                    EscalationAction::Warn {
                        minutes_remaining: self.minutes_before_penalty(self.warn1_at),
                    }
                }
                EscalationStage::Warning1 if now >= self.call_at => {
                    self.stage = EscalationStage::CallPlaced;
                    EscalationAction::PlaceCall {
                        minutes_remaining: self.minutes_before_penalty(self.call_at),
                    }
                }
                EscalationStage::CallPlaced if now >= self.warn2_at => {
                    self.stage = EscalationStage::Warning2;
                    EscalationAction::Warn {
                        minutes_remaining: self.minutes_before_penalty(self.warn2_at),
                    }
                }
                EscalationStage::Warning2 if now >= self.penalize_at => {
                    self.stage = EscalationStage::Penalized;
                    EscalationAction::Penalize
                }
                _ => break,
            };
            actions.push(action);
        }
        actions
    }

    /// Scheduled minutes between a stage deadline and the penalty deadline.
    /// Catch-up bursts report the same figures the live schedule would have.
    fn minutes_before_penalty(&self, from: DateTime<Utc>) -> i64 {
        (self.penalize_at - from).num_minutes().max(0)
    }

    /// Confirmed arrival. From any stage at or past `Active`, moves to
    /// `Completed` and returns true; everywhere else (including a second
    /// arrival) it is a no-op returning false.
    pub fn arrive(&mut self, at: DateTime<Utc>) -> bool {
        match self.stage {
            EscalationStage::Active
            | EscalationStage::Warning1
            | EscalationStage::CallPlaced
            | EscalationStage::Warning2 => {
                self.stage = EscalationStage::Completed;
                self.completed_at = Some(at);
                true
            }
            _ => false,
        }
    }

    /// Abort the run. Returns true if it was non-terminal.
    pub fn cancel(&mut self) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = EscalationStage::Cancelled;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn six_pm() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 18, 0, 0).unwrap()
    }

    fn run() -> EscalationRun {
        let t0 = six_pm();
        EscalationRun::new(t0, t0 + Duration::hours(1))
    }

    fn min(m: i64) -> Duration {
        Duration::minutes(m)
    }

    #[test]
    fn nothing_happens_before_the_window() {
        let mut r = run();
        assert!(r.tick(six_pm() - min(1)).is_empty());
        assert_eq!(r.stage(), EscalationStage::AwaitingWindow);
        assert_eq!(r.next_deadline(), Some(six_pm()));
    }

    #[test]
    fn full_miss_walks_the_whole_ladder() {
        let mut r = run();
        let t0 = six_pm();

        assert_eq!(r.tick(t0), vec![EscalationAction::Activate]);
        assert!(r.tick(t0 + min(14)).is_empty());
        assert_eq!(
            r.tick(t0 + min(15)),
            vec![EscalationAction::Warn {
                minutes_remaining: 45
            }]
        );
        assert_eq!(
            r.tick(t0 + min(30)),
            vec![EscalationAction::PlaceCall {
                minutes_remaining: 30
            }]
        );
        assert_eq!(
            r.tick(t0 + min(45)),
            vec![EscalationAction::Warn {
                minutes_remaining: 15
            }]
        );
        assert_eq!(r.tick(t0 + min(60)), vec![EscalationAction::Penalize]);
        assert_eq!(r.stage(), EscalationStage::Penalized);

        // Terminal: nothing more ever fires.
        assert!(r.tick(t0 + min(61)).is_empty());
        assert!(r.tick(t0 + Duration::days(2)).is_empty());
        assert_eq!(r.next_deadline(), None);
    }

    #[test]
    fn suspension_catch_up_fires_missed_stages_in_order() {
        let mut r = run();
        let actions = r.tick(six_pm() + min(90));
        assert_eq!(
            actions,
            vec![
                EscalationAction::Activate,
                EscalationAction::Warn {
                    minutes_remaining: 45
                },
                EscalationAction::PlaceCall {
                    minutes_remaining: 30
                },
                EscalationAction::Warn {
                    minutes_remaining: 15
                },
                EscalationAction::Penalize,
            ]
        );
        assert_eq!(r.stage(), EscalationStage::Penalized);
    }

    #[test]
    fn arrival_completes_and_stops_the_ladder() {
        let mut r = run();
        let t0 = six_pm();
        r.tick(t0);
        r.tick(t0 + min(15));
        assert_eq!(r.stage(), EscalationStage::Warning1);

        assert!(r.arrive(t0 + min(20)));
        assert_eq!(r.stage(), EscalationStage::Completed);
        assert_eq!(r.completed_at(), Some(t0 + min(20)));

        // No call, no second warning, no penalty.
        assert!(r.tick(t0 + min(30)).is_empty());
        assert!(r.tick(t0 + min(60)).is_empty());

        // A second arrival is a no-op.
        assert!(!r.arrive(t0 + min(21)));
    }

    #[test]
    fn arrival_before_the_window_does_nothing() {
        let mut r = run();
        assert!(!r.arrive(six_pm() - min(5)));
        assert_eq!(r.stage(), EscalationStage::AwaitingWindow);
    }

    #[test]
    fn cancel_absorbs_from_any_non_terminal_stage() {
        let mut r = run();
        assert!(r.cancel());
        assert_eq!(r.stage(), EscalationStage::Cancelled);
        assert!(!r.cancel());
        assert!(r.tick(six_pm() + min(90)).is_empty());

        let mut r = run();
        r.tick(six_pm() + min(31));
        assert_eq!(r.stage(), EscalationStage::CallPlaced);
        assert!(r.cancel());

        let mut r = run();
        r.tick(six_pm());
        assert!(r.arrive(six_pm() + min(1)));
        assert!(!r.cancel(), "terminal stages stay terminal");
        assert_eq!(r.stage(), EscalationStage::Completed);
    }

    #[test]
    fn deadlines_are_inclusive() {
        let mut r = run();
        let t0 = six_pm();
        assert_eq!(r.tick(t0), vec![EscalationAction::Activate]);
        // One millisecond short of the first warning: nothing.
        assert!(r.tick(t0 + min(15) - Duration::milliseconds(1)).is_empty());
        assert_eq!(r.tick(t0 + min(15)).len(), 1);
    }

    #[test]
    fn custom_ladder_reports_its_own_minutes() {
        let ladder = EscalationLadder {
            warn1_after_ms: 5 * 60 * 1000,
            call_after_ms: 10 * 60 * 1000,
            warn2_after_ms: 15 * 60 * 1000,
            penalize_after_ms: 20 * 60 * 1000,
        };
        let t0 = six_pm();
        let mut r = EscalationRun::with_ladder(t0, t0 + min(60), &ladder);
        let actions = r.tick(t0 + min(20));
        assert_eq!(
            actions,
            vec![
                EscalationAction::Activate,
                EscalationAction::Warn {
                    minutes_remaining: 15
                },
                EscalationAction::PlaceCall {
                    minutes_remaining: 10
                },
                EscalationAction::Warn {
                    minutes_remaining: 5
                },
                EscalationAction::Penalize,
            ]
        );
    }
}
