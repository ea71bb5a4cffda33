//! Cross-day scheduling: one workout window occurrence per calendar day.
//!
//! [`DayCycle`] owns the per-day bookkeeping the escalation machine does
//! not: which local day it is, whether today's window was already armed,
//! and how today resolved. Like [`crate::escalation::EscalationRun`] it is
//! pure and tick-driven; the engine calls [`DayCycle::tick`] with the wall
//! clock and executes the returned actions. Day boundaries are detected by
//! comparing local dates rather than by sleeping until midnight, so a
//! process suspension that swallows one or more midnights still reconciles
//! on the first tick after resume.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::setup::{WindowMode, WorkoutWindow};

/// How the current day resolved so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOutcome {
    /// No check-in yet and no penalty applied.
    Pending,
    /// A check-in (automated or manual) was recorded today.
    CheckedIn,
    /// Today's window fully escalated to a penalty.
    Penalized,
}

/// Snapshot of the cycle for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCycleState {
    pub date: NaiveDate,
    pub window_armed: bool,
    pub outcome: DayOutcome,
    pub last_check_in_at: Option<DateTime<Utc>>,
}

/// Side effects the owner must perform after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleAction {
    /// Today's window opened: create exactly one escalation run for it.
    ArmWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// A local day finished: ask the ledger whether the streak survives.
    ReconcileDay { finished: NaiveDate },
}

/// Per-day scheduler for a single workout window definition.
///
/// Generic over the timezone so the day boundary follows the user's local
/// midnight in production while tests can run in `Utc`.
#[derive(Debug, Clone)]
pub struct DayCycle<Tz: TimeZone> {
    tz: Tz,
    window: WorkoutWindow,
    date: NaiveDate,
    outcome: DayOutcome,
    armed: bool,
    last_check_in_at: Option<DateTime<Utc>>,
    next_start: DateTime<Utc>,
}

impl<Tz: TimeZone> DayCycle<Tz> {
    /// Start the cycle at `now` for a window created at `created_at`.
    ///
    /// The first occurrence is today if the window start has not passed
    /// (starting exactly at the start instant still counts as today),
    /// otherwise tomorrow. A `StartNow` window created today is due at its
    /// embedded start even though that instant just passed, so it arms on
    /// the first tick; on any later day it recurs like a custom window.
    pub fn new(
        window: WorkoutWindow,
        tz: Tz,
        now: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let local = now.with_timezone(&tz);
        let today = local.date_naive();
        let created_today = created_at.with_timezone(&tz).date_naive() == today;
        let today_start = resolve_local(&tz, today.and_time(window.start)).with_timezone(&Utc);
        let next_start = if now <= today_start
            || (window.mode == WindowMode::StartNow && created_today)
        {
            today_start
        } else {
            resolve_local(
                &tz,
                today
                    .succ_opt()
                    .unwrap_or(today)
                    .and_time(window.start),
            )
            .with_timezone(&Utc)
        };
        Self {
            tz,
            window,
            date: today,
            outcome: DayOutcome::Pending,
            armed: false,
            last_check_in_at: None,
            next_start,
        }
    }

    pub fn state(&self) -> DayCycleState {
        DayCycleState {
            date: self.date,
            window_armed: self.armed,
            outcome: self.outcome,
            last_check_in_at: self.last_check_in_at,
        }
    }

    /// The instant the next window will arm, for status display.
    pub fn next_window_at(&self) -> DateTime<Utc> {
        if self.armed || self.outcome != DayOutcome::Pending {
            let tomorrow = self.date.succ_opt().unwrap_or(self.date);
            resolve_local(&self.tz, tomorrow.and_time(self.window.start)).with_timezone(&Utc)
        } else {
            self.next_start
        }
    }

    /// Advance the cycle to `now`.
    ///
    /// A crossed local midnight yields one `ReconcileDay` for the most
    /// recently finished day and resets the day state; a due window yields
    /// `ArmWindow` at most once per day, and only while the day is still
    /// `Pending`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<CycleAction> {
        let mut actions = Vec::new();
        let today = now.with_timezone(&self.tz).date_naive();

        if today > self.date {
            actions.push(CycleAction::ReconcileDay {
                finished: today.pred_opt().unwrap_or(self.date),
            });
            self.date = today;
            self.outcome = DayOutcome::Pending;
            self.armed = false;
            self.next_start =
                resolve_local(&self.tz, today.and_time(self.window.start)).with_timezone(&Utc);
        }

        if self.outcome == DayOutcome::Pending && !self.armed && now >= self.next_start {
            self.armed = true;
            actions.push(CycleAction::ArmWindow {
                start: self.next_start,
                end: self.next_start + self.window.duration(),
            });
        }

        actions
    }

    /// Record that today's session resolved with a check-in.
    pub fn note_check_in(&mut self, at: DateTime<Utc>) {
        self.outcome = DayOutcome::CheckedIn;
        self.last_check_in_at = Some(at);
    }

    /// Record that today's window escalated all the way to a penalty.
    pub fn note_penalized(&mut self) {
        self.outcome = DayOutcome::Penalized;
    }
}

/// Map a local datetime to an instant, tolerating DST folds and gaps.
fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Skipped by a DST gap; the same clock reading an hour later exists.
        LocalResult::None => match tz.from_local_datetime(&(local + Duration::hours(1))) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => Utc.from_utc_datetime(&local).with_timezone(tz),
        },
    }
}
