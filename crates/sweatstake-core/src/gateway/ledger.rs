//! Ledger contract: progress, check-ins, penalties, streak reconciliation.
//!
//! The engine never touches wallet state directly. Everything goes through
//! [`LedgerGateway`], and every mutation is phrased so that replaying it is
//! harmless: a second check-in or penalty on the same day reports
//! `AlreadyToday`, a penalty against an empty wallet produces a flagged
//! receipt instead of an error, and reconciling an already-reconciled day
//! returns `false`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::LedgerError;

/// Progress snapshot as the ledger reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub streak_days: u32,
    pub total_sessions: u32,
    pub last_check_in_at: Option<DateTime<Utc>>,
    pub last_check_in_date: Option<NaiveDate>,
    pub last_penalty_date: Option<NaiveDate>,
    pub wallet_balance: i64,
    pub shopping_balance: i64,
}

/// Penalty math, in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyPolicy {
    /// Fraction of the wallet deducted on a miss (default: 0.1)
    pub penalty_rate: f64,
    /// Fraction of the wallet credited to the shopping balance (default: 0.2)
    pub shopping_credit_rate: f64,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            penalty_rate: 0.1,
            shopping_credit_rate: 0.2,
        }
    }
}

impl PenaltyPolicy {
    /// Deduction for a miss at the given balance. Never exceeds the balance.
    pub fn penalty_for(&self, balance: i64) -> i64 {
        if balance <= 0 {
            return 0;
        }
        ((balance as f64 * self.penalty_rate).round() as i64).min(balance)
    }

    /// Shopping credit for a miss, computed on the balance before deduction.
    pub fn credit_for(&self, balance: i64) -> i64 {
        if balance <= 0 {
            return 0;
        }
        (balance as f64 * self.shopping_credit_rate).round() as i64
    }
}

/// What a penalty would do right now. Shown in warnings before it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyPreview {
    pub penalty: i64,
    pub shopping_credit: i64,
    pub balance_after: i64,
}

/// What a penalty actually did.
///
/// `insufficient` marks a miss against an exhausted wallet: no money moved,
/// but the streak still reset. That is a recorded outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyReceipt {
    pub penalty: i64,
    pub shopping_credit: i64,
    pub balance_after: i64,
    pub shopping_after: i64,
    pub streak_before: u32,
    pub insufficient: bool,
    pub at: DateTime<Utc>,
}

/// Outcome of applying a penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyOutcome {
    /// First penalty of the day; money moved (possibly zero) and the
    /// streak reset.
    Applied(PenaltyReceipt),
    /// The day was already penalized; nothing changed.
    AlreadyToday,
}

impl PenaltyOutcome {
    pub fn receipt(&self) -> Option<PenaltyReceipt> {
        match self {
            PenaltyOutcome::Applied(receipt) => Some(*receipt),
            PenaltyOutcome::AlreadyToday => None,
        }
    }
}

/// Outcome of recording a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInRecorded {
    /// First check-in of the day; progress was advanced.
    Recorded(UserProgress),
    /// The day already had one; nothing changed.
    AlreadyToday(UserProgress),
}

impl CheckInRecorded {
    pub fn progress(&self) -> UserProgress {
        match self {
            CheckInRecorded::Recorded(p) | CheckInRecorded::AlreadyToday(p) => *p,
        }
    }
}

/// Contract into the ledger collaborator.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Current progress snapshot.
    async fn progress(&self) -> Result<UserProgress, LedgerError>;

    /// Record a confirmed gym arrival for `day`.
    ///
    /// At most one check-in counts per calendar day; a duplicate reports
    /// `AlreadyToday` without mutating anything.
    async fn record_check_in(
        &self,
        at: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<CheckInRecorded, LedgerError>;

    /// Apply the missed-workout penalty for `day` and reset the streak.
    ///
    /// At most one penalty counts per calendar day; a replay reports
    /// `AlreadyToday` without mutating anything.
    async fn apply_penalty(
        &self,
        at: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<PenaltyOutcome, LedgerError>;

    /// What `apply_penalty` would do right now. Pure read.
    async fn preview_penalty(&self) -> Result<PenaltyPreview, LedgerError>;

    /// A local day `finished` without a session outcome. Reset the streak
    /// if no check-in landed on that day or after it. Returns whether a
    /// reset happened; repeated calls for the same day return `false`.
    async fn reconcile_missed_day(&self, finished: NaiveDate) -> Result<bool, LedgerError>;
}

/// In-memory ledger for tests and the simulated runner.
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    policy: PenaltyPolicy,
}

struct MemoryState {
    progress: UserProgress,
    last_reconciled: Option<NaiveDate>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_progress(UserProgress::default())
    }

    pub fn with_balance(wallet_balance: i64) -> Self {
        Self::with_progress(UserProgress {
            wallet_balance,
            ..UserProgress::default()
        })
    }

    pub fn with_progress(progress: UserProgress) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                progress,
                last_reconciled: None,
            }),
            policy: PenaltyPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PenaltyPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn progress(&self) -> Result<UserProgress, LedgerError> {
        Ok(self.state.lock().await.progress)
    }

    async fn record_check_in(
        &self,
        at: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<CheckInRecorded, LedgerError> {
        let mut state = self.state.lock().await;
        if state.progress.last_check_in_date == Some(day) {
            return Ok(CheckInRecorded::AlreadyToday(state.progress));
        }
        state.progress.streak_days += 1;
        state.progress.total_sessions += 1;
        state.progress.last_check_in_at = Some(at);
        state.progress.last_check_in_date = Some(day);
        Ok(CheckInRecorded::Recorded(state.progress))
    }

    async fn apply_penalty(
        &self,
        at: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<PenaltyOutcome, LedgerError> {
        let mut state = self.state.lock().await;
        if state.progress.last_penalty_date == Some(day) {
            return Ok(PenaltyOutcome::AlreadyToday);
        }
        let balance = state.progress.wallet_balance;
        let insufficient = balance <= 0;
        let penalty = self.policy.penalty_for(balance);
        let credit = self.policy.credit_for(balance);
        let streak_before = state.progress.streak_days;

        state.progress.wallet_balance = (balance - penalty).max(0);
        state.progress.shopping_balance += credit;
        state.progress.streak_days = 0;
        state.progress.last_penalty_date = Some(day);

        Ok(PenaltyOutcome::Applied(PenaltyReceipt {
            penalty,
            shopping_credit: credit,
            balance_after: state.progress.wallet_balance,
            shopping_after: state.progress.shopping_balance,
            streak_before,
            insufficient,
            at,
        }))
    }

    async fn preview_penalty(&self) -> Result<PenaltyPreview, LedgerError> {
        let state = self.state.lock().await;
        let balance = state.progress.wallet_balance;
        let penalty = self.policy.penalty_for(balance);
        Ok(PenaltyPreview {
            penalty,
            shopping_credit: self.policy.credit_for(balance),
            balance_after: (balance - penalty).max(0),
        })
    }

    async fn reconcile_missed_day(&self, finished: NaiveDate) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().await;
        if state.last_reconciled == Some(finished) {
            return Ok(false);
        }
        state.last_reconciled = Some(finished);

        let covered = match state.progress.last_check_in_date {
            Some(d) => d >= finished,
            None => false,
        };
        if covered || state.progress.streak_days == 0 {
            return Ok(false);
        }
        state.progress.streak_days = 0;
        Ok(true)
    }
}
