//! SQLite-backed ledger: the progress row, wallet balances, and the
//! transaction history.
//!
//! One progress row (id = 1) carries the streak and both balances; every
//! money movement appends to `transactions`; `meta` holds the schema
//! version and the reconciliation watermark. Timestamps are RFC 3339 text,
//! calendar days are `YYYY-MM-DD` text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data_dir;
use crate::error::LedgerError;
use crate::gateway::ledger::{
    CheckInRecorded, LedgerGateway, PenaltyOutcome, PenaltyPolicy, PenaltyPreview, PenaltyReceipt,
    UserProgress,
};

const DB_FILE: &str = "sweatstake.db";
const SCHEMA_VERSION: u32 = 1;

/// Fraction kept when moving shopping credit back into the wallet.
const TRANSFER_FEE_RATE: f64 = 0.05;

/// Description prefixes shared between the writers and [`SqliteLedger::summary`].
const DESC_PENALTY: &str = "missed workout";
const DESC_SHOPPING_CREDIT: &str = "shopping credit";

/// Kind tags for the transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Opening stake deposit
    Initial,
    /// Money leaving a balance (penalty, shopping spend)
    Deduction,
    /// Money entering a balance (top-up, shopping credit)
    Credit,
    /// Shopping-to-wallet move
    Transfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Initial => "initial",
            TransactionKind::Deduction => "deduction",
            TransactionKind::Credit => "credit",
            TransactionKind::Transfer => "transfer",
        }
    }

    fn parse(s: &str) -> Result<Self, LedgerError> {
        match s {
            "initial" => Ok(TransactionKind::Initial),
            "deduction" => Ok(TransactionKind::Deduction),
            "credit" => Ok(TransactionKind::Credit),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(LedgerError::Corrupt(format!(
                "unknown transaction kind '{other}'"
            ))),
        }
    }
}

/// One row of the money history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub description: String,
    pub at: DateTime<Utc>,
}

/// Balances plus lifetime totals folded out of the transaction history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub wallet_balance: i64,
    pub shopping_balance: i64,
    /// Money put in from outside: the opening stake plus every top-up.
    pub total_deposited: i64,
    /// Everything the wallet has lost to missed workouts.
    pub total_penalties: i64,
    /// Shopping credit earned from missed workouts.
    pub total_shopping_credits: i64,
    pub last_penalty_at: Option<DateTime<Utc>>,
}

/// SQLite ledger.
///
/// The connection sits behind a mutex so the ledger can be shared as a
/// `LedgerGateway` across tasks; every operation takes the lock for the
/// duration of its statements.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    policy: PenaltyPolicy,
}

impl SqliteLedger {
    /// Open the ledger at `~/.config/sweatstake/sweatstake.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, LedgerError> {
        let path = data_dir()?.join(DB_FILE);
        Self::open_at(path)
    }

    /// Open the ledger at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory ledger, used by tests and simulated runs.
    pub fn open_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        let ledger = Self {
            conn: Mutex::new(conn),
            policy: PenaltyPolicy::default(),
        };
        ledger.migrate()?;
        Ok(ledger)
    }

    pub fn with_policy(mut self, policy: PenaltyPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Corrupt("connection mutex poisoned".into()))
    }

    fn migrate(&self) -> Result<(), LedgerError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS progress (
                id                 INTEGER PRIMARY KEY CHECK (id = 1),
                streak_days        INTEGER NOT NULL DEFAULT 0,
                total_sessions     INTEGER NOT NULL DEFAULT 0,
                last_check_in_at   TEXT,
                last_check_in_date TEXT,
                last_penalty_date  TEXT,
                wallet_balance     INTEGER NOT NULL DEFAULT 0,
                shopping_balance   INTEGER NOT NULL DEFAULT 0
            );
            INSERT OR IGNORE INTO progress (id) VALUES (1);

            CREATE TABLE IF NOT EXISTS transactions (
                id          TEXT PRIMARY KEY,
                kind        TEXT NOT NULL,
                amount      INTEGER NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                at          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_at ON transactions(at);

            CREATE TABLE IF NOT EXISTS meta (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        meta_set(&conn, "schema_version", &SCHEMA_VERSION.to_string())?;
        Ok(())
    }

    /// Fund the wallet for the first time.
    ///
    /// # Errors
    /// `InvalidAmount` for non-positive amounts, `AlreadyInitialized` if
    /// the wallet was funded before.
    pub fn initialize_wallet(
        &self,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<UserProgress, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let conn = self.lock()?;
        if meta_get(&conn, "wallet_initialized")?.is_some() {
            return Err(LedgerError::AlreadyInitialized);
        }
        let mut progress = read_progress(&conn)?;
        progress.wallet_balance = amount;
        write_progress(&conn, &progress)?;
        record_transaction(
            &conn,
            TransactionKind::Initial,
            amount,
            "initial stake deposit",
            at,
        )?;
        meta_set(&conn, "wallet_initialized", "true")?;
        Ok(progress)
    }

    /// Top the wallet up.
    pub fn add_funds(&self, amount: i64, at: DateTime<Utc>) -> Result<UserProgress, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let conn = self.lock()?;
        let mut progress = read_progress(&conn)?;
        progress.wallet_balance += amount;
        write_progress(&conn, &progress)?;
        record_transaction(&conn, TransactionKind::Credit, amount, "wallet top-up", at)?;
        Ok(progress)
    }

    /// Spend earned shopping credit.
    pub fn use_shopping_credits(
        &self,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<UserProgress, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let conn = self.lock()?;
        let mut progress = read_progress(&conn)?;
        if progress.shopping_balance < amount {
            return Err(LedgerError::InsufficientShopping {
                available: progress.shopping_balance,
                requested: amount,
            });
        }
        progress.shopping_balance -= amount;
        write_progress(&conn, &progress)?;
        record_transaction(
            &conn,
            TransactionKind::Deduction,
            amount,
            "shopping credit spent",
            at,
        )?;
        Ok(progress)
    }

    /// Move shopping credit back into the wallet, minus a 5% fee.
    pub fn transfer_shopping_to_wallet(
        &self,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<UserProgress, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let conn = self.lock()?;
        let mut progress = read_progress(&conn)?;
        if progress.shopping_balance < amount {
            return Err(LedgerError::InsufficientShopping {
                available: progress.shopping_balance,
                requested: amount,
            });
        }
        let fee = (amount as f64 * TRANSFER_FEE_RATE).round() as i64;
        progress.shopping_balance -= amount;
        progress.wallet_balance += amount - fee;
        write_progress(&conn, &progress)?;
        record_transaction(
            &conn,
            TransactionKind::Transfer,
            amount,
            &format!("shopping-to-wallet transfer (fee {fee})"),
            at,
        )?;
        Ok(progress)
    }

    /// Most recent money movements, newest first.
    pub fn recent_transactions(&self, limit: u32) -> Result<Vec<TransactionRecord>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, amount, description, at
             FROM transactions ORDER BY at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, kind, amount, description, at) = row?;
            records.push(TransactionRecord {
                id,
                kind: TransactionKind::parse(&kind)?,
                amount,
                description,
                at: parse_timestamp(&at)?,
            });
        }
        Ok(records)
    }

    /// Current balances plus lifetime totals.
    ///
    /// Penalty and shopping-credit rows are told apart from ordinary
    /// deductions and top-ups by the description prefixes the writers use.
    pub fn summary(&self) -> Result<WalletSummary, LedgerError> {
        let conn = self.lock()?;
        let progress = read_progress(&conn)?;
        let mut summary = WalletSummary {
            wallet_balance: progress.wallet_balance,
            shopping_balance: progress.shopping_balance,
            ..WalletSummary::default()
        };

        let mut stmt = conn.prepare("SELECT kind, amount, description, at FROM transactions")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        for row in rows {
            let (kind, amount, description, at) = row?;
            match TransactionKind::parse(&kind)? {
                TransactionKind::Initial => summary.total_deposited += amount,
                TransactionKind::Credit if description.starts_with(DESC_SHOPPING_CREDIT) => {
                    summary.total_shopping_credits += amount;
                }
                TransactionKind::Credit => summary.total_deposited += amount,
                TransactionKind::Deduction if description.starts_with(DESC_PENALTY) => {
                    summary.total_penalties += amount;
                    let at = parse_timestamp(&at)?;
                    summary.last_penalty_at =
                        Some(summary.last_penalty_at.map_or(at, |prev| prev.max(at)));
                }
                TransactionKind::Deduction | TransactionKind::Transfer => {}
            }
        }
        Ok(summary)
    }
}

#[async_trait]
impl LedgerGateway for SqliteLedger {
    async fn progress(&self) -> Result<UserProgress, LedgerError> {
        let conn = self.lock()?;
        read_progress(&conn)
    }

    async fn record_check_in(
        &self,
        at: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<CheckInRecorded, LedgerError> {
        let conn = self.lock()?;
        let mut progress = read_progress(&conn)?;
        if progress.last_check_in_date == Some(day) {
            return Ok(CheckInRecorded::AlreadyToday(progress));
        }
        progress.streak_days += 1;
        progress.total_sessions += 1;
        progress.last_check_in_at = Some(at);
        progress.last_check_in_date = Some(day);
        write_progress(&conn, &progress)?;
        Ok(CheckInRecorded::Recorded(progress))
    }

    async fn apply_penalty(
        &self,
        at: DateTime<Utc>,
        day: NaiveDate,
    ) -> Result<PenaltyOutcome, LedgerError> {
        let conn = self.lock()?;
        let mut progress = read_progress(&conn)?;
        if progress.last_penalty_date == Some(day) {
            return Ok(PenaltyOutcome::AlreadyToday);
        }

        let balance = progress.wallet_balance;
        let insufficient = balance <= 0;
        let penalty = self.policy.penalty_for(balance);
        let credit = self.policy.credit_for(balance);
        let streak_before = progress.streak_days;

        progress.wallet_balance = (balance - penalty).max(0);
        progress.shopping_balance += credit;
        progress.streak_days = 0;
        progress.last_penalty_date = Some(day);
        write_progress(&conn, &progress)?;

        if penalty > 0 {
            record_transaction(
                &conn,
                TransactionKind::Deduction,
                penalty,
                &format!("{DESC_PENALTY} on {day}"),
                at,
            )?;
        }
        if credit > 0 {
            record_transaction(
                &conn,
                TransactionKind::Credit,
                credit,
                &format!("{DESC_SHOPPING_CREDIT} for missed workout on {day}"),
                at,
            )?;
        }

        Ok(PenaltyOutcome::Applied(PenaltyReceipt {
            penalty,
            shopping_credit: credit,
            balance_after: progress.wallet_balance,
            shopping_after: progress.shopping_balance,
            streak_before,
            insufficient,
            at,
        }))
    }

    async fn preview_penalty(&self) -> Result<PenaltyPreview, LedgerError> {
        let conn = self.lock()?;
        let progress = read_progress(&conn)?;
        let balance = progress.wallet_balance;
        let penalty = self.policy.penalty_for(balance);
        Ok(PenaltyPreview {
            penalty,
            shopping_credit: self.policy.credit_for(balance),
            balance_after: (balance - penalty).max(0),
        })
    }

    async fn reconcile_missed_day(&self, finished: NaiveDate) -> Result<bool, LedgerError> {
        let conn = self.lock()?;
        let watermark = finished.format("%Y-%m-%d").to_string();
        if meta_get(&conn, "last_reconciled")?.as_deref() == Some(watermark.as_str()) {
            return Ok(false);
        }
        meta_set(&conn, "last_reconciled", &watermark)?;

        let mut progress = read_progress(&conn)?;
        let covered = progress
            .last_check_in_date
            .map(|d| d >= finished)
            .unwrap_or(false);
        if covered || progress.streak_days == 0 {
            return Ok(false);
        }
        progress.streak_days = 0;
        write_progress(&conn, &progress)?;
        Ok(true)
    }
}

fn read_progress(conn: &Connection) -> Result<UserProgress, LedgerError> {
    let (streak, sessions, at, date, penalty_date, wallet, shopping) = conn.query_row(
        "SELECT streak_days, total_sessions, last_check_in_at, last_check_in_date,
                last_penalty_date, wallet_balance, shopping_balance
         FROM progress WHERE id = 1",
        [],
        |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))
        },
    )?;
    Ok(UserProgress {
        streak_days: streak,
        total_sessions: sessions,
        last_check_in_at: at.as_deref().map(parse_timestamp).transpose()?,
        last_check_in_date: date.as_deref().map(parse_day).transpose()?,
        last_penalty_date: penalty_date.as_deref().map(parse_day).transpose()?,
        wallet_balance: wallet,
        shopping_balance: shopping,
    })
}

fn write_progress(conn: &Connection, progress: &UserProgress) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE progress
         SET streak_days = ?1, total_sessions = ?2, last_check_in_at = ?3,
             last_check_in_date = ?4, last_penalty_date = ?5,
             wallet_balance = ?6, shopping_balance = ?7
         WHERE id = 1",
        params![
            progress.streak_days,
            progress.total_sessions,
            progress.last_check_in_at.map(|d| d.to_rfc3339()),
            progress
                .last_check_in_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            progress
                .last_penalty_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            progress.wallet_balance,
            progress.shopping_balance,
        ],
    )?;
    Ok(())
}

fn record_transaction(
    conn: &Connection,
    kind: TransactionKind,
    amount: i64,
    description: &str,
    at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO transactions (id, kind, amount, description, at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            kind.as_str(),
            amount,
            description,
            at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn meta_get(conn: &Connection, key: &str) -> Result<Option<String>, LedgerError> {
    let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
    match stmt.query_row(params![key], |row| row.get::<_, String>(0)) {
        Ok(v) => Ok(Some(v)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn meta_set(conn: &Connection, key: &str, value: &str) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt(format!("bad timestamp '{s}': {e}")))
}

fn parse_day(s: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| LedgerError::Corrupt(format!("bad date '{s}': {e}")))
}
