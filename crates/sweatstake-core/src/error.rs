//! Core error types for sweatstake-core.
//!
//! This module defines the error hierarchy using thiserror. The taxonomy
//! mirrors how failures are actually handled: position problems degrade to
//! a skipped poll, call problems are logged and escalation continues,
//! ledger problems surface to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for sweatstake-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Position provider errors
    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    /// Check-in errors
    #[error("Check-in error: {0}")]
    CheckIn(#[from] CheckInError),

    /// Outbound call errors
    #[error("Call error: {0}")]
    Call(#[from] CallError),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Setup validation errors
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// A position reading could not be obtained.
///
/// Every variant carries its cause; the caller decides retry policy. During
/// automated polling these are logged and the tick is skipped; on manual
/// check-in they surface to the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    /// The user denied location access
    #[error("location permission denied")]
    PermissionDenied,

    /// No location provider is available on this host
    #[error("location provider unsupported on this host")]
    Unsupported,

    /// The provider did not answer within the read timeout
    #[error("position read timed out after {waited_ms} ms")]
    Timeout { waited_ms: u64 },

    /// Provider-specific failure
    #[error("position provider failed: {0}")]
    Provider(String),
}

/// Manual check-in failures.
#[derive(Error, Debug)]
pub enum CheckInError {
    /// The engine loop is not running; there is no writer to apply the check-in
    #[error("engine is not running")]
    NotRunning,

    /// Confirmed reading outside the manual radius
    #[error("too far from gym: {distance_m:.0} m away (radius {radius_m:.0} m)")]
    TooFar { distance_m: f64, radius_m: f64 },

    /// No confirmed reading; nothing was mutated
    #[error("position unavailable: {0}")]
    Position(#[from] PositionError),

    /// Recording the check-in failed
    #[error("ledger rejected check-in: {0}")]
    Ledger(#[from] LedgerError),
}

/// Outbound motivational-call failures. Logged at the call site; escalation
/// continues undeterred.
#[derive(Error, Debug)]
pub enum CallError {
    /// No API key stored for the voice provider
    #[error("voice provider API key is not configured")]
    NotConfigured,

    /// Credential storage (keyring) failure
    #[error("credential storage error: {0}")]
    Credential(String),

    /// Transport-level failure
    #[error("voice provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("voice provider error: HTTP {status}: {message}")]
    Provider { status: u16, message: String },
}

/// Notification delivery failures. Notifications are fire-and-forget, so
/// these are only ever logged.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The delivery channel rejected or dropped the notification
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Ledger errors.
///
/// Note what is *not* here: an exhausted wallet is a flagged receipt and a
/// same-day duplicate check-in is a no-op success. Neither is an error.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO failure resolving or creating the database location
    #[error("ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The wallet was never initialized
    #[error("wallet is not initialized")]
    NotInitialized,

    /// Wallet already holds funds; refusing to re-initialize
    #[error("wallet is already initialized")]
    AlreadyInitialized,

    /// Not enough shopping balance for the requested spend
    #[error("insufficient shopping balance: have {available}, need {requested}")]
    InsufficientShopping { available: i64, requested: i64 },

    /// Amounts must be positive
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// Stored state failed to parse
    #[error("ledger state is corrupt: {0}")]
    Corrupt(String),
}

/// Setup document validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetupError {
    /// A required field is empty or absent
    #[error("missing setup field: {0}")]
    MissingField(&'static str),

    /// The workout time string could not be parsed
    #[error("invalid workout time: '{0}' (expected 'HH:MM - HH:MM')")]
    InvalidTimeRange(String),

    /// The window has no duration
    #[error("workout window is empty: end ({end}) must be after start ({start})")]
    EmptyWindow {
        start: chrono::NaiveTime,
        end: chrono::NaiveTime,
    },

    /// Latitude/longitude outside valid range
    #[error("invalid coordinate for '{field}': {value}")]
    InvalidCoordinate { field: &'static str, value: f64 },

    /// The stake must be positive
    #[error("invalid bet amount: {0}")]
    InvalidBet(i64),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Dot-path key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Value cannot be parsed into the existing field's type
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Identity/setup document store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO failure reading or writing a document
    #[error("document IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A document exists but failed to parse
    #[error("document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
