//! # Sweatstake Core Library
//!
//! This library provides the core business logic for Sweatstake, a
//! gym-accountability engine: the user stakes real money on a daily workout
//! window, the engine verifies attendance by location, and missed days cost
//! a cut of the wallet. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary, with any GUI being
//! a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Workflow Engine**: A wall-clock-based event loop that samples `now`
//!   on a short interval and drives two pure state machines, the day cycle
//!   and the escalation run
//! - **Monitoring**: Background location polling with arrival detection,
//!   plus an explicit manual check-in path with a wider radius
//! - **Gateways**: Traits at the outbound seams (ledger, notifications,
//!   voice calls) with production and in-memory implementations
//! - **Storage**: SQLite-based wallet ledger, TOML-based configuration,
//!   JSON document store for identity and setup
//!
//! ## Key Components
//!
//! - [`WorkflowEngine`]: Engine lifecycle and the single-writer loop
//! - [`EscalationRun`]: The warning ladder for one workout window
//! - [`DayCycle`]: Daily arming, midnight rollover, streak reconciliation
//! - [`SqliteLedger`]: Wallet, streak, and transaction persistence
//! - [`Config`]: Application configuration management

pub mod cycle;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod events;
pub mod gateway;
pub mod geo;
pub mod monitor;
pub mod position;
pub mod setup;
pub mod storage;

pub use cycle::{CycleAction, DayCycle, DayOutcome};
pub use engine::{EnginePolicy, EngineStatus, WorkflowEngine};
pub use error::{
    CallError, CheckInError, ConfigError, CoreError, LedgerError, NotifyError, PositionError,
    Result, SetupError, StoreError,
};
pub use escalation::{EscalationAction, EscalationLadder, EscalationRun, EscalationStage};
pub use events::EngineEvent;
pub use gateway::{
    CallContext, CallReceipt, CheckInRecorded, ConsoleNotifier, LedgerGateway, MemoryLedger,
    Notification, NotificationGateway, PenaltyOutcome, PenaltyPolicy, PenaltyPreview,
    PenaltyReceipt, RetellClient, UserProgress, VoiceConfig,
};
pub use geo::{distance_meters, within_radius, GeoPoint, Target};
pub use monitor::{manual_probe, ManualFix, MonitorEvent, MonitorPolicy, SessionMonitor};
pub use position::{
    watch_positions, CachedPositionSource, PositionFix, PositionPolicy, PositionSource,
    PositionWatch, SimulatedPositionSource, UnsupportedPositionSource,
};
pub use setup::{
    preset_slots, GymLocation, SetupDocument, SetupProfile, UserIdentity, WindowMode,
    WorkoutWindow,
};
pub use storage::{
    Config, ProfileStore, SqliteLedger, TransactionKind, TransactionRecord, WalletSummary,
};
