pub mod config;
pub mod ledger_db;
pub mod profile;

pub use config::Config;
pub use ledger_db::{SqliteLedger, TransactionKind, TransactionRecord, WalletSummary};
pub use profile::ProfileStore;

use std::path::PathBuf;

/// Returns `~/.config/sweatstake[-dev]/` based on SWEATSTAKE_ENV.
///
/// Set SWEATSTAKE_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SWEATSTAKE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("sweatstake-dev")
    } else {
        base_dir.join("sweatstake")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
