use chrono::Utc;
use clap::Subcommand;
use sweatstake_core::{Config, LedgerGateway, SqliteLedger};

#[derive(Subcommand)]
pub enum WalletAction {
    /// Balances and lifetime totals
    Balance {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recent transactions, newest first
    History {
        /// Maximum entries
        #[arg(long, default_value = "20")]
        limit: u32,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// What missing today would cost right now
    Preview,
    /// Add funds to the wallet
    Add {
        /// Amount in whole currency units
        amount: i64,
    },
    /// Spend shopping credit
    Spend {
        /// Amount in whole currency units
        amount: i64,
    },
    /// Move shopping credit back to the wallet, minus the 5% fee
    Transfer {
        /// Amount in whole currency units
        amount: i64,
    },
}

pub async fn run(action: WalletAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let ledger = SqliteLedger::open()?.with_policy(config.policy.penalty_policy());

    match action {
        WalletAction::Balance { json } => {
            let summary = ledger.summary()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Wallet: {}", summary.wallet_balance);
                println!("Shopping: {}", summary.shopping_balance);
                println!(
                    "Lifetime: {} deposited, {} lost to penalties, {} earned as shopping credit",
                    summary.total_deposited,
                    summary.total_penalties,
                    summary.total_shopping_credits
                );
                if let Some(at) = summary.last_penalty_at {
                    println!("Last penalty: {}", at.format("%Y-%m-%d %H:%M"));
                }
            }
        }
        WalletAction::History { limit, json } => {
            let records = ledger.recent_transactions(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No transactions yet.");
            } else {
                for record in records {
                    println!(
                        "{}  {:<9} {:>6}  {}",
                        record.at.format("%Y-%m-%d %H:%M"),
                        record.kind.as_str(),
                        record.amount,
                        record.description
                    );
                }
            }
        }
        WalletAction::Preview => {
            let preview = ledger.preview_penalty().await?;
            println!(
                "Missing today costs {}: wallet drops to {}, shopping gains {}.",
                preview.penalty, preview.balance_after, preview.shopping_credit
            );
        }
        WalletAction::Add { amount } => {
            let progress = ledger.add_funds(amount, Utc::now())?;
            println!("Added {}. Wallet: {}.", amount, progress.wallet_balance);
        }
        WalletAction::Spend { amount } => {
            let progress = ledger.use_shopping_credits(amount, Utc::now())?;
            println!("Spent {}. Shopping: {}.", amount, progress.shopping_balance);
        }
        WalletAction::Transfer { amount } => {
            let progress = ledger.transfer_shopping_to_wallet(amount, Utc::now())?;
            println!(
                "Transferred {}. Wallet: {}, shopping: {}.",
                amount, progress.wallet_balance, progress.shopping_balance
            );
        }
    }
    Ok(())
}
