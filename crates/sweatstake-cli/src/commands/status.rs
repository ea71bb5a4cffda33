use serde::Serialize;
use sweatstake_core::storage::config::PolicyConfig;
use sweatstake_core::{
    Config, LedgerGateway, ProfileStore, SetupDocument, SqliteLedger, UserIdentity, UserProgress,
};

/// One-shot view assembled without a running engine.
#[derive(Serialize)]
struct StatusView {
    identity: Option<UserIdentity>,
    setup: Option<SetupDocument>,
    progress: UserProgress,
    policy: PolicyConfig,
}

pub async fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = ProfileStore::open()?;
    let ledger = SqliteLedger::open()?.with_policy(config.policy.penalty_policy());

    let view = StatusView {
        identity: store.load_identity()?,
        setup: store.load_setup()?,
        progress: ledger.progress().await?,
        policy: config.policy,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    match &view.identity {
        Some(identity) => println!("Logged in as {}", identity.email),
        None => println!("Not logged in."),
    }
    match &view.setup {
        Some(doc) => println!(
            "Contract: {} daily at {}, {} on the line",
            doc.gym.name, doc.workout_time, doc.bet_amount
        ),
        None => println!("No contract yet."),
    }
    let p = &view.progress;
    println!(
        "Streak: {} days | Sessions: {} | Wallet: {} | Shopping: {}",
        p.streak_days, p.total_sessions, p.wallet_balance, p.shopping_balance
    );
    if let Some(date) = p.last_check_in_date {
        println!("Last check-in: {date}");
    }
    println!(
        "Policy: {:.0} m auto / {:.0} m manual, poll every {} s, penalty {}% + {}% shopping",
        view.policy.auto_radius_m,
        view.policy.manual_radius_m,
        view.policy.poll_interval_ms / 1000,
        (view.policy.penalty_rate * 100.0).round() as i64,
        (view.policy.shopping_credit_rate * 100.0).round() as i64,
    );
    Ok(())
}
