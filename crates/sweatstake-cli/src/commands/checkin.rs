use std::sync::Arc;

use sweatstake_core::{
    CheckInRecorded, Config, ConsoleNotifier, EnginePolicy, GeoPoint, ProfileStore,
    SimulatedPositionSource, SqliteLedger, WorkflowEngine,
};

/// Manual check-in from the given coordinates.
///
/// The engine API is in-process only, so this spins up a short-lived
/// engine around the shared ledger, probes once against the manual
/// radius, and tears down. A `run` engine in another process sees the
/// result through the ledger.
pub async fn run(lat: f64, lng: f64) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = ProfileStore::open()?;

    let ledger = Arc::new(SqliteLedger::open()?.with_policy(config.policy.penalty_policy()));
    let notifier = Arc::new(ConsoleNotifier::new(None));
    let position = Arc::new(SimulatedPositionSource::new(GeoPoint::new(lat, lng)));
    let mut engine =
        WorkflowEngine::new(ledger, notifier, position, EnginePolicy::from_config(&config));

    if !engine.init(&store).await? {
        return Err("not set up; run `sweatstake login` and `sweatstake setup init` first".into());
    }

    engine.start().await?;
    let result = engine.manual_check_in().await;
    engine.stop().await;

    match result? {
        CheckInRecorded::Recorded(progress) => println!(
            "Checked in. Streak: {} {}, sessions: {}.",
            progress.streak_days,
            if progress.streak_days == 1 { "day" } else { "days" },
            progress.total_sessions
        ),
        CheckInRecorded::AlreadyToday(_) => println!("Already checked in today."),
    }
    Ok(())
}
