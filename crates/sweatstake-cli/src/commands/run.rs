use std::sync::Arc;

use sweatstake_core::{
    CachedPositionSource, CallError, Config, ConsoleNotifier, EnginePolicy, GeoPoint,
    PositionSource, ProfileStore, RetellClient, SimulatedPositionSource, SqliteLedger,
    UnsupportedPositionSource, WorkflowEngine,
};
use tokio::sync::broadcast::error::RecvError;

pub async fn run(simulate: bool, watch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = ProfileStore::open()?;
    let identity = store.load_identity()?;
    let setup = store.load_setup()?;

    let position: Arc<dyn PositionSource> = if simulate {
        let gym = setup
            .as_ref()
            .map(|doc| GeoPoint::new(doc.gym.lat, doc.gym.lng))
            .ok_or("no contract to simulate against; run `sweatstake setup init` first")?;
        println!("Simulated position source standing at the gym.");
        Arc::new(CachedPositionSource::with_policy(
            SimulatedPositionSource::new(gym),
            config.policy.position_policy(),
        ))
    } else {
        // No location provider on a headless host: windows, warnings,
        // calls, and penalties still run; check-ins come from `checkin`.
        Arc::new(UnsupportedPositionSource)
    };

    let voice = match RetellClient::from_stored_key(config.voice.clone()) {
        Ok(client) => Some(client),
        Err(CallError::NotConfigured) => {
            println!("Voice calls disabled: no API key. Set one with `sweatstake config set-key`.");
            None
        }
        Err(e) => {
            println!("Voice calls disabled: {e}");
            None
        }
    };

    let ledger = Arc::new(SqliteLedger::open()?.with_policy(config.policy.penalty_policy()));
    let notifier = Arc::new(ConsoleNotifier::new(voice));
    let mut engine =
        WorkflowEngine::new(ledger, notifier, position, EnginePolicy::from_config(&config));

    if !engine.init_with(identity, setup).await? {
        return Err("not set up; run `sweatstake login` and `sweatstake setup init` first".into());
    }

    let mut events = engine.subscribe();
    engine.start().await?;
    println!("Engine running. Ctrl-C to stop.");

    if watch {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(event) => println!("{}", serde_json::to_string(&event)?),
                    Err(RecvError::Lagged(n)) => eprintln!("event stream lagged, {n} skipped"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
    }

    engine.stop().await;
    println!("Engine stopped.");
    Ok(())
}
