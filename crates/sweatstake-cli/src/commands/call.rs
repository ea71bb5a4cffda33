use clap::Subcommand;
use sweatstake_core::{Config, RetellClient};

#[derive(Subcommand)]
pub enum CallAction {
    /// Probe voice provider connectivity with the stored key
    Test,
}

pub async fn run(action: CallAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CallAction::Test => {
            let config = Config::load()?;
            let client = RetellClient::from_stored_key(config.voice)?;
            client.test_connection().await?;
            println!("Voice provider reachable, credentials accepted.");
        }
    }
    Ok(())
}
