use clap::Subcommand;
use sweatstake_core::{Config, RetellClient};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the full config
    Show,
    /// Print the config file location
    Path,
    /// Get a config value
    Get {
        /// Dot-separated key, e.g. "policy.auto_radius_m"
        key: String,
    },
    /// Set a config value
    Set {
        /// Dot-separated key
        key: String,
        /// New value
        value: String,
    },
    /// Store the voice provider API key in the OS keyring
    SetKey {
        /// API key value
        key: String,
    },
    /// Remove the stored voice API key
    ForgetKey,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", Config::path()?.display());
        }
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::SetKey { key } => {
            RetellClient::store_api_key(&key)?;
            println!("Voice API key stored.");
        }
        ConfigAction::ForgetKey => {
            RetellClient::forget_api_key()?;
            println!("Voice API key removed.");
        }
    }
    Ok(())
}
