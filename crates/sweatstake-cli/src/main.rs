use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "sweatstake", version, about = "Sweatstake CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accountability contract setup
    Setup {
        #[command(subcommand)]
        action: commands::setup::SetupAction,
    },
    /// Log in with an email address
    Login {
        /// Email address
        #[arg(long)]
        email: String,
    },
    /// Log out and clear the stored documents
    Logout,
    /// Run the accountability engine until Ctrl-C
    Run {
        /// Use a simulated position source standing at the gym
        #[arg(long)]
        simulate: bool,
        /// Stream engine events as JSON lines
        #[arg(long)]
        watch: bool,
    },
    /// Show documents, progress, and policy
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check in manually at the given coordinates
    Checkin {
        /// Current latitude
        #[arg(long)]
        lat: f64,
        /// Current longitude
        #[arg(long)]
        lng: f64,
    },
    /// Wallet and shopping balance
    Wallet {
        #[command(subcommand)]
        action: commands::wallet::WalletAction,
    },
    /// Voice call provider
    Call {
        #[command(subcommand)]
        action: commands::call::CallAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Setup { action } => commands::setup::run(action),
        Commands::Login { email } => commands::auth::login(&email),
        Commands::Logout => commands::auth::logout(),
        Commands::Run { simulate, watch } => commands::run::run(simulate, watch).await,
        Commands::Status { json } => commands::status::run(json).await,
        Commands::Checkin { lat, lng } => commands::checkin::run(lat, lng).await,
        Commands::Wallet { action } => commands::wallet::run(action).await,
        Commands::Call { action } => commands::call::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so JSON output on stdout stays pipeable.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("SWEATSTAKE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
