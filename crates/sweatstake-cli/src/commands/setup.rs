use chrono::Utc;
use clap::Subcommand;
use sweatstake_core::{
    preset_slots, Config, GymLocation, LedgerError, ProfileStore, SetupDocument, SetupProfile,
    SqliteLedger,
};

#[derive(Subcommand)]
pub enum SetupAction {
    /// Create the accountability contract
    Init {
        /// Gym display name
        #[arg(long)]
        gym_name: String,
        /// Gym latitude
        #[arg(long)]
        lat: f64,
        /// Gym longitude
        #[arg(long)]
        lng: f64,
        /// Daily window, e.g. "18:00 - 19:00" (see `setup slots`)
        #[arg(long)]
        time: String,
        /// Phone number for motivational calls
        #[arg(long)]
        phone: String,
        /// Stake amount backing the contract
        #[arg(long, default_value = "50")]
        bet: i64,
    },
    /// Show the stored contract
    Show,
    /// List the preset window slots
    Slots,
}

pub fn run(action: SetupAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SetupAction::Init {
            gym_name,
            lat,
            lng,
            time,
            phone,
            bet,
        } => {
            let doc = SetupDocument {
                gym: GymLocation {
                    name: gym_name,
                    lat,
                    lng,
                },
                workout_time: time,
                phone_number: phone,
                bet_amount: bet,
                created_at: Utc::now(),
            };
            // Validate before persisting anything.
            let profile = SetupProfile::from_document(&doc)?;

            let store = ProfileStore::open()?;
            store.save_setup(&doc)?;
            println!(
                "Contract saved: {} daily at {}, {} on the line.",
                profile.gym_name,
                profile.window.label(),
                profile.bet_amount
            );

            // The stake funds the wallet the first time through.
            let config = Config::load()?;
            let ledger = SqliteLedger::open()?.with_policy(config.policy.penalty_policy());
            match ledger.initialize_wallet(profile.bet_amount, Utc::now()) {
                Ok(progress) => println!("Wallet funded with {}.", progress.wallet_balance),
                Err(LedgerError::AlreadyInitialized) => {}
                Err(e) => return Err(e.into()),
            }
        }
        SetupAction::Show => {
            let store = ProfileStore::open()?;
            match store.load_setup()? {
                Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
                None => println!("No contract yet. Run `sweatstake setup init`."),
            }
        }
        SetupAction::Slots => {
            for slot in preset_slots() {
                println!("{slot}");
            }
        }
    }
    Ok(())
}
