use chrono::Utc;
use sweatstake_core::{ProfileStore, UserIdentity};

pub fn login(email: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !email.contains('@') {
        return Err("a full email address is required".into());
    }
    let store = ProfileStore::open()?;
    let identity = UserIdentity::new(email, Utc::now());
    store.save_identity(&identity)?;
    println!("Logged in as {}", identity.email);
    Ok(())
}

/// Clears both documents. The ledger and its history stay.
pub fn logout() -> Result<(), Box<dyn std::error::Error>> {
    let store = ProfileStore::open()?;
    store.clear_identity()?;
    store.clear_setup()?;
    println!("Logged out");
    Ok(())
}
