pub mod auth;
pub mod call;
pub mod checkin;
pub mod config;
pub mod run;
pub mod setup;
pub mod status;
pub mod wallet;
