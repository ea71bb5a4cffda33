//! User-facing notifications and the gateway that delivers them.
//!
//! Notifications are fire-and-forget: the engine spawns delivery and logs
//! failures without letting them stall escalation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CallError, NotifyError};
use crate::gateway::ledger::{PenaltyPreview, PenaltyReceipt};
use crate::gateway::voice::{CallContext, CallReceipt, RetellClient};

/// Everything the engine can tell the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Window just opened.
    WorkoutReminder {
        gym_name: String,
        window_end: DateTime<Utc>,
    },
    /// Penalty at risk, with the precomputed damage.
    PenaltyWarning {
        minutes_remaining: i64,
        preview: PenaltyPreview,
    },
    /// The motivational call is being placed.
    MotivationalCallNotice,
    /// The window elapsed and the ledger moved money.
    PenaltyApplied { receipt: PenaltyReceipt },
    /// Check-in confirmed.
    CheckInSuccess { streak_days: u32, gym_name: String },
}

impl Notification {
    pub fn title(&self) -> &'static str {
        match self {
            Notification::WorkoutReminder { .. } => "💪 Workout time",
            Notification::PenaltyWarning { .. } => "⚠️ Penalty at risk",
            Notification::MotivationalCallNotice => "📞 Incoming call",
            Notification::PenaltyApplied { .. } => "💸 Penalty applied",
            Notification::CheckInSuccess { .. } => "✅ Checked in",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::WorkoutReminder {
                gym_name,
                window_end,
            } => format!(
                "Your workout window is open. Get to {} before {}.",
                gym_name,
                window_end.format("%H:%M")
            ),
            Notification::PenaltyWarning {
                minutes_remaining,
                preview,
            } => format!(
                "Check in within {} minutes or lose {} from your wallet \
                 ({} goes to the shopping balance).",
                minutes_remaining, preview.penalty, preview.shopping_credit
            ),
            Notification::MotivationalCallNotice => {
                "Still not at the gym. A motivational call is on its way.".to_string()
            }
            Notification::PenaltyApplied { receipt } => {
                if receipt.insufficient {
                    "Workout missed. Your wallet is empty, so nothing was deducted, \
                     but your streak is gone."
                        .to_string()
                } else {
                    format!(
                        "Workout missed. {} deducted, {} credited to shopping. \
                         Wallet is now {}. Streak reset.",
                        receipt.penalty, receipt.shopping_credit, receipt.balance_after
                    )
                }
            }
            Notification::CheckInSuccess {
                streak_days,
                gym_name,
            } => format!(
                "Nice work at {}. Your streak is now {} {}.",
                gym_name,
                streak_days,
                if *streak_days == 1 { "day" } else { "days" }
            ),
        }
    }
}

/// Contract into the notification collaborator.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver a notification.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Place the motivational call. Invoked at most once per escalation run.
    async fn place_motivational_call(
        &self,
        phone_number: &str,
        context: &CallContext,
    ) -> Result<CallReceipt, CallError>;
}

/// Gateway that writes notifications to the log stream and places real
/// calls through the voice provider when one is configured.
pub struct ConsoleNotifier {
    voice: Option<RetellClient>,
}

impl ConsoleNotifier {
    pub fn new(voice: Option<RetellClient>) -> Self {
        Self { voice }
    }
}

#[async_trait]
impl NotificationGateway for ConsoleNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            target: "sweatstake::notify",
            "{}: {}",
            notification.title(),
            notification.body()
        );
        Ok(())
    }

    async fn place_motivational_call(
        &self,
        phone_number: &str,
        context: &CallContext,
    ) -> Result<CallReceipt, CallError> {
        match &self.voice {
            Some(client) => client.place_call(phone_number, context).await,
            None => Err(CallError::NotConfigured),
        }
    }
}
