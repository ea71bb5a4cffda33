use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escalation::EscalationStage;
use crate::gateway::ledger::{PenaltyPreview, PenaltyReceipt};

/// Every state change in the engine produces an EngineEvent.
/// The CLI streams them; tests assert on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    EngineStarted {
        at: DateTime<Utc>,
    },
    EngineStopped {
        at: DateTime<Utc>,
    },
    /// Today's window was scheduled and an escalation run created.
    WindowArmed {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// The window opened: reminder fired, monitor polling.
    RunActivated {
        at: DateTime<Utc>,
    },
    /// A penalty-at-risk warning fired.
    WarningFired {
        minutes_remaining: i64,
        preview: PenaltyPreview,
        at: DateTime<Utc>,
    },
    /// The motivational call is being placed.
    CallRequested {
        at: DateTime<Utc>,
    },
    CallPlaced {
        call_id: String,
        at: DateTime<Utc>,
    },
    /// The call failed; escalation continues regardless.
    CallFailed {
        error: String,
        at: DateTime<Utc>,
    },
    /// The monitor saw the user inside the gym radius.
    ArrivalDetected {
        distance_m: f64,
        at: DateTime<Utc>,
    },
    /// A check-in (automated or manual) advanced the streak.
    CheckInRecorded {
        streak_days: u32,
        total_sessions: u32,
        at: DateTime<Utc>,
    },
    /// The calendar day already had a check-in; nothing changed.
    AlreadyCheckedIn {
        at: DateTime<Utc>,
    },
    /// The window fully escalated and the ledger moved money.
    PenaltyApplied {
        receipt: PenaltyReceipt,
        at: DateTime<Utc>,
    },
    /// Midnight reconciliation reset the streak.
    StreakReset {
        at: DateTime<Utc>,
    },
    /// A polling read failed and was skipped.
    MonitorPollSkipped {
        error: String,
        at: DateTime<Utc>,
    },
    /// The active run was aborted before reaching a terminal stage.
    RunCancelled {
        stage: EscalationStage,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::EngineStarted { at }
            | EngineEvent::EngineStopped { at }
            | EngineEvent::WindowArmed { at, .. }
            | EngineEvent::RunActivated { at }
            | EngineEvent::WarningFired { at, .. }
            | EngineEvent::CallRequested { at }
            | EngineEvent::CallPlaced { at, .. }
            | EngineEvent::CallFailed { at, .. }
            | EngineEvent::ArrivalDetected { at, .. }
            | EngineEvent::CheckInRecorded { at, .. }
            | EngineEvent::AlreadyCheckedIn { at }
            | EngineEvent::PenaltyApplied { at, .. }
            | EngineEvent::StreakReset { at }
            | EngineEvent::MonitorPollSkipped { at, .. }
            | EngineEvent::RunCancelled { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_tag_by_type() {
        let event = EngineEvent::WarningFired {
            minutes_remaining: 45,
            preview: PenaltyPreview {
                penalty: 10,
                shopping_credit: 20,
                balance_after: 90,
            },
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "WarningFired");
        assert_eq!(json["minutes_remaining"], 45);
        assert_eq!(json["preview"]["penalty"], 10);
    }
}
