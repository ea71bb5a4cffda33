//! Integration tests for the SQLite ledger behind the gateway trait.
//!
//! These verify the complete workflow across several simulated days: the
//! state machines decide what happens, the ledger persists it, and the
//! transaction history tells the story afterwards, including across a
//! process restart.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sweatstake_core::cycle::{CycleAction, DayCycle};
use sweatstake_core::escalation::{EscalationAction, EscalationRun};
use sweatstake_core::gateway::ledger::LedgerGateway;
use sweatstake_core::setup::WorkoutWindow;
use sweatstake_core::storage::ledger_db::{SqliteLedger, TransactionKind};

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, h, m, 0).unwrap()
}

/// One engine-shaped pass: cycle, arm on demand, then the run.
fn drive(
    cycle: &mut DayCycle<Utc>,
    run: &mut Option<EscalationRun>,
    now: DateTime<Utc>,
) -> (Vec<CycleAction>, Vec<EscalationAction>) {
    let cycle_actions = cycle.tick(now);
    for action in &cycle_actions {
        if let CycleAction::ArmWindow { start, end } = action {
            *run = Some(EscalationRun::new(*start, *end));
        }
    }
    let run_actions = match run {
        Some(run) => run.tick(now),
        None => Vec::new(),
    };
    (cycle_actions, run_actions)
}

#[tokio::test]
async fn test_three_day_story_lands_in_the_database() {
    let ledger = SqliteLedger::open_memory().unwrap();
    ledger.initialize_wallet(100, at(1, 9, 0)).unwrap();

    let window = WorkoutWindow::parse("18:00 - 19:00").unwrap();
    let mut cycle = DayCycle::new(window, Utc, at(1, 12, 0), at(1, 12, 0));
    let mut run: Option<EscalationRun> = None;

    // Day 1: shows up twenty minutes in.
    drive(&mut cycle, &mut run, at(1, 18, 0));
    assert!(run.as_mut().unwrap().arrive(at(1, 18, 20)));
    ledger
        .record_check_in(at(1, 18, 20), at(1, 18, 20).date_naive())
        .await
        .unwrap();
    cycle.note_check_in(at(1, 18, 20));

    // Day 2: rollover spares the covered day, then a full miss.
    let (actions, _) = drive(&mut cycle, &mut run, at(2, 7, 0));
    assert_eq!(
        actions,
        vec![CycleAction::ReconcileDay {
            finished: at(1, 0, 0).date_naive()
        }]
    );
    assert!(!ledger
        .reconcile_missed_day(at(1, 0, 0).date_naive())
        .await
        .unwrap());

    let (_, actions) = drive(&mut cycle, &mut run, at(2, 19, 0));
    assert!(actions.contains(&EscalationAction::Penalize));
    let receipt = ledger
        .apply_penalty(at(2, 19, 0), at(2, 19, 0).date_naive())
        .await
        .unwrap()
        .receipt()
        .unwrap();
    cycle.note_penalized();
    assert_eq!(receipt.penalty, 10);
    assert_eq!(receipt.streak_before, 1);

    // Day 3: the penalized day needs no further reconciliation (the streak
    // is already gone), and a new check-in starts a fresh streak.
    let (actions, _) = drive(&mut cycle, &mut run, at(3, 7, 0));
    assert_eq!(
        actions,
        vec![CycleAction::ReconcileDay {
            finished: at(2, 0, 0).date_naive()
        }]
    );
    assert!(!ledger
        .reconcile_missed_day(at(2, 0, 0).date_naive())
        .await
        .unwrap());

    drive(&mut cycle, &mut run, at(3, 18, 0));
    assert!(run.as_mut().unwrap().arrive(at(3, 18, 5)));
    ledger
        .record_check_in(at(3, 18, 5), at(3, 18, 5).date_naive())
        .await
        .unwrap();

    let progress = ledger.progress().await.unwrap();
    assert_eq!(progress.streak_days, 1);
    assert_eq!(progress.total_sessions, 2);
    assert_eq!(progress.wallet_balance, 90);
    assert_eq!(progress.shopping_balance, 20);

    // History, newest first: penalty credit, penalty deduction, deposit.
    let history = ledger.recent_transactions(10).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].kind, TransactionKind::Credit);
    assert_eq!(history[0].amount, 20);
    assert!(history[0].description.contains("2025-06-02"));
    assert_eq!(history[1].kind, TransactionKind::Deduction);
    assert_eq!(history[1].amount, 10);
    assert_eq!(history[2].kind, TransactionKind::Initial);
    assert_eq!(history[2].amount, 100);
}

#[tokio::test]
async fn test_wallet_arc_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweatstake.db");

    {
        let ledger = SqliteLedger::open_at(&path).unwrap();
        ledger.initialize_wallet(200, at(1, 9, 0)).unwrap();
        ledger
            .apply_penalty(at(1, 19, 0), at(1, 19, 0).date_naive())
            .await
            .unwrap();
        ledger.use_shopping_credits(15, at(2, 10, 0)).unwrap();
        ledger.transfer_shopping_to_wallet(20, at(2, 11, 0)).unwrap();
    }

    // 200 -> penalty 20 -> wallet 180, shopping 40.
    // Spend 15 -> shopping 25. Transfer 20 (fee 1) -> wallet 199, shopping 5.
    let ledger = SqliteLedger::open_at(&path).unwrap();
    let progress = ledger.progress().await.unwrap();
    assert_eq!(progress.wallet_balance, 199);
    assert_eq!(progress.shopping_balance, 5);

    let history = ledger.recent_transactions(10).unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[0].kind, TransactionKind::Transfer);
    assert!(history[0].description.contains("fee 1"));

    // The reopened ledger refuses a second initialization.
    assert!(ledger.initialize_wallet(50, at(3, 9, 0)).is_err());
}

#[tokio::test]
async fn test_watermark_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweatstake.db");
    let missed = at(1, 0, 0).date_naive();

    {
        let ledger = SqliteLedger::open_at(&path).unwrap();
        ledger
            .record_check_in(at(1, 18, 0) - Duration::days(1), missed.pred_opt().unwrap())
            .await
            .unwrap();
        assert!(ledger.reconcile_missed_day(missed).await.unwrap());
    }

    // After a restart the same finished day stays reconciled.
    let ledger = SqliteLedger::open_at(&path).unwrap();
    assert!(!ledger.reconcile_missed_day(missed).await.unwrap());
    assert_eq!(ledger.progress().await.unwrap().streak_days, 0);
}
