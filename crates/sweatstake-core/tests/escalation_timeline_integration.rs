//! Integration tests for the day cycle and escalation ladder working
//! together against a ledger.
//!
//! These drive the two state machines with an explicit simulated clock,
//! the same way the engine loop does, and verify the complete timeline of
//! a day: arming, activation, warnings, the call deadline, the penalty,
//! and next-morning streak reconciliation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use sweatstake_core::cycle::{CycleAction, DayCycle, DayOutcome};
use sweatstake_core::escalation::{EscalationAction, EscalationRun, EscalationStage};
use sweatstake_core::gateway::ledger::{LedgerGateway, MemoryLedger, UserProgress};
use sweatstake_core::setup::WorkoutWindow;

// ============================================================================
// Test Helpers
// ============================================================================

fn monday(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
}

fn tuesday(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 3, h, m, 0).unwrap()
}

fn evening_window() -> WorkoutWindow {
    WorkoutWindow::parse("18:00 - 19:00").unwrap()
}

/// Drive cycle and run exactly the way the engine loop does: cycle first,
/// arming a fresh run on demand, then the run. Returns everything that
/// fired at this instant.
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

// ============================================================================
// Full-Day Timelines
// ============================================================================

#[tokio::test]
async fn test_missed_day_walks_the_whole_ladder_on_schedule() {
    let ledger = MemoryLedger::with_progress(UserProgress {
        streak_days: 7,
        wallet_balance: 100,
        ..UserProgress::default()
    });
    let mut cycle = DayCycle::new(evening_window(), Utc, monday(12, 0), monday(12, 0));
    let mut run: Option<EscalationRun> = None;

    // Sample every minute from noon to just past the window, recording
    // what fired when.
    let mut timeline: Vec<(DateTime<Utc>, EscalationAction)> = Vec::new();
    let mut now = monday(12, 0);
    while now <= monday(19, 5) {
        let (_, actions) = drive(&mut cycle, &mut run, now);
        for action in actions {
            timeline.push((now, action));
        }
        now += Duration::minutes(1);
    }

    assert_eq!(
        timeline,
        vec![
            (monday(18, 0), EscalationAction::Activate),
            (monday(18, 15), EscalationAction::Warn { minutes_remaining: 45 }),
            (monday(18, 30), EscalationAction::PlaceCall { minutes_remaining: 30 }),
            (monday(18, 45), EscalationAction::Warn { minutes_remaining: 15 }),
            (monday(19, 0), EscalationAction::Penalize),
        ]
    );

    // Execute the penalty the way the engine would.
    let receipt = ledger
        .apply_penalty(monday(19, 0), monday(19, 0).date_naive())
        .await
        .unwrap()
        .receipt()
        .unwrap();
    cycle.note_penalized();

    assert_eq!(receipt.penalty, 10);
    assert_eq!(receipt.shopping_credit, 20);
    assert_eq!(receipt.balance_after, 90);
    assert_eq!(receipt.streak_before, 7);
    assert!(!receipt.insufficient);
    assert_eq!(cycle.state().outcome, DayOutcome::Penalized);

    // The rest of the evening stays quiet.
    let (cycle_actions, run_actions) = drive(&mut cycle, &mut run, monday(22, 0));
    assert!(cycle_actions.is_empty());
    assert!(run_actions.is_empty());
}

#[tokio::test]
async fn test_arrival_mid_window_completes_and_advances_the_streak() {
    let ledger = MemoryLedger::with_progress(UserProgress {
        streak_days: 3,
        total_sessions: 12,
        wallet_balance: 80,
        ..UserProgress::default()
    });
    let mut cycle = DayCycle::new(evening_window(), Utc, monday(12, 0), monday(12, 0));
    let mut run: Option<EscalationRun> = None;

    drive(&mut cycle, &mut run, monday(18, 0));
    let (_, actions) = drive(&mut cycle, &mut run, monday(18, 15));
    assert_eq!(actions, vec![EscalationAction::Warn { minutes_remaining: 45 }]);

    // Arrival at 18:20, before the call deadline.
    let arrived = run.as_mut().unwrap().arrive(monday(18, 20));
    assert!(arrived);
    assert_eq!(run.as_ref().unwrap().stage(), EscalationStage::Completed);

    let recorded = ledger
        .record_check_in(monday(18, 20), monday(18, 20).date_naive())
        .await
        .unwrap();
    cycle.note_check_in(monday(18, 20));

    let progress = recorded.progress();
    assert_eq!(progress.streak_days, 4);
    assert_eq!(progress.total_sessions, 13);
    assert_eq!(progress.wallet_balance, 80);

    // No call, no second warning, no penalty after completion.
    let mut now = monday(18, 21);
    while now <= monday(19, 5) {
        let (cycle_actions, run_actions) = drive(&mut cycle, &mut run, now);
        assert!(cycle_actions.is_empty());
        assert!(run_actions.is_empty());
        now += Duration::minutes(1);
    }
}

#[test]
fn test_suspension_across_the_window_fires_everything_on_resume() {
    let mut cycle = DayCycle::new(evening_window(), Utc, monday(12, 0), monday(12, 0));
    let mut run: Option<EscalationRun> = None;

    drive(&mut cycle, &mut run, monday(12, 0));

    // The process sleeps through the entire window and wakes at 19:30.
    let (cycle_actions, run_actions) = drive(&mut cycle, &mut run, monday(19, 30));
    assert_eq!(cycle_actions.len(), 1);
    assert!(matches!(cycle_actions[0], CycleAction::ArmWindow { .. }));
    assert_eq!(
        run_actions,
        vec![
            EscalationAction::Activate,
            EscalationAction::Warn { minutes_remaining: 45 },
            EscalationAction::PlaceCall { minutes_remaining: 30 },
            EscalationAction::Warn { minutes_remaining: 15 },
            EscalationAction::Penalize,
        ]
    );
    assert_eq!(run.as_ref().unwrap().stage(), EscalationStage::Penalized);
}

// ============================================================================
// Next-Morning Reconciliation
// ============================================================================

#[tokio::test]
async fn test_missed_day_reconciles_the_streak_next_morning() {
    let ledger = MemoryLedger::with_progress(UserProgress {
        streak_days: 5,
        wallet_balance: 50,
        ..UserProgress::default()
    });
    let mut cycle = DayCycle::new(evening_window(), Utc, monday(12, 0), monday(12, 0));
    let mut run: Option<EscalationRun> = None;

    // Monday passes with no check-in (process was down during the window).
    drive(&mut cycle, &mut run, monday(12, 0));

    // First tick on Tuesday reconciles Monday.
    let (cycle_actions, _) = drive(&mut cycle, &mut run, tuesday(0, 5));
    assert_eq!(
        cycle_actions,
        vec![CycleAction::ReconcileDay {
            finished: monday(0, 0).date_naive()
        }]
    );

    let reset = ledger
        .reconcile_missed_day(monday(0, 0).date_naive())
        .await
        .unwrap();
    assert!(reset);
    assert_eq!(ledger.progress().await.unwrap().streak_days, 0);

    // Tuesday's window still arms at its normal time.
    let (cycle_actions, run_actions) = drive(&mut cycle, &mut run, tuesday(18, 0));
    assert!(matches!(cycle_actions[0], CycleAction::ArmWindow { .. }));
    assert_eq!(run_actions, vec![EscalationAction::Activate]);
}

#[tokio::test]
async fn test_checked_in_day_survives_reconciliation() {
    let ledger = MemoryLedger::with_progress(UserProgress {
        streak_days: 9,
        wallet_balance: 50,
        ..UserProgress::default()
    });
    let mut cycle = DayCycle::new(evening_window(), Utc, monday(12, 0), monday(12, 0));
    let mut run: Option<EscalationRun> = None;

    drive(&mut cycle, &mut run, monday(18, 0));
    run.as_mut().unwrap().arrive(monday(18, 10));
    ledger
        .record_check_in(monday(18, 10), monday(18, 10).date_naive())
        .await
        .unwrap();
    cycle.note_check_in(monday(18, 10));

    let (cycle_actions, _) = drive(&mut cycle, &mut run, tuesday(7, 0));
    assert_eq!(
        cycle_actions,
        vec![CycleAction::ReconcileDay {
            finished: monday(0, 0).date_naive()
        }]
    );
    let reset = ledger
        .reconcile_missed_day(monday(0, 0).date_naive())
        .await
        .unwrap();
    assert!(!reset);
    assert_eq!(ledger.progress().await.unwrap().streak_days, 10);
}

// ============================================================================
// Consecutive Days
// ============================================================================

#[tokio::test]
async fn test_two_misses_in_a_row_compound_the_penalty() {
    let ledger = MemoryLedger::with_balance(100);
    let mut cycle = DayCycle::new(evening_window(), Utc, monday(12, 0), monday(12, 0));
    let mut run: Option<EscalationRun> = None;

    // Monday: full miss.
    drive(&mut cycle, &mut run, monday(12, 0));
    let (_, actions) = drive(&mut cycle, &mut run, monday(19, 0));
    assert!(actions.contains(&EscalationAction::Penalize));
    ledger
        .apply_penalty(monday(19, 0), monday(19, 0).date_naive())
        .await
        .unwrap();
    cycle.note_penalized();

    // Tuesday: rollover, then a second full miss.
    drive(&mut cycle, &mut run, tuesday(0, 5));
    ledger
        .reconcile_missed_day(monday(0, 0).date_naive())
        .await
        .unwrap();
    let (_, actions) = drive(&mut cycle, &mut run, tuesday(19, 0));
    assert!(actions.contains(&EscalationAction::Penalize));
    let receipt = ledger
        .apply_penalty(tuesday(19, 0), tuesday(19, 0).date_naive())
        .await
        .unwrap()
        .receipt()
        .unwrap();

    // 100 -> 90 on Monday, then round(90 * 0.1) = 9 on Tuesday.
    assert_eq!(receipt.penalty, 9);
    assert_eq!(receipt.balance_after, 81);
    let progress = ledger.progress().await.unwrap();
    assert_eq!(progress.wallet_balance, 81);
    assert_eq!(progress.shopping_balance, 20 + 18);
}
