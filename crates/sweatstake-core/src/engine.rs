//! The workflow engine: lifecycle, wiring, and the single-writer loop.
//!
//! One spawned task owns every piece of mutable state (the day cycle, the
//! escalation run, the monitor handles) and is the only writer. Everything
//! else talks to it through channels: commands in via mpsc, events out via
//! broadcast, status out via watch. The loop samples the wall clock on a
//! short interval and feeds it to the pure state machines, so deadlines
//! hold across process suspensions.
//!
//! Select priority inside the loop is deliberate: commands and monitor
//! events are served before the ticker, so an arrival that races a penalty
//! deadline resolves as `Completed`. Slow work (position reads, HTTP calls,
//! notification delivery) runs on spawned tasks; only ledger mutations are
//! awaited inline, keeping them serialized with everything else that
//! touches the day's outcome.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cycle::{CycleAction, DayCycle, DayOutcome};
use crate::error::{CheckInError, CoreError, Result};
use crate::escalation::{EscalationAction, EscalationLadder, EscalationRun, EscalationStage};
use crate::events::EngineEvent;
use crate::gateway::ledger::{CheckInRecorded, LedgerGateway, PenaltyOutcome, PenaltyPreview};
use crate::gateway::notify::{Notification, NotificationGateway};
use crate::gateway::voice::CallContext;
use crate::monitor::{manual_probe, ManualFix, MonitorEvent, MonitorPolicy, SessionMonitor};
use crate::position::PositionSource;
use crate::setup::{SetupDocument, SetupProfile, UserIdentity};
use crate::storage::config::{Config, EngineConfig};
use crate::storage::profile::ProfileStore;

/// Everything that parameterizes a running engine.
#[derive(Debug, Clone, Default)]
pub struct EnginePolicy {
    pub monitor: MonitorPolicy,
    pub ladder: EscalationLadder,
    pub engine: EngineConfig,
}

impl EnginePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            monitor: config.policy.monitor_policy(),
            ladder: config.policy.ladder(),
            engine: config.engine.clone(),
        }
    }
}

/// Read-only snapshot for UIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub window_armed: bool,
    pub day_outcome: DayOutcome,
    pub stage: Option<EscalationStage>,
    pub next_window_at: Option<DateTime<Utc>>,
    pub as_of: DateTime<Utc>,
}

impl EngineStatus {
    fn stopped(as_of: DateTime<Utc>) -> Self {
        Self {
            running: false,
            window_armed: false,
            day_outcome: DayOutcome::Pending,
            stage: None,
            next_window_at: None,
            as_of,
        }
    }
}

enum Command {
    ApplyCheckIn {
        fix: ManualFix,
        respond: oneshot::Sender<std::result::Result<CheckInRecorded, CheckInError>>,
    },
    Shutdown,
}

/// Facade owning the engine lifecycle.
pub struct WorkflowEngine {
    ledger: Arc<dyn LedgerGateway>,
    notifier: Arc<dyn NotificationGateway>,
    position: Arc<dyn PositionSource>,
    policy: EnginePolicy,
    identity: Option<UserIdentity>,
    profile: Option<SetupProfile>,
    events: broadcast::Sender<EngineEvent>,
    status_tx: Arc<watch::Sender<EngineStatus>>,
    status_rx: watch::Receiver<EngineStatus>,
    commands: Option<mpsc::Sender<Command>>,
    loop_handle: Option<JoinHandle<()>>,
}

impl WorkflowEngine {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        notifier: Arc<dyn NotificationGateway>,
        position: Arc<dyn PositionSource>,
        policy: EnginePolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(policy.engine.event_buffer);
        let (status_tx, status_rx) = watch::channel(EngineStatus::stopped(Utc::now()));
        Self {
            ledger,
            notifier,
            position,
            policy,
            identity: None,
            profile: None,
            events,
            status_tx: Arc::new(status_tx),
            status_rx,
            commands: None,
            loop_handle: None,
        }
    }

    /// Load the external documents the engine depends on.
    ///
    /// Returns `Ok(false)` when identity or setup is absent. That is the
    /// not-set-up gate, not a failure; `start()` will refuse until both
    /// documents exist.
    pub async fn init(&mut self, store: &ProfileStore) -> Result<bool> {
        let identity = store.load_identity()?;
        let setup = store.load_setup()?;
        self.init_with(identity, setup).await
    }

    /// Same gate with the documents supplied directly.
    pub async fn init_with(
        &mut self,
        identity: Option<UserIdentity>,
        setup: Option<SetupDocument>,
    ) -> Result<bool> {
        let (identity, setup) = match (identity, setup) {
            (Some(identity), Some(setup)) => (identity, setup),
            _ => {
                info!("identity or setup document absent, engine stays idle");
                return Ok(false);
            }
        };
        let profile = SetupProfile::from_document(&setup)?;
        // The third document: progress must be readable before we arm
        // anything that would mutate it.
        self.ledger.progress().await?;

        self.identity = Some(identity);
        self.profile = Some(profile);
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.is_some() && self.profile.is_some()
    }

    /// Start the event loop. Idempotent: starting while running restarts.
    pub async fn start(&mut self) -> Result<()> {
        if self.loop_handle.is_some() {
            info!("engine already running, restarting");
            self.stop().await;
        }
        let identity = self
            .identity
            .clone()
            .ok_or_else(|| CoreError::Custom("engine is not initialized".into()))?;
        let profile = self
            .profile
            .clone()
            .ok_or_else(|| CoreError::Custom("engine is not initialized".into()))?;

        let now = Utc::now();
        let mut cycle = DayCycle::new(profile.window, Local, now, profile.created_at);
        // Rehydrate today's outcome so a restart does not re-arm a day the
        // ledger already settled, whichever way it settled.
        let today = now.with_timezone(&Local).date_naive();
        let progress = self.ledger.progress().await?;
        if progress.last_check_in_date == Some(today) {
            cycle.note_check_in(progress.last_check_in_at.unwrap_or(now));
        } else if progress.last_penalty_date == Some(today) {
            cycle.note_penalized();
        }

        let (command_tx, command_rx) = mpsc::channel(self.policy.engine.command_buffer);
        let engine_loop = EngineLoop {
            ledger: self.ledger.clone(),
            notifier: self.notifier.clone(),
            position: self.position.clone(),
            identity,
            profile,
            monitor_policy: self.policy.monitor,
            ladder: self.policy.ladder,
            cycle,
            run: None,
            monitor: None,
            monitor_rx: None,
            events: self.events.clone(),
            status: self.status_tx.clone(),
            commands: command_rx,
        };
        let tick_interval_ms = self.policy.engine.tick_interval_ms;
        self.loop_handle = Some(tokio::spawn(engine_loop.run(tick_interval_ms)));
        self.commands = Some(command_tx);
        Ok(())
    }

    /// Stop the event loop and tear down the day's run. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Shutdown).await;
        }
        if let Some(handle) = self.loop_handle.take() {
            if handle.await.is_err() {
                error!("engine loop panicked during shutdown");
            }
        }
    }

    /// Latest status snapshot. Never blocks.
    pub fn status(&self) -> EngineStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch channel for status changes, for live UIs.
    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.status_rx.clone()
    }

    /// Subscribe to the engine event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Explicit user-initiated check-in.
    ///
    /// Takes one immediate position read against the lenient manual
    /// radius, then hands the confirmed fix to the event loop to apply.
    /// Nothing is mutated on failure, and a day that already has a
    /// check-in reports `AlreadyToday` without spending a read.
    pub async fn manual_check_in(&self) -> std::result::Result<CheckInRecorded, CheckInError> {
        let commands = self.commands.clone().ok_or(CheckInError::NotRunning)?;
        let profile = self.profile.as_ref().ok_or(CheckInError::NotRunning)?;

        let today = Local::now().date_naive();
        if let Ok(progress) = self.ledger.progress().await {
            if progress.last_check_in_date == Some(today) {
                let _ = self.events.send(EngineEvent::AlreadyCheckedIn { at: Utc::now() });
                return Ok(CheckInRecorded::AlreadyToday(progress));
            }
        }

        let fix = manual_probe(
            self.position.as_ref(),
            profile.gym_location,
            &self.policy.monitor,
        )
        .await?;

        let (respond, response) = oneshot::channel();
        commands
            .send(Command::ApplyCheckIn { fix, respond })
            .await
            .map_err(|_| CheckInError::NotRunning)?;
        response.await.map_err(|_| CheckInError::NotRunning)?
    }
}

/// State owned by the spawned loop task. Single writer for the cycle, the
/// run, and the monitor.
struct EngineLoop {
    ledger: Arc<dyn LedgerGateway>,
    notifier: Arc<dyn NotificationGateway>,
    position: Arc<dyn PositionSource>,
    identity: UserIdentity,
    profile: SetupProfile,
    monitor_policy: MonitorPolicy,
    ladder: EscalationLadder,
    cycle: DayCycle<Local>,
    run: Option<EscalationRun>,
    monitor: Option<SessionMonitor>,
    monitor_rx: Option<mpsc::Receiver<MonitorEvent>>,
    events: broadcast::Sender<EngineEvent>,
    status: Arc<watch::Sender<EngineStatus>>,
    commands: mpsc::Receiver<Command>,
}

impl EngineLoop {
    async fn run(mut self, tick_interval_ms: u64) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_millis(tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.emit(EngineEvent::EngineStarted { at: Utc::now() });
        info!(gym = %self.profile.gym_name, "engine started");

        // Days that finished while the engine was stopped settle the same
        // way a crossed midnight does.
        let started = Utc::now();
        if let Some(yesterday) = started.with_timezone(&Local).date_naive().pred_opt() {
            self.reconcile_day(yesterday, started).await;
        }

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    match command {
                        Some(Command::ApplyCheckIn { fix, respond }) => {
                            let result = self.apply_manual_check_in(fix, Utc::now()).await;
                            let _ = respond.send(result);
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }

                event = recv_monitor(&mut self.monitor_rx) => {
                    match event {
                        Some(MonitorEvent::Arrived { distance_m, .. }) => {
                            self.on_arrival(distance_m, Utc::now()).await;
                        }
                        Some(MonitorEvent::PollSkipped { error }) => {
                            self.emit(EngineEvent::MonitorPollSkipped {
                                error: error.to_string(),
                                at: Utc::now(),
                            });
                        }
                        None => self.monitor_rx = None,
                    }
                }

                _ = ticker.tick() => {
                    self.on_tick(Utc::now()).await;
                }
            }
        }

        self.teardown(Utc::now());
    }

    async fn on_tick(&mut self, now: DateTime<Utc>) {
        for action in self.cycle.tick(now) {
            match action {
                CycleAction::ReconcileDay { finished } => self.reconcile_day(finished, now).await,
                CycleAction::ArmWindow { start, end } => self.arm_run(start, end, now),
            }
        }

        if let Some(run) = &mut self.run {
            for action in run.tick(now) {
                match action {
                    EscalationAction::Activate => self.activate_run(now),
                    EscalationAction::Warn { minutes_remaining } => {
                        self.fire_warning(minutes_remaining, now).await;
                    }
                    EscalationAction::PlaceCall { minutes_remaining } => {
                        self.request_call(minutes_remaining, now);
                    }
                    EscalationAction::Penalize => self.apply_penalty(now).await,
                }
            }
        }

        self.publish_status(now);
    }

    async fn reconcile_day(&mut self, finished: NaiveDate, now: DateTime<Utc>) {
        // A run straddling midnight still owns the outcome; the streak
        // question is settled by its terminal transition instead.
        if self.run.as_ref().is_some_and(|r| !r.is_terminal()) {
            debug!(%finished, "skipping reconciliation, run still active");
            return;
        }
        match self.ledger.reconcile_missed_day(finished).await {
            Ok(true) => {
                info!(%finished, "no check-in for finished day, streak reset");
                self.emit(EngineEvent::StreakReset { at: now });
            }
            Ok(false) => {}
            Err(e) => error!("streak reconciliation failed: {e}"),
        }
    }

    fn arm_run(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) {
        // One non-terminal run at a time.
        if let Some(old) = &mut self.run {
            let stage = old.stage();
            if old.cancel() {
                warn!(?stage, "cancelling previous run before arming a new one");
                self.emit(EngineEvent::RunCancelled { stage, at: now });
            }
        }
        self.stop_monitor();
        self.run = Some(EscalationRun::with_ladder(start, end, &self.ladder));
        info!(%start, %end, "window armed");
        self.emit(EngineEvent::WindowArmed {
            window_start: start,
            window_end: end,
            at: now,
        });
    }

    fn activate_run(&mut self, now: DateTime<Utc>) {
        self.emit(EngineEvent::RunActivated { at: now });
        let window_end = self
            .run
            .as_ref()
            .map(|r| r.window_end())
            .unwrap_or(now);
        self.notify_later(Notification::WorkoutReminder {
            gym_name: self.profile.gym_name.clone(),
            window_end,
        });

        let (tx, rx) = mpsc::channel(8);
        self.monitor = Some(SessionMonitor::spawn(
            self.position.clone(),
            self.profile.gym_location,
            self.monitor_policy,
            tx,
        ));
        self.monitor_rx = Some(rx);
    }

    async fn fire_warning(&mut self, minutes_remaining: i64, now: DateTime<Utc>) {
        let preview = match self.ledger.preview_penalty().await {
            Ok(p) => p,
            Err(e) => {
                error!("penalty preview unavailable: {e}");
                PenaltyPreview {
                    penalty: 0,
                    shopping_credit: 0,
                    balance_after: 0,
                }
            }
        };
        self.emit(EngineEvent::WarningFired {
            minutes_remaining,
            preview,
            at: now,
        });
        self.notify_later(Notification::PenaltyWarning {
            minutes_remaining,
            preview,
        });
    }

    /// Fire-and-forget: the call itself runs on its own task so a slow
    /// provider cannot stall the loop.
    fn request_call(&mut self, minutes_remaining: i64, now: DateTime<Utc>) {
        self.emit(EngineEvent::CallRequested { at: now });
        self.notify_later(Notification::MotivationalCallNotice);

        let ledger = self.ledger.clone();
        let notifier = self.notifier.clone();
        let events = self.events.clone();
        let phone_number = self.profile.phone_number.clone();
        let user_name = self.identity.display_name().to_string();
        let gym_name = self.profile.gym_name.clone();
        let bet_amount = self.profile.bet_amount;
        tokio::spawn(async move {
            let streak_days = match ledger.progress().await {
                Ok(p) => p.streak_days,
                Err(e) => {
                    warn!("could not read progress for call context: {e}");
                    0
                }
            };
            let context = CallContext {
                user_name,
                gym_name,
                bet_amount,
                streak_days,
                minutes_remaining,
            };
            match notifier.place_motivational_call(&phone_number, &context).await {
                Ok(receipt) => {
                    info!(call_id = %receipt.call_id, "motivational call placed");
                    let _ = events.send(EngineEvent::CallPlaced {
                        call_id: receipt.call_id,
                        at: Utc::now(),
                    });
                }
                Err(e) => {
                    warn!("motivational call failed: {e}");
                    let _ = events.send(EngineEvent::CallFailed {
                        error: e.to_string(),
                        at: Utc::now(),
                    });
                }
            }
        });
    }

    async fn apply_penalty(&mut self, now: DateTime<Utc>) {
        self.stop_monitor();
        let day = now.with_timezone(&Local).date_naive();
        // The ledger holds the day's truth: a check-in recorded by another
        // process settles the day before the penalty does.
        if let Ok(progress) = self.ledger.progress().await {
            if progress.last_check_in_date == Some(day) {
                info!("check-in already on the ledger, penalty skipped");
                self.cycle.note_check_in(now);
                self.emit(EngineEvent::AlreadyCheckedIn { at: now });
                return;
            }
        }
        self.cycle.note_penalized();
        match self.ledger.apply_penalty(now, day).await {
            Ok(PenaltyOutcome::Applied(receipt)) => {
                info!(
                    penalty = receipt.penalty,
                    credit = receipt.shopping_credit,
                    insufficient = receipt.insufficient,
                    "penalty applied"
                );
                self.emit(EngineEvent::PenaltyApplied { receipt, at: now });
                self.notify_later(Notification::PenaltyApplied { receipt });
            }
            Ok(PenaltyOutcome::AlreadyToday) => {
                info!(%day, "day already penalized on the ledger, nothing to deduct");
            }
            Err(e) => error!("penalty could not be applied: {e}"),
        }
    }

    async fn on_arrival(&mut self, distance_m: f64, now: DateTime<Utc>) {
        self.emit(EngineEvent::ArrivalDetected { distance_m, at: now });
        let completed = self.run.as_mut().map(|r| r.arrive(now)).unwrap_or(false);
        self.stop_monitor();
        if !completed {
            debug!("arrival without an active run, ignoring");
            return;
        }
        self.record_check_in(now).await;
        self.publish_status(now);
    }

    async fn apply_manual_check_in(
        &mut self,
        fix: ManualFix,
        now: DateTime<Utc>,
    ) -> std::result::Result<CheckInRecorded, CheckInError> {
        debug!(
            "manual check-in confirmed {:.0} m from the gym",
            fix.distance_m
        );
        let day = now.with_timezone(&Local).date_naive();
        let recorded = self.ledger.record_check_in(now, day).await?;
        match &recorded {
            CheckInRecorded::Recorded(progress) => {
                self.emit(EngineEvent::CheckInRecorded {
                    streak_days: progress.streak_days,
                    total_sessions: progress.total_sessions,
                    at: now,
                });
                self.cycle.note_check_in(now);
                self.notify_later(Notification::CheckInSuccess {
                    streak_days: progress.streak_days,
                    gym_name: self.profile.gym_name.clone(),
                });
            }
            CheckInRecorded::AlreadyToday(_) => {
                self.emit(EngineEvent::AlreadyCheckedIn { at: now });
                self.cycle.note_check_in(now);
            }
        }
        self.resolve_run(now);
        self.publish_status(now);
        Ok(recorded)
    }

    /// Shared tail of automated arrival: record, note, notify.
    async fn record_check_in(&mut self, now: DateTime<Utc>) {
        let day = now.with_timezone(&Local).date_naive();
        match self.ledger.record_check_in(now, day).await {
            Ok(CheckInRecorded::Recorded(progress)) => {
                self.emit(EngineEvent::CheckInRecorded {
                    streak_days: progress.streak_days,
                    total_sessions: progress.total_sessions,
                    at: now,
                });
                self.cycle.note_check_in(now);
                self.notify_later(Notification::CheckInSuccess {
                    streak_days: progress.streak_days,
                    gym_name: self.profile.gym_name.clone(),
                });
            }
            Ok(CheckInRecorded::AlreadyToday(_)) => {
                self.emit(EngineEvent::AlreadyCheckedIn { at: now });
                self.cycle.note_check_in(now);
            }
            Err(e) => error!("failed to record check-in: {e}"),
        }
    }

    /// A check-in closes the day's run: `Completed` if it was live,
    /// `Cancelled` if it had not activated yet.
    fn resolve_run(&mut self, now: DateTime<Utc>) {
        if let Some(run) = &mut self.run {
            if !run.is_terminal() && !run.arrive(now) {
                let stage = run.stage();
                if run.cancel() {
                    self.emit(EngineEvent::RunCancelled { stage, at: now });
                }
            }
        }
        self.stop_monitor();
    }

    fn teardown(&mut self, now: DateTime<Utc>) {
        if let Some(run) = &mut self.run {
            let stage = run.stage();
            if run.cancel() {
                self.emit(EngineEvent::RunCancelled { stage, at: now });
            }
        }
        self.stop_monitor();
        self.emit(EngineEvent::EngineStopped { at: now });
        let _ = self.status.send_replace(EngineStatus::stopped(now));
        info!("engine stopped");
    }

    fn stop_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.monitor_rx = None;
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine; the stream is observability, not control.
        let _ = self.events.send(event);
    }

    fn notify_later(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&notification).await {
                warn!("notification delivery failed: {e}");
            }
        });
    }

    fn publish_status(&self, now: DateTime<Utc>) {
        let state = self.cycle.state();
        let _ = self.status.send_replace(EngineStatus {
            running: true,
            window_armed: state.window_armed,
            day_outcome: state.outcome,
            stage: self.run.as_ref().map(|r| r.stage()),
            next_window_at: Some(self.cycle.next_window_at()),
            as_of: now,
        });
    }
}

async fn recv_monitor(rx: &mut Option<mpsc::Receiver<MonitorEvent>>) -> Option<MonitorEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
