//! In-process tick scheduler.
//!
//! Two detached loops drive the lifecycle manager: a round loop on the
//! round grid and a maintenance loop on the day grid. Each fires a few
//! seconds after its boundary so a resolving tick never races the clock
//! edge it is about to settle, and missed ticks are skipped rather than
//! bursted — the lifecycle already treats every tick as idempotent, so one
//! late tick catches the process up.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use fable_core::{
  broadcast::Broadcast,
  lifecycle::LifecycleManager,
  source::CandidateSource,
  story::window_floor,
  store::StateStore,
};
use tokio::{
  task::JoinHandle,
  time::{self, MissedTickBehavior},
};
use tracing::{error, info};

/// Offset past a boundary before the tick fires.
const BOUNDARY_GRACE: Duration = Duration::from_secs(5);
/// Maintenance cadence, aligned to UTC midnight.
const DAILY_SECS: u64 = 24 * 60 * 60;

pub struct TickScheduler<S, C, B> {
  manager: Arc<LifecycleManager<S, C, B>>,
}

impl<S, C, B> TickScheduler<S, C, B>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  pub fn new(manager: Arc<LifecycleManager<S, C, B>>) -> Self {
    Self { manager }
  }

  /// Spawn both loops; they run until the runtime shuts down.
  pub fn spawn(self) -> (JoinHandle<()>, JoinHandle<()>) {
    let rounds = tokio::spawn(run_rounds(self.manager.clone()));
    let maintenance = tokio::spawn(run_maintenance(self.manager));
    (rounds, maintenance)
  }
}

async fn run_rounds<S, C, B>(manager: Arc<LifecycleManager<S, C, B>>)
where
  S: StateStore,
  C: CandidateSource,
  B: Broadcast,
{
  let period_secs = manager.settings().round_secs;
  let mut interval = grid_interval(period_secs);
  info!(period_secs, "round scheduler started");
  loop {
    interval.tick().await;
    if let Err(error) = manager.on_hourly_tick().await {
      error!(%error, "round tick failed");
    }
  }
}

async fn run_maintenance<S, C, B>(manager: Arc<LifecycleManager<S, C, B>>)
where
  S: StateStore,
  C: CandidateSource,
  B: Broadcast,
{
  let mut interval = grid_interval(DAILY_SECS);
  info!("maintenance scheduler started");
  loop {
    interval.tick().await;
    if let Err(error) = manager.on_daily_tick().await {
      error!(%error, "maintenance tick failed");
    }
  }
}

/// An interval whose first tick lands just after the next `period_secs`
/// boundary on the UTC grid.
fn grid_interval(period_secs: u64) -> time::Interval {
  let now = Utc::now();
  let until = (next_boundary(now, period_secs) - now)
    .to_std()
    .unwrap_or_default()
    + BOUNDARY_GRACE;
  let mut interval = time::interval_at(
    time::Instant::now() + until,
    Duration::from_secs(period_secs.max(1)),
  );
  interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
  interval
}

/// The first grid point strictly after `now`.
fn next_boundary(now: DateTime<Utc>, period_secs: u64) -> DateTime<Utc> {
  window_floor(now, period_secs)
    + chrono::Duration::seconds(period_secs.max(1) as i64)
}
