//! The periodic task driver.
//!
//! Once per tick every task in both audiences is scanned; any activated task
//! whose fire time has elapsed is executed. Execution is sequential (one
//! task at a time, each awaited) and isolated: an error return or a panic
//! inside a task is logged and never reaches the driver. A task whose
//! previous run is still in flight is skipped for this tick, not queued.

use crate::context::AppContext;
use crate::registry::{Audience, TaskEntry};
use crate::schedule::clock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Spawn the tick loop. Runs until the handle is aborted.
pub fn spawn(ctx: Arc<AppContext>) -> JoinHandle<()> {
    let period = Duration::from_secs(ctx.config.runtime.tick_seconds.max(1));
    info!(period_secs = period.as_secs(), "task runner started");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            run_due_tasks(&ctx, Utc::now()).await;
        }
    })
}

/// One scan over both audiences. Public so tests can drive ticks directly.
pub async fn run_due_tasks(ctx: &Arc<AppContext>, now: DateTime<Utc>) {
    for audience in Audience::ALL {
        for entry in ctx.tasks.snapshot(audience) {
            let due = {
                let runtime = entry.runtime();
                runtime.activated && runtime.next_fire_at.is_some_and(|at| at <= now)
            };
            if !due {
                continue;
            }
            if !entry.try_begin_run() {
                warn!(
                    task = %entry.spec.name,
                    audience = %entry.audience,
                    "previous run still in flight; skipping this fire"
                );
                continue;
            }
            execute(ctx, entry).await;
        }
    }
}

/// Run one task to completion and do the repeat/reschedule bookkeeping.
async fn execute(ctx: &Arc<AppContext>, entry: Arc<TaskEntry>) {
    let run_ctx = Arc::clone(ctx);
    let run_entry = Arc::clone(&entry);
    // The extra spawn contains panics as JoinErrors instead of letting them
    // take down the driver loop.
    let outcome = tokio::spawn(async move {
        let run = run_entry.run;
        run(&run_ctx, &run_entry.spec).await
    })
    .await;

    match outcome {
        Ok(Ok(())) => debug!(task = %entry.spec.name, "task run finished"),
        Ok(Err(e)) => error!(task = %entry.spec.name, error = %e, "task run failed"),
        Err(join_err) => {
            error!(task = %entry.spec.name, error = %join_err, "task run panicked")
        }
    }

    let still_activated = entry.with_state(|state| {
        if let Some(remaining) = state.remaining_repeats {
            if remaining <= 1 {
                state.activated = false;
                state.next_fire_at = None;
                state.remaining_repeats = None;
            } else {
                state.remaining_repeats = Some(remaining - 1);
            }
        }
        state.activated
    });
    entry.end_run();

    if !still_activated {
        info!(task = %entry.spec.name, "task finished its repeats; deactivated");
        return;
    }
    match clock::next_fire(
        entry.spec.interval_minutes,
        &entry.spec.times,
        ctx.tasks.timezone(),
        Utc::now(),
    ) {
        Ok(next) => entry.with_state(|state| state.next_fire_at = Some(next)),
        Err(e) => {
            // Never leave a stale fire time that would trigger again
            // immediately.
            warn!(task = %entry.spec.name, error = %e, "cannot reschedule; deactivating");
            entry.deactivate();
        }
    }
}
