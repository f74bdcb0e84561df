use super::context::AppContext;
use crate::output::Output;
use color_eyre::Result;
use media_prune_config::SyncConfig;
use media_prune_core::{Engine, EngineError};
use media_prune_models::{JobStatus, SyncKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Timer that first fires one period from now.
fn timer(secs: u64) -> Interval {
    let period = Duration::from_secs(secs);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

struct Timers {
    full_secs: u64,
    incremental_secs: u64,
    full: Interval,
    incremental: Interval,
}

impl Timers {
    fn new(sync: &SyncConfig) -> Self {
        Self {
            full_secs: sync.full_interval_secs,
            incremental_secs: sync.incremental_interval_secs,
            full: timer(sync.full_interval_secs),
            incremental: timer(sync.incremental_interval_secs),
        }
    }

    /// Restart the timers whose period changed.
    fn adjust(&mut self, sync: &SyncConfig) {
        if sync.full_interval_secs != self.full_secs {
            info!(operation = "scheduler_reschedule", timer = "full", secs = sync.full_interval_secs, "Full sync interval changed");
            self.full_secs = sync.full_interval_secs;
            self.full = timer(sync.full_interval_secs);
        }
        if sync.incremental_interval_secs != self.incremental_secs {
            info!(
                operation = "scheduler_reschedule",
                timer = "incremental",
                secs = sync.incremental_interval_secs,
                "Incremental sync interval changed"
            );
            self.incremental_secs = sync.incremental_interval_secs;
            self.incremental = timer(sync.incremental_interval_secs);
        }
    }
}

/// Re-read config.toml and credentials. A broken file keeps the previous
/// configuration running.
async fn reload(ctx: &AppContext, engine: &Engine, timers: &mut Timers) {
    let loaded = ctx
        .load_config()
        .and_then(|config| ctx.build_clients(&config).map(|clients| (config, clients)));
    match loaded {
        Ok((config, clients)) => {
            timers.adjust(&config.sync);
            engine.replace_config(config, clients).await;
        }
        Err(e) => {
            warn!(
                operation = "config_reload",
                status = "error",
                error = %e,
                "Keeping the previous configuration"
            );
        }
    }
}

async fn scheduled(ctx: &AppContext, engine: &Arc<Engine>, timers: &mut Timers, kind: SyncKind) {
    reload(ctx, engine, timers).await;
    match engine.trigger_sync(kind).await {
        Ok(job_id) => info!(operation = "scheduled_sync_start", kind = %kind, job_id = %job_id, "Scheduled sync started"),
        Err(EngineError::SyncInProgress) => {
            info!(operation = "scheduled_sync_start", kind = %kind, status = "skipped", "Previous sync still running")
        }
        Err(e) => error!(operation = "scheduled_sync_start", kind = %kind, status = "error", error = %e, "Scheduled sync failed to start"),
    }
}

/// Give a running cycle the rest of its timeout before exiting.
async fn drain(engine: &Engine) {
    let limit = Duration::from_secs(engine.config().await.sync.timeout_secs);
    let deadline = Instant::now() + limit;
    while engine.sync_status().await.running {
        if Instant::now() >= deadline {
            warn!(operation = "daemon_shutdown", "Exiting with a sync still running");
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

pub async fn run_daemon(ctx: &AppContext, no_startup_sync: bool, output: &Output) -> Result<()> {
    let engine = Arc::new(ctx.open_engine()?);
    let config = engine.config().await;

    let interrupted = engine.recover_interrupted_jobs().await;
    if interrupted > 0 {
        warn!(operation = "daemon_start", interrupted, "Marked jobs from a previous run as failed");
    }

    output.info(format!(
        "Sweeparr daemon running: full sync every {}s, incremental every {}s. Press Ctrl-C to stop.",
        config.sync.full_interval_secs, config.sync.incremental_interval_secs
    ));
    info!(
        operation = "daemon_start",
        full_interval_secs = config.sync.full_interval_secs,
        incremental_interval_secs = config.sync.incremental_interval_secs,
        dry_run = config.app.dry_run,
        enable_deletion = config.app.enable_deletion,
        "Daemon started"
    );

    let mut timers = Timers::new(&config.sync);

    if config.sync.run_on_startup && !no_startup_sync {
        info!(operation = "scheduler_startup", "Running initial full sync");
        match engine.run_sync(SyncKind::Full).await {
            Ok(job) if job.status == JobStatus::Completed => {}
            Ok(job) => warn!(
                operation = "scheduler_startup",
                job_id = %job.id,
                error = job.error.as_deref().unwrap_or_default(),
                "Initial sync failed, continuing on schedule"
            ),
            Err(e) => warn!(operation = "scheduler_startup", status = "error", error = %e, "Initial sync did not start"),
        }
    }

    loop {
        tokio::select! {
            _ = timers.full.tick() => {
                scheduled(ctx, &engine, &mut timers, SyncKind::Full).await;
            }
            _ = timers.incremental.tick() => {
                scheduled(ctx, &engine, &mut timers, SyncKind::Incremental).await;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(operation = "daemon_shutdown", error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    info!(operation = "daemon_shutdown", "Shutting down");
    drain(&engine).await;
    output.success("Daemon stopped");
    Ok(())
}
