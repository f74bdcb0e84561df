use super::context::AppContext;
use super::status::render_job;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use media_prune_models::{JobStatus, SyncKind};

pub async fn run_sync(ctx: &AppContext, incremental: bool, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");
    let engine = ctx.open_engine()?;
    let kind = if incremental { SyncKind::Incremental } else { SyncKind::Full };

    let job = engine
        .run_sync(kind)
        .await
        .map_err(|e| eyre!("Sync could not start: {}", e))?;

    if output.is_human() {
        render_job(&job, output);
    } else {
        output.json(&serde_json::to_value(&job)?);
    }

    match job.status {
        JobStatus::Completed => {
            output.success(format!(
                "Sync completed: {} leaving soon, {} overdue",
                job.summary.leaving_soon, job.summary.scheduled_deletions
            ));
            Ok(())
        }
        _ => Err(eyre!(
            "Sync job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        )),
    }
}
