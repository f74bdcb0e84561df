use super::context::AppContext;
use crate::output::{format_date, format_size, styled_table, Output};
use color_eyre::Result;
use comfy_table::{Cell, Color};
use media_prune_models::{Job, JobStatus};
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_status(ctx: &AppContext, history: Option<usize>, output: &Output) -> Result<()> {
    let engine = ctx.open_engine()?;
    let status = engine.sync_status().await;
    // A daemon in another process shows up through the persisted job.
    let running = status.running
        || matches!(&status.latest_job, Some(job) if job.status == JobStatus::Running);
    let recent = match history {
        Some(limit) => engine.recent_jobs(limit).await,
        None => Vec::new(),
    };

    if !output.is_human() {
        output.json(&json!({
            "running": running,
            "latest_job": status.latest_job,
            "recent_jobs": recent,
        }));
        return Ok(());
    }

    match &status.latest_job {
        Some(job) => render_job(job, output),
        None => output.info("No sync has run yet. Start one with `sweeparr sync`."),
    }
    if running {
        output.warn("A sync is running right now.");
    }

    if !recent.is_empty() {
        let mut table = styled_table(&["Started", "Kind", "Status", "Duration", "Leaving soon", "Overdue", "Deleted"]);
        for job in &recent {
            table.add_row(vec![
                Cell::new(format_date(job.started_at.or(Some(job.created_at)))),
                Cell::new(job.kind),
                status_cell(job.status),
                Cell::new(job.duration_ms().map(|ms| format!("{:.1}s", ms as f64 / 1000.0)).unwrap_or_default()),
                Cell::new(job.summary.leaving_soon),
                Cell::new(job.summary.scheduled_deletions),
                Cell::new(job.summary.deleted_count.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())),
            ]);
        }
        output.table(&table);
    }
    Ok(())
}

fn status_cell(status: JobStatus) -> Cell {
    let (label, color) = match status {
        JobStatus::Pending => ("pending", Color::Grey),
        JobStatus::Running => ("running", Color::Cyan),
        JobStatus::Completed => ("completed", Color::Green),
        JobStatus::Failed => ("failed", Color::Red),
    };
    Cell::new(label).fg(color)
}

/// Human rendering of one job, shared with `sweeparr sync`.
pub fn render_job(job: &Job, output: &Output) {
    let summary = &job.summary;
    let mode = match (summary.dry_run, summary.enable_deletion) {
        (true, _) => "dry run".yellow().to_string(),
        (false, false) => "preview only (deletion disabled)".yellow().to_string(),
        (false, true) => "deletion enabled".red().to_string(),
    };

    let mut table = styled_table(&["Job", job.id.as_str()]);
    table.add_row(vec![Cell::new("Kind"), Cell::new(job.kind)]);
    table.add_row(vec![Cell::new("Status"), status_cell(job.status)]);
    table.add_row(vec![Cell::new("Mode"), Cell::new(mode)]);
    table.add_row(vec![Cell::new("Started"), Cell::new(format_date(job.started_at))]);
    table.add_row(vec![Cell::new("Finished"), Cell::new(format_date(job.completed_at))]);
    table.add_row(vec![
        Cell::new("Catalog"),
        Cell::new(format!(
            "{} movies, {} series, {} excluded",
            summary.movies, summary.series, summary.excluded
        )),
    ]);
    if summary.skipped_items > 0 {
        table.add_row(vec![Cell::new("Skipped"), Cell::new(summary.skipped_items)]);
    }
    table.add_row(vec![Cell::new("Leaving soon"), Cell::new(summary.leaving_soon)]);
    table.add_row(vec![Cell::new("Overdue"), Cell::new(summary.scheduled_deletions)]);
    if let Some(report) = &summary.reconciliation {
        table.add_row(vec![
            Cell::new("Preview"),
            Cell::new(format!("+{} / -{} symlinks", report.added, report.removed)),
        ]);
    }
    if let Some(count) = summary.deleted_count {
        table.add_row(vec![Cell::new("Deleted"), Cell::new(count)]);
    }
    output.table(&table);

    if let Some(error) = &job.error {
        output.error(error);
    }

    if !summary.would_delete.is_empty() && summary.deleted_count.is_none() {
        output.info(format!("{}", "Would delete:".bold()));
        let mut candidates = styled_table(&["ID", "Title", "Size", "Overdue", "Reason"]);
        for candidate in &summary.would_delete {
            candidates.add_row(vec![
                Cell::new(&candidate.id),
                Cell::new(&candidate.title),
                Cell::new(format_size(candidate.file_size)),
                Cell::new(format!("{}d", candidate.days_overdue)),
                Cell::new(&candidate.reason),
            ]);
        }
        output.table(&candidates);
    }

    if let Some(deleted) = &summary.deleted_items {
        for item in deleted {
            output.success(format!("Deleted {} ({})", item.title, format_size(item.file_size)));
        }
    }

    for error in &summary.errors {
        output.warn(error);
    }
}
