use super::context::AppContext;
use crate::output::{format_date, format_size, styled_table, Output};
use chrono::Utc;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Cell, Color};
use media_prune_core::Engine;
use media_prune_models::MediaItem;
use owo_colors::OwoColorize;
use serde_json::{json, Value};

/// JSON view of an item with the derived fields consumers ask about.
fn item_json(item: &MediaItem) -> Value {
    let mut value = serde_json::to_value(item).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("excluded".to_string(), json!(item.is_excluded()));
        map.insert("days_until_deletion".to_string(), json!(item.days_until_deletion(Utc::now())));
    }
    value
}

/// Internal ID first, then a unique title match.
async fn resolve(engine: &Engine, query: &str) -> Result<MediaItem> {
    if let Some(item) = engine.media_by_id(query).await {
        return Ok(item);
    }
    let mut matches = engine.media_by_title(query).await;
    match matches.len() {
        0 => Err(eyre!(
            "No item matches '{}'. Run `sweeparr list` to see what is catalogued.",
            query
        )),
        1 => Ok(matches.remove(0)),
        n => {
            let ids: Vec<String> = matches.iter().map(|i| format!("{} ({})", i.id, i.title)).collect();
            Err(eyre!(
                "'{}' matches {} items, use the internal ID: {}",
                query,
                n,
                ids.join(", ")
            ))
        }
    }
}

fn render_list(items: &[MediaItem], output: &Output) {
    let now = Utc::now();
    let mut table = styled_table(&["ID", "Title", "Size", "Added", "Deletion", "Reason"]);
    for item in items {
        let title = match item.year {
            Some(year) => format!("{} ({})", item.title, year),
            None => item.title.clone(),
        };
        let deletion = match item.days_until_deletion(now) {
            Some(days) if days < 0 => Cell::new(format!("overdue {}d", -days)).fg(Color::Red),
            Some(days) => Cell::new(format!("{} (in {}d)", format_date(item.deletion_date), days)),
            None if item.is_excluded() => Cell::new("excluded").fg(Color::Green),
            None => Cell::new("never"),
        };
        table.add_row(vec![
            Cell::new(&item.id),
            Cell::new(title),
            Cell::new(format_size(item.file_size)),
            Cell::new(item.added_at.format("%Y-%m-%d")),
            deletion,
            Cell::new(&item.deletion_reason),
        ]);
    }
    output.table(&table);
}

pub async fn run_leaving_soon(ctx: &AppContext, output: &Output) -> Result<()> {
    let engine = ctx.open_engine()?;
    let items = engine.list_leaving_soon().await;

    if !output.is_human() {
        output.json(&Value::Array(items.iter().map(item_json).collect()));
        return Ok(());
    }
    if items.is_empty() {
        output.info("Nothing is leaving soon.");
        return Ok(());
    }
    let window = engine.config().await.app.leaving_soon_days;
    output.info(format!(
        "{} items leave within {} days:",
        items.len().to_string().bold(),
        window
    ));
    render_list(&items, output);
    Ok(())
}

pub async fn run_list(ctx: &AppContext, series: bool, output: &Output) -> Result<()> {
    let engine = ctx.open_engine()?;
    let items = if series {
        engine.list_series().await
    } else {
        engine.list_movies().await
    };

    if !output.is_human() {
        output.json(&Value::Array(items.iter().map(item_json).collect()));
        return Ok(());
    }
    if items.is_empty() {
        output.info("The catalog is empty. Run `sweeparr sync` first.");
        return Ok(());
    }
    render_list(&items, output);
    Ok(())
}

pub async fn run_show(ctx: &AppContext, query: &str, output: &Output) -> Result<()> {
    let engine = ctx.open_engine()?;
    let item = resolve(&engine, query).await?;

    if !output.is_human() {
        output.json(&item_json(&item));
        return Ok(());
    }

    let mut table = styled_table(&["Field", "Value"]);
    let mut row = |field: &str, value: String| {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    };
    row("ID", item.id.clone());
    row("Title", item.title.clone());
    row("Year", item.year.map(|y| y.to_string()).unwrap_or_default());
    row("Type", item.media_type.to_string());
    row("Path", item.file_path.clone());
    row("Size", format_size(item.file_size));
    row("Added", format_date(Some(item.added_at)));
    row("Tags", item.tags.join(", "));
    if let Some(requester) = &item.requester {
        let name = requester
            .username
            .clone()
            .or_else(|| requester.email.clone())
            .or_else(|| requester.user_id.map(|id| format!("user #{}", id)))
            .unwrap_or_default();
        row("Requested by", name);
    }
    row(
        "Plays",
        format!(
            "{} (last {})",
            item.watch.play_count,
            item.last_watched_at().map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_else(|| "-".to_string())
        ),
    );
    row("Excluded", item.exclusion.as_ref().map(|e| e.reason.clone()).unwrap_or_else(|| "no".to_string()));
    row("Deletion date", format_date(item.deletion_date));
    row("Reason", item.deletion_reason.clone());
    if let Some(symlink) = &item.symlink {
        row("Preview link", symlink.path.clone());
    }
    output.table(&table);
    Ok(())
}

pub async fn run_exclude(ctx: &AppContext, query: &str, reason: &str, output: &Output) -> Result<()> {
    let engine = ctx.open_engine()?;
    let item = resolve(&engine, query).await?;
    let item = engine.exclude(&item.id, reason).await?;

    if output.is_human() {
        output.success(format!("{} ({}) will not be deleted: {}", item.title, item.id, reason.trim()));
        output.info("The preview symlink is removed on the next sync.");
    } else {
        output.json(&item_json(&item));
    }
    Ok(())
}

pub async fn run_include(ctx: &AppContext, query: &str, output: &Output) -> Result<()> {
    let engine = ctx.open_engine()?;
    // Exclusions can outlive their item, so an unknown ID is still tried.
    let id = match resolve(&engine, query).await {
        Ok(item) => item.id,
        Err(_) => query.to_string(),
    };
    let removed = engine.remove_exclusion(&id).await?;

    if !output.is_human() {
        output.json(&json!({ "id": id, "removed": removed, "item": engine.media_by_id(&id).await.map(|i| item_json(&i)) }));
        return Ok(());
    }
    if removed {
        output.success(format!("Exclusion removed from {}", id));
        if let Some(item) = engine.media_by_id(&id).await {
            output.info(format!("New deletion date: {} ({})", format_date(item.deletion_date), item.deletion_reason));
        }
    } else {
        output.warn(format!("{} was not excluded", id));
    }
    Ok(())
}
