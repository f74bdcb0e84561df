use super::context::AppContext;
use crate::output::{styled_table, Output};
use crate::ConfigCommands;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Cell, Color};
use media_prune_config::{Config, CredentialStore, ServiceConfig};
use owo_colors::OwoColorize;
use serde_json::{json, Value};

pub async fn run_config(ctx: &AppContext, cmd: ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Validate { ping } => validate(ctx, ping, output).await,
        ConfigCommands::Show { full } => show(ctx, full, output),
        ConfigCommands::Path => show_paths(ctx, output),
    }
}

/// One integration as listed by `config show`.
struct ServiceRow<'a> {
    name: &'static str,
    enabled: bool,
    url: &'a str,
    api_key: Option<String>,
}

fn service_rows<'a>(config: &'a Config, credentials: &CredentialStore) -> Vec<ServiceRow<'a>> {
    let integrations = &config.integrations;
    let jellyfin = integrations.jellyfin.as_ref().map(|j| (j.enabled, j.url.as_str(), j.api_key.as_deref()));
    let service = |s: Option<&'a ServiceConfig>| s.map(|s| (s.enabled, s.url.as_str(), s.api_key.as_deref()));
    let services = [
        ("radarr", service(integrations.radarr.as_ref())),
        ("sonarr", service(integrations.sonarr.as_ref())),
        ("jellyfin", jellyfin),
        ("jellyseerr", service(integrations.jellyseerr.as_ref())),
        ("jellystat", service(integrations.jellystat.as_ref())),
    ];
    services
        .into_iter()
        .filter_map(|(name, entry)| {
            entry.map(|(enabled, url, api_key)| ServiceRow {
                name,
                enabled,
                url,
                api_key: credentials.resolve_api_key(name, api_key),
            })
        })
        .collect()
}

async fn validate(ctx: &AppContext, ping: bool, output: &Output) -> Result<()> {
    let config = ctx.load_config()?;
    let services = config.get_configured_services();

    if !ping {
        if output.is_human() {
            output.success(format!("{} is valid", ctx.config_path().display()));
            output.info(format!("Enabled integrations: {}", services.join(", ")));
        } else {
            output.json(&json!({ "valid": true, "integrations": services }));
        }
        return Ok(());
    }

    let clients = ctx.build_clients(&config)?;
    let results = clients.ping_all().await;
    let failed = results.iter().filter(|(_, result)| result.is_err()).count();

    if output.is_human() {
        let mut table = styled_table(&["Integration", "Status"]);
        for (service, result) in &results {
            let status = match result {
                Ok(()) => Cell::new("reachable").fg(Color::Green),
                Err(e) => Cell::new(e.to_string()).fg(Color::Red),
            };
            table.add_row(vec![Cell::new(service), status]);
        }
        output.table(&table);
    } else {
        let checks: Vec<Value> = results
            .iter()
            .map(|(service, result)| {
                json!({
                    "service": service,
                    "ok": result.is_ok(),
                    "error": result.as_ref().err().map(|e| e.to_string()),
                })
            })
            .collect();
        output.json(&json!({ "valid": failed == 0, "checks": checks }));
    }

    if failed > 0 {
        return Err(eyre!("{} of {} integrations are unreachable", failed, results.len()));
    }
    output.success("All integrations are reachable");
    Ok(())
}

fn show(ctx: &AppContext, full: bool, output: &Output) -> Result<()> {
    let config = ctx.load_config()?;
    let credentials = ctx.credentials()?;
    let display_key = |key: &Option<String>| match key {
        Some(key) if full => key.clone(),
        Some(key) => mask_string(key),
        None => "<not set>".to_string(),
    };

    if !output.is_human() {
        let mut value = serde_json::to_value(&config)?;
        for row in service_rows(&config, &credentials) {
            if let Some(service) = value.pointer_mut(&format!("/integrations/{}", row.name)) {
                service["api_key"] = json!(row.api_key.as_ref().map(|_| display_key(&row.api_key)));
            }
        }
        output.json(&value);
        return Ok(());
    }

    let mode = if config.app.dry_run {
        "dry run".yellow().to_string()
    } else if config.app.enable_deletion {
        "deletion enabled".red().to_string()
    } else {
        "preview only".yellow().to_string()
    };
    let config_file = ctx.config_path().display().to_string();
    let mut general = styled_table(&["Config File", config_file.as_str()]);
    general.add_row(vec![Cell::new("Mode"), Cell::new(mode)]);
    general.add_row(vec![Cell::new("Leaving soon window"), Cell::new(format!("{} days", config.app.leaving_soon_days))]);
    general.add_row(vec![Cell::new("Movie retention"), Cell::new(config.rules.movie_retention)]);
    general.add_row(vec![Cell::new("TV retention"), Cell::new(config.rules.tv_retention)]);
    general.add_row(vec![
        Cell::new("Sync intervals"),
        Cell::new(format!(
            "full {}s, incremental {}s, timeout {}s",
            config.sync.full_interval_secs, config.sync.incremental_interval_secs, config.sync.timeout_secs
        )),
    ]);
    output.table(&general);

    let mut services = styled_table(&["Integration", "Enabled", "URL", "API Key"]);
    for row in service_rows(&config, &credentials) {
        services.add_row(vec![
            Cell::new(row.name),
            Cell::new(if row.enabled { "✓".green().to_string() } else { "✗".red().to_string() }),
            Cell::new(row.url),
            Cell::new(display_key(&row.api_key)),
        ]);
    }
    output.table(&services);

    if let Some(library) = config.symlink_library() {
        let mut preview = styled_table(&["Leaving Soon Library", ""]);
        preview.add_row(vec![Cell::new("Base path"), Cell::new(&library.base_path)]);
        preview.add_row(vec![Cell::new("Movies"), Cell::new(&library.movies_library_name)]);
        preview.add_row(vec![Cell::new("TV"), Cell::new(&library.tv_library_name)]);
        preview.add_row(vec![Cell::new("Hide when empty"), Cell::new(library.hide_when_empty)]);
        output.table(&preview);
    }

    if !config.advanced_rules.is_empty() {
        let mut rules = styled_table(&["Rule", "Type", "Retention", "Watched only", "Enabled"]);
        for rule in &config.advanced_rules {
            rules.add_row(vec![
                Cell::new(&rule.name),
                Cell::new(rule.matcher.kind()),
                Cell::new(rule.retention),
                Cell::new(rule.require_watched),
                Cell::new(rule.enabled),
            ]);
        }
        output.table(&rules);
    }
    Ok(())
}

fn show_paths(ctx: &AppContext, output: &Output) -> Result<()> {
    let paths = ctx.paths();
    let entries = [
        ("config", ctx.config_path().to_path_buf()),
        ("credentials", paths.credentials_file()),
        ("catalog", paths.catalog_file()),
        ("exclusions", paths.exclusions_file()),
        ("jobs", paths.jobs_file()),
        ("log", ctx.logging_settings().file.unwrap_or_else(|| paths.daemon_log_file())),
    ];

    if output.is_human() {
        let mut table = styled_table(&["File", "Path", "Exists"]);
        for (name, path) in &entries {
            table.add_row(vec![Cell::new(name), Cell::new(path.display()), Cell::new(path.exists())]);
        }
        output.table(&table);
    } else {
        let map: serde_json::Map<String, Value> = entries
            .iter()
            .map(|(name, path)| (name.to_string(), json!(path.display().to_string())))
            .collect();
        output.json(&Value::Object(map));
    }
    Ok(())
}

fn mask_string(s: &str) -> String {
    let chars: Vec<char> = s.trim().chars().collect();
    if chars.is_empty() {
        return "<not set>".to_string();
    }
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mask_string() {
        assert_eq!(mask_string(""), "<not set>");
        assert_eq!(mask_string("abcd"), "****");
        assert_eq!(mask_string("0123456789abcdef"), "01***ef");
    }

    #[test]
    fn test_service_rows_fall_back_to_credentials() {
        let dir = TempDir::new().unwrap();
        let config: Config = toml::from_str(
            r#"
[integrations.radarr]
enabled = true
url = "http://radarr:7878"

[integrations.sonarr]
enabled = false
url = "http://sonarr:8989"
api_key = "inline-key"

[integrations.jellyfin]
enabled = true
url = "http://jellyfin:8096"
api_key = "jf"
"#,
        )
        .unwrap();
        let mut credentials = CredentialStore::new(dir.path().join("credentials.toml"));
        credentials.set_api_key("radarr", "stored-key".to_string());

        let rows = service_rows(&config, &credentials);
        let names: Vec<&str> = rows.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["radarr", "sonarr", "jellyfin"]);
        assert_eq!(rows[0].api_key.as_deref(), Some("stored-key"));
        assert_eq!(rows[1].api_key.as_deref(), Some("inline-key"));
        assert!(!rows[1].enabled);
    }
}
