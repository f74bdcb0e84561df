use media_prune_models::MediaType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::retention::Retention;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    /// Evaluated in order, first enabled match wins
    #[serde(default)]
    pub advanced_rules: Vec<AdvancedRule>,
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Safety switches and the preview window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Blocks every side-effecting call, including deletion
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Narrower switch for the irreversible deletion step only
    #[serde(default)]
    pub enable_deletion: bool,
    #[serde(default = "default_leaving_soon_days")]
    pub leaving_soon_days: u32,
}

impl AppConfig {
    pub fn leaving_soon_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.leaving_soon_days as i64)
    }

    /// Deletion only happens when both switches allow it.
    pub fn deletion_allowed(&self) -> bool {
        self.enable_deletion && !self.dry_run
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            enable_deletion: false,
            leaving_soon_days: default_leaving_soon_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_full_interval")]
    pub full_interval_secs: u64,
    #[serde(default = "default_incremental_interval")]
    pub incremental_interval_secs: u64,
    /// Upper bound for a whole cycle, fetches included
    #[serde(default = "default_sync_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            full_interval_secs: default_full_interval(),
            incremental_interval_secs: default_incremental_interval(),
            timeout_secs: default_sync_timeout(),
            run_on_startup: true,
        }
    }
}

/// Global fallback retention per media type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_movie_retention")]
    pub movie_retention: Retention,
    #[serde(default = "default_tv_retention")]
    pub tv_retention: Retention,
}

impl RulesConfig {
    pub fn retention_for(&self, media_type: MediaType) -> Retention {
        match media_type {
            MediaType::Movie => self.movie_retention,
            MediaType::Series => self.tv_retention,
        }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            movie_retention: default_movie_retention(),
            tv_retention: default_tv_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedRule {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub retention: Retention,
    /// Keep the item forever unless the history tracker saw it played
    #[serde(default)]
    pub require_watched: bool,
    pub matcher: RuleMatcher,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleMatcher {
    /// Manager tag, compared case-insensitively
    Tag { tag: String },
    /// Requesting user(s) from the request tracker
    User { users: Vec<UserMatcher> },
    /// Anything with at least one watch-history record
    Watched,
}

impl RuleMatcher {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleMatcher::Tag { .. } => "tag",
            RuleMatcher::User { .. } => "user",
            RuleMatcher::Watched => "watched",
        }
    }
}

/// One user entry in a `user` rule.
///
/// Only the first non-empty identifier (id, then username, then email) is
/// used for matching. Entries may override the rule's retention settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMatcher {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub retention: Option<Retention>,
    #[serde(default)]
    pub require_watched: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdentifier<'a> {
    Id(u64),
    Username(&'a str),
    Email(&'a str),
}

impl UserMatcher {
    pub fn identifier(&self) -> Option<UserIdentifier<'_>> {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(id) = self.user_id {
            return Some(UserIdentifier::Id(id));
        }
        if let Some(username) = non_empty(&self.username) {
            return Some(UserIdentifier::Username(username));
        }
        non_empty(&self.email).map(UserIdentifier::Email)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub radarr: Option<ServiceConfig>,
    #[serde(default)]
    pub sonarr: Option<ServiceConfig>,
    #[serde(default)]
    pub jellyfin: Option<JellyfinConfig>,
    #[serde(default)]
    pub jellyseerr: Option<ServiceConfig>,
    #[serde(default)]
    pub jellystat: Option<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub enabled: bool,
    pub url: String,
    /// Falls back to `<service>_api_key` in the credentials file
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JellyfinConfig {
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub symlink_library: SymlinkLibraryConfig,
}

impl JellyfinConfig {
    pub fn as_service(&self) -> ServiceConfig {
        ServiceConfig {
            enabled: self.enabled,
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// The "leaving soon" preview library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymlinkLibraryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_symlink_base_path")]
    pub base_path: String,
    #[serde(default = "default_movies_library_name")]
    pub movies_library_name: String,
    #[serde(default = "default_tv_library_name")]
    pub tv_library_name: String,
    /// Drop the virtual folder while it would be empty
    #[serde(default = "default_true")]
    pub hide_when_empty: bool,
}

impl SymlinkLibraryConfig {
    pub fn directory_for(&self, media_type: MediaType) -> String {
        let sub = match media_type {
            MediaType::Movie => "movies",
            MediaType::Series => "tv",
        };
        format!("{}/{}", self.base_path.trim_end_matches('/'), sub)
    }

    pub fn library_name_for(&self, media_type: MediaType) -> &str {
        match media_type {
            MediaType::Movie => &self.movies_library_name,
            MediaType::Series => &self.tv_library_name,
        }
    }
}

impl Default for SymlinkLibraryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_path: default_symlink_base_path(),
            movies_library_name: default_movies_library_name(),
            tv_library_name: default_tv_library_name(),
            hide_when_empty: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Defaults to JSON when stdout is not a terminal
    #[serde(default)]
    pub json: Option<bool>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: None,
            file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_leaving_soon_days() -> u32 {
    14
}

fn default_full_interval() -> u64 {
    3600 // hourly
}

fn default_incremental_interval() -> u64 {
    900
}

fn default_sync_timeout() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_movie_retention() -> Retention {
    Retention::days(90)
}

fn default_tv_retention() -> Retention {
    Retention::days(120)
}

fn default_symlink_base_path() -> String {
    "/data/leaving-soon".to_string()
}

fn default_movies_library_name() -> String {
    "Leaving Soon - Movies".to_string()
}

fn default_tv_library_name() -> String {
    "Leaving Soon - TV Shows".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn enabled(service: &Option<ServiceConfig>) -> bool {
    service.as_ref().map(|s| s.enabled).unwrap_or(false)
}

impl Config {
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load and validate in one step; what the daemon does on every reload.
    pub fn load_validated(path: &Path) -> anyhow::Result<Self> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.full_interval_secs == 0 {
            return Err(ConfigError::field("sync.full_interval_secs", "must be greater than zero"));
        }
        if self.sync.incremental_interval_secs == 0 {
            return Err(ConfigError::field("sync.incremental_interval_secs", "must be greater than zero"));
        }
        if self.sync.timeout_secs == 0 {
            return Err(ConfigError::field("sync.timeout_secs", "must be greater than zero"));
        }

        if !self.movies_enabled() && !self.series_enabled() {
            return Err(ConfigError::MissingIntegration(
                "at least one of radarr or sonarr must be enabled".to_string(),
            ));
        }

        let services = [
            ("radarr", self.integrations.radarr.clone()),
            ("sonarr", self.integrations.sonarr.clone()),
            ("jellyfin", self.integrations.jellyfin.as_ref().map(|j| j.as_service())),
            ("jellyseerr", self.integrations.jellyseerr.clone()),
            ("jellystat", self.integrations.jellystat.clone()),
        ];
        for (name, service) in services.iter() {
            if let Some(service) = service.as_ref().filter(|s| s.enabled) {
                let url = service.url.trim();
                if url.is_empty() {
                    return Err(ConfigError::field(format!("integrations.{}.url", name), "is required"));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::field(
                        format!("integrations.{}.url", name),
                        "must start with http:// or https://",
                    ));
                }
            }
        }

        if let Some(library) = self.symlink_library() {
            if !self.media_server_enabled() {
                return Err(ConfigError::MissingIntegration(
                    "symlink_library requires jellyfin to be enabled".to_string(),
                ));
            }
            if !library.base_path.starts_with('/') {
                return Err(ConfigError::field(
                    "integrations.jellyfin.symlink_library.base_path",
                    "must be an absolute path",
                ));
            }
            if library.movies_library_name.trim().is_empty() || library.tv_library_name.trim().is_empty() {
                return Err(ConfigError::field(
                    "integrations.jellyfin.symlink_library",
                    "library names cannot be empty",
                ));
            }
            if library.movies_library_name == library.tv_library_name {
                return Err(ConfigError::field(
                    "integrations.jellyfin.symlink_library",
                    "movies and tv library names must differ",
                ));
            }
        }

        let mut names = HashSet::new();
        for rule in &self.advanced_rules {
            let name = rule.name.trim();
            if name.is_empty() {
                return Err(ConfigError::rule("<unnamed>", "name is required"));
            }
            if !names.insert(name.to_lowercase()) {
                return Err(ConfigError::rule(name, "duplicate rule name"));
            }
            match &rule.matcher {
                RuleMatcher::Tag { tag } if tag.trim().is_empty() => {
                    return Err(ConfigError::rule(name, "tag cannot be empty"));
                }
                RuleMatcher::User { users } => {
                    if users.is_empty() {
                        return Err(ConfigError::rule(name, "at least one user is required"));
                    }
                    if let Some(index) = users.iter().position(|u| u.identifier().is_none()) {
                        return Err(ConfigError::rule(
                            name,
                            format!("user #{} needs a user_id, username or email", index + 1),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn movies_enabled(&self) -> bool {
        enabled(&self.integrations.radarr)
    }

    pub fn series_enabled(&self) -> bool {
        enabled(&self.integrations.sonarr)
    }

    pub fn media_server_enabled(&self) -> bool {
        self.integrations.jellyfin.as_ref().map(|j| j.enabled).unwrap_or(false)
    }

    pub fn requests_enabled(&self) -> bool {
        enabled(&self.integrations.jellyseerr)
    }

    pub fn history_enabled(&self) -> bool {
        enabled(&self.integrations.jellystat)
    }

    /// The preview library settings, when the feature is switched on
    pub fn symlink_library(&self) -> Option<&SymlinkLibraryConfig> {
        self.integrations
            .jellyfin
            .as_ref()
            .filter(|j| j.enabled)
            .map(|j| &j.symlink_library)
            .filter(|l| l.enabled)
    }

    /// Get list of configured and enabled services
    pub fn get_configured_services(&self) -> Vec<String> {
        let mut services = Vec::new();
        if self.movies_enabled() {
            services.push("radarr".to_string());
        }
        if self.series_enabled() {
            services.push("sonarr".to_string());
        }
        if self.media_server_enabled() {
            services.push("jellyfin".to_string());
        }
        if self.requests_enabled() {
            services.push("jellyseerr".to_string());
        }
        if self.history_enabled() {
            services.push("jellystat".to_string());
        }
        services
    }
}
