pub mod config;
pub mod credentials;
pub mod error;
pub mod paths;
pub mod retention;

pub use config::{
    AdvancedRule, AppConfig, Config, IntegrationsConfig, JellyfinConfig, LoggingConfig, RuleMatcher, RulesConfig,
    ServiceConfig, SymlinkLibraryConfig, SyncConfig, UserIdentifier, UserMatcher,
};
pub use credentials::CredentialStore;
pub use error::ConfigError;
pub use paths::{container_base_path, PathManager};
pub use retention::Retention;
