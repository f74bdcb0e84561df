use media_prune_clients::ClientError;
use media_prune_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a sync is already in progress; wait for it to finish or check `sweeparr status`")]
    SyncInProgress,

    #[error("required integration {service} failed: {source}")]
    RequiredIntegration {
        service: String,
        #[source]
        source: ClientError,
    },

    #[error("sync timed out after {0}s")]
    Timeout(u64),

    #[error("no media item with id '{0}'")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn storage(error: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", error))
    }
}
