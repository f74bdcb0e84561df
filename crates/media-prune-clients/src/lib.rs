pub mod error;
pub mod factory;
pub mod jellyfin;
pub mod jellyseerr;
pub mod jellystat;
pub mod radarr;
pub mod sonarr;
pub mod traits;

mod arr;
mod http;

pub use error::ClientError;
pub use factory::ClientSet;
pub use traits::{BridgeOutcome, HistoryTracker, LibraryManager, MediaServer, RequestTracker, SymlinkBridge};
