//! Client seams the engine is written against.
//!
//! Implementations are thin request/response wrappers; every decision lives
//! in the core crate.

use async_trait::async_trait;
use media_prune_models::{
    BridgeStatus, HistoryRecord, ManagedEntry, MediaRequest, MediaType, Page, PageRequest, ServerItem,
    SymlinkEntry, SymlinkRequest, VirtualFolder, WatchState,
};

use crate::error::ClientError;

/// Movie or TV manager, the source of truth for files on disk.
#[async_trait]
pub trait LibraryManager: Send + Sync {
    fn service_name(&self) -> &str;

    fn media_type(&self) -> MediaType;

    async fn ping(&self) -> Result<(), ClientError>;

    /// ListMovies / ListSeries
    async fn list_entries(&self) -> Result<Vec<ManagedEntry>, ClientError>;

    /// Remove the entry and its files from disk.
    async fn delete_entry(&self, manager_id: u64) -> Result<(), ClientError>;
}

#[async_trait]
pub trait MediaServer: Send + Sync {
    fn service_name(&self) -> &str;

    async fn ping(&self) -> Result<(), ClientError>;

    /// Every movie and series with provider IDs and aggregated watch state
    async fn list_items(&self) -> Result<Vec<ServerItem>, ClientError>;

    async fn get_watch_state(&self, item_id: &str) -> Result<WatchState, ClientError>;

    async fn delete_item(&self, item_id: &str) -> Result<(), ClientError>;
}

#[async_trait]
pub trait RequestTracker: Send + Sync {
    fn service_name(&self) -> &str;

    async fn ping(&self) -> Result<(), ClientError>;

    async fn list_requests(&self, page: PageRequest) -> Result<Page<MediaRequest>, ClientError>;
}

#[async_trait]
pub trait HistoryTracker: Send + Sync {
    fn service_name(&self) -> &str;

    async fn ping(&self) -> Result<(), ClientError>;

    async fn list_watch_history(&self, page: PageRequest) -> Result<Page<HistoryRecord>, ClientError>;
}

/// Per-path result of a bridge batch call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeOutcome {
    pub applied: Vec<String>,
    pub failed: Vec<String>,
}

/// Media server plugin that manages the preview symlinks and libraries.
#[async_trait]
pub trait SymlinkBridge: Send + Sync {
    async fn status(&self) -> Result<BridgeStatus, ClientError>;

    async fn list_symlinks(&self, directory: &str) -> Result<Vec<SymlinkEntry>, ClientError>;

    async fn add_symlinks(&self, items: &[SymlinkRequest], dry_run: bool) -> Result<BridgeOutcome, ClientError>;

    async fn remove_symlinks(&self, paths: &[String], dry_run: bool) -> Result<BridgeOutcome, ClientError>;

    async fn list_virtual_folders(&self) -> Result<Vec<VirtualFolder>, ClientError>;

    async fn create_virtual_folder(
        &self,
        name: &str,
        media_type: MediaType,
        path: &str,
    ) -> Result<(), ClientError>;

    async fn delete_virtual_folder(&self, name: &str) -> Result<(), ClientError>;
}
