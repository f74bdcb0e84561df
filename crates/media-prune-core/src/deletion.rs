use chrono::{DateTime, Utc};
use media_prune_clients::{ClientSet, SymlinkBridge};
use media_prune_config::AppConfig;
use media_prune_models::{DeletedItem, JobSummary, MediaItem, MediaType, SymlinkState};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::Catalog;
use crate::exclusions::ExclusionStore;

/// Irreversibly removes overdue items from every service.
pub struct DeletionExecutor<'a> {
    clients: &'a ClientSet,
    exclusions: &'a Mutex<ExclusionStore>,
    catalog: &'a RwLock<Catalog>,
}

impl<'a> DeletionExecutor<'a> {
    pub fn new(clients: &'a ClientSet, exclusions: &'a Mutex<ExclusionStore>, catalog: &'a RwLock<Catalog>) -> Self {
        Self {
            clients,
            exclusions,
            catalog,
        }
    }

    /// Returns `false` when the safety switches do not allow deletion.
    ///
    /// Failures are per item; one failed item never stops the batch. Each
    /// deletion is recorded in `summary` and dropped from the catalog before
    /// the next item starts.
    #[instrument(skip_all, fields(candidates = overdue.len()))]
    pub async fn execute(
        &self,
        app: &AppConfig,
        overdue: &[MediaItem],
        now: DateTime<Utc>,
        summary: &mut JobSummary,
    ) -> bool {
        if !app.deletion_allowed() {
            info!(
                operation = "delete",
                dry_run = app.dry_run,
                enable_deletion = app.enable_deletion,
                "Deletion disabled, {} overdue items left in place",
                overdue.len()
            );
            return false;
        }

        summary.start_deletion();
        let errors_before = summary.errors.len();
        for item in overdue {
            if let Some(deleted) = self.delete_one(item, now, &mut summary.errors).await {
                summary.record_deleted(deleted);
                self.catalog.write().await.remove(&item.id);
            }
        }

        info!(
            operation = "delete",
            deleted = summary.deleted_count.unwrap_or_default(),
            errors = summary.errors.len() - errors_before,
            "Deletion pass finished"
        );
        true
    }

    async fn still_excluded(&self, item: &MediaItem, errors: &mut Vec<String>) -> bool {
        if item.is_excluded() {
            return true;
        }
        let mut store = self.exclusions.lock().await;
        if let Err(e) = store.reload() {
            errors.push(format!("{}: could not verify exclusions, not deleted: {:#}", item.title, e));
            return true;
        }
        store.contains(&item.id)
    }

    /// Someone played the item after this cycle read its watch state. An
    /// unreachable server does not hold deletion back.
    async fn played_since_evaluation(&self, item: &MediaItem) -> bool {
        let (Some(server), Some(jellyfin_id)) = (&self.clients.media_server, &item.ids.jellyfin_id) else {
            return false;
        };
        match server.get_watch_state(jellyfin_id).await {
            Ok(live) => match (live.last_played, item.watch.last_played) {
                (Some(live), Some(seen)) => live > seen,
                (Some(_), None) => true,
                (None, _) => live.play_count > item.watch.play_count,
            },
            Err(e) => {
                warn!(operation = "delete", item = %item.id, error = %e, "Could not re-check watch state");
                false
            }
        }
    }

    /// A link the bridge could not remove counts as removed when it is no
    /// longer listed in its directory.
    async fn remove_preview(
        &self,
        bridge: &dyn SymlinkBridge,
        item: &MediaItem,
        symlink: &SymlinkState,
        errors: &mut Vec<String>,
    ) {
        match bridge.remove_symlinks(std::slice::from_ref(&symlink.path), false).await {
            Ok(result) if result.failed.is_empty() => {}
            Ok(_) => match bridge.list_symlinks(&symlink.target_dir).await {
                Ok(links) if !links.iter().any(|link| link.path == symlink.path) => {
                    debug!(operation = "delete", item = %item.id, path = %symlink.path, "Preview symlink already gone");
                }
                _ => errors.push(format!("{}: preview symlink {} was not removed", item.title, symlink.path)),
            },
            Err(e) => errors.push(format!("{}: failed to remove preview symlink: {}", item.title, e)),
        }
    }

    async fn delete_one(&self, item: &MediaItem, now: DateTime<Utc>, errors: &mut Vec<String>) -> Option<DeletedItem> {
        if self.still_excluded(item, errors).await {
            info!(operation = "delete", item = %item.id, "Skipping '{}': excluded", item.title);
            return None;
        }
        if self.played_since_evaluation(item).await {
            info!(operation = "delete", item = %item.id, "Skipping '{}': played during this cycle", item.title);
            return None;
        }

        let (manager, manager_id) = match item.media_type {
            MediaType::Movie => (self.clients.radarr.as_ref(), item.ids.radarr_id),
            MediaType::Series => (self.clients.sonarr.as_ref(), item.ids.sonarr_id),
        };
        let (Some(manager), Some(manager_id)) = (manager, manager_id) else {
            errors.push(format!("{}: no {} manager entry to delete", item.title, item.media_type));
            return None;
        };

        if let (Some(symlink), Some(bridge)) = (&item.symlink, &self.clients.bridge) {
            self.remove_preview(bridge.as_ref(), item, symlink, errors).await;
        }

        match manager.delete_entry(manager_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(operation = "delete", item = %item.id, "'{}' was already gone from {}", item.title, manager.service_name());
            }
            Err(e) => {
                error!(operation = "delete", item = %item.id, status = "error", error = %e, "Failed to delete '{}'", item.title);
                errors.push(format!("{}: {}", item.title, e));
                return None;
            }
        }

        if let (Some(server), Some(jellyfin_id)) = (&self.clients.media_server, &item.ids.jellyfin_id) {
            if let Err(e) = server.delete_item(jellyfin_id).await {
                if !e.is_not_found() {
                    warn!(operation = "delete", item = %item.id, error = %e, "Media server entry for '{}' not removed", item.title);
                    errors.push(format!("{}: files deleted but media server entry remains: {}", item.title, e));
                }
            }
        }

        info!(
            operation = "delete",
            item = %item.id,
            size = item.file_size,
            "Deleted '{}' ({})",
            item.title,
            item.deletion_reason
        );
        Some(DeletedItem {
            id: item.id.clone(),
            title: item.title.clone(),
            media_type: item.media_type,
            file_size: item.file_size,
            deleted_at: now,
        })
    }
}
