//! Keeps the "leaving soon" preview libraries in step with the catalog.
//!
//! Each pass diffs the desired symlink set against what the bridge reports
//! and issues only the missing adds and removes, so repeated passes over an
//! unchanged catalog make no mutating calls.

use chrono::{DateTime, Duration, Utc};
use media_prune_clients::{BridgeOutcome, ClientError, SymlinkBridge};
use media_prune_config::SymlinkLibraryConfig;
use media_prune_models::{MediaItem, MediaType, ReconcileReport, SymlinkRequest, SymlinkState, VirtualFolder};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub report: ReconcileReport,
    /// New symlink state per item ID, for every type the bridge could list
    pub symlinks: HashMap<String, Option<SymlinkState>>,
}

fn link_path(target_dir: &str, source_path: &str) -> String {
    let name = source_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(source_path);
    format!("{}/{}", target_dir.trim_end_matches('/'), name)
}

pub struct Reconciler<'a> {
    bridge: &'a dyn SymlinkBridge,
    library: &'a SymlinkLibraryConfig,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(bridge: &'a dyn SymlinkBridge, library: &'a SymlinkLibraryConfig, dry_run: bool) -> Self {
        Self {
            bridge,
            library,
            dry_run,
        }
    }

    #[instrument(skip(self, items), fields(dry_run = self.dry_run))]
    pub async fn reconcile(&self, items: &[MediaItem], now: DateTime<Utc>, window: Duration) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            report: ReconcileReport {
                dry_run: self.dry_run,
                ..ReconcileReport::default()
            },
            ..ReconcileOutcome::default()
        };
        let mut folders: Option<Vec<VirtualFolder>> = None;

        for media_type in [MediaType::Movie, MediaType::Series] {
            let desired: BTreeMap<&str, &str> = items
                .iter()
                .filter(|i| i.media_type == media_type && !i.is_excluded() && i.is_leaving_soon(now, window))
                .filter(|i| !i.file_path.is_empty())
                .map(|i| (i.file_path.as_str(), i.id.as_str()))
                .collect();

            if let Err(e) = self.sync_links(media_type, items, &desired, &mut outcome).await {
                outcome.report.errors.push(format!("{} symlinks: {}", media_type, e));
                warn!(operation = "reconcile", media_type = %media_type, status = "error", error = %e, "Bridge call failed");
                continue;
            }

            if folders.is_none() {
                match self.bridge.list_virtual_folders().await {
                    Ok(list) => folders = Some(list),
                    Err(e) => {
                        outcome.report.errors.push(format!("virtual folders: {}", e));
                        warn!(operation = "reconcile", status = "error", error = %e, "Failed to list virtual folders");
                        continue;
                    }
                }
            }
            let existing = folders.as_deref().unwrap_or_default();
            if let Err(e) = self.sync_folder(media_type, desired.is_empty(), existing, &mut outcome.report).await {
                outcome.report.errors.push(format!("{} library: {}", media_type, e));
                warn!(operation = "reconcile", media_type = %media_type, status = "error", error = %e, "Library update failed");
            }
        }

        info!(
            operation = "reconcile",
            added = outcome.report.added,
            removed = outcome.report.removed,
            errors = outcome.report.errors.len(),
            "Leaving-soon reconciliation finished"
        );
        outcome
    }

    async fn sync_links(
        &self,
        media_type: MediaType,
        items: &[MediaItem],
        desired: &BTreeMap<&str, &str>,
        outcome: &mut ReconcileOutcome,
    ) -> Result<(), ClientError> {
        let dir = self.library.directory_for(media_type);
        let actual = self.bridge.list_symlinks(&dir).await?;

        for item in items.iter().filter(|i| i.media_type == media_type) {
            outcome.symlinks.insert(item.id.clone(), None);
        }

        let mut present: HashSet<&str> = HashSet::new();
        let mut to_remove: Vec<String> = Vec::new();
        for link in &actual {
            match desired.get(link.target.as_str()) {
                Some(item_id) => {
                    present.insert(link.target.as_str());
                    outcome.symlinks.insert(
                        item_id.to_string(),
                        Some(SymlinkState {
                            path: link.path.clone(),
                            target_dir: dir.clone(),
                        }),
                    );
                }
                None => to_remove.push(link.path.clone()),
            }
        }
        let to_add: Vec<SymlinkRequest> = desired
            .keys()
            .filter(|source| !present.contains(*source))
            .map(|source| SymlinkRequest {
                source_path: source.to_string(),
                target_dir: dir.clone(),
            })
            .collect();

        debug!(
            "{}: {} desired, {} present, {} to add, {} to remove",
            media_type,
            desired.len(),
            actual.len(),
            to_add.len(),
            to_remove.len()
        );

        if self.dry_run {
            for request in &to_add {
                info!(operation = "reconcile", dry_run = true, "Would link {} into {}", request.source_path, dir);
            }
            for path in &to_remove {
                info!(operation = "reconcile", dry_run = true, "Would remove {}", path);
            }
            outcome.report.added += to_add.len();
            outcome.report.removed += to_remove.len();
            return Ok(());
        }

        if !to_remove.is_empty() {
            let result = self.bridge.remove_symlinks(&to_remove, false).await?;
            outcome.report.removed += result.applied.len();
            record_failures(&mut outcome.report, "remove", &result);
        }

        if !to_add.is_empty() {
            let result = self.bridge.add_symlinks(&to_add, false).await?;
            outcome.report.added += result.applied.len();
            record_failures(&mut outcome.report, "add", &result);
            for source in &result.applied {
                if let Some(item_id) = desired.get(source.as_str()) {
                    outcome.symlinks.insert(
                        item_id.to_string(),
                        Some(SymlinkState {
                            path: link_path(&dir, source),
                            target_dir: dir.clone(),
                        }),
                    );
                }
            }
        }
        Ok(())
    }

    /// Check-then-act on the library for one type.
    async fn sync_folder(
        &self,
        media_type: MediaType,
        nothing_leaving: bool,
        existing: &[VirtualFolder],
        report: &mut ReconcileReport,
    ) -> Result<(), ClientError> {
        let name = self.library.library_name_for(media_type);
        let exists = existing.iter().any(|f| f.name == name);

        if self.library.hide_when_empty && nothing_leaving {
            if exists {
                if self.dry_run {
                    info!(operation = "reconcile", dry_run = true, "Would hide empty library '{}'", name);
                } else {
                    self.bridge.delete_virtual_folder(name).await?;
                    info!(operation = "reconcile", "Removed empty library '{}'", name);
                }
                report.folders_deleted.push(name.to_string());
            }
        } else if !exists {
            let dir = self.library.directory_for(media_type);
            if self.dry_run {
                info!(operation = "reconcile", dry_run = true, "Would create library '{}' at {}", name, dir);
            } else {
                self.bridge.create_virtual_folder(name, media_type, &dir).await?;
                info!(operation = "reconcile", "Created library '{}' at {}", name, dir);
            }
            report.folders_created.push(name.to_string());
        }
        Ok(())
    }
}

fn record_failures(report: &mut ReconcileReport, action: &str, result: &BridgeOutcome) {
    for path in &result.failed {
        report.errors.push(format!("failed to {} symlink for {}", action, path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{leaving_item, FakeBridge};

    fn library(hide_when_empty: bool) -> SymlinkLibraryConfig {
        SymlinkLibraryConfig {
            enabled: true,
            hide_when_empty,
            ..SymlinkLibraryConfig::default()
        }
    }

    #[test]
    fn test_link_path_uses_last_component() {
        assert_eq!(link_path("/ls/movies", "/movies/Heat (1995)/Heat.mkv"), "/ls/movies/Heat.mkv");
        assert_eq!(link_path("/ls/tv/", "/tv/Dark/"), "/ls/tv/Dark");
    }

    #[tokio::test]
    async fn test_second_pass_makes_no_changes() {
        let bridge = FakeBridge::default();
        let library = library(true);
        let now = Utc::now();
        let items = vec![
            leaving_item("movie:tmdb:1", MediaType::Movie, now, 3),
            leaving_item("movie:tmdb:2", MediaType::Movie, now, 5),
            leaving_item("series:tvdb:1", MediaType::Series, now, 60),
        ];
        let reconciler = Reconciler::new(&bridge, &library, false);

        let first = reconciler.reconcile(&items, now, Duration::days(14)).await;
        assert_eq!(first.report.added, 2);
        assert_eq!(first.report.folders_created, vec!["Leaving Soon - Movies"]);
        assert!(first.report.succeeded());
        assert!(first.symlinks["movie:tmdb:1"].is_some());
        assert!(first.symlinks["series:tvdb:1"].is_none());

        let calls = bridge.mutation_calls();
        let second = reconciler.reconcile(&items, now, Duration::days(14)).await;
        assert_eq!(second.report.added, 0);
        assert_eq!(second.report.removed, 0);
        assert!(second.report.folders_created.is_empty());
        assert_eq!(bridge.mutation_calls(), calls);
        assert_eq!(
            second.symlinks["movie:tmdb:2"].as_ref().unwrap().target_dir,
            "/data/leaving-soon/movies"
        );
    }

    #[tokio::test]
    async fn test_items_leaving_the_window_are_unlinked_and_library_hidden() {
        let bridge = FakeBridge::default();
        let library = library(true);
        let now = Utc::now();
        let mut items = vec![leaving_item("movie:tmdb:1", MediaType::Movie, now, 3)];
        let reconciler = Reconciler::new(&bridge, &library, false);
        reconciler.reconcile(&items, now, Duration::days(14)).await;
        assert_eq!(bridge.link_count(), 1);

        items[0].exclusion = Some(media_prune_models::Exclusion {
            reason: "keep".to_string(),
            excluded_at: now,
        });
        items[0].deletion_date = None;
        let outcome = reconciler.reconcile(&items, now, Duration::days(14)).await;

        assert_eq!(outcome.report.removed, 1);
        assert_eq!(outcome.report.folders_deleted, vec!["Leaving Soon - Movies"]);
        assert_eq!(bridge.link_count(), 0);
        assert!(bridge.folder_names().is_empty());
    }

    #[tokio::test]
    async fn test_visible_library_kept_when_not_hiding() {
        let bridge = FakeBridge::default();
        let library = library(false);
        let reconciler = Reconciler::new(&bridge, &library, false);

        let outcome = reconciler.reconcile(&[], Utc::now(), Duration::days(14)).await;
        assert_eq!(outcome.report.folders_created.len(), 2);
        assert_eq!(bridge.folder_names().len(), 2);

        let again = reconciler.reconcile(&[], Utc::now(), Duration::days(14)).await;
        assert!(again.report.folders_created.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_mutating() {
        let bridge = FakeBridge::default();
        let library = library(true);
        let now = Utc::now();
        let items = vec![leaving_item("movie:tmdb:1", MediaType::Movie, now, 3)];

        let outcome = Reconciler::new(&bridge, &library, true)
            .reconcile(&items, now, Duration::days(14))
            .await;

        assert!(outcome.report.dry_run);
        assert_eq!(outcome.report.added, 1);
        assert_eq!(outcome.report.folders_created.len(), 1);
        assert_eq!(bridge.mutation_calls(), 0);
        assert_eq!(bridge.link_count(), 0);
    }

    #[tokio::test]
    async fn test_bridge_failure_is_reported() {
        let bridge = FakeBridge::default();
        bridge.set_failing(true);
        let library = library(true);
        let now = Utc::now();
        let items = vec![leaving_item("movie:tmdb:1", MediaType::Movie, now, 3)];

        let outcome = Reconciler::new(&bridge, &library, false)
            .reconcile(&items, now, Duration::days(14))
            .await;

        assert!(!outcome.report.succeeded());
        assert_eq!(outcome.report.errors.len(), 2);
        assert!(outcome.symlinks.is_empty());
    }
}
