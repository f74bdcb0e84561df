//! Public face of the core: owns the catalog, the stores and the sync lock.

use chrono::Utc;
use media_prune_clients::ClientSet;
use media_prune_config::{Config, PathManager};
use media_prune_models::{Job, JobStatus, MediaItem, MediaType, SyncKind};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{error, info, instrument, warn};

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::exclusions::ExclusionStore;
use crate::jobs::JobRecorder;
use crate::rules::{evaluate, RuleContext};
use crate::storage::CatalogStorage;

/// Configuration and the clients built from it, swapped as one unit.
#[derive(Clone)]
pub(crate) struct Snapshot {
    pub(crate) config: Arc<Config>,
    pub(crate) clients: ClientSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    /// The running job, or the last finished one
    pub latest_job: Option<Job>,
}

pub struct Engine {
    pub(crate) snapshot: RwLock<Snapshot>,
    pub(crate) catalog: RwLock<Catalog>,
    pub(crate) exclusions: Mutex<ExclusionStore>,
    pub(crate) jobs: Mutex<JobRecorder>,
    pub(crate) storage: Option<CatalogStorage>,
    sync_lock: Arc<Mutex<()>>,
}

impl Engine {
    /// Engine with nothing persisted, for one-shot use and tests.
    pub fn new(config: Config, clients: ClientSet) -> Self {
        Self::with_parts(config, clients, Catalog::new(), ExclusionStore::in_memory(), JobRecorder::in_memory(), None)
    }

    /// Engine backed by the catalog snapshot, exclusions and job history
    /// under the data directory.
    pub fn open(config: Config, clients: ClientSet, paths: &PathManager) -> Result<Self, EngineError> {
        paths.ensure_directories().map_err(EngineError::storage)?;
        let storage = CatalogStorage::new(&paths.catalog_file());
        let catalog = storage.load().map_err(EngineError::storage)?;
        let exclusions = ExclusionStore::open(paths.exclusions_file()).map_err(EngineError::storage)?;
        let jobs = JobRecorder::open(paths.jobs_file()).map_err(EngineError::storage)?;
        Ok(Self::with_parts(config, clients, catalog, exclusions, jobs, Some(storage)))
    }

    fn with_parts(
        config: Config,
        clients: ClientSet,
        catalog: Catalog,
        exclusions: ExclusionStore,
        jobs: JobRecorder,
        storage: Option<CatalogStorage>,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Snapshot {
                config: Arc::new(config),
                clients,
            }),
            catalog: RwLock::new(catalog),
            exclusions: Mutex::new(exclusions),
            jobs: Mutex::new(jobs),
            storage,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn config(&self) -> Arc<Config> {
        self.snapshot.read().await.config.clone()
    }

    /// Swap in a reloaded configuration. A running cycle keeps the snapshot
    /// it started with; the next cycle sees the new one.
    pub async fn replace_config(&self, config: Config, clients: ClientSet) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.config = Arc::new(config);
        snapshot.clients = clients;
        info!(operation = "config_reload", "Configuration replaced");
    }

    fn acquire(&self) -> Result<OwnedMutexGuard<()>, EngineError> {
        self.sync_lock.clone().try_lock_owned().map_err(|_| EngineError::SyncInProgress)
    }

    /// Start a cycle in the background and return its job ID.
    pub async fn trigger_sync(self: &Arc<Self>, kind: SyncKind) -> Result<String, EngineError> {
        let guard = self.acquire()?;
        let job = self.jobs.lock().await.create(kind);
        let id = job.id.clone();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            engine.execute(job).await;
        });
        Ok(id)
    }

    /// Run a cycle to completion. A failed cycle is still `Ok`, with the
    /// failure recorded on the returned job.
    pub async fn run_sync(&self, kind: SyncKind) -> Result<Job, EngineError> {
        let _guard = self.acquire()?;
        let job = self.jobs.lock().await.create(kind);
        Ok(self.execute(job).await)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind))]
    async fn execute(&self, mut job: Job) -> Job {
        let snapshot = self.snapshot.read().await.clone();
        let config = snapshot.config.clone();

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        job.summary.dry_run = config.app.dry_run;
        job.summary.enable_deletion = config.app.enable_deletion;
        self.jobs.lock().await.update(&job);

        let timeout_secs = config.sync.timeout_secs;
        let limit = std::time::Duration::from_secs(timeout_secs);
        let result = match tokio::time::timeout(limit, self.cycle(&snapshot, &mut job)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(timeout_secs)),
        };

        job.completed_at = Some(Utc::now());
        match result {
            Ok(()) => {
                job.status = JobStatus::Completed;
                info!(
                    operation = "sync_complete",
                    duration_ms = job.duration_ms().unwrap_or_default(),
                    leaving_soon = job.summary.leaving_soon,
                    scheduled_deletions = job.summary.scheduled_deletions,
                    errors = job.summary.errors.len(),
                    "Sync cycle completed"
                );
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                error!(operation = "sync_complete", status = "error", error = %e, "Sync cycle failed");
                // A cut-off deletion pass has already removed items from the catalog.
                if job.summary.deleted_count.is_some_and(|n| n > 0) {
                    self.save_catalog(&mut job.summary.errors).await;
                }
            }
        }
        self.jobs.lock().await.update(&job);
        job
    }

    pub(crate) async fn save_catalog(&self, errors: &mut Vec<String>) {
        let Some(storage) = &self.storage else {
            return;
        };
        let catalog = self.catalog.read().await;
        if let Err(e) = storage.save(&catalog) {
            warn!(operation = "persist", error = %e, "Failed to save catalog snapshot");
            errors.push(format!("catalog snapshot: {:#}", e));
        }
    }

    /// Fail jobs a previous process left unfinished. Only the process that
    /// owns the schedule should call this.
    pub async fn recover_interrupted_jobs(&self) -> usize {
        self.jobs.lock().await.abandon_unfinished()
    }

    pub async fn sync_status(&self) -> SyncStatus {
        SyncStatus {
            running: self.sync_lock.try_lock().is_err(),
            latest_job: self.latest_job().await,
        }
    }

    pub async fn latest_job(&self) -> Option<Job> {
        self.jobs.lock().await.latest().cloned()
    }

    pub async fn job(&self, id: &str) -> Option<Job> {
        self.jobs.lock().await.get(id).cloned()
    }

    pub async fn recent_jobs(&self, limit: usize) -> Vec<Job> {
        self.jobs.lock().await.recent(limit)
    }

    pub async fn list_movies(&self) -> Vec<MediaItem> {
        self.list(MediaType::Movie).await
    }

    pub async fn list_series(&self) -> Vec<MediaItem> {
        self.list(MediaType::Series).await
    }

    async fn list(&self, media_type: MediaType) -> Vec<MediaItem> {
        self.catalog.read().await.list(media_type).into_iter().cloned().collect()
    }

    pub async fn list_leaving_soon(&self) -> Vec<MediaItem> {
        let window = self.config().await.app.leaving_soon_window();
        self.catalog
            .read()
            .await
            .leaving_soon(Utc::now(), window)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn media_by_id(&self, id: &str) -> Option<MediaItem> {
        self.catalog.read().await.get(id).cloned()
    }

    pub async fn media_by_title(&self, title: &str) -> Vec<MediaItem> {
        self.catalog.read().await.find_by_title(title).into_iter().cloned().collect()
    }

    /// Protect an item from deletion. The catalog view updates at once; the
    /// preview symlink goes away on the next reconciliation.
    pub async fn exclude(&self, id: &str, reason: &str) -> Result<MediaItem, EngineError> {
        if self.catalog.read().await.get(id).is_none() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        let exclusion = {
            let mut store = self.exclusions.lock().await;
            store.reload().map_err(EngineError::storage)?;
            store.exclude(id, reason, Utc::now()).map_err(EngineError::storage)?
        };

        let config = self.config().await;
        let mut catalog = self.catalog.write().await;
        let item = catalog.get_mut(id).ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        item.exclusion = Some(exclusion);
        evaluate(item, &rule_context(&config)).apply_to(item);
        Ok(item.clone())
    }

    /// Lift an exclusion. Returns whether one was present.
    pub async fn remove_exclusion(&self, id: &str) -> Result<bool, EngineError> {
        let removed = {
            let mut store = self.exclusions.lock().await;
            store.reload().map_err(EngineError::storage)?;
            store.remove(id).map_err(EngineError::storage)?
        };

        let config = self.config().await;
        if let Some(item) = self.catalog.write().await.get_mut(id) {
            item.exclusion = None;
            evaluate(item, &rule_context(&config)).apply_to(item);
        }
        Ok(removed)
    }
}

/// Rule context for evaluation outside a cycle, trusting the configuration
/// for history availability.
fn rule_context(config: &Config) -> RuleContext<'_> {
    RuleContext {
        rules: &config.rules,
        advanced_rules: &config.advanced_rules,
        history_enabled: config.history_enabled(),
    }
}
