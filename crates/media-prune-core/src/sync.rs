//! One sync cycle: fetch, correlate, evaluate, reconcile, delete.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use futures::Future;
use media_prune_clients::{ClientError, ClientSet};
use media_prune_config::Config;
use media_prune_models::{
    DeletionCandidate, Exclusion, HistoryRecord, Job, ManagedEntry, MediaItem, MediaRequest, MediaType, Page,
    PageRequest, ServerItem, SyncKind,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::correlate::{items_from_entries, Enrichment};
use crate::deletion::DeletionExecutor;
use crate::engine::{Engine, Snapshot};
use crate::error::EngineError;
use crate::reconcile::Reconciler;
use crate::rules::{evaluate, RuleContext};

const PAGE_SIZE: u32 = 100;
/// Upper bound on pages per paginated source, against services that never
/// report an end.
const MAX_PAGES: u32 = 1_000;

/// Everything the integrations returned for one cycle.
///
/// `None` for an optional source means disabled or failed; either way its
/// facts are cleared for this cycle.
struct Fetched {
    entries: Vec<(MediaType, Vec<ManagedEntry>)>,
    server: Option<Vec<ServerItem>>,
    requests: Option<Vec<MediaRequest>>,
    history: Option<Vec<HistoryRecord>>,
}

async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, ClientError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, ClientError>>,
{
    let mut request = PageRequest::first(PAGE_SIZE);
    let mut items = Vec::new();
    loop {
        let page = fetch(request).await?;
        let more = page.has_more(request);
        items.extend(page.items);
        if !more || request.page + 1 >= MAX_PAGES {
            break;
        }
        request = request.next();
    }
    Ok(items)
}

/// Keep the data of an optional source, or record why it is missing.
fn degrade<T>(service: &str, result: Option<Result<T, ClientError>>, errors: &mut Vec<String>) -> Option<T> {
    match result? {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                operation = "fetch",
                service = service,
                status = "error",
                error = %e,
                "Optional integration {} failed, continuing without it",
                service
            );
            errors.push(format!("{}: {}", service, e));
            None
        }
    }
}

#[instrument(skip(clients, errors))]
async fn fetch(clients: &ClientSet, kind: SyncKind, errors: &mut Vec<String>) -> Result<Fetched, EngineError> {
    let managers = match kind {
        SyncKind::Full => clients.managers(),
        SyncKind::Incremental => Vec::new(),
    };
    let entries = try_join_all(managers.iter().map(|manager| async move {
        let entries = manager
            .list_entries()
            .await
            .map_err(|source| EngineError::RequiredIntegration {
                service: manager.service_name().to_string(),
                source,
            })?;
        info!(operation = "fetch", service = manager.service_name(), count = entries.len(), "Fetched library");
        Ok::<_, EngineError>((manager.media_type(), entries))
    }));

    let server = async {
        match &clients.media_server {
            Some(server) => Some(server.list_items().await),
            None => None,
        }
    };
    let requests = async {
        match &clients.requests {
            Some(tracker) => Some(collect_pages(|page| tracker.list_requests(page)).await),
            None => None,
        }
    };
    let history = async {
        match &clients.history {
            Some(tracker) => Some(collect_pages(|page| tracker.list_watch_history(page)).await),
            None => None,
        }
    };

    let (entries, server, requests, history) = futures::join!(entries, server, requests, history);
    let entries = entries?;

    let fetched = Fetched {
        entries,
        server: degrade("jellyfin", server, errors),
        requests: degrade("jellyseerr", requests, errors),
        history: degrade("jellystat", history, errors),
    };
    debug!(
        "Fetched: server={:?} requests={:?} history={:?}",
        fetched.server.as_ref().map(Vec::len),
        fetched.requests.as_ref().map(Vec::len),
        fetched.history.as_ref().map(Vec::len)
    );
    Ok(fetched)
}

fn candidate(item: &MediaItem, now: DateTime<Utc>) -> Option<DeletionCandidate> {
    let deletion_date = item.deletion_date?;
    Some(DeletionCandidate {
        id: item.id.clone(),
        title: item.title.clone(),
        media_type: item.media_type,
        file_size: item.file_size,
        deletion_date,
        days_overdue: (now - deletion_date).num_days(),
        reason: item.deletion_reason.clone(),
        rule: item.rule_source.clone(),
    })
}

/// Fresh facts, exclusion and verdict for every item of the cycle.
fn evaluate_all(items: &mut [MediaItem], enrichment: &Enrichment, exclusions: &BTreeMap<String, Exclusion>, config: &Config) {
    let ctx = RuleContext {
        rules: &config.rules,
        advanced_rules: &config.advanced_rules,
        history_enabled: enrichment.has_history(),
    };
    for item in items.iter_mut() {
        enrichment.apply(item);
        item.exclusion = exclusions.get(&item.id).cloned();
        evaluate(item, &ctx).apply_to(item);
    }
}

impl Engine {
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub(crate) async fn cycle(&self, snapshot: &Snapshot, job: &mut Job) -> Result<(), EngineError> {
        let config = snapshot.config.as_ref();
        let clients = &snapshot.clients;
        let now = Utc::now();
        let errors = &mut job.summary.errors;

        let managed_types: Vec<MediaType> = clients.managers().iter().map(|m| m.media_type()).collect();
        if job.kind == SyncKind::Incremental {
            let catalog = self.catalog.read().await;
            if let Some(missing) = managed_types.iter().find(|t| !catalog.has_synced(**t)) {
                info!(operation = "sync_start", "No full sync of {} yet, running a full sync instead", missing);
                job.kind = SyncKind::Full;
            }
        }
        info!(
            operation = "sync_start",
            kind = %job.kind,
            dry_run = config.app.dry_run,
            enable_deletion = config.app.enable_deletion,
            "Starting sync cycle"
        );

        let (exclusions, exclusions_trusted) = {
            let mut store = self.exclusions.lock().await;
            match store.reload() {
                Ok(()) => (store.snapshot(), true),
                Err(e) => {
                    errors.push(format!("exclusions: {:#}; deletion skipped this cycle", e));
                    (store.snapshot(), false)
                }
            }
        };

        let fetched = fetch(clients, job.kind, errors).await?;
        let enrichment = Enrichment::new(fetched.server, fetched.requests, fetched.history);

        // Work on copies; the shared catalog only changes once evaluation is done.
        let mut batches: Vec<(MediaType, Vec<MediaItem>)> = Vec::new();
        match job.kind {
            SyncKind::Full => {
                let catalog = self.catalog.read().await;
                for (media_type, entries) in fetched.entries {
                    let correlated = items_from_entries(entries);
                    for skipped in &correlated.skipped {
                        warn!(operation = "correlate", media_type = %media_type, "Skipped {}", skipped);
                    }
                    job.summary.skipped_items += correlated.skipped.len();
                    let mut items = correlated.items;
                    for item in items.iter_mut() {
                        if let Some(previous) = catalog.get(&item.id) {
                            item.symlink = previous.symlink.clone();
                        }
                    }
                    batches.push((media_type, items));
                }
            }
            SyncKind::Incremental => {
                let catalog = self.catalog.read().await;
                for media_type in &managed_types {
                    let items = catalog.list(*media_type).into_iter().cloned().collect();
                    batches.push((*media_type, items));
                }
            }
        }

        for (_, items) in batches.iter_mut() {
            evaluate_all(items, &enrichment, &exclusions, config);
        }

        {
            let mut catalog = self.catalog.write().await;
            catalog.retain_types(&managed_types);
            for (media_type, items) in batches {
                match job.kind {
                    SyncKind::Full => catalog.replace_type(media_type, items),
                    SyncKind::Incremental => items.into_iter().for_each(|item| catalog.upsert(item)),
                }
            }
        }

        let window = config.app.leaving_soon_window();
        let items = {
            let catalog = self.catalog.read().await;
            let summary = &mut job.summary;
            summary.movies = catalog.count(MediaType::Movie);
            summary.series = catalog.count(MediaType::Series);
            summary.excluded = catalog.items().filter(|i| i.is_excluded()).count();
            summary.leaving_soon = catalog.leaving_soon(now, window).len();
            let overdue = catalog.overdue(now);
            summary.scheduled_deletions = overdue.len();
            summary.would_delete = overdue.into_iter().filter_map(|i| candidate(i, now)).collect();
            catalog.to_vec()
        };
        info!(
            operation = "evaluate",
            movies = job.summary.movies,
            series = job.summary.series,
            excluded = job.summary.excluded,
            leaving_soon = job.summary.leaving_soon,
            scheduled_deletions = job.summary.scheduled_deletions,
            "Evaluation finished"
        );

        if let (Some(bridge), Some(library)) = (&clients.bridge, config.symlink_library()) {
            let outcome = Reconciler::new(bridge.as_ref(), library, config.app.dry_run)
                .reconcile(&items, now, window)
                .await;
            {
                let mut catalog = self.catalog.write().await;
                for (id, symlink) in outcome.symlinks {
                    if let Some(item) = catalog.get_mut(&id) {
                        item.symlink = symlink;
                    }
                }
            }
            job.summary
                .errors
                .extend(outcome.report.errors.iter().map(|e| format!("reconcile: {}", e)));
            job.summary.reconciliation = Some(outcome.report);
        }

        if config.app.deletion_allowed() && !exclusions_trusted {
            warn!(operation = "delete", "Exclusions could not be read, no item deleted this cycle");
        } else {
            // After reconciliation, so symlink state reflects the links it removed.
            let overdue: Vec<MediaItem> = self.catalog.read().await.overdue(now).into_iter().cloned().collect();
            DeletionExecutor::new(clients, &self.exclusions, &self.catalog)
                .execute(&config.app, &overdue, now, &mut job.summary)
                .await;
        }

        self.save_catalog(&mut job.summary.errors).await;
        Ok(())
    }
}
