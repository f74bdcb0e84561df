//! In-memory clients for engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use media_prune_clients::{
    BridgeOutcome, ClientError, HistoryTracker, LibraryManager, MediaServer, RequestTracker, SymlinkBridge,
};
use media_prune_models::{
    BridgeStatus, HistoryRecord, ManagedEntry, MediaIds, MediaItem, MediaRequest, MediaType, Page, PageRequest,
    ServerItem, SymlinkEntry, SymlinkRequest, VirtualFolder, WatchState,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

fn unavailable(service: &str) -> ClientError {
    ClientError::unavailable(service, "connection refused")
}

pub fn leaving_item(id: &str, media_type: MediaType, now: DateTime<Utc>, due_in_days: i64) -> MediaItem {
    let mut item = MediaItem::new(
        id.to_string(),
        MediaIds::default(),
        id.to_string(),
        media_type,
        format!("/media/{}", id.replace(':', "_")),
        now - Duration::days(30),
    );
    item.deletion_date = Some(now + Duration::days(due_in_days));
    item
}

pub fn movie_entry(manager_id: u64, tmdb_id: u32, title: &str, added: DateTime<Utc>) -> ManagedEntry {
    ManagedEntry {
        manager_id,
        media_type: MediaType::Movie,
        title: title.to_string(),
        year: Some(2020),
        ids: MediaIds {
            tmdb_id: Some(tmdb_id),
            radarr_id: Some(manager_id),
            ..MediaIds::default()
        },
        path: format!("/movies/{}/{}.mkv", title, title),
        size_on_disk: 1_000_000,
        added,
        tags: Vec::new(),
        has_file: true,
    }
}

pub fn series_entry(manager_id: u64, tvdb_id: u32, title: &str, added: DateTime<Utc>) -> ManagedEntry {
    ManagedEntry {
        manager_id,
        media_type: MediaType::Series,
        title: title.to_string(),
        year: Some(2019),
        ids: MediaIds {
            tvdb_id: Some(tvdb_id),
            sonarr_id: Some(manager_id),
            ..MediaIds::default()
        },
        path: format!("/tv/{}", title),
        size_on_disk: 5_000_000,
        added,
        tags: Vec::new(),
        has_file: true,
    }
}

pub struct FakeManager {
    media_type: MediaType,
    entries: Mutex<Vec<ManagedEntry>>,
    failing: AtomicBool,
    delay: Mutex<Option<std::time::Duration>>,
    delete_delay: Mutex<Option<std::time::Duration>>,
    pub list_calls: AtomicUsize,
    deleted: Mutex<Vec<u64>>,
    fail_delete: Mutex<HashSet<u64>>,
}

impl FakeManager {
    pub fn new(media_type: MediaType, entries: Vec<ManagedEntry>) -> Self {
        Self {
            media_type,
            entries: Mutex::new(entries),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            delete_delay: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            fail_delete: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_delete_delay(&self, delay: std::time::Duration) {
        *self.delete_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_delete_of(&self, manager_id: u64) {
        self.fail_delete.lock().unwrap().insert(manager_id);
    }

    pub fn set_entries(&self, entries: Vec<ManagedEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn deleted(&self) -> Vec<u64> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl LibraryManager for FakeManager {
    fn service_name(&self) -> &str {
        match self.media_type {
            MediaType::Movie => "radarr",
            MediaType::Series => "sonarr",
        }
    }

    fn media_type(&self) -> MediaType {
        self.media_type
    }

    async fn ping(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<ManagedEntry>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable(self.service_name()));
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn delete_entry(&self, manager_id: u64) -> Result<(), ClientError> {
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_delete.lock().unwrap().contains(&manager_id) {
            return Err(ClientError::Status {
                service: self.service_name().to_string(),
                status: 500,
                body: "disk busy".to_string(),
            });
        }
        self.deleted.lock().unwrap().push(manager_id);
        self.entries.lock().unwrap().retain(|e| e.manager_id != manager_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeServer {
    items: Mutex<Vec<ServerItem>>,
    failing: AtomicBool,
    deleted: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new(items: Vec<ServerItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

pub fn server_item(item_id: &str, media_type: MediaType, ids: MediaIds) -> ServerItem {
    ServerItem {
        item_id: item_id.to_string(),
        name: item_id.to_string(),
        media_type,
        ids,
        path: None,
        watch: WatchState::default(),
    }
}

#[async_trait]
impl MediaServer for FakeServer {
    fn service_name(&self) -> &str {
        "jellyfin"
    }

    async fn ping(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<ServerItem>, ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("jellyfin"));
        }
        Ok(self.items.lock().unwrap().clone())
    }

    async fn get_watch_state(&self, item_id: &str) -> Result<WatchState, ClientError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.item_id == item_id)
            .map(|i| i.watch.clone())
            .unwrap_or_default())
    }

    async fn delete_item(&self, item_id: &str) -> Result<(), ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("jellyfin"));
        }
        self.deleted.lock().unwrap().push(item_id.to_string());
        Ok(())
    }
}

fn paginate<T: Clone>(all: &[T], page: PageRequest) -> Page<T> {
    let start = (page.offset() as usize).min(all.len());
    let end = (start + page.page_size as usize).min(all.len());
    Page {
        items: all[start..end].to_vec(),
        total: Some(all.len() as u64),
    }
}

#[derive(Default)]
pub struct FakeRequests {
    requests: Mutex<Vec<MediaRequest>>,
    failing: AtomicBool,
    pub pages_served: AtomicUsize,
}

impl FakeRequests {
    pub fn new(requests: Vec<MediaRequest>) -> Self {
        Self {
            requests: Mutex::new(requests),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestTracker for FakeRequests {
    fn service_name(&self) -> &str {
        "jellyseerr"
    }

    async fn ping(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_requests(&self, page: PageRequest) -> Result<Page<MediaRequest>, ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("jellyseerr"));
        }
        self.pages_served.fetch_add(1, Ordering::SeqCst);
        Ok(paginate(&self.requests.lock().unwrap(), page))
    }
}

#[derive(Default)]
pub struct FakeHistory {
    records: Mutex<Vec<HistoryRecord>>,
    failing: AtomicBool,
}

impl FakeHistory {
    pub fn new(records: Vec<HistoryRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl HistoryTracker for FakeHistory {
    fn service_name(&self) -> &str {
        "jellystat"
    }

    async fn ping(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_watch_history(&self, page: PageRequest) -> Result<Page<HistoryRecord>, ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("jellystat"));
        }
        Ok(paginate(&self.records.lock().unwrap(), page))
    }
}

/// Bridge backed by an in-memory directory tree.
#[derive(Default)]
pub struct FakeBridge {
    /// symlink path -> (target dir, source)
    links: Mutex<BTreeMap<String, (String, String)>>,
    folders: Mutex<Vec<VirtualFolder>>,
    failing: AtomicBool,
    mutations: AtomicUsize,
}

impl FakeBridge {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Add/remove/create/delete calls received so far
    pub fn mutation_calls(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn linked_sources(&self) -> Vec<String> {
        self.links.lock().unwrap().values().map(|(_, source)| source.clone()).collect()
    }

    pub fn folder_names(&self) -> Vec<String> {
        self.folders.lock().unwrap().iter().map(|f| f.name.clone()).collect()
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("bridge"));
        }
        Ok(())
    }
}

#[async_trait]
impl SymlinkBridge for FakeBridge {
    async fn status(&self) -> Result<BridgeStatus, ClientError> {
        self.check()?;
        Ok(BridgeStatus {
            version: "test".to_string(),
            healthy: true,
        })
    }

    async fn list_symlinks(&self, directory: &str) -> Result<Vec<SymlinkEntry>, ClientError> {
        self.check()?;
        Ok(self
            .links
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (dir, _))| dir == directory)
            .map(|(path, (_, source))| SymlinkEntry {
                path: path.clone(),
                target: source.clone(),
            })
            .collect())
    }

    async fn add_symlinks(&self, items: &[SymlinkRequest], dry_run: bool) -> Result<BridgeOutcome, ClientError> {
        self.check()?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut outcome = BridgeOutcome::default();
        for item in items {
            if !dry_run {
                let name = item.source_path.rsplit('/').next().unwrap_or_default();
                self.links.lock().unwrap().insert(
                    format!("{}/{}", item.target_dir, name),
                    (item.target_dir.clone(), item.source_path.clone()),
                );
            }
            outcome.applied.push(item.source_path.clone());
        }
        Ok(outcome)
    }

    async fn remove_symlinks(&self, paths: &[String], dry_run: bool) -> Result<BridgeOutcome, ClientError> {
        self.check()?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut outcome = BridgeOutcome::default();
        for path in paths {
            let removed = dry_run || self.links.lock().unwrap().remove(path).is_some();
            if removed {
                outcome.applied.push(path.clone());
            } else {
                outcome.failed.push(path.clone());
            }
        }
        Ok(outcome)
    }

    async fn list_virtual_folders(&self) -> Result<Vec<VirtualFolder>, ClientError> {
        self.check()?;
        Ok(self.folders.lock().unwrap().clone())
    }

    async fn create_virtual_folder(&self, name: &str, media_type: MediaType, path: &str) -> Result<(), ClientError> {
        self.check()?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.folders.lock().unwrap().push(VirtualFolder {
            name: name.to_string(),
            locations: vec![path.to_string()],
            collection_type: Some(media_type.to_string()),
        });
        Ok(())
    }

    async fn delete_virtual_folder(&self, name: &str) -> Result<(), ClientError> {
        self.check()?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.folders.lock().unwrap().retain(|f| f.name != name);
        Ok(())
    }
}
