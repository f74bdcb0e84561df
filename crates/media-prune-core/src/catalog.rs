//! In-memory media catalog keyed by internal ID.

use chrono::{DateTime, Duration, Utc};
use media_prune_models::{MediaIds, MediaItem, MediaType};
use std::collections::{HashMap, HashSet};

/// Stable internal key for an item, e.g. `movie:tmdb:603` or `series:tvdb:81189`.
///
/// Movies prefer TMDB and series prefer TVDB, matching what each manager
/// keys on. `None` when the item has no metadata database ID at all.
pub fn internal_id(media_type: MediaType, ids: &MediaIds) -> Option<String> {
    let imdb = || ids.imdb_id.as_ref().map(|id| format!("imdb:{}", id.to_lowercase()));
    let key = match media_type {
        MediaType::Movie => ids
            .tmdb_id
            .map(|id| format!("tmdb:{}", id))
            .or_else(imdb)
            .or_else(|| ids.tvdb_id.map(|id| format!("tvdb:{}", id))),
        MediaType::Series => ids
            .tvdb_id
            .map(|id| format!("tvdb:{}", id))
            .or_else(|| ids.tmdb_id.map(|id| format!("tmdb:{}", id)))
            .or_else(imdb),
    }?;
    Some(format!("{}:{}", media_type, key))
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: HashMap<String, MediaItem>,
    /// Media types that completed at least one full sync
    synced: HashSet<MediaType>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(items: Vec<MediaItem>, synced: impl IntoIterator<Item = MediaType>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
            synced: synced.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MediaItem> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MediaItem> {
        self.items.get_mut(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &MediaItem> {
        self.items.values()
    }

    /// Items of one type, sorted by title
    pub fn list(&self, media_type: MediaType) -> Vec<&MediaItem> {
        let mut items: Vec<&MediaItem> = self.items.values().filter(|i| i.media_type == media_type).collect();
        items.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()).then(a.year.cmp(&b.year)));
        items
    }

    /// Exact title matches (case-insensitive), or substring matches if none.
    pub fn find_by_title(&self, title: &str) -> Vec<&MediaItem> {
        let needle = title.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut exact: Vec<&MediaItem> = self.items.values().filter(|i| i.title.to_lowercase() == needle).collect();
        if exact.is_empty() {
            exact = self
                .items
                .values()
                .filter(|i| i.title.to_lowercase().contains(&needle))
                .collect();
        }
        exact.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        exact
    }

    /// Non-excluded items due within the window, soonest first
    pub fn leaving_soon(&self, now: DateTime<Utc>, window: Duration) -> Vec<&MediaItem> {
        let mut items: Vec<&MediaItem> = self
            .items
            .values()
            .filter(|i| !i.is_excluded() && i.is_leaving_soon(now, window))
            .collect();
        items.sort_by_key(|i| (i.deletion_date, i.title.clone()));
        items
    }

    /// Non-excluded items whose deletion date has passed, oldest first
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<&MediaItem> {
        let mut items: Vec<&MediaItem> = self
            .items
            .values()
            .filter(|i| !i.is_excluded() && i.is_overdue(now))
            .collect();
        items.sort_by_key(|i| (i.deletion_date, i.title.clone()));
        items
    }

    /// Swap in the complete item set for one type after a full sync.
    pub fn replace_type(&mut self, media_type: MediaType, items: Vec<MediaItem>) {
        self.items.retain(|_, item| item.media_type != media_type);
        for item in items.into_iter().filter(|i| i.media_type == media_type) {
            self.items.insert(item.id.clone(), item);
        }
        self.synced.insert(media_type);
    }

    /// Forget types whose manager is no longer enabled.
    pub fn retain_types(&mut self, types: &[MediaType]) {
        self.items.retain(|_, item| types.contains(&item.media_type));
        self.synced.retain(|t| types.contains(t));
    }

    pub fn upsert(&mut self, item: MediaItem) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn remove(&mut self, id: &str) -> Option<MediaItem> {
        self.items.remove(id)
    }

    pub fn has_synced(&self, media_type: MediaType) -> bool {
        self.synced.contains(&media_type)
    }

    pub fn synced_types(&self) -> Vec<MediaType> {
        let mut types: Vec<MediaType> = self.synced.iter().copied().collect();
        types.sort();
        types
    }

    pub fn count(&self, media_type: MediaType) -> usize {
        self.items.values().filter(|i| i.media_type == media_type).count()
    }

    pub fn to_vec(&self) -> Vec<MediaItem> {
        self.items.values().cloned().collect()
    }
}
