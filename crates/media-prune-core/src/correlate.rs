//! Fuses manager entries with media server, request and history data.
//!
//! Managers define which items exist. The other services only add facts,
//! joined on the metadata database IDs (tmdb, tvdb, imdb) or, for watch
//! history, on the media server's own item ID.

use chrono::{DateTime, Utc};
use media_prune_models::{
    HistoryRecord, ManagedEntry, MediaIds, MediaItem, MediaRequest, MediaType, Requester, ServerItem, WatchState,
};
use std::collections::HashMap;
use tracing::debug;

use crate::catalog::internal_id;

#[derive(Debug, Default)]
pub struct Correlated {
    pub items: Vec<MediaItem>,
    /// Human-readable reason per dropped entry
    pub skipped: Vec<String>,
}

/// Turn manager entries into catalog items, dropping what can't be tracked.
pub fn items_from_entries(entries: Vec<ManagedEntry>) -> Correlated {
    let mut result = Correlated::default();
    let mut seen: HashMap<String, String> = HashMap::new();

    for entry in entries {
        if !entry.has_file {
            debug!("Skipping {} '{}': no file on disk", entry.media_type, entry.title);
            result
                .skipped
                .push(format!("{} '{}': no file on disk", entry.media_type, entry.title));
            continue;
        }
        let Some(id) = internal_id(entry.media_type, &entry.ids) else {
            result.skipped.push(format!(
                "{} '{}' (manager id {}): no tmdb, tvdb or imdb id",
                entry.media_type, entry.title, entry.manager_id
            ));
            continue;
        };
        if let Some(first) = seen.get(&id) {
            result
                .skipped
                .push(format!("{} '{}': duplicate of '{}' ({})", entry.media_type, entry.title, first, id));
            continue;
        }
        seen.insert(id.clone(), entry.title.clone());

        let mut item = MediaItem::new(id, entry.ids, entry.title, entry.media_type, entry.path, entry.added);
        item.year = entry.year;
        item.file_size = entry.size_on_disk;
        item.tags = entry.tags;
        result.items.push(item);
    }

    result
}

fn external_keys(media_type: MediaType, ids: &MediaIds) -> Vec<(MediaType, String)> {
    let mut keys = Vec::new();
    if let Some(id) = ids.tmdb_id {
        keys.push((media_type, format!("tmdb:{}", id)));
    }
    if let Some(id) = ids.tvdb_id {
        keys.push((media_type, format!("tvdb:{}", id)));
    }
    if let Some(id) = &ids.imdb_id {
        keys.push((media_type, format!("imdb:{}", id.to_lowercase())));
    }
    keys
}

#[derive(Debug, Default)]
struct ServerIndex {
    items: Vec<ServerItem>,
    by_item_id: HashMap<String, usize>,
    by_external: HashMap<(MediaType, String), usize>,
}

impl ServerIndex {
    fn new(items: Vec<ServerItem>) -> Self {
        let mut index = Self::default();
        for (position, item) in items.iter().enumerate() {
            index.by_item_id.insert(item.item_id.clone(), position);
            for key in external_keys(item.media_type, &item.ids) {
                index.by_external.entry(key).or_insert(position);
            }
        }
        index.items = items;
        index
    }

    fn lookup(&self, item: &MediaItem) -> Option<&ServerItem> {
        let by_id = item
            .ids
            .jellyfin_id
            .as_ref()
            .and_then(|id| self.by_item_id.get(id))
            .filter(|&&p| self.items[p].media_type == item.media_type);
        by_id
            .or_else(|| {
                external_keys(item.media_type, &item.ids)
                    .iter()
                    .find_map(|key| self.by_external.get(key))
            })
            .map(|&p| &self.items[p])
    }
}

#[derive(Debug, Default)]
struct RequestIndex {
    by_external: HashMap<(MediaType, String), (Option<DateTime<Utc>>, Requester)>,
}

impl RequestIndex {
    /// The earliest request for an item names its requester.
    fn new(requests: Vec<MediaRequest>) -> Self {
        let mut index = Self::default();
        for request in requests {
            let ids = MediaIds {
                tmdb_id: request.tmdb_id,
                tvdb_id: request.tvdb_id,
                ..MediaIds::default()
            };
            for key in external_keys(request.media_type, &ids) {
                let candidate = (request.created_at, request.requested_by.clone());
                match index.by_external.get_mut(&key) {
                    Some(existing) => {
                        let earlier = match (candidate.0, existing.0) {
                            (Some(new), Some(old)) => new < old,
                            (Some(_), None) => true,
                            _ => false,
                        };
                        if earlier {
                            *existing = candidate;
                        }
                    }
                    None => {
                        index.by_external.insert(key, candidate);
                    }
                }
            }
        }
        index
    }

    fn lookup(&self, item: &MediaItem) -> Option<&Requester> {
        external_keys(item.media_type, &item.ids)
            .iter()
            .find_map(|key| self.by_external.get(key))
            .map(|(_, requester)| requester)
    }
}

#[derive(Debug, Default)]
struct HistoryIndex {
    last_watched: HashMap<String, DateTime<Utc>>,
}

impl HistoryIndex {
    fn new(records: Vec<HistoryRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            let ids = std::iter::once(record.item_id).chain(record.series_id);
            for id in ids {
                index
                    .last_watched
                    .entry(id)
                    .and_modify(|at| *at = (*at).max(record.watched_at))
                    .or_insert(record.watched_at);
            }
        }
        index
    }

    fn lookup(&self, jellyfin_id: &str) -> Option<DateTime<Utc>> {
        self.last_watched.get(jellyfin_id).copied()
    }
}

/// Facts from the optional integrations for one cycle.
///
/// A missing source (disabled or failed) clears the facts it would provide,
/// so rules depending on it behave as if it were disabled.
#[derive(Debug, Default)]
pub struct Enrichment {
    server: Option<ServerIndex>,
    requests: Option<RequestIndex>,
    history: Option<HistoryIndex>,
}

impl Enrichment {
    pub fn new(
        server_items: Option<Vec<ServerItem>>,
        requests: Option<Vec<MediaRequest>>,
        history: Option<Vec<HistoryRecord>>,
    ) -> Self {
        Self {
            server: server_items.map(ServerIndex::new),
            requests: requests.map(RequestIndex::new),
            history: history.map(HistoryIndex::new),
        }
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    /// Refresh the mutable facts of an item.
    pub fn apply(&self, item: &mut MediaItem) {
        match self.server.as_ref().and_then(|s| s.lookup(item)) {
            Some(server_item) => {
                item.ids.jellyfin_id = Some(server_item.item_id.clone());
                item.ids.merge(&server_item.ids);
                item.watch = server_item.watch.clone();
            }
            None => item.watch = WatchState::default(),
        }

        item.requester = self.requests.as_ref().and_then(|r| r.lookup(item)).cloned();

        item.history_watched_at = match (&self.history, &item.ids.jellyfin_id) {
            (Some(history), Some(jellyfin_id)) => history.lookup(jellyfin_id),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(manager_id: u64, title: &str, tmdb: Option<u32>, has_file: bool) -> ManagedEntry {
        ManagedEntry {
            manager_id,
            media_type: MediaType::Movie,
            title: title.to_string(),
            year: Some(2020),
            ids: MediaIds {
                tmdb_id: tmdb,
                radarr_id: Some(manager_id),
                ..MediaIds::default()
            },
            path: format!("/movies/{}.mkv", title),
            size_on_disk: 100,
            added: Utc::now(),
            tags: vec!["tag".to_string()],
            has_file,
        }
    }

    #[test]
    fn test_entries_without_ids_or_files_are_skipped() {
        let result = items_from_entries(vec![
            entry(1, "Kept", Some(10), true),
            entry(2, "NoFile", Some(11), false),
            entry(3, "NoIds", None, true),
            entry(4, "Dupe", Some(10), true),
        ]);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "movie:tmdb:10");
        assert_eq!(result.items[0].ids.radarr_id, Some(1));
        assert_eq!(result.items[0].file_size, 100);
        assert_eq!(result.skipped.len(), 3);
    }

    #[test]
    fn test_enrichment_joins_every_source() {
        let mut item = items_from_entries(vec![entry(1, "Heat", Some(949), true)]).items.remove(0);
        let now = Utc::now();

        let server_items = vec![ServerItem {
            item_id: "jf-1".to_string(),
            name: "Heat".to_string(),
            media_type: MediaType::Movie,
            ids: MediaIds {
                tmdb_id: Some(949),
                imdb_id: Some("tt0113277".to_string()),
                ..MediaIds::default()
            },
            path: None,
            watch: WatchState {
                play_count: 2,
                last_played: Some(now - Duration::days(9)),
                played: true,
            },
        }];
        let requests = vec![
            MediaRequest {
                request_id: 2,
                media_type: MediaType::Movie,
                tmdb_id: Some(949),
                tvdb_id: None,
                requested_by: Requester {
                    username: Some("late".to_string()),
                    ..Requester::default()
                },
                created_at: Some(now - Duration::days(1)),
            },
            MediaRequest {
                request_id: 1,
                media_type: MediaType::Movie,
                tmdb_id: Some(949),
                tvdb_id: None,
                requested_by: Requester {
                    username: Some("first".to_string()),
                    ..Requester::default()
                },
                created_at: Some(now - Duration::days(5)),
            },
            // same tmdb id, wrong type
            MediaRequest {
                request_id: 3,
                media_type: MediaType::Series,
                tmdb_id: Some(949),
                tvdb_id: None,
                requested_by: Requester::default(),
                created_at: None,
            },
        ];
        let history = vec![
            HistoryRecord {
                item_id: "jf-1".to_string(),
                series_id: None,
                user_name: None,
                watched_at: now - Duration::days(3),
            },
            HistoryRecord {
                item_id: "jf-1".to_string(),
                series_id: None,
                user_name: None,
                watched_at: now - Duration::days(2),
            },
        ];

        Enrichment::new(Some(server_items), Some(requests), Some(history)).apply(&mut item);

        assert_eq!(item.ids.jellyfin_id.as_deref(), Some("jf-1"));
        assert_eq!(item.ids.imdb_id.as_deref(), Some("tt0113277"));
        assert_eq!(item.watch.play_count, 2);
        assert_eq!(item.requester.as_ref().unwrap().username.as_deref(), Some("first"));
        assert_eq!(item.history_watched_at, Some(now - Duration::days(2)));
    }

    #[test]
    fn test_episode_history_counts_for_series() {
        let mut item = MediaItem::new(
            "series:tvdb:5".to_string(),
            MediaIds {
                tvdb_id: Some(5),
                jellyfin_id: Some("series-1".to_string()),
                ..MediaIds::default()
            },
            "Show".to_string(),
            MediaType::Series,
            "/tv/Show".to_string(),
            Utc::now(),
        );
        let watched = Utc::now() - Duration::hours(5);
        let history = vec![HistoryRecord {
            item_id: "episode-9".to_string(),
            series_id: Some("series-1".to_string()),
            user_name: Some("bob".to_string()),
            watched_at: watched,
        }];

        Enrichment::new(None, None, Some(history)).apply(&mut item);
        assert_eq!(item.history_watched_at, Some(watched));
    }

    #[test]
    fn test_missing_sources_clear_facts() {
        let mut item = items_from_entries(vec![entry(1, "Heat", Some(949), true)]).items.remove(0);
        item.requester = Some(Requester::default());
        item.history_watched_at = Some(Utc::now());
        item.watch.play_count = 3;

        let enrichment = Enrichment::new(None, None, None);
        assert!(!enrichment.has_history());
        enrichment.apply(&mut item);

        assert!(item.requester.is_none());
        assert!(item.history_watched_at.is_none());
        assert_eq!(item.watch, WatchState::default());
    }
}
