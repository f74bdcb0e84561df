use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::{MediaType, Requester, WatchState};
use crate::media_ids::MediaIds;

/// A movie or series as listed by its manager (Radarr/Sonarr).
///
/// The manager is the source of truth for file facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagedEntry {
    pub manager_id: u64,
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<u32>,
    pub ids: MediaIds,
    /// Movie file path or series folder
    pub path: String,
    pub size_on_disk: u64,
    pub added: DateTime<Utc>,
    pub tags: Vec<String>,
    pub has_file: bool,
}

/// A library item on the media server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerItem {
    pub item_id: String,
    pub name: String,
    pub media_type: MediaType,
    pub ids: MediaIds,
    pub path: Option<String>,
    pub watch: WatchState,
}

/// A request made through the request tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaRequest {
    pub request_id: u64,
    pub media_type: MediaType,
    pub tmdb_id: Option<u32>,
    pub tvdb_id: Option<u32>,
    pub requested_by: Requester,
    pub created_at: Option<DateTime<Utc>>,
}

/// One play recorded by the watch-history tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// Media server ID of the played item (an episode for TV)
    pub item_id: String,
    /// Media server ID of the parent series, if the play was an episode
    pub series_id: Option<String>,
    pub user_name: Option<String>,
    pub watched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self { page: 0, page_size }
    }

    pub fn next(self) -> Self {
        Self { page: self.page + 1, ..self }
    }

    pub fn offset(&self) -> u64 {
        self.page as u64 * self.page_size as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total results across every page, when the service reports it
    pub total: Option<u64>,
}

impl<T> Page<T> {
    /// Whether a further page should be requested after `request`.
    pub fn has_more(&self, request: PageRequest) -> bool {
        if self.items.is_empty() {
            return false;
        }
        match self.total {
            Some(total) => request.offset() + (self.items.len() as u64) < total,
            None => self.items.len() as u32 >= request.page_size,
        }
    }
}

/// A symlink found in a preview directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SymlinkEntry {
    pub path: String,
    /// File or folder the link points at
    pub target: String,
}

/// Ask the bridge to create a link to `source_path` inside `target_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SymlinkRequest {
    pub source_path: String,
    pub target_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualFolder {
    pub name: String,
    pub locations: Vec<String>,
    pub collection_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeStatus {
    pub version: String,
    pub healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_more_with_total() {
        let request = PageRequest::first(2);
        let page = Page { items: vec![1, 2], total: Some(3) };
        assert!(page.has_more(request));

        let last = Page { items: vec![3], total: Some(3) };
        assert!(!last.has_more(request.next()));
    }

    #[test]
    fn test_has_more_without_total_uses_page_size() {
        let request = PageRequest::first(2);
        assert!(Page { items: vec![1, 2], total: None }.has_more(request));
        assert!(!Page { items: vec![1], total: None }.has_more(request));
        assert!(!Page::<u8> { items: vec![], total: Some(10) }.has_more(request));
    }
}
