use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::media_ids::MediaIds;

// MediaItem is persisted with bincode, so none of these types may use
// `skip_serializing_if`, `flatten` or internally tagged enums.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "series",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watch state as reported by the media server, aggregated over its users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchState {
    pub play_count: u32,
    pub last_played: Option<DateTime<Utc>>,
    pub played: bool,
}

/// Who asked for this item, as known by the request tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Requester {
    pub user_id: Option<u64>,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exclusion {
    pub reason: String,
    pub excluded_at: DateTime<Utc>,
}

/// Which rule produced an item's deletion date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Excluded,
    Advanced { name: String, kind: String },
    Global,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Excluded => f.write_str("exclusion"),
            RuleSource::Advanced { name, kind } => write!(f, "{} rule '{}'", kind, name),
            RuleSource::Global => f.write_str("global retention"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymlinkState {
    /// Full path of the symlink inside the preview directory
    pub path: String,
    /// Directory the symlink lives in
    pub target_dir: String,
}

/// One movie or series, fused from every service that knows about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    /// Stable internal key, e.g. `movie:tmdb:603`
    pub id: String,
    pub ids: MediaIds,
    pub title: String,
    pub year: Option<u32>,
    pub media_type: MediaType,
    pub file_path: String,
    pub file_size: u64,
    /// When the manager imported the item
    pub added_at: DateTime<Utc>,
    /// Tag labels attached to the manager entry
    pub tags: Vec<String>,

    pub watch: WatchState,
    pub requester: Option<Requester>,
    /// Most recent play according to the history tracker
    pub history_watched_at: Option<DateTime<Utc>>,

    pub exclusion: Option<Exclusion>,
    pub deletion_date: Option<DateTime<Utc>>,
    pub deletion_reason: String,
    pub rule_source: Option<RuleSource>,

    pub symlink: Option<SymlinkState>,
}

impl MediaItem {
    pub fn new(
        id: String,
        ids: MediaIds,
        title: String,
        media_type: MediaType,
        file_path: String,
        added_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            ids,
            title,
            year: None,
            media_type,
            file_path,
            file_size: 0,
            added_at,
            tags: Vec::new(),
            watch: WatchState::default(),
            requester: None,
            history_watched_at: None,
            exclusion: None,
            deletion_date: None,
            deletion_reason: String::new(),
            rule_source: None,
            symlink: None,
        }
    }

    pub fn is_excluded(&self) -> bool {
        self.exclusion.is_some()
    }

    /// True when the history tracker holds at least one play for this item.
    pub fn has_watch_history(&self) -> bool {
        self.history_watched_at.is_some()
    }

    /// Most recent play across the history tracker and the media server.
    pub fn last_watched_at(&self) -> Option<DateTime<Utc>> {
        match (self.history_watched_at, self.watch.last_played) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Deletion date has been reached.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.deletion_date, Some(date) if date <= now)
    }

    /// `now < deletion_date <= now + window`
    pub fn is_leaving_soon(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.deletion_date {
            Some(date) => date > now && date - now <= window,
            None => false,
        }
    }

    /// Whole days left before deletion, negative once overdue.
    pub fn days_until_deletion(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deletion_date.map(|date| (date - now).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_due_in(now: DateTime<Utc>, due: Option<Duration>) -> MediaItem {
        let mut item = MediaItem::new(
            "movie:tmdb:1".to_string(),
            MediaIds::default(),
            "Test".to_string(),
            MediaType::Movie,
            "/movies/Test (2020)/Test.mkv".to_string(),
            now - Duration::days(30),
        );
        item.deletion_date = due.map(|d| now + d);
        item
    }

    #[test]
    fn test_leaving_soon_window_boundaries() {
        let now = Utc::now();
        let window = Duration::days(14);

        assert!(item_due_in(now, Some(Duration::days(14))).is_leaving_soon(now, window));
        assert!(item_due_in(now, Some(Duration::seconds(1))).is_leaving_soon(now, window));
        assert!(!item_due_in(now, Some(Duration::days(15))).is_leaving_soon(now, window));
        assert!(!item_due_in(now, Some(Duration::zero())).is_leaving_soon(now, window));
        assert!(!item_due_in(now, None).is_leaving_soon(now, window));
    }

    #[test]
    fn test_overdue_includes_exact_now() {
        let now = Utc::now();
        assert!(item_due_in(now, Some(Duration::zero())).is_overdue(now));
        assert!(item_due_in(now, Some(Duration::days(-2))).is_overdue(now));
        assert!(!item_due_in(now, Some(Duration::days(1))).is_overdue(now));
        assert!(!item_due_in(now, None).is_overdue(now));
    }

    #[test]
    fn test_last_watched_prefers_most_recent() {
        let now = Utc::now();
        let mut item = item_due_in(now, None);
        assert_eq!(item.last_watched_at(), None);

        item.watch.last_played = Some(now - Duration::days(1));
        assert_eq!(item.last_watched_at(), Some(now - Duration::days(1)));

        item.history_watched_at = Some(now - Duration::days(5));
        assert_eq!(item.last_watched_at(), Some(now - Duration::days(1)));
    }
}
