use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::media::{MediaType, RuleSource};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    /// Replace the catalog from manager data
    Full,
    /// Refresh watch state, requester and history only
    Incremental,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncKind::Full => f.write_str("full"),
            SyncKind::Incremental => f.write_str("incremental"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Audit record of one sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub kind: SyncKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: JobSummary,
}

impl Job {
    pub fn new(id: String, kind: SyncKind, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            error: None,
            summary: JobSummary::default(),
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Decisions and outcomes of a cycle.
///
/// `deleted_count` and `deleted_items` are only present when deletion
/// actually ran, so consumers can tell "nothing deleted" from "deletion
/// disabled".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub dry_run: bool,
    pub enable_deletion: bool,
    pub movies: usize,
    pub series: usize,
    pub excluded: usize,
    pub leaving_soon: usize,
    /// Items whose deletion date has passed, whether or not deletion ran
    pub scheduled_deletions: usize,
    pub would_delete: Vec<DeletionCandidate>,
    /// Manager entries dropped because they could not be correlated
    #[serde(default)]
    pub skipped_items: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconcileReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_items: Option<Vec<DeletedItem>>,
}

impl JobSummary {
    /// Mark deletion as having run, with nothing deleted yet.
    pub fn start_deletion(&mut self) {
        self.deleted_count.get_or_insert(0);
        self.deleted_items.get_or_insert_with(Vec::new);
    }

    pub fn record_deleted(&mut self, item: DeletedItem) {
        let items = self.deleted_items.get_or_insert_with(Vec::new);
        items.push(item);
        self.deleted_count = Some(items.len());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletionCandidate {
    pub id: String,
    pub title: String,
    pub media_type: MediaType,
    pub file_size: u64,
    pub deletion_date: DateTime<Utc>,
    pub days_overdue: i64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletedItem {
    pub id: String,
    pub title: String,
    pub media_type: MediaType,
    pub file_size: u64,
    pub deleted_at: DateTime<Utc>,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub added: usize,
    pub removed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders_created: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders_deleted: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_omits_deleted_keys_until_deletion_ran() {
        let summary = JobSummary {
            enable_deletion: false,
            scheduled_deletions: 2,
            ..JobSummary::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("deleted_count").is_none());
        assert!(json.get("deleted_items").is_none());
        assert_eq!(json["scheduled_deletions"], 2);
        assert_eq!(json["enable_deletion"], false);

        let mut ran = JobSummary::default();
        ran.start_deletion();
        let json = serde_json::to_value(&ran).unwrap();
        assert_eq!(json["deleted_count"], 0);
        assert_eq!(json["deleted_items"], serde_json::json!([]));
    }

    #[test]
    fn test_record_deleted_keeps_count_in_step() {
        let mut summary = JobSummary::default();
        for id in ["movie:tmdb:1", "movie:tmdb:2"] {
            summary.record_deleted(DeletedItem {
                id: id.to_string(),
                title: id.to_string(),
                media_type: MediaType::Movie,
                file_size: 10,
                deleted_at: Utc::now(),
            });
        }
        summary.start_deletion();
        assert_eq!(summary.deleted_count, Some(2));
        assert_eq!(summary.deleted_items.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_status_finished() {
        assert!(!JobStatus::Pending.is_finished());
        assert!(!JobStatus::Running.is_finished());
        assert!(JobStatus::Completed.is_finished());
        assert!(JobStatus::Failed.is_finished());
    }
}
