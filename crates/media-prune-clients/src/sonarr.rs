use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_prune_models::{ManagedEntry, MediaIds, MediaType};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::arr::{self, API_KEY_HEADER};
use crate::error::ClientError;
use crate::http::ServiceHttp;
use crate::traits::LibraryManager;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeries {
    id: u64,
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    tvdb_id: Option<u32>,
    #[serde(default)]
    tmdb_id: Option<u32>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    path: Option<String>,
    added: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<u64>,
    #[serde(default)]
    statistics: Option<SonarrStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrStatistics {
    #[serde(default)]
    episode_file_count: u32,
    #[serde(default)]
    size_on_disk: u64,
}

fn into_entry(series: SonarrSeries, labels: &HashMap<u64, String>) -> ManagedEntry {
    let stats = series.statistics.unwrap_or_default();
    ManagedEntry {
        manager_id: series.id,
        media_type: MediaType::Series,
        title: series.title,
        year: series.year.filter(|y| *y > 0),
        ids: MediaIds {
            tvdb_id: arr::non_zero(series.tvdb_id),
            tmdb_id: arr::non_zero(series.tmdb_id),
            imdb_id: arr::non_blank(series.imdb_id),
            sonarr_id: Some(series.id),
            ..MediaIds::default()
        },
        path: series.path.unwrap_or_default(),
        size_on_disk: stats.size_on_disk,
        added: series.added,
        tags: arr::resolve_tags(&series.tags, labels),
        has_file: stats.episode_file_count > 0,
    }
}

pub struct SonarrClient {
    http: ServiceHttp,
}

impl SonarrClient {
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: ServiceHttp::new("sonarr", url, API_KEY_HEADER, api_key, timeout)?,
        })
    }
}

#[async_trait]
impl LibraryManager for SonarrClient {
    fn service_name(&self) -> &str {
        self.http.service()
    }

    fn media_type(&self) -> MediaType {
        MediaType::Series
    }

    async fn ping(&self) -> Result<(), ClientError> {
        arr::ping(&self.http).await
    }

    async fn list_entries(&self) -> Result<Vec<ManagedEntry>, ClientError> {
        let (labels, series) = futures::try_join!(
            arr::fetch_tag_labels(&self.http),
            self.http.get::<Vec<SonarrSeries>>("/api/v3/series", &[])
        )?;

        let entries: Vec<ManagedEntry> = series.into_iter().map(|s| into_entry(s, &labels)).collect();
        info!(service = "sonarr", count = entries.len(), "Fetched series");
        Ok(entries)
    }

    async fn delete_entry(&self, manager_id: u64) -> Result<(), ClientError> {
        self.http
            .delete(
                &format!("/api/v3/series/{}", manager_id),
                &[
                    ("deleteFiles", "true".to_string()),
                    ("addImportListExclusion", "false".to_string()),
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_maps_to_entry() {
        let json = r#"{
            "id": 7,
            "title": "Dark",
            "year": 2017,
            "tvdbId": 334824,
            "imdbId": "tt5753856",
            "path": "/tv/Dark",
            "added": "2023-11-20T08:30:00Z",
            "tags": [1, 2],
            "statistics": { "episodeFileCount": 26, "sizeOnDisk": 90000 }
        }"#;
        let series: SonarrSeries = serde_json::from_str(json).unwrap();
        let labels = HashMap::from([(1, "German".to_string())]);
        let entry = into_entry(series, &labels);

        assert_eq!(entry.media_type, MediaType::Series);
        assert_eq!(entry.ids.tvdb_id, Some(334824));
        assert_eq!(entry.ids.sonarr_id, Some(7));
        assert_eq!(entry.size_on_disk, 90000);
        assert_eq!(entry.tags, vec!["German"]);
        assert!(entry.has_file);
    }

    #[test]
    fn test_series_without_episode_files_has_no_file() {
        let json = r#"{"id": 8, "title": "Announced", "added": "2024-01-01T00:00:00Z"}"#;
        let entry = into_entry(serde_json::from_str(json).unwrap(), &HashMap::new());
        assert!(!entry.has_file);
        assert_eq!(entry.size_on_disk, 0);
    }
}
