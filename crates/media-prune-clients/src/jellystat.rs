use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_prune_models::{HistoryRecord, Page, PageRequest};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::ClientError;
use crate::http::ServiceHttp;
use crate::traits::HistoryTracker;

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default)]
    results: Vec<HistoryRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoryRow {
    #[serde(default)]
    now_playing_item_id: Option<String>,
    /// Set when the play was an episode; `NowPlayingItemId` is then the series.
    #[serde(default)]
    episode_id: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    activity_date_inserted: Option<DateTime<Utc>>,
}

fn into_record(row: HistoryRow) -> Option<HistoryRecord> {
    let item_id = row.now_playing_item_id.filter(|id| !id.is_empty())?;
    let watched_at = row.activity_date_inserted?;
    match row.episode_id.filter(|id| !id.is_empty()) {
        Some(episode_id) => Some(HistoryRecord {
            item_id: episode_id,
            series_id: Some(item_id),
            user_name: row.user_name,
            watched_at,
        }),
        None => Some(HistoryRecord {
            item_id,
            series_id: None,
            user_name: row.user_name,
            watched_at,
        }),
    }
}

pub struct JellystatClient {
    http: ServiceHttp,
}

impl JellystatClient {
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: ServiceHttp::new("jellystat", url, "x-api-token", api_key, timeout)?,
        })
    }
}

#[async_trait]
impl HistoryTracker for JellystatClient {
    fn service_name(&self) -> &str {
        self.http.service()
    }

    async fn ping(&self) -> Result<(), ClientError> {
        let _: serde_json::Value = self.http.get("/api/getconfig", &[]).await?;
        Ok(())
    }

    async fn list_watch_history(&self, page: PageRequest) -> Result<Page<HistoryRecord>, ClientError> {
        // Jellystat pages are 1-based.
        let response: HistoryPage = self
            .http
            .get(
                "/api/getHistory",
                &[
                    ("page", (page.page + 1).to_string()),
                    ("size", page.page_size.to_string()),
                ],
            )
            .await?;
        let rows = response.results.len();
        let items: Vec<HistoryRecord> = response.results.into_iter().filter_map(into_record).collect();
        if items.len() < rows {
            trace!("Jellystat: dropped {} rows without item or date", rows - items.len());
        }
        debug!("Jellystat: page {} returned {} records", page.page, items.len());

        // Only the page count is reported, so the total is known on the last page.
        let total = match response.pages {
            Some(pages) if page.page + 1 >= pages => Some(page.offset() + rows as u64),
            _ => None,
        };
        Ok(Page { items, total })
    }
}
