use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_prune_models::{MediaRequest, MediaType, Page, PageRequest, Requester};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;
use crate::http::ServiceHttp;
use crate::traits::RequestTracker;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestPage {
    page_info: PageInfo,
    #[serde(default)]
    results: Vec<JellyseerrRequest>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    /// Total request count
    #[serde(default)]
    results: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JellyseerrRequest {
    id: u64,
    #[serde(rename = "type")]
    request_type: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    media: Option<RequestedMedia>,
    requested_by: JellyseerrUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestedMedia {
    #[serde(default)]
    tmdb_id: Option<u32>,
    #[serde(default)]
    tvdb_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JellyseerrUser {
    id: u64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    jellyfin_username: Option<String>,
    #[serde(default)]
    plex_username: Option<String>,
}

fn into_request(raw: JellyseerrRequest) -> Option<MediaRequest> {
    let media_type = match raw.request_type.as_str() {
        "movie" => MediaType::Movie,
        "tv" => MediaType::Series,
        _ => return None,
    };
    let media = raw.media.unwrap_or(RequestedMedia {
        tmdb_id: None,
        tvdb_id: None,
    });
    let user = raw.requested_by;
    // Local accounts have `username`; imported ones only carry the server name.
    let username = user
        .username
        .or(user.jellyfin_username)
        .or(user.plex_username)
        .filter(|u| !u.trim().is_empty());

    Some(MediaRequest {
        request_id: raw.id,
        media_type,
        tmdb_id: media.tmdb_id.filter(|id| *id != 0),
        tvdb_id: media.tvdb_id.filter(|id| *id != 0),
        requested_by: Requester {
            user_id: Some(user.id),
            username,
            email: user.email.filter(|e| !e.trim().is_empty()),
        },
        created_at: raw.created_at,
    })
}

pub struct JellyseerrClient {
    http: ServiceHttp,
}

impl JellyseerrClient {
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: ServiceHttp::new("jellyseerr", url, "x-api-key", api_key, timeout)?,
        })
    }
}

#[async_trait]
impl RequestTracker for JellyseerrClient {
    fn service_name(&self) -> &str {
        self.http.service()
    }

    async fn ping(&self) -> Result<(), ClientError> {
        let _: serde_json::Value = self.http.get("/api/v1/status", &[]).await?;
        Ok(())
    }

    async fn list_requests(&self, page: PageRequest) -> Result<Page<MediaRequest>, ClientError> {
        let response: RequestPage = self
            .http
            .get(
                "/api/v1/request",
                &[
                    ("take", page.page_size.to_string()),
                    ("skip", page.offset().to_string()),
                    ("filter", "all".to_string()),
                ],
            )
            .await?;
        debug!("Jellyseerr: page {} returned {} requests", page.page, response.results.len());

        Ok(Page {
            items: response.results.into_iter().filter_map(into_request).collect(),
            total: response.page_info.results,
        })
    }
}
