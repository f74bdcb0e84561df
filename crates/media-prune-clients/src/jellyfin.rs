//! Jellyfin server API plus the symlink bridge plugin it hosts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use media_prune_models::{
    BridgeStatus, MediaIds, MediaType, ServerItem, SymlinkEntry, SymlinkRequest, VirtualFolder, WatchState,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::http::ServiceHttp;
use crate::traits::{BridgeOutcome, MediaServer, SymlinkBridge};

const TOKEN_HEADER: &str = "x-emby-token";
const ITEM_FIELDS: &str = "ProviderIds,Path";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JellyfinUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<JellyfinItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JellyfinItem {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "Type", default)]
    item_type: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    provider_ids: HashMap<String, String>,
    #[serde(default)]
    user_data: Option<UserData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserData {
    #[serde(default)]
    play_count: u32,
    #[serde(default)]
    played: bool,
    #[serde(default)]
    last_played_date: Option<DateTime<Utc>>,
}

impl UserData {
    fn as_watch_state(&self) -> WatchState {
        WatchState {
            play_count: self.play_count,
            last_played: self.last_played_date,
            played: self.played,
        }
    }
}

/// Fold one user's view of an item into the running total.
fn accumulate(total: &mut WatchState, user: &WatchState) {
    total.play_count = total.play_count.saturating_add(user.play_count);
    total.played |= user.played;
    total.last_played = match (total.last_played, user.last_played) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
}

/// Provider ID keys are not consistently cased across Jellyfin versions.
fn provider_ids(raw: &HashMap<String, String>) -> MediaIds {
    let mut ids = MediaIds::default();
    for (key, value) in raw {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.to_ascii_lowercase().as_str() {
            "tmdb" => ids.tmdb_id = value.parse().ok(),
            "tvdb" => ids.tvdb_id = value.parse().ok(),
            "imdb" => ids.imdb_id = Some(value.to_string()),
            _ => {}
        }
    }
    ids
}

fn media_type_of(item_type: &str) -> Option<MediaType> {
    match item_type {
        "Movie" => Some(MediaType::Movie),
        "Series" => Some(MediaType::Series),
        _ => None,
    }
}

fn into_server_item(item: &JellyfinItem) -> Option<ServerItem> {
    let media_type = media_type_of(&item.item_type)?;
    let mut ids = provider_ids(&item.provider_ids);
    ids.jellyfin_id = Some(item.id.clone());
    Some(ServerItem {
        item_id: item.id.clone(),
        name: item.name.clone(),
        media_type,
        ids,
        path: item.path.clone(),
        watch: WatchState::default(),
    })
}

/// Merge per-user listings into one item list with summed watch state.
fn merge_user_listings(listings: Vec<Vec<JellyfinItem>>) -> Vec<ServerItem> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, ServerItem> = HashMap::new();

    for listing in listings {
        for item in listing {
            let Some(mut server_item) = merged.remove(&item.id).or_else(|| into_server_item(&item)) else {
                continue;
            };
            if !order.contains(&item.id) {
                order.push(item.id.clone());
            }
            if let Some(user_data) = &item.user_data {
                accumulate(&mut server_item.watch, &user_data.as_watch_state());
            }
            merged.insert(item.id.clone(), server_item);
        }
    }

    order.into_iter().filter_map(|id| merged.remove(&id)).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct JellyfinVirtualFolder {
    name: String,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    collection_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeStatusResponse {
    #[serde(default)]
    version: String,
    #[serde(default)]
    healthy: bool,
}

#[derive(Debug, Deserialize)]
struct BridgeListResponse {
    #[serde(default)]
    symlinks: Vec<BridgeSymlink>,
}

#[derive(Debug, Deserialize)]
struct BridgeSymlink {
    path: String,
    target: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeAddItem<'a> {
    source_path: &'a str,
    target_directory: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeAddRequest<'a> {
    items: Vec<BridgeAddItem<'a>>,
    dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeRemoveRequest<'a> {
    symlink_paths: &'a [String],
    dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
struct BridgeBatchResponse {
    #[serde(default)]
    succeeded: Vec<String>,
    #[serde(default)]
    failed: Vec<String>,
}

pub struct JellyfinClient {
    http: ServiceHttp,
}

impl JellyfinClient {
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: ServiceHttp::new("jellyfin", url, TOKEN_HEADER, api_key, timeout)?,
        })
    }

    async fn users(&self) -> Result<Vec<JellyfinUser>, ClientError> {
        self.http.get("/Users", &[]).await
    }

    async fn user_items(&self, user_id: &str) -> Result<Vec<JellyfinItem>, ClientError> {
        let response: ItemsResponse = self
            .http
            .get(
                &format!("/Users/{}/Items", user_id),
                &[
                    ("Recursive", "true".to_string()),
                    ("IncludeItemTypes", "Movie,Series".to_string()),
                    ("Fields", ITEM_FIELDS.to_string()),
                    ("EnableUserData", "true".to_string()),
                ],
            )
            .await?;
        Ok(response.items)
    }
}

#[async_trait]
impl MediaServer for JellyfinClient {
    fn service_name(&self) -> &str {
        self.http.service()
    }

    async fn ping(&self) -> Result<(), ClientError> {
        let _: serde_json::Value = self.http.get("/System/Info/Public", &[]).await?;
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<ServerItem>, ClientError> {
        let users = self.users().await?;
        if users.is_empty() {
            // Without users there is no user data; list the library bare.
            warn!("Jellyfin: no users found, watch state will be empty");
            let response: ItemsResponse = self
                .http
                .get(
                    "/Items",
                    &[
                        ("Recursive", "true".to_string()),
                        ("IncludeItemTypes", "Movie,Series".to_string()),
                        ("Fields", ITEM_FIELDS.to_string()),
                    ],
                )
                .await?;
            return Ok(merge_user_listings(vec![response.items]));
        }

        debug!("Jellyfin: aggregating watch state over {} users", users.len());
        let listings = try_join_all(users.iter().map(|u| self.user_items(&u.id))).await?;
        let items = merge_user_listings(listings);
        info!(service = "jellyfin", count = items.len(), "Fetched library items");
        Ok(items)
    }

    async fn get_watch_state(&self, item_id: &str) -> Result<WatchState, ClientError> {
        let users = self.users().await?;
        let mut total = WatchState::default();
        for user in &users {
            let item: JellyfinItem = self
                .http
                .get(&format!("/Users/{}/Items/{}", user.id, item_id), &[])
                .await?;
            if let Some(user_data) = &item.user_data {
                debug!(
                    "Jellyfin: {} has play count {} for {}",
                    user.name.as_deref().unwrap_or(&user.id),
                    user_data.play_count,
                    item_id
                );
                accumulate(&mut total, &user_data.as_watch_state());
            }
        }
        Ok(total)
    }

    async fn delete_item(&self, item_id: &str) -> Result<(), ClientError> {
        self.http.delete(&format!("/Items/{}", item_id), &[]).await
    }
}

#[async_trait]
impl SymlinkBridge for JellyfinClient {
    async fn status(&self) -> Result<BridgeStatus, ClientError> {
        let status: BridgeStatusResponse = self.http.get("/Bridge/Status", &[]).await?;
        Ok(BridgeStatus {
            version: status.version,
            healthy: status.healthy,
        })
    }

    async fn list_symlinks(&self, directory: &str) -> Result<Vec<SymlinkEntry>, ClientError> {
        let response: BridgeListResponse = self
            .http
            .get("/Bridge/Symlinks", &[("directory", directory.to_string())])
            .await?;
        Ok(response
            .symlinks
            .into_iter()
            .map(|s| SymlinkEntry {
                path: s.path,
                target: s.target,
            })
            .collect())
    }

    async fn add_symlinks(&self, items: &[SymlinkRequest], dry_run: bool) -> Result<BridgeOutcome, ClientError> {
        let body = BridgeAddRequest {
            items: items
                .iter()
                .map(|i| BridgeAddItem {
                    source_path: &i.source_path,
                    target_directory: &i.target_dir,
                })
                .collect(),
            dry_run,
        };
        let response: BridgeBatchResponse = self.http.post("/Bridge/Symlinks/Add", &[], &body).await?;
        Ok(BridgeOutcome {
            applied: response.succeeded,
            failed: response.failed,
        })
    }

    async fn remove_symlinks(&self, paths: &[String], dry_run: bool) -> Result<BridgeOutcome, ClientError> {
        let body = BridgeRemoveRequest {
            symlink_paths: paths,
            dry_run,
        };
        let response: BridgeBatchResponse = self.http.post("/Bridge/Symlinks/Remove", &[], &body).await?;
        Ok(BridgeOutcome {
            applied: response.succeeded,
            failed: response.failed,
        })
    }

    async fn list_virtual_folders(&self) -> Result<Vec<VirtualFolder>, ClientError> {
        let folders: Vec<JellyfinVirtualFolder> = self.http.get("/Library/VirtualFolders", &[]).await?;
        Ok(folders
            .into_iter()
            .map(|f| VirtualFolder {
                name: f.name,
                locations: f.locations,
                collection_type: f.collection_type,
            })
            .collect())
    }

    async fn create_virtual_folder(&self, name: &str, media_type: MediaType, path: &str) -> Result<(), ClientError> {
        let collection_type = match media_type {
            MediaType::Movie => "movies",
            MediaType::Series => "tvshows",
        };
        self.http
            .post_no_content(
                "/Library/VirtualFolders",
                &[
                    ("name", name.to_string()),
                    ("collectionType", collection_type.to_string()),
                    ("paths", path.to_string()),
                    ("refreshLibrary", "true".to_string()),
                ],
            )
            .await
    }

    async fn delete_virtual_folder(&self, name: &str) -> Result<(), ClientError> {
        self.http
            .delete(
                "/Library/VirtualFolders",
                &[("name", name.to_string()), ("refreshLibrary", "true".to_string())],
            )
            .await
    }
}
