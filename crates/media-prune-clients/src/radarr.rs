use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_prune_models::{ManagedEntry, MediaIds, MediaType};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::arr::{self, API_KEY_HEADER};
use crate::error::ClientError;
use crate::http::ServiceHttp;
use crate::traits::LibraryManager;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovie {
    id: u64,
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    tmdb_id: Option<u32>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    has_file: bool,
    #[serde(default)]
    size_on_disk: u64,
    added: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<u64>,
    #[serde(default)]
    movie_file: Option<RadarrMovieFile>,
}

#[derive(Debug, Deserialize)]
struct RadarrMovieFile {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    size: u64,
}

fn into_entry(movie: RadarrMovie, labels: &HashMap<u64, String>) -> ManagedEntry {
    let ids = MediaIds {
        tmdb_id: arr::non_zero(movie.tmdb_id),
        imdb_id: arr::non_blank(movie.imdb_id),
        radarr_id: Some(movie.id),
        ..MediaIds::default()
    };
    let (path, size) = match movie.movie_file {
        Some(file) => (
            file.path.or(movie.path).unwrap_or_default(),
            if file.size > 0 { file.size } else { movie.size_on_disk },
        ),
        None => (movie.path.unwrap_or_default(), movie.size_on_disk),
    };

    ManagedEntry {
        manager_id: movie.id,
        media_type: MediaType::Movie,
        title: movie.title,
        year: movie.year.filter(|y| *y > 0),
        ids,
        path,
        size_on_disk: size,
        added: movie.added,
        tags: arr::resolve_tags(&movie.tags, labels),
        has_file: movie.has_file,
    }
}

pub struct RadarrClient {
    http: ServiceHttp,
}

impl RadarrClient {
    pub fn new(url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            http: ServiceHttp::new("radarr", url, API_KEY_HEADER, api_key, timeout)?,
        })
    }
}

#[async_trait]
impl LibraryManager for RadarrClient {
    fn service_name(&self) -> &str {
        self.http.service()
    }

    fn media_type(&self) -> MediaType {
        MediaType::Movie
    }

    async fn ping(&self) -> Result<(), ClientError> {
        arr::ping(&self.http).await
    }

    async fn list_entries(&self) -> Result<Vec<ManagedEntry>, ClientError> {
        let (labels, movies) = futures::try_join!(
            arr::fetch_tag_labels(&self.http),
            self.http.get::<Vec<RadarrMovie>>("/api/v3/movie", &[])
        )?;
        debug!("Radarr: {} tags known", labels.len());

        let entries: Vec<ManagedEntry> = movies.into_iter().map(|m| into_entry(m, &labels)).collect();
        info!(service = "radarr", count = entries.len(), "Fetched movies");
        Ok(entries)
    }

    async fn delete_entry(&self, manager_id: u64) -> Result<(), ClientError> {
        self.http
            .delete(
                &format!("/api/v3/movie/{}", manager_id),
                &[
                    ("deleteFiles", "true".to_string()),
                    ("addImportExclusion", "false".to_string()),
                ],
            )
            .await
    }
}
