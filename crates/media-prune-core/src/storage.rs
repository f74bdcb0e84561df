use anyhow::Result;
use bincode::{deserialize, serialize};
use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use media_prune_models::{MediaItem, MediaType};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;

#[derive(Debug, Serialize, Deserialize)]
struct CatalogSnapshot {
    saved_at: DateTime<Utc>,
    synced: Vec<MediaType>,
    items: Vec<MediaItem>,
}

/// Catalog snapshot on disk, bincode inside gzip.
///
/// Lets read queries answer before the first sync of a new process.
pub struct CatalogStorage {
    path: PathBuf,
}

impl CatalogStorage {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or an empty catalog when there is none.
    pub fn load(&self) -> Result<Catalog> {
        if !self.path.exists() {
            debug!("Catalog snapshot does not exist, starting empty");
            return Ok(Catalog::new());
        }

        let start = std::time::Instant::now();
        let data = std::fs::read(&self.path)?;
        let mut decoder = GzDecoder::new(&data[..]);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded)?;

        let snapshot: CatalogSnapshot = match deserialize(&decoded) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Format changed between versions; the next full sync rebuilds it.
                let backup_path = self.path.with_extension("bin.bak");
                if let Err(backup_err) = std::fs::rename(&self.path, &backup_path) {
                    warn!("Failed to back up incompatible catalog snapshot: {}", backup_err);
                } else {
                    info!(
                        "Catalog snapshot incompatible ({}). Moved to {:?}, starting empty.",
                        e, backup_path
                    );
                }
                return Ok(Catalog::new());
            }
        };

        info!(
            "Loaded catalog snapshot: {} items from {} in {:?}",
            snapshot.items.len(),
            snapshot.saved_at.to_rfc3339(),
            start.elapsed()
        );
        Ok(Catalog::from_parts(snapshot.items, snapshot.synced))
    }

    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        let start = std::time::Instant::now();
        let snapshot = CatalogSnapshot {
            saved_at: Utc::now(),
            synced: catalog.synced_types(),
            items: catalog.to_vec(),
        };

        let serialized = serialize(&snapshot)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let encoded = encoder.finish()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, encoded)?;
        std::fs::rename(&temp_path, &self.path)?;

        debug!("Saved catalog snapshot: {} items in {:?}", snapshot.items.len(), start.elapsed());
        Ok(())
    }
}
