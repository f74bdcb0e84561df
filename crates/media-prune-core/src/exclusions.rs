use anyhow::Result;
use chrono::{DateTime, Utc};
use media_prune_models::Exclusion;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Persistent "never delete" overrides keyed by internal item ID.
///
/// Backed by `exclusions.json`. The file is reloaded at the start of every
/// cycle so an exclusion added from another process is honoured.
#[derive(Debug, Default)]
pub struct ExclusionStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Exclusion>,
}

impl ExclusionStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let mut store = Self {
            path: Some(path),
            entries: BTreeMap::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-read the backing file; a missing file means no exclusions.
    pub fn reload(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            debug!("Exclusions file {:?} does not exist", path);
            self.entries.clear();
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<BTreeMap<String, Exclusion>>(&content) {
            Ok(entries) => {
                debug!("Loaded {} exclusions", entries.len());
                self.entries = entries;
            }
            Err(e) => {
                // An unreadable file must never read as "no exclusions":
                // keep the file and the entries loaded before it broke.
                warn!("Exclusions file {:?} is corrupt: {}", path, e);
                return Err(anyhow::anyhow!("exclusions file {:?} is corrupt: {}", path, e));
            }
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Exclusion> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Exclusion> {
        self.entries.clone()
    }

    /// Add or update an exclusion. Re-excluding keeps the original timestamp.
    pub fn exclude(&mut self, id: &str, reason: &str, now: DateTime<Utc>) -> Result<Exclusion> {
        let reason = reason.trim().to_string();
        let exclusion = match self.entries.get(id) {
            Some(existing) => Exclusion {
                reason,
                excluded_at: existing.excluded_at,
            },
            None => Exclusion { reason, excluded_at: now },
        };
        self.entries.insert(id.to_string(), exclusion.clone());
        self.save()?;
        info!(operation = "exclude", item = id, reason = %exclusion.reason, "Item excluded from deletion");
        Ok(exclusion)
    }

    /// Returns whether an exclusion was present.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        if self.entries.remove(id).is_none() {
            return Ok(false);
        }
        self.save()?;
        info!(operation = "include", item = id, "Exclusion removed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exclude_is_idempotent_and_updates_reason() {
        let mut store = ExclusionStore::in_memory();
        let first = Utc::now() - chrono::Duration::days(1);

        store.exclude("movie:tmdb:1", "keep", first).unwrap();
        let updated = store.exclude("movie:tmdb:1", "  kids love it ", Utc::now()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(updated.reason, "kids love it");
        assert_eq!(updated.excluded_at, first);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut store = ExclusionStore::in_memory();
        assert!(!store.remove("movie:tmdb:1").unwrap());
        store.exclude("movie:tmdb:1", "keep", Utc::now()).unwrap();
        assert!(store.remove("movie:tmdb:1").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_persists_and_reloads_external_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exclusions.json");

        let mut store = ExclusionStore::open(path.clone()).unwrap();
        store.exclude("series:tvdb:5", "rewatching", Utc::now()).unwrap();

        // Another process adds one
        let mut other = ExclusionStore::open(path.clone()).unwrap();
        assert!(other.contains("series:tvdb:5"));
        other.exclude("movie:tmdb:9", "classic", Utc::now()).unwrap();

        store.reload().unwrap();
        assert!(store.contains("movie:tmdb:9"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_corrupt_file_keeps_previous_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exclusions.json");

        let mut store = ExclusionStore::open(path.clone()).unwrap();
        store.exclude("movie:tmdb:1", "keep", Utc::now()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        assert!(store.reload().is_err());
        assert!(store.contains("movie:tmdb:1"));
        assert!(path.exists());
        assert!(ExclusionStore::open(path).is_err());
    }
}
