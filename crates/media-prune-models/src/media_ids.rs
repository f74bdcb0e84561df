use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// External identifiers for one piece of content across every service
///
/// Radarr/Sonarr hand out numeric IDs, Jellyfin hands out opaque string IDs,
/// and the metadata databases (TMDB, TVDB, IMDB) are the only IDs all five
/// services agree on. Correlation joins on the metadata IDs; the service IDs
/// are kept so the engine can call back into the owning service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaIds {
    pub tmdb_id: Option<u32>,
    pub tvdb_id: Option<u32>,
    pub imdb_id: Option<String>,
    pub radarr_id: Option<u64>,
    pub sonarr_id: Option<u64>,
    pub jellyfin_id: Option<String>,
}

impl MediaIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge IDs from another source, only filling in missing values.
    pub fn merge(&mut self, other: &MediaIds) {
        if self.tmdb_id.is_none() {
            self.tmdb_id = other.tmdb_id;
        }
        if self.tvdb_id.is_none() {
            self.tvdb_id = other.tvdb_id;
        }
        if self.imdb_id.is_none() {
            self.imdb_id = other.imdb_id.clone();
        }
        if self.radarr_id.is_none() {
            self.radarr_id = other.radarr_id;
        }
        if self.sonarr_id.is_none() {
            self.sonarr_id = other.sonarr_id;
        }
        if self.jellyfin_id.is_none() {
            self.jellyfin_id = other.jellyfin_id.clone();
        }
    }

    /// True when no metadata database ID is known.
    ///
    /// Service IDs alone can't be correlated with the other services.
    pub fn has_no_external_id(&self) -> bool {
        self.tmdb_id.is_none() && self.tvdb_id.is_none() && self.imdb_id.is_none()
    }

    /// Check if all ID fields are empty
    pub fn is_empty(&self) -> bool {
        self.has_no_external_id()
            && self.radarr_id.is_none()
            && self.sonarr_id.is_none()
            && self.jellyfin_id.is_none()
    }

    /// Returns true if both share any metadata database ID.
    pub fn shares_external_id(&self, other: &MediaIds) -> bool {
        if let (Some(a), Some(b)) = (self.tmdb_id, other.tmdb_id) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (self.tvdb_id, other.tvdb_id) {
            if a == b {
                return true;
            }
        }
        if let (Some(a), Some(b)) = (&self.imdb_id, &other.imdb_id) {
            if a.eq_ignore_ascii_case(b) {
                return true;
            }
        }
        false
    }

    /// Best metadata ID as a prefixed string, preferring tmdb then tvdb then imdb
    pub fn primary_external_id(&self) -> Option<String> {
        self.tmdb_id
            .map(|id| format!("tmdb:{}", id))
            .or_else(|| self.tvdb_id.map(|id| format!("tvdb:{}", id)))
            .or_else(|| self.imdb_id.as_ref().map(|id| format!("imdb:{}", id.to_lowercase())))
    }
}

impl Hash for MediaIds {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tmdb_id.hash(state);
        self.tvdb_id.hash(state);
        self.imdb_id.hash(state);
        self.radarr_id.hash(state);
        self.sonarr_id.hash(state);
        self.jellyfin_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_existing_values() {
        let mut ids = MediaIds {
            tmdb_id: Some(603),
            radarr_id: Some(1),
            ..MediaIds::default()
        };
        let other = MediaIds {
            tmdb_id: Some(999),
            imdb_id: Some("tt0133093".to_string()),
            jellyfin_id: Some("abc".to_string()),
            ..MediaIds::default()
        };
        ids.merge(&other);
        assert_eq!(ids.tmdb_id, Some(603));
        assert_eq!(ids.imdb_id.as_deref(), Some("tt0133093"));
        assert_eq!(ids.jellyfin_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_shares_external_id_ignores_service_ids() {
        let a = MediaIds {
            radarr_id: Some(5),
            ..MediaIds::default()
        };
        let b = MediaIds {
            radarr_id: Some(5),
            ..MediaIds::default()
        };
        assert!(!a.shares_external_id(&b));

        let c = MediaIds {
            imdb_id: Some("TT0133093".to_string()),
            ..MediaIds::default()
        };
        let d = MediaIds {
            imdb_id: Some("tt0133093".to_string()),
            ..MediaIds::default()
        };
        assert!(c.shares_external_id(&d));
    }

    #[test]
    fn test_primary_external_id_preference() {
        let ids = MediaIds {
            tvdb_id: Some(81189),
            imdb_id: Some("tt0903747".to_string()),
            ..MediaIds::default()
        };
        assert_eq!(ids.primary_external_id().as_deref(), Some("tvdb:81189"));
        assert!(MediaIds::new().primary_external_id().is_none());
    }
}
