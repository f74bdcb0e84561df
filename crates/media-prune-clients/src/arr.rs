use serde::Deserialize;
use std::collections::HashMap;

use crate::error::ClientError;
use crate::http::ServiceHttp;

pub(crate) const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub(crate) struct ArrTag {
    pub id: u64,
    pub label: String,
}

/// Tag ID to label lookup shared by Radarr and Sonarr (`/api/v3/tag`).
pub(crate) async fn fetch_tag_labels(http: &ServiceHttp) -> Result<HashMap<u64, String>, ClientError> {
    let tags: Vec<ArrTag> = http.get("/api/v3/tag", &[]).await?;
    Ok(tag_map(tags))
}

pub(crate) fn tag_map(tags: Vec<ArrTag>) -> HashMap<u64, String> {
    tags.into_iter().map(|t| (t.id, t.label)).collect()
}

pub(crate) fn resolve_tags(ids: &[u64], labels: &HashMap<u64, String>) -> Vec<String> {
    ids.iter().filter_map(|id| labels.get(id).cloned()).collect()
}

pub(crate) async fn ping(http: &ServiceHttp) -> Result<(), ClientError> {
    let _: serde_json::Value = http.get("/api/v3/system/status", &[]).await?;
    Ok(())
}

/// Arr services report 0 for "no ID".
pub(crate) fn non_zero(value: Option<u32>) -> Option<u32> {
    value.filter(|v| *v != 0)
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tags_skips_unknown_ids() {
        let labels = tag_map(vec![
            ArrTag { id: 1, label: "kids".to_string() },
            ArrTag { id: 2, label: "keep".to_string() },
        ]);
        assert_eq!(resolve_tags(&[2, 9, 1], &labels), vec!["keep", "kids"]);
    }

    #[test]
    fn test_zero_and_blank_ids_are_absent() {
        assert_eq!(non_zero(Some(0)), None);
        assert_eq!(non_zero(Some(5)), Some(5));
        assert_eq!(non_blank(Some(" ".to_string())), None);
    }
}
