//! Builds the set of enabled clients from configuration.

use futures::future::join_all;
use media_prune_config::{Config, CredentialStore, ServiceConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;
use crate::jellyfin::JellyfinClient;
use crate::jellyseerr::JellyseerrClient;
use crate::jellystat::JellystatClient;
use crate::radarr::RadarrClient;
use crate::sonarr::SonarrClient;
use crate::traits::{HistoryTracker, LibraryManager, MediaServer, RequestTracker, SymlinkBridge};

/// One handle per enabled integration; `None` means disabled.
#[derive(Clone, Default)]
pub struct ClientSet {
    pub radarr: Option<Arc<dyn LibraryManager>>,
    pub sonarr: Option<Arc<dyn LibraryManager>>,
    pub media_server: Option<Arc<dyn MediaServer>>,
    pub requests: Option<Arc<dyn RequestTracker>>,
    pub history: Option<Arc<dyn HistoryTracker>>,
    /// Present only when the preview library is switched on
    pub bridge: Option<Arc<dyn SymlinkBridge>>,
}

fn enabled(service: &Option<ServiceConfig>) -> Option<&ServiceConfig> {
    service.as_ref().filter(|s| s.enabled)
}

fn timeout(service: &ServiceConfig) -> Duration {
    Duration::from_secs(service.timeout_secs.max(1))
}

impl ClientSet {
    pub fn from_config(config: &Config, credentials: &CredentialStore) -> Result<Self, ClientError> {
        let integrations = &config.integrations;
        let key = |name: &str, service: &ServiceConfig| credentials.resolve_api_key(name, service.api_key.as_deref());
        let mut set = ClientSet::default();

        if let Some(service) = enabled(&integrations.radarr) {
            let api_key = key("radarr", service);
            set.radarr = Some(Arc::new(RadarrClient::new(&service.url, api_key.as_deref(), timeout(service))?));
        }
        if let Some(service) = enabled(&integrations.sonarr) {
            let api_key = key("sonarr", service);
            set.sonarr = Some(Arc::new(SonarrClient::new(&service.url, api_key.as_deref(), timeout(service))?));
        }
        if let Some(jellyfin) = integrations.jellyfin.as_ref().filter(|j| j.enabled) {
            let service = jellyfin.as_service();
            let api_key = key("jellyfin", &service);
            let client = Arc::new(JellyfinClient::new(&service.url, api_key.as_deref(), timeout(&service))?);
            if config.symlink_library().is_some() {
                set.bridge = Some(client.clone());
            }
            set.media_server = Some(client);
        }
        if let Some(service) = enabled(&integrations.jellyseerr) {
            let api_key = key("jellyseerr", service);
            set.requests = Some(Arc::new(JellyseerrClient::new(
                &service.url,
                api_key.as_deref(),
                timeout(service),
            )?));
        }
        if let Some(service) = enabled(&integrations.jellystat) {
            let api_key = key("jellystat", service);
            set.history = Some(Arc::new(JellystatClient::new(
                &service.url,
                api_key.as_deref(),
                timeout(service),
            )?));
        }

        debug!(
            "Built clients: radarr={} sonarr={} jellyfin={} jellyseerr={} jellystat={} bridge={}",
            set.radarr.is_some(),
            set.sonarr.is_some(),
            set.media_server.is_some(),
            set.requests.is_some(),
            set.history.is_some(),
            set.bridge.is_some()
        );
        Ok(set)
    }

    /// Library managers in a fixed order (movies first).
    pub fn managers(&self) -> Vec<Arc<dyn LibraryManager>> {
        self.radarr.iter().chain(self.sonarr.iter()).cloned().collect()
    }

    /// Health check of every enabled integration, including the bridge.
    pub async fn ping_all(&self) -> Vec<(String, Result<(), ClientError>)> {
        let mut checks: Vec<futures::future::BoxFuture<'_, (String, Result<(), ClientError>)>> = Vec::new();

        for manager in self.managers() {
            checks.push(Box::pin(async move {
                (manager.service_name().to_string(), manager.ping().await)
            }));
        }
        if let Some(server) = &self.media_server {
            checks.push(Box::pin(async move { (server.service_name().to_string(), server.ping().await) }));
        }
        if let Some(requests) = &self.requests {
            checks.push(Box::pin(async move {
                (requests.service_name().to_string(), requests.ping().await)
            }));
        }
        if let Some(history) = &self.history {
            checks.push(Box::pin(async move { (history.service_name().to_string(), history.ping().await) }));
        }
        if let Some(bridge) = &self.bridge {
            checks.push(Box::pin(async move {
                let result = match bridge.status().await {
                    Ok(status) if status.healthy => Ok(()),
                    Ok(status) => Err(ClientError::unavailable(
                        "bridge",
                        format!("plugin {} reports unhealthy", status.version),
                    )),
                    Err(e) => Err(e),
                };
                ("bridge".to_string(), result)
            }));
        }

        join_all(checks).await
    }
}
