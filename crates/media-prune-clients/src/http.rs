use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

use crate::error::ClientError;

/// Shared JSON-over-HTTP plumbing with the API key baked into default headers.
#[derive(Clone)]
pub(crate) struct ServiceHttp {
    client: Client,
    base_url: String,
    service: &'static str,
}

impl ServiceHttp {
    pub fn new(
        service: &'static str,
        base_url: &str,
        key_header: &'static str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let invalid = |message: String| ClientError::InvalidConfig {
            service: service.to_string(),
            message,
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            headers.insert(
                HeaderName::from_static(key_header),
                HeaderValue::from_str(key).map_err(|_| invalid("API key contains invalid characters".to_string()))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClientError> {
        let request = self.client.get(self.url(path)).query(query);
        self.json(self.send(request).await?).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, ClientError> {
        let request = self.client.post(self.url(path)).query(query).json(body);
        self.json(self.send(request).await?).await
    }

    /// POST where the response body is irrelevant
    pub async fn post_no_content(&self, path: &str, query: &[(&str, String)]) -> Result<(), ClientError> {
        self.send(self.client.post(self.url(path)).query(query)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str, query: &[(&str, String)]) -> Result<(), ClientError> {
        self.send(self.client.delete(self.url(path)).query(query)).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await.map_err(|source| ClientError::Request {
            service: self.service.to_string(),
            source,
        })?;

        let status = response.status();
        trace!(service = self.service, status = status.as_u16(), url = %response.url(), "HTTP response");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            service: self.service.to_string(),
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ClientError> {
        response.json::<T>().await.map_err(|e| ClientError::Decode {
            service: self.service.to_string(),
            message: e.to_string(),
        })
    }
}
