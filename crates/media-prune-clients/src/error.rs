use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{service}: request failed: {source}")]
    Request {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service}: unexpected status {status}: {body}")]
    Status { service: String, status: u16, body: String },

    #[error("{service}: invalid response: {message}")]
    Decode { service: String, message: String },

    #[error("{service}: unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("{service}: invalid client configuration: {message}")]
    InvalidConfig { service: String, message: String },
}

impl ClientError {
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn service(&self) -> &str {
        match self {
            ClientError::Request { service, .. }
            | ClientError::Status { service, .. }
            | ClientError::Decode { service, .. }
            | ClientError::Unavailable { service, .. }
            | ClientError::InvalidConfig { service, .. } => service,
        }
    }

    /// The entry no longer exists upstream.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}
