use thiserror::Error;

/// Configuration problems, all caught before a sync cycle can start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid retention '{value}': {reason}")]
    InvalidRetention { value: String, reason: &'static str },

    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("advanced rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("{0}")]
    MissingIntegration(String),
}

impl ConfigError {
    pub(crate) fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
