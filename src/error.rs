//! Application error types for the MOLPay plugin
//!
//! Every fallible operation in the crate returns [`AppResult`]. Errors are
//! grouped by where they originate so the host can decide how to react:
//! configuration problems are permanent until an administrator fixes the
//! settings, gateway problems may be retried by the host, and validation
//! problems describe order data the plugin cannot turn into a request.

use std::fmt;
use thiserror::Error;

/// Result type for plugin operations
pub type AppResult<T> = Result<T, AppError>;

/// Problems with the plugin's own setup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InfrastructureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Failed to persist order attribute '{key}': {message}")]
    AttributeStore { key: String, message: String },
}

/// Problems talking to the payment gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{provider} error: {message}")]
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },

    #[error("{provider} did not answer within {seconds} seconds")]
    Timeout { provider: String, seconds: u64 },
}

/// Problems with the order data handed to the plugin
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{entity} '{id}' could not be resolved")]
    LookupFailed { entity: String, id: String },

    #[error("Invalid URL '{value}': {message}")]
    InvalidUrl { value: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppErrorKind {
    #[error(transparent)]
    Infrastructure(InfrastructureError),

    #[error(transparent)]
    External(ExternalError),

    #[error(transparent)]
    Validation(ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
    }

    /// For `OrderAttributeStore` implementations reporting a failed read or write.
    pub fn attribute_store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::AttributeStore {
                key: key.into(),
                message: message.into(),
            },
        ))
    }

    pub fn gateway(message: impl Into<String>, is_retryable: bool) -> Self {
        Self::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: crate::PROVIDER_NAME.to_string(),
            message: message.into(),
            is_retryable,
        }))
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::new(AppErrorKind::External(ExternalError::Timeout {
            provider: crate::PROVIDER_NAME.to_string(),
            seconds,
        }))
    }

    pub fn lookup_failed(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::LookupFailed {
            entity: entity.into(),
            id: id.into(),
        }))
    }

    pub fn invalid_url(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidUrl {
            value: value.into(),
            message: message.into(),
        }))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { .. })
        )
    }

    /// Whether the host may retry the operation later.
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::Timeout { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout()
            || err.is_connect()
            || err.status().is_some_and(|s| s.is_server_error());
        AppError::gateway(format!("Request error: {}", err), retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_is_not_retryable() {
        let err = AppError::configuration("merchant id is required");
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Configuration error: merchant id is required"
        );
    }

    #[test]
    fn test_gateway_error_carries_retry_flag() {
        assert!(AppError::gateway("HTTP 503", true).is_retryable());
        assert!(!AppError::gateway("HTTP 403", false).is_retryable());
        assert!(AppError::timeout(10).is_retryable());
    }

    #[test]
    fn test_attribute_store_error() {
        let err = AppError::attribute_store("OrderTotalSentToMOLPay", "connection reset");
        assert!(!err.is_configuration());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Failed to persist order attribute 'OrderTotalSentToMOLPay': connection reset"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::lookup_failed("Product", "p-1").with_context("order 42");
        assert_eq!(err.to_string(), "Product 'p-1' could not be resolved (order 42)");
    }
}
