//! Errors from external service calls, classified for retry decisions.

use thiserror::Error;

/// Statuses retried when no explicit list is configured
pub const DEFAULT_RETRIABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Network error calling {service}: {message}")]
    Network { service: String, message: String },

    #[error("{service} returned HTTP {status}: {message}")]
    HttpStatus {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Could not decode {service} response: {message}")]
    Deserialization { service: String, message: String },

    #[error("{service} call failed: {message}")]
    Other { service: String, message: String },
}

impl ServiceError {
    pub fn network(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn http_status(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    pub fn deserialization(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Deserialization {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn other(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Classify a reqwest failure
    pub fn from_reqwest(service: impl Into<String>, error: reqwest::Error) -> Self {
        let service = service.into();
        if error.is_decode() {
            Self::deserialization(service, error.to_string())
        } else if let Some(status) = error.status() {
            Self::http_status(service, status.as_u16(), error.to_string())
        } else if error.is_builder() {
            Self::other(service, error.to_string())
        } else {
            Self::network(service, error.to_string())
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn service(&self) -> &str {
        match self {
            Self::Network { service, .. }
            | Self::HttpStatus { service, .. }
            | Self::Deserialization { service, .. }
            | Self::Other { service, .. } => service,
        }
    }

    /// Retriable under the default status list
    pub fn is_retriable(&self) -> bool {
        self.is_retriable_with(&DEFAULT_RETRIABLE_STATUS_CODES)
    }

    pub fn is_retriable_with(&self, retriable_status_codes: &[u16]) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => retriable_status_codes.contains(status),
            Self::Deserialization { .. } | Self::Other { .. } => false,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
