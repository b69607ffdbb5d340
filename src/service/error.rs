//! Url service errors with stable codes.

use thiserror::Error;

use crate::core::UrlPath;
use crate::resource::{ResourceId, ResourceType, SourceError};

#[derive(Debug, Error)]
pub enum UrlServiceError {
    /// Lookup before the `init` stage ended; retry later
    #[error("url service is not ready, try again shortly")]
    NotReady,

    #[error("resource `{0}` not found")]
    ResourceNotFound(ResourceId),

    /// Logged and self-healed, never returned from a public call
    #[error("resource `{id}` already has url {url}, replacing")]
    DuplicateResource { id: ResourceId, url: UrlPath },

    #[error("failed to fetch {resource_type}")]
    Fetch {
        resource_type: ResourceType,
        source: SourceError,
    },

    #[error("unknown router `{0}`")]
    UnknownRouter(String),

    #[error("invalid timezone `{0}`")]
    Timezone(String),
}

impl UrlServiceError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotReady => "URLSERVICE_NOT_READY",
            Self::ResourceNotFound(_) => "URLSERVICE_RESOURCE_NOT_FOUND",
            Self::DuplicateResource { .. } => "URLSERVICE_RESOURCE_DUPLICATE",
            Self::Fetch { .. } => "URLSERVICE_FETCH_FAILED",
            Self::UnknownRouter(_) => "URLSERVICE_UNKNOWN_ROUTER",
            Self::Timezone(_) => "URLSERVICE_INVALID_TIMEZONE",
        }
    }

    /// Whether the same call can succeed later without intervention.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(UrlServiceError::NotReady.code(), "URLSERVICE_NOT_READY");
        assert_eq!(
            UrlServiceError::ResourceNotFound("x".into()).code(),
            "URLSERVICE_RESOURCE_NOT_FOUND"
        );
        assert!(UrlServiceError::NotReady.is_retryable());
        assert!(!UrlServiceError::Timezone("Mars/Base".into()).is_retryable());
    }

    #[test]
    fn test_fetch_keeps_source() {
        use std::error::Error;
        let err = UrlServiceError::Fetch {
            resource_type: ResourceType::Posts,
            source: SourceError::Unavailable("db".into()),
        };
        assert_eq!(err.to_string(), "failed to fetch posts");
        assert_eq!(err.source().unwrap().to_string(), "db unavailable");
    }
}
