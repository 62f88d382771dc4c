use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::routing::types::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingErrorKind {
    QuotaExceeded,
    NoEligibleProviders,
    AffinityStorage,
    ExternalCallTimeout,
    ExternalCallError,
    UsageRecording,
    InvalidRequest,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingError {
    pub kind: RoutingErrorKind,
    pub message: String,
    pub retryable: bool,
    pub provider_id: Option<ProviderId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub retry_at: Option<OffsetDateTime>,
}

impl RoutingError {
    pub fn new(kind: RoutingErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: matches!(
                kind,
                RoutingErrorKind::AffinityStorage
                    | RoutingErrorKind::ExternalCallTimeout
                    | RoutingErrorKind::ExternalCallError
            ),
            provider_id: None,
            retry_at: None,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_retry_at(mut self, retry_at: OffsetDateTime) -> Self {
        self.retry_at = Some(retry_at);
        self
    }
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.provider_id {
            Some(provider_id) => write!(f, "{} (provider={})", self.message, provider_id),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RoutingError {}

pub fn quota_exceeded(identity: &str, reset_at: OffsetDateTime) -> RoutingError {
    RoutingError::new(
        RoutingErrorKind::QuotaExceeded,
        format!("daily request quota exhausted for identity '{}'", identity),
    )
    .with_retry_at(reset_at)
}

pub fn no_eligible_providers(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::NoEligibleProviders, message)
}

pub fn affinity_storage(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::AffinityStorage, message)
}

pub fn external_timeout(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::ExternalCallTimeout, message)
}

pub fn external_error(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::ExternalCallError, message)
}

pub fn usage_recording(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::UsageRecording, message)
}

pub fn invalid_request(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::InvalidRequest, message)
}

pub fn internal_error(message: impl Into<String>) -> RoutingError {
    RoutingError::new(RoutingErrorKind::Internal, message)
}
