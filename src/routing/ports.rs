use async_trait::async_trait;
use time::OffsetDateTime;

use crate::routing::{
    error::RoutingError,
    types::{
        CandidateProvider, Intent, ProviderId, RequestId, SessionRecord, Tier, TokenUsage,
        UsageRecord,
    },
};

#[async_trait]
pub trait ProviderPool: Send + Sync {
    async fn list_eligible(&self, intent: Intent) -> Result<Vec<CandidateProvider>, RoutingError>;

    async fn is_eligible(&self, provider_id: &str) -> Result<bool, RoutingError>;
}

#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    async fn tier_of(&self, identity: &str) -> Result<Tier, RoutingError>;
}

#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created,
    Existing(SessionRecord),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, RoutingError>;

    async fn create_if_absent(&self, record: SessionRecord) -> Result<CreateOutcome, RoutingError>;

    async fn replace(&self, record: SessionRecord) -> Result<(), RoutingError>;

    async fn touch(
        &self,
        session_id: &str,
        seen_at: OffsetDateTime,
    ) -> Result<bool, RoutingError>;

    async fn remove(&self, session_id: &str) -> Result<bool, RoutingError>;

    async fn snapshot(&self) -> Result<Vec<SessionRecord>, RoutingError>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn append(&self, record: UsageRecord) -> Result<(), RoutingError>;

    async fn history_for(&self, provider_id: &str) -> Result<Vec<UsageRecord>, RoutingError>;
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub request_id: RequestId,
    pub provider_id: ProviderId,
    pub intent: Intent,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct InferenceOutcome {
    pub model: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn complete(&self, request: InferenceRequest) -> Result<InferenceOutcome, RoutingError>;
}
