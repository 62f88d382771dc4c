use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::routing::{
    error::{RoutingError, usage_recording},
    ports::UsageStore,
    types::{Identity, ProviderId, SessionId, TokenUsage, UsageRecord},
};

#[derive(Debug, Clone)]
pub struct UsageDraft {
    pub provider_id: ProviderId,
    pub identity: Identity,
    pub session_id: Option<SessionId>,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub model: String,
}

pub struct UsageRecorder {
    store: Arc<dyn UsageStore>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, draft: UsageDraft) -> Result<UsageRecord, RoutingError> {
        self.record_at(draft, OffsetDateTime::now_utc()).await
    }

    pub async fn record_at(
        &self,
        draft: UsageDraft,
        now: OffsetDateTime,
    ) -> Result<UsageRecord, RoutingError> {
        let record = UsageRecord {
            record_id: Uuid::now_v7().to_string(),
            provider_id: draft.provider_id,
            identity: draft.identity,
            session_id: draft.session_id,
            usage: draft.usage,
            latency_ms: draft.latency_ms,
            model: draft.model,
            created_at: now,
        };

        match self.store.append(record.clone()).await {
            Ok(()) => {
                tracing::debug!(
                    target: "routing",
                    record_id = %record.record_id,
                    provider_id = %record.provider_id,
                    total_tokens = record.usage.total(),
                    latency_ms = record.latency_ms,
                    "usage_recorded"
                );
                Ok(record)
            }
            Err(err) => {
                tracing::error!(
                    target: "routing",
                    record_id = %record.record_id,
                    provider_id = %record.provider_id,
                    error = %err,
                    "usage_recording_failed"
                );
                Err(usage_recording(format!(
                    "failed to append usage record '{}': {}",
                    record.record_id, err
                ))
                .with_provider_id(record.provider_id))
            }
        }
    }
}
