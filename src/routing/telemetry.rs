use time::OffsetDateTime;

use crate::routing::{
    error::RoutingErrorKind,
    types::{Identity, Intent, ProviderId, RequestId, SessionId},
};

#[derive(Debug, Clone)]
pub enum RoutingTelemetryEvent {
    DispatchStarted {
        request_id: RequestId,
        identity: Identity,
        session_id: SessionId,
        intent: Intent,
    },
    QuotaDenied {
        request_id: RequestId,
        identity: Identity,
        reset_at: OffsetDateTime,
    },
    ProviderAssigned {
        request_id: RequestId,
        session_id: SessionId,
        provider_id: ProviderId,
        affinity_hit: bool,
    },
    ExternalAttemptFailed {
        request_id: RequestId,
        provider_id: ProviderId,
        attempt: u32,
        kind: RoutingErrorKind,
        retryable: bool,
    },
    DispatchCompleted {
        request_id: RequestId,
        provider_id: ProviderId,
        total_tokens: u64,
        latency_ms: u64,
        points_added: u64,
    },
    DispatchFailed {
        request_id: RequestId,
        kind: RoutingErrorKind,
    },
    UsageRecordingFailed {
        request_id: RequestId,
        provider_id: ProviderId,
    },
    ReconciliationRequired {
        provider_id: ProviderId,
    },
}

pub trait TelemetrySink: Send + Sync {
    fn on_event(&self, event: RoutingTelemetryEvent);
}

#[derive(Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn on_event(&self, _event: RoutingTelemetryEvent) {}
}

#[derive(Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn on_event(&self, event: RoutingTelemetryEvent) {
        match event {
            RoutingTelemetryEvent::DispatchStarted {
                request_id,
                identity,
                session_id,
                intent,
            } => {
                tracing::debug!(
                    target: "routing",
                    request_id = %request_id,
                    identity = %identity,
                    session_id = %session_id,
                    intent = ?intent,
                    "dispatch_started"
                );
            }
            RoutingTelemetryEvent::QuotaDenied {
                request_id,
                identity,
                reset_at,
            } => {
                tracing::info!(
                    target: "routing",
                    request_id = %request_id,
                    identity = %identity,
                    reset_at = %reset_at,
                    "quota_denied"
                );
            }
            RoutingTelemetryEvent::ProviderAssigned {
                request_id,
                session_id,
                provider_id,
                affinity_hit,
            } => {
                tracing::debug!(
                    target: "routing",
                    request_id = %request_id,
                    session_id = %session_id,
                    provider_id = %provider_id,
                    affinity_hit = affinity_hit,
                    "provider_assigned"
                );
            }
            RoutingTelemetryEvent::ExternalAttemptFailed {
                request_id,
                provider_id,
                attempt,
                kind,
                retryable,
            } => {
                tracing::warn!(
                    target: "routing",
                    request_id = %request_id,
                    provider_id = %provider_id,
                    attempt = attempt,
                    kind = ?kind,
                    retryable = retryable,
                    "external_attempt_failed"
                );
            }
            RoutingTelemetryEvent::DispatchCompleted {
                request_id,
                provider_id,
                total_tokens,
                latency_ms,
                points_added,
            } => {
                tracing::info!(
                    target: "routing",
                    request_id = %request_id,
                    provider_id = %provider_id,
                    total_tokens = total_tokens,
                    latency_ms = latency_ms,
                    points_added = points_added,
                    "dispatch_completed"
                );
            }
            RoutingTelemetryEvent::DispatchFailed { request_id, kind } => {
                tracing::warn!(
                    target: "routing",
                    request_id = %request_id,
                    kind = ?kind,
                    "dispatch_failed"
                );
            }
            RoutingTelemetryEvent::UsageRecordingFailed {
                request_id,
                provider_id,
            } => {
                tracing::error!(
                    target: "routing",
                    request_id = %request_id,
                    provider_id = %provider_id,
                    "usage_recording_failed"
                );
            }
            RoutingTelemetryEvent::ReconciliationRequired { provider_id } => {
                tracing::warn!(
                    target: "routing",
                    provider_id = %provider_id,
                    "reconciliation_required"
                );
            }
        }
    }
}
