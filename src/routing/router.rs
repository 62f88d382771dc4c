use std::{sync::Arc, time::Instant};

use time::OffsetDateTime;
use tokio::time::{Duration, timeout};
use uuid::Uuid;

use crate::routing::{
    affinity::SessionAffinityMap,
    error::{RoutingError, external_timeout, invalid_request, quota_exceeded},
    points::PointConverter,
    ports::{
        CredentialDirectory, InferenceBackend, InferenceOutcome, InferenceRequest, ProviderPool,
        SessionStore, UsageStore,
    },
    quota::QuotaLedger,
    telemetry::{RoutingTelemetryEvent, TelemetrySink, TracingTelemetrySink},
    types::{
        AUTO_SELECT_MODEL, Intent, ProviderId, RateLimitStatus, RequestId, RoutingConfig,
        SessionStats, TokenUsage,
    },
    usage::{UsageDraft, UsageRecorder},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSummary {
    pub model: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub points_added: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub request_id: RequestId,
    pub provider_id: ProviderId,
    pub usage: UsageSummary,
}

pub struct Router {
    config: RoutingConfig,
    quota: QuotaLedger,
    affinity: SessionAffinityMap,
    recorder: UsageRecorder,
    converter: PointConverter,
    credentials: Arc<dyn CredentialDirectory>,
    usage_store: Arc<dyn UsageStore>,
    backend: Arc<dyn InferenceBackend>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Router {
    pub fn new(
        config: RoutingConfig,
        pool: Arc<dyn ProviderPool>,
        credentials: Arc<dyn CredentialDirectory>,
        sessions: Arc<dyn SessionStore>,
        usage: Arc<dyn UsageStore>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self {
            quota: QuotaLedger::new(&config.quota),
            affinity: SessionAffinityMap::new(&config.session, pool, sessions),
            recorder: UsageRecorder::new(usage.clone()),
            converter: PointConverter::new(&config.points),
            credentials,
            usage_store: usage,
            backend,
            telemetry: Arc::new(TracingTelemetrySink),
            config,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub async fn dispatch(
        &self,
        identity: &str,
        session_id: &str,
        intent: Intent,
        model_hint: Option<&str>,
    ) -> Result<DispatchOutcome, RoutingError> {
        self.dispatch_at(
            identity,
            session_id,
            intent,
            model_hint,
            OffsetDateTime::now_utc(),
        )
        .await
    }

    pub async fn dispatch_at(
        &self,
        identity: &str,
        session_id: &str,
        intent: Intent,
        model_hint: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<DispatchOutcome, RoutingError> {
        if identity.trim().is_empty() {
            return Err(invalid_request("identity must not be empty"));
        }
        if session_id.trim().is_empty() {
            return Err(invalid_request("session id must not be empty"));
        }

        let request_id = Uuid::now_v7().to_string();
        self.telemetry.on_event(RoutingTelemetryEvent::DispatchStarted {
            request_id: request_id.clone(),
            identity: identity.to_string(),
            session_id: session_id.to_string(),
            intent,
        });

        let tier = self.credentials.tier_of(identity).await?;
        let daily_limit = self.config.tiers.daily_limit(tier);

        // Non-mutating admission check first: a provider-lookup failure
        // below must not consume a quota slot.
        let status = self.quota.status_at(identity, daily_limit, now).await;
        if status.remaining == 0 {
            self.telemetry.on_event(RoutingTelemetryEvent::QuotaDenied {
                request_id: request_id.clone(),
                identity: identity.to_string(),
                reset_at: status.reset_at,
            });
            return Err(quota_exceeded(identity, status.reset_at));
        }

        let resolved = match self.affinity.resolve_at(session_id, intent, now).await {
            Ok(resolved) => resolved,
            Err(err) => {
                self.telemetry.on_event(RoutingTelemetryEvent::DispatchFailed {
                    request_id: request_id.clone(),
                    kind: err.kind,
                });
                return Err(err);
            }
        };
        self.telemetry
            .on_event(RoutingTelemetryEvent::ProviderAssigned {
                request_id: request_id.clone(),
                session_id: session_id.to_string(),
                provider_id: resolved.provider_id.clone(),
                affinity_hit: resolved.affinity_hit,
            });

        let decision = self
            .quota
            .check_and_reserve_at(identity, daily_limit, now)
            .await;
        if !decision.allowed {
            self.telemetry.on_event(RoutingTelemetryEvent::QuotaDenied {
                request_id: request_id.clone(),
                identity: identity.to_string(),
                reset_at: decision.reset_at,
            });
            return Err(quota_exceeded(identity, decision.reset_at));
        }

        let model = match model_hint {
            Some(hint) if !hint.trim().is_empty() => hint.to_string(),
            _ => AUTO_SELECT_MODEL.to_string(),
        };

        let first = self
            .invoke_backend(&request_id, &resolved.provider_id, intent, &model)
            .await;
        let (provider_id, outcome, latency_ms) = match first {
            Ok((outcome, latency_ms)) => (resolved.provider_id.clone(), outcome, latency_ms),
            Err(err) if err.retryable && self.config.dispatch.retry_on_alternate_provider => {
                self.telemetry
                    .on_event(RoutingTelemetryEvent::ExternalAttemptFailed {
                        request_id: request_id.clone(),
                        provider_id: resolved.provider_id.clone(),
                        attempt: 0,
                        kind: err.kind,
                        retryable: err.retryable,
                    });
                match self
                    .affinity
                    .reassign_avoiding_at(session_id, intent, &resolved.provider_id, now)
                    .await
                {
                    Ok(alternate) => {
                        match self
                            .invoke_backend(&request_id, &alternate.provider_id, intent, &model)
                            .await
                        {
                            Ok((outcome, latency_ms)) => {
                                (alternate.provider_id, outcome, latency_ms)
                            }
                            Err(second_err) => {
                                self.telemetry.on_event(
                                    RoutingTelemetryEvent::ExternalAttemptFailed {
                                        request_id: request_id.clone(),
                                        provider_id: alternate.provider_id.clone(),
                                        attempt: 1,
                                        kind: second_err.kind,
                                        retryable: second_err.retryable,
                                    },
                                );
                                self.telemetry.on_event(
                                    RoutingTelemetryEvent::DispatchFailed {
                                        request_id: request_id.clone(),
                                        kind: second_err.kind,
                                    },
                                );
                                return Err(second_err);
                            }
                        }
                    }
                    // No alternate provider exists; surface the original
                    // call failure, not a misattributed pool error.
                    Err(_) => {
                        self.telemetry.on_event(RoutingTelemetryEvent::DispatchFailed {
                            request_id: request_id.clone(),
                            kind: err.kind,
                        });
                        return Err(err);
                    }
                }
            }
            Err(err) => {
                self.telemetry
                    .on_event(RoutingTelemetryEvent::ExternalAttemptFailed {
                        request_id: request_id.clone(),
                        provider_id: resolved.provider_id.clone(),
                        attempt: 0,
                        kind: err.kind,
                        retryable: err.retryable,
                    });
                self.telemetry.on_event(RoutingTelemetryEvent::DispatchFailed {
                    request_id: request_id.clone(),
                    kind: err.kind,
                });
                return Err(err);
            }
        };

        // Usage recording is best-effort: the caller's already-obtained
        // result is never blocked on ledger durability.
        let draft = UsageDraft {
            provider_id: provider_id.clone(),
            identity: identity.to_string(),
            session_id: Some(session_id.to_string()),
            usage: outcome.usage,
            latency_ms,
            model: outcome.model.clone(),
        };
        let points_added = match self.recorder.record_at(draft, now).await {
            Ok(record) => self.converter.apply(&record).await,
            Err(_) => {
                self.telemetry
                    .on_event(RoutingTelemetryEvent::UsageRecordingFailed {
                        request_id: request_id.clone(),
                        provider_id: provider_id.clone(),
                    });
                self.telemetry
                    .on_event(RoutingTelemetryEvent::ReconciliationRequired {
                        provider_id: provider_id.clone(),
                    });
                0
            }
        };

        self.telemetry
            .on_event(RoutingTelemetryEvent::DispatchCompleted {
                request_id: request_id.clone(),
                provider_id: provider_id.clone(),
                total_tokens: outcome.usage.total(),
                latency_ms,
                points_added,
            });

        Ok(DispatchOutcome {
            request_id,
            provider_id,
            usage: UsageSummary {
                model: outcome.model,
                usage: outcome.usage,
                latency_ms,
                points_added,
            },
        })
    }

    pub async fn rate_limit_status(&self, identity: &str) -> Result<RateLimitStatus, RoutingError> {
        self.rate_limit_status_at(identity, OffsetDateTime::now_utc())
            .await
    }

    pub async fn rate_limit_status_at(
        &self,
        identity: &str,
        now: OffsetDateTime,
    ) -> Result<RateLimitStatus, RoutingError> {
        if identity.trim().is_empty() {
            return Err(invalid_request("identity must not be empty"));
        }
        let tier = self.credentials.tier_of(identity).await?;
        let daily_limit = self.config.tiers.daily_limit(tier);
        Ok(self.quota.status_at(identity, daily_limit, now).await)
    }

    pub async fn session_stats(&self) -> Result<SessionStats, RoutingError> {
        self.affinity.stats().await
    }

    pub async fn session_stats_at(
        &self,
        now: OffsetDateTime,
    ) -> Result<SessionStats, RoutingError> {
        self.affinity.stats_at(now).await
    }

    pub async fn remove_session(&self, session_id: &str) -> Result<bool, RoutingError> {
        self.affinity.remove(session_id).await
    }

    pub async fn sweep_expired(&self) -> Result<(usize, usize), RoutingError> {
        self.sweep_expired_at(OffsetDateTime::now_utc()).await
    }

    pub async fn sweep_expired_at(
        &self,
        now: OffsetDateTime,
    ) -> Result<(usize, usize), RoutingError> {
        let sessions = self.affinity.sweep_expired_at(now).await?;
        let windows = self.quota.sweep_expired_at(now).await;
        Ok((sessions, windows))
    }

    pub async fn provider_point_balance(&self, provider_id: &str) -> u64 {
        self.converter.balance(provider_id).await
    }

    pub async fn reconcile_provider_points(
        &self,
        provider_id: &str,
    ) -> Result<u64, RoutingError> {
        self.converter
            .reconcile(provider_id, self.usage_store.as_ref())
            .await
    }

    async fn invoke_backend(
        &self,
        request_id: &str,
        provider_id: &str,
        intent: Intent,
        model: &str,
    ) -> Result<(InferenceOutcome, u64), RoutingError> {
        let timeout_ms = self.config.dispatch.request_timeout_ms.max(1);
        let request = InferenceRequest {
            request_id: request_id.to_string(),
            provider_id: provider_id.to_string(),
            intent,
            model: model.to_string(),
        };

        let started = Instant::now();
        match timeout(
            Duration::from_millis(timeout_ms),
            self.backend.complete(request),
        )
        .await
        {
            Ok(Ok(outcome)) => Ok((outcome, started.elapsed().as_millis() as u64)),
            Ok(Err(err)) => {
                let err = if err.provider_id.is_none() {
                    err.with_provider_id(provider_id)
                } else {
                    err
                };
                Err(err)
            }
            Err(_) => Err(external_timeout(format!(
                "inference call exceeded {}ms",
                timeout_ms
            ))
            .with_provider_id(provider_id)),
        }
    }
}
