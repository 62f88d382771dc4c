use std::sync::Arc;

use rand::Rng;
use time::{Duration, OffsetDateTime};

use crate::routing::{
    error::{RoutingError, no_eligible_providers},
    ports::{CreateOutcome, ProviderPool, SessionStore},
    types::{CandidateProvider, Intent, ProviderId, SessionConfig, SessionRecord, SessionStats},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider_id: ProviderId,
    pub affinity_hit: bool,
}

// Probability of picking candidate i is weight_i / sum(weights). Zero
// weights are clamped to 1 so every eligible candidate stays selectable;
// equal weights degenerate to a uniform draw.
pub fn select_weighted<R: Rng>(candidates: &[CandidateProvider], rng: &mut R) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }

    let total: u64 = candidates
        .iter()
        .map(|candidate| candidate.weight.max(1))
        .sum();
    let draw = rng.gen_range(0..total);

    let mut cumulative = 0_u64;
    for (index, candidate) in candidates.iter().enumerate() {
        cumulative += candidate.weight.max(1);
        if draw < cumulative {
            return Some(index);
        }
    }

    Some(candidates.len() - 1)
}

pub struct SessionAffinityMap {
    idle_ttl: Duration,
    pool: Arc<dyn ProviderPool>,
    store: Arc<dyn SessionStore>,
}

impl SessionAffinityMap {
    pub fn new(
        config: &SessionConfig,
        pool: Arc<dyn ProviderPool>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            idle_ttl: Duration::milliseconds(config.idle_ttl_ms.max(1) as i64),
            pool,
            store,
        }
    }

    pub async fn resolve(
        &self,
        session_id: &str,
        intent: Intent,
    ) -> Result<ResolvedProvider, RoutingError> {
        self.resolve_at(session_id, intent, OffsetDateTime::now_utc())
            .await
    }

    pub async fn resolve_at(
        &self,
        session_id: &str,
        intent: Intent,
        now: OffsetDateTime,
    ) -> Result<ResolvedProvider, RoutingError> {
        let existing = self.store.get(session_id).await?;

        if let Some(record) = &existing {
            if !self.expired(record, now) {
                if self.pool.is_eligible(&record.provider_id).await? {
                    self.store.touch(session_id, now).await?;
                    return Ok(ResolvedProvider {
                        provider_id: record.provider_id.clone(),
                        affinity_hit: true,
                    });
                }
                // Assigned provider churned out of the pool; re-assign.
            }
        }

        self.assign_at(session_id, intent, None, existing.is_some(), now)
            .await
    }

    pub async fn reassign_avoiding(
        &self,
        session_id: &str,
        intent: Intent,
        avoid: &str,
    ) -> Result<ResolvedProvider, RoutingError> {
        self.reassign_avoiding_at(session_id, intent, avoid, OffsetDateTime::now_utc())
            .await
    }

    pub async fn reassign_avoiding_at(
        &self,
        session_id: &str,
        intent: Intent,
        avoid: &str,
        now: OffsetDateTime,
    ) -> Result<ResolvedProvider, RoutingError> {
        self.assign_at(session_id, intent, Some(avoid), true, now)
            .await
    }

    pub async fn remove(&self, session_id: &str) -> Result<bool, RoutingError> {
        self.store.remove(session_id).await
    }

    pub async fn stats(&self) -> Result<SessionStats, RoutingError> {
        self.stats_at(OffsetDateTime::now_utc()).await
    }

    pub async fn stats_at(&self, now: OffsetDateTime) -> Result<SessionStats, RoutingError> {
        let mut stats = SessionStats::default();
        for record in self.store.snapshot().await? {
            if self.expired(&record, now) {
                continue;
            }
            stats.active_count += 1;
            *stats
                .per_provider_counts
                .entry(record.provider_id)
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    pub async fn sweep_expired(&self) -> Result<usize, RoutingError> {
        self.sweep_expired_at(OffsetDateTime::now_utc()).await
    }

    pub async fn sweep_expired_at(&self, now: OffsetDateTime) -> Result<usize, RoutingError> {
        let mut removed = 0;
        for record in self.store.snapshot().await? {
            if self.expired(&record, now) && self.store.remove(&record.session_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn assign_at(
        &self,
        session_id: &str,
        intent: Intent,
        avoid: Option<&str>,
        overwrite: bool,
        now: OffsetDateTime,
    ) -> Result<ResolvedProvider, RoutingError> {
        let mut candidates = self.pool.list_eligible(intent).await?;
        if let Some(avoid) = avoid {
            candidates.retain(|candidate| candidate.provider_id != avoid);
        }

        let picked = {
            let mut rng = rand::thread_rng();
            select_weighted(&candidates, &mut rng)
        };
        let Some(index) = picked else {
            return Err(no_eligible_providers(format!(
                "no eligible providers for intent {:?}",
                intent
            )));
        };
        let provider_id = candidates[index].provider_id.clone();

        let record = SessionRecord {
            session_id: session_id.to_string(),
            provider_id: provider_id.clone(),
            intent,
            created_at: now,
            last_seen_at: now,
        };

        if overwrite {
            self.store.replace(record).await?;
            tracing::debug!(
                target: "routing",
                session_id = %session_id,
                provider_id = %provider_id,
                "session_reassigned"
            );
            return Ok(ResolvedProvider {
                provider_id,
                affinity_hit: false,
            });
        }

        match self.store.create_if_absent(record).await? {
            CreateOutcome::Created => {
                tracing::debug!(
                    target: "routing",
                    session_id = %session_id,
                    provider_id = %provider_id,
                    "session_assigned"
                );
                Ok(ResolvedProvider {
                    provider_id,
                    affinity_hit: false,
                })
            }
            // Lost the create race; adopt the winner's assignment.
            CreateOutcome::Existing(winner) => Ok(ResolvedProvider {
                provider_id: winner.provider_id,
                affinity_hit: false,
            }),
        }
    }

    fn expired(&self, record: &SessionRecord, now: OffsetDateTime) -> bool {
        record.last_seen_at + self.idle_ttl <= now
    }
}
