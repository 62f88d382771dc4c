use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::Mutex;

use crate::routing::{
    error::RoutingError,
    ports::UsageStore,
    types::{PointsConfig, ProviderId, TokenUsage, UsageRecord},
};

#[derive(Debug, Default)]
struct ProviderPoints {
    balance: u64,
    applied: HashSet<String>,
}

pub struct PointConverter {
    rate_version: String,
    points_per_1k_tokens: u64,
    balances: Arc<Mutex<HashMap<ProviderId, ProviderPoints>>>,
}

impl PointConverter {
    pub fn new(config: &PointsConfig) -> Self {
        Self {
            rate_version: config.rate_version.clone(),
            points_per_1k_tokens: config.points_per_1k_tokens,
            balances: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn rate_version(&self) -> &str {
        &self.rate_version
    }

    pub fn points_for(&self, usage: &TokenUsage) -> u64 {
        usage.total().saturating_mul(self.points_per_1k_tokens) / 1_000
    }

    pub async fn apply(&self, record: &UsageRecord) -> u64 {
        let mut guard = self.balances.lock().await;
        let state = guard.entry(record.provider_id.clone()).or_default();

        if !state.applied.insert(record.record_id.clone()) {
            tracing::debug!(
                target: "routing",
                record_id = %record.record_id,
                provider_id = %record.provider_id,
                "point_conversion_replayed"
            );
            return 0;
        }

        let added = self.points_for(&record.usage);
        state.balance = state.balance.saturating_add(added);
        added
    }

    pub async fn balance(&self, provider_id: &str) -> u64 {
        let guard = self.balances.lock().await;
        guard
            .get(provider_id)
            .map(|state| state.balance)
            .unwrap_or(0)
    }

    // The only sanctioned correction path: a deterministic recomputation
    // from the immutable usage history under the current rate version.
    pub async fn reconcile(
        &self,
        provider_id: &str,
        store: &dyn UsageStore,
    ) -> Result<u64, RoutingError> {
        let history = store.history_for(provider_id).await?;

        let mut applied = HashSet::new();
        let mut balance = 0_u64;
        for record in &history {
            if applied.insert(record.record_id.clone()) {
                balance = balance.saturating_add(self.points_for(&record.usage));
            }
        }

        let mut guard = self.balances.lock().await;
        let state = guard.entry(provider_id.to_string()).or_default();
        tracing::info!(
            target: "routing",
            provider_id = %provider_id,
            previous_balance = state.balance,
            recomputed_balance = balance,
            records = history.len(),
            rate_version = %self.rate_version,
            "point_balance_reconciled"
        );
        state.balance = balance;
        state.applied = applied;

        Ok(balance)
    }
}
