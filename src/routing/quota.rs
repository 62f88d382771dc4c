use std::{collections::HashMap, sync::Arc};

use time::{Duration, OffsetDateTime, Time};
use tokio::sync::Mutex;

use crate::routing::types::{Identity, QuotaConfig, RateLimitStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct QuotaWindow {
    window_start: OffsetDateTime,
    count: u32,
}

pub struct QuotaLedger {
    window_grace: Duration,
    windows: Arc<Mutex<HashMap<Identity, Arc<Mutex<QuotaWindow>>>>>,
}

impl QuotaLedger {
    pub fn new(config: &QuotaConfig) -> Self {
        Self {
            window_grace: Duration::milliseconds(config.window_grace_ms as i64),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn check_and_reserve(&self, identity: &str, daily_limit: u32) -> QuotaDecision {
        self.check_and_reserve_at(identity, daily_limit, OffsetDateTime::now_utc())
            .await
    }

    // Check and increment happen inside the per-identity critical section:
    // two concurrent calls cannot both take the last slot.
    pub async fn check_and_reserve_at(
        &self,
        identity: &str,
        daily_limit: u32,
        now: OffsetDateTime,
    ) -> QuotaDecision {
        let daily_limit = daily_limit.max(1);
        let window_start = day_start(now);
        let slot = self.slot_for(identity, window_start).await;
        let mut window = slot.lock().await;

        if window.window_start != window_start {
            window.window_start = window_start;
            window.count = 0;
        }

        let reset_at = window_start + Duration::days(1);
        if window.count < daily_limit {
            window.count += 1;
            QuotaDecision {
                allowed: true,
                remaining: daily_limit - window.count,
                reset_at,
            }
        } else {
            QuotaDecision {
                allowed: false,
                remaining: 0,
                reset_at,
            }
        }
    }

    pub async fn status(&self, identity: &str, daily_limit: u32) -> RateLimitStatus {
        self.status_at(identity, daily_limit, OffsetDateTime::now_utc())
            .await
    }

    pub async fn status_at(
        &self,
        identity: &str,
        daily_limit: u32,
        now: OffsetDateTime,
    ) -> RateLimitStatus {
        let daily_limit = daily_limit.max(1);
        let window_start = day_start(now);
        let reset_at = window_start + Duration::days(1);

        let slot = {
            let guard = self.windows.lock().await;
            guard.get(identity).cloned()
        };

        let current = match slot {
            Some(slot) => {
                let window = slot.lock().await;
                if window.window_start == window_start {
                    window.count
                } else {
                    0
                }
            }
            None => 0,
        };

        RateLimitStatus {
            current,
            remaining: daily_limit.saturating_sub(current),
            reset_at,
        }
    }

    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(OffsetDateTime::now_utc()).await
    }

    pub async fn sweep_expired_at(&self, now: OffsetDateTime) -> usize {
        let mut guard = self.windows.lock().await;
        let mut stale = Vec::new();
        for (identity, slot) in guard.iter() {
            let window = slot.lock().await;
            if window.window_start + Duration::days(1) + self.window_grace <= now {
                stale.push(identity.clone());
            }
        }
        for identity in &stale {
            guard.remove(identity);
        }
        stale.len()
    }

    async fn slot_for(&self, identity: &str, window_start: OffsetDateTime) -> Arc<Mutex<QuotaWindow>> {
        let mut guard = self.windows.lock().await;
        guard
            .entry(identity.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(QuotaWindow {
                    window_start,
                    count: 0,
                }))
            })
            .clone()
    }
}

fn day_start(now: OffsetDateTime) -> OffsetDateTime {
    now.replace_time(Time::MIDNIGHT)
}
