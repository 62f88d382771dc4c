use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type ProviderId = String;
pub type SessionId = String;
pub type Identity = String;
pub type RequestId = String;

pub const AUTO_SELECT_MODEL: &str = "auto-select";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Chat,
    Code,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Developer,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(default = "default_developer_daily_limit")]
    pub developer_daily_limit: u32,
    #[serde(default = "default_agent_daily_limit")]
    pub agent_daily_limit: u32,
}

impl TierTable {
    pub fn daily_limit(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Developer => self.developer_daily_limit,
            Tier::Agent => self.agent_daily_limit,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            developer_daily_limit: default_developer_daily_limit(),
            agent_daily_limit: default_agent_daily_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProvider {
    pub provider_id: ProviderId,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub provider_id: ProviderId,
    pub intent: Intent,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub record_id: String,
    pub provider_id: ProviderId,
    pub identity: Identity,
    pub session_id: Option<SessionId>,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub model: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub current: u32,
    pub remaining: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub reset_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub active_count: u64,
    pub per_provider_counts: BTreeMap<ProviderId, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub tiers: TierTable,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub points: PointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_window_grace_ms")]
    pub window_grace_ms: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_grace_ms: default_window_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_ttl_ms")]
    pub idle_ttl_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_ms: default_idle_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_enabled_true")]
    pub retry_on_alternate_provider: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            retry_on_alternate_provider: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsConfig {
    #[serde(default = "default_rate_version")]
    pub rate_version: String,
    #[serde(default = "default_points_per_1k_tokens")]
    pub points_per_1k_tokens: u64,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            rate_version: default_rate_version(),
            points_per_1k_tokens: default_points_per_1k_tokens(),
        }
    }
}

fn default_developer_daily_limit() -> u32 {
    500
}

fn default_agent_daily_limit() -> u32 {
    5_000
}

fn default_window_grace_ms() -> u64 {
    3_600_000
}

fn default_idle_ttl_ms() -> u64 {
    1_800_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_enabled_true() -> bool {
    true
}

fn default_rate_version() -> String {
    "v1".to_string()
}

fn default_points_per_1k_tokens() -> u64 {
    100
}
