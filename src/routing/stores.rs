use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::routing::{
    error::RoutingError,
    ports::{CreateOutcome, CredentialDirectory, ProviderPool, SessionStore, UsageStore},
    types::{CandidateProvider, Intent, SessionId, SessionRecord, Tier, UsageRecord},
};

const AGENT_KEY_PREFIX: &str = "ak_";

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, SessionRecord>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, RoutingError> {
        let guard = self.sessions.lock().await;
        Ok(guard.get(session_id).cloned())
    }

    async fn create_if_absent(&self, record: SessionRecord) -> Result<CreateOutcome, RoutingError> {
        let mut guard = self.sessions.lock().await;
        match guard.entry(record.session_id.clone()) {
            Entry::Occupied(existing) => Ok(CreateOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn replace(&self, record: SessionRecord) -> Result<(), RoutingError> {
        let mut guard = self.sessions.lock().await;
        guard.insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn touch(
        &self,
        session_id: &str,
        seen_at: OffsetDateTime,
    ) -> Result<bool, RoutingError> {
        let mut guard = self.sessions.lock().await;
        match guard.get_mut(session_id) {
            Some(record) => {
                record.last_seen_at = seen_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, session_id: &str) -> Result<bool, RoutingError> {
        let mut guard = self.sessions.lock().await;
        Ok(guard.remove(session_id).is_some())
    }

    async fn snapshot(&self) -> Result<Vec<SessionRecord>, RoutingError> {
        let guard = self.sessions.lock().await;
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryUsageStore {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn all(&self) -> Vec<UsageRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn append(&self, record: UsageRecord) -> Result<(), RoutingError> {
        let mut guard = self.records.lock().await;
        guard.push(record);
        Ok(())
    }

    async fn history_for(&self, provider_id: &str) -> Result<Vec<UsageRecord>, RoutingError> {
        let guard = self.records.lock().await;
        Ok(guard
            .iter()
            .filter(|record| record.provider_id == provider_id)
            .cloned()
            .collect())
    }
}

pub struct StaticProviderPool {
    candidates: Arc<Mutex<Vec<CandidateProvider>>>,
}

impl StaticProviderPool {
    pub fn new(candidates: Vec<CandidateProvider>) -> Self {
        Self {
            candidates: Arc::new(Mutex::new(candidates)),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub async fn set_candidates(&self, candidates: Vec<CandidateProvider>) {
        let mut guard = self.candidates.lock().await;
        *guard = candidates;
    }
}

#[async_trait]
impl ProviderPool for StaticProviderPool {
    async fn list_eligible(&self, _intent: Intent) -> Result<Vec<CandidateProvider>, RoutingError> {
        let guard = self.candidates.lock().await;
        Ok(guard.clone())
    }

    async fn is_eligible(&self, provider_id: &str) -> Result<bool, RoutingError> {
        let guard = self.candidates.lock().await;
        Ok(guard
            .iter()
            .any(|candidate| candidate.provider_id == provider_id))
    }
}

// Identities without a recognized key prefix are anonymous session tokens
// and fall into the developer tier.
#[derive(Default)]
pub struct KeyPrefixCredentialDirectory;

#[async_trait]
impl CredentialDirectory for KeyPrefixCredentialDirectory {
    async fn tier_of(&self, identity: &str) -> Result<Tier, RoutingError> {
        if identity.starts_with(AGENT_KEY_PREFIX) {
            Ok(Tier::Agent)
        } else {
            Ok(Tier::Developer)
        }
    }
}
