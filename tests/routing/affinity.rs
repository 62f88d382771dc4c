use std::{collections::HashMap, sync::Arc};

use rand::{SeedableRng, rngs::StdRng};
use switchyard::routing::{
    affinity::{SessionAffinityMap, select_weighted},
    ports::SessionStore,
    stores::{InMemorySessionStore, StaticProviderPool},
    types::{CandidateProvider, Intent, SessionConfig},
};
use time::{Duration, macros::datetime};

fn equal_candidates(ids: &[&str]) -> Vec<CandidateProvider> {
    ids.iter()
        .map(|id| CandidateProvider {
            provider_id: id.to_string(),
            weight: 1,
        })
        .collect()
}

fn affinity_map(
    pool: Arc<StaticProviderPool>,
) -> (SessionAffinityMap, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let map = SessionAffinityMap::new(&SessionConfig::default(), pool, store.clone());
    (map, store)
}

#[test]
fn given_empty_candidates_when_select_then_none() {
    let mut rng = StdRng::seed_from_u64(42);
    assert_eq!(select_weighted(&[], &mut rng), None);
}

#[test]
fn given_equal_weights_when_many_draws_then_uniformity_is_not_rejected() {
    let candidates = equal_candidates(&["p1", "p2", "p3", "p4", "p5"]);
    let mut rng = StdRng::seed_from_u64(42);

    let mut counts = [0_u64; 5];
    for _ in 0..10_000 {
        let index = select_weighted(&candidates, &mut rng).expect("candidates are non-empty");
        counts[index] += 1;
    }

    // Chi-square goodness of fit, df = 4; 18.47 is the 0.001 critical value.
    let expected = 2_000.0_f64;
    let chi_square: f64 = counts
        .iter()
        .map(|&observed| {
            let delta = observed as f64 - expected;
            delta * delta / expected
        })
        .sum();
    assert!(
        chi_square < 18.47,
        "uniformity rejected: chi_square = {chi_square}, counts = {counts:?}"
    );
}

#[test]
fn given_unequal_weights_when_many_draws_then_shares_track_weights() {
    let candidates = vec![
        CandidateProvider {
            provider_id: "heavy".to_string(),
            weight: 3,
        },
        CandidateProvider {
            provider_id: "light".to_string(),
            weight: 1,
        },
    ];
    let mut rng = StdRng::seed_from_u64(7);

    let mut heavy = 0_u64;
    for _ in 0..10_000 {
        if select_weighted(&candidates, &mut rng) == Some(0) {
            heavy += 1;
        }
    }

    let share = heavy as f64 / 10_000.0;
    assert!(
        (0.72..=0.78).contains(&share),
        "heavy share {share} is outside the expected band around 0.75"
    );
}

#[test]
fn given_zero_weight_candidates_when_select_then_every_candidate_stays_selectable() {
    let candidates = vec![
        CandidateProvider {
            provider_id: "a".to_string(),
            weight: 0,
        },
        CandidateProvider {
            provider_id: "b".to_string(),
            weight: 0,
        },
    ];
    let mut rng = StdRng::seed_from_u64(3);

    let mut seen = [false; 2];
    for _ in 0..1_000 {
        let index = select_weighted(&candidates, &mut rng).expect("candidates are non-empty");
        seen[index] = true;
    }

    assert_eq!(seen, [true, true]);
}

#[tokio::test]
async fn given_fixed_session_when_resolved_repeatedly_then_provider_is_stable() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&[
        "p1", "p2", "p3", "p4", "p5",
    ])));
    let (map, _store) = affinity_map(pool);
    let now = datetime!(2026-08-07 10:00:00 UTC);

    let first = map
        .resolve_at("conv-1", Intent::Chat, now)
        .await
        .expect("assignment should succeed");
    assert!(!first.affinity_hit);

    for _ in 0..1_000 {
        let repeat = map
            .resolve_at("conv-1", Intent::Chat, now)
            .await
            .expect("resolve should succeed");
        assert_eq!(repeat.provider_id, first.provider_id);
        assert!(repeat.affinity_hit);
    }
}

#[tokio::test]
async fn given_assigned_provider_becomes_ineligible_when_resolve_then_new_provider_assigned() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&[
        "p1", "p2", "p3",
    ])));
    let (map, store) = affinity_map(pool.clone());
    let now = datetime!(2026-08-07 10:00:00 UTC);

    let first = map
        .resolve_at("conv-1", Intent::Chat, now)
        .await
        .expect("assignment should succeed");

    let survivors: Vec<&str> = ["p1", "p2", "p3"]
        .into_iter()
        .filter(|id| *id != first.provider_id)
        .collect();
    pool.set_candidates(equal_candidates(&survivors)).await;

    let reassigned = map
        .resolve_at("conv-1", Intent::Chat, now)
        .await
        .expect("re-assignment should succeed");

    assert_ne!(reassigned.provider_id, first.provider_id);
    assert!(survivors.contains(&reassigned.provider_id.as_str()));

    let record = store
        .get("conv-1")
        .await
        .expect("store read should succeed")
        .expect("session record should exist");
    assert_eq!(record.provider_id, reassigned.provider_id);
}

#[tokio::test]
async fn given_fresh_sessions_when_assigned_then_shares_stay_near_uniform() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&[
        "p1", "p2", "p3", "p4", "p5",
    ])));
    let (map, _store) = affinity_map(pool);
    let now = datetime!(2026-08-07 10:00:00 UTC);

    let mut counts: HashMap<String, u64> = HashMap::new();
    for index in 0..10_000 {
        let session_id = format!("conv-{index}");
        let resolved = map
            .resolve_at(&session_id, Intent::Chat, now)
            .await
            .expect("assignment should succeed");
        *counts.entry(resolved.provider_id).or_insert(0) += 1;
    }

    assert_eq!(counts.len(), 5);
    for (provider_id, count) in &counts {
        assert!(
            (1_500..=2_500).contains(count),
            "provider {provider_id} drew {count} of 10000 sessions"
        );
    }
}

#[tokio::test]
async fn given_idle_session_past_ttl_when_resolve_then_fresh_assignment_is_made() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&["p1", "p2"])));
    let (map, _store) = affinity_map(pool);
    let created = datetime!(2026-08-07 10:00:00 UTC);
    let past_ttl = created + Duration::minutes(31);

    map.resolve_at("conv-1", Intent::Chat, created)
        .await
        .expect("assignment should succeed");

    let stats = map.stats_at(past_ttl).await.expect("stats should succeed");
    assert_eq!(stats.active_count, 0);

    let resolved = map
        .resolve_at("conv-1", Intent::Chat, past_ttl)
        .await
        .expect("re-assignment should succeed");
    assert!(!resolved.affinity_hit);
}

#[tokio::test]
async fn given_activity_within_ttl_when_resolve_then_session_stays_alive() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&["p1", "p2"])));
    let (map, _store) = affinity_map(pool);
    let created = datetime!(2026-08-07 10:00:00 UTC);
    let touched = created + Duration::minutes(29);
    let later = touched + Duration::minutes(29);

    let first = map
        .resolve_at("conv-1", Intent::Chat, created)
        .await
        .expect("assignment should succeed");
    let refreshed = map
        .resolve_at("conv-1", Intent::Chat, touched)
        .await
        .expect("resolve should succeed");
    let still_alive = map
        .resolve_at("conv-1", Intent::Chat, later)
        .await
        .expect("resolve should succeed");

    assert!(refreshed.affinity_hit);
    assert!(still_alive.affinity_hit);
    assert_eq!(still_alive.provider_id, first.provider_id);
}

#[tokio::test]
async fn given_expired_sessions_when_sweep_then_only_expired_are_removed() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&["p1", "p2"])));
    let (map, store) = affinity_map(pool);
    let early = datetime!(2026-08-07 10:00:00 UTC);
    let late = early + Duration::minutes(20);
    let sweep_time = early + Duration::minutes(32);

    map.resolve_at("conv-old", Intent::Chat, early)
        .await
        .expect("assignment should succeed");
    map.resolve_at("conv-new", Intent::Chat, late)
        .await
        .expect("assignment should succeed");

    let removed = map
        .sweep_expired_at(sweep_time)
        .await
        .expect("sweep should succeed");

    assert_eq!(removed, 1);
    let snapshot = store.snapshot().await.expect("snapshot should succeed");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].session_id, "conv-new");
}

#[tokio::test]
async fn given_missing_session_when_remove_then_noop_returns_false() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&["p1"])));
    let (map, _store) = affinity_map(pool);

    assert!(!map.remove("conv-missing").await.expect("remove should succeed"));

    let now = datetime!(2026-08-07 10:00:00 UTC);
    map.resolve_at("conv-1", Intent::Chat, now)
        .await
        .expect("assignment should succeed");
    assert!(map.remove("conv-1").await.expect("remove should succeed"));
    assert!(!map.remove("conv-1").await.expect("remove should succeed"));
}

#[tokio::test]
async fn given_concurrent_first_resolves_when_same_session_then_single_assignment_wins() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&[
        "p1", "p2", "p3", "p4", "p5",
    ])));
    let store = Arc::new(InMemorySessionStore::new());
    let map = Arc::new(SessionAffinityMap::new(
        &SessionConfig::default(),
        pool,
        store.clone(),
    ));
    let now = datetime!(2026-08-07 10:00:00 UTC);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let map = Arc::clone(&map);
        handles.push(tokio::spawn(async move {
            map.resolve_at("conv-contended", Intent::Chat, now)
                .await
                .expect("resolve should succeed")
                .provider_id
        }));
    }

    let mut assigned = Vec::new();
    for handle in handles {
        assigned.push(handle.await.expect("task should complete"));
    }

    let snapshot = store.snapshot().await.expect("snapshot should succeed");
    assert_eq!(snapshot.len(), 1);
    for provider_id in &assigned {
        assert_eq!(provider_id, &snapshot[0].provider_id);
    }
}

#[tokio::test]
async fn given_active_sessions_when_stats_then_counts_group_by_provider() {
    let pool = Arc::new(StaticProviderPool::new(equal_candidates(&["p1", "p2"])));
    let (map, _store) = affinity_map(pool);
    let now = datetime!(2026-08-07 10:00:00 UTC);

    for index in 0..8 {
        map.resolve_at(&format!("conv-{index}"), Intent::Code, now)
            .await
            .expect("assignment should succeed");
    }

    let stats = map.stats_at(now).await.expect("stats should succeed");
    assert_eq!(stats.active_count, 8);
    let summed: u64 = stats.per_provider_counts.values().sum();
    assert_eq!(summed, 8);
}
