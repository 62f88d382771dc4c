use switchyard::routing::{
    points::PointConverter,
    ports::UsageStore,
    stores::InMemoryUsageStore,
    types::{PointsConfig, TokenUsage, UsageRecord},
};
use time::macros::datetime;

fn converter() -> PointConverter {
    PointConverter::new(&PointsConfig::default())
}

fn usage_record(record_id: &str, provider_id: &str, tokens: TokenUsage) -> UsageRecord {
    UsageRecord {
        record_id: record_id.to_string(),
        provider_id: provider_id.to_string(),
        identity: "dk_alice".to_string(),
        session_id: Some("conv-1".to_string()),
        usage: tokens,
        latency_ms: 420,
        model: "auto-select".to_string(),
        created_at: datetime!(2026-08-07 10:00:00 UTC),
    }
}

#[test]
fn given_default_rate_when_points_computed_then_proportional_to_total_tokens() {
    let converter = converter();
    let usage = TokenUsage {
        prompt_tokens: 1_000,
        completion_tokens: 500,
    };

    assert_eq!(converter.points_for(&usage), 150);
    assert_eq!(converter.rate_version(), "v1");
}

#[tokio::test]
async fn given_same_record_when_applied_twice_then_balance_counted_once() {
    let converter = converter();
    let record = usage_record(
        "rec-1",
        "p1",
        TokenUsage {
            prompt_tokens: 600,
            completion_tokens: 400,
        },
    );

    let first = converter.apply(&record).await;
    let replay = converter.apply(&record).await;

    assert_eq!(first, 100);
    assert_eq!(replay, 0);
    assert_eq!(converter.balance("p1").await, 100);
}

#[tokio::test]
async fn given_distinct_records_when_applied_then_balance_accumulates() {
    let converter = converter();
    let tokens = TokenUsage {
        prompt_tokens: 500,
        completion_tokens: 500,
    };

    converter.apply(&usage_record("rec-1", "p1", tokens)).await;
    converter.apply(&usage_record("rec-2", "p1", tokens)).await;
    converter.apply(&usage_record("rec-3", "p2", tokens)).await;

    assert_eq!(converter.balance("p1").await, 200);
    assert_eq!(converter.balance("p2").await, 100);
    assert_eq!(converter.balance("p3").await, 0);
}

#[tokio::test]
async fn given_duplicated_history_when_reconcile_then_each_fact_counts_once() {
    let converter = converter();
    let store = InMemoryUsageStore::new();
    let tokens = TokenUsage {
        prompt_tokens: 1_000,
        completion_tokens: 0,
    };

    let record = usage_record("rec-1", "p1", tokens);
    store.append(record.clone()).await.expect("append should succeed");
    store.append(record).await.expect("append should succeed");
    store
        .append(usage_record("rec-2", "p1", tokens))
        .await
        .expect("append should succeed");

    let balance = converter
        .reconcile("p1", &store)
        .await
        .expect("reconcile should succeed");

    assert_eq!(balance, 200);
    assert_eq!(converter.balance("p1").await, 200);
}

#[tokio::test]
async fn given_drifted_balance_when_reconcile_then_history_is_authoritative() {
    let converter = converter();
    let store = InMemoryUsageStore::new();
    let tokens = TokenUsage {
        prompt_tokens: 1_000,
        completion_tokens: 0,
    };

    // Applied but never durably stored: the balance drifts above what the
    // history can support until reconciliation runs.
    converter
        .apply(&usage_record(
            "rec-lost",
            "p1",
            TokenUsage {
                prompt_tokens: 2_000,
                completion_tokens: 0,
            },
        ))
        .await;
    store
        .append(usage_record("rec-kept", "p1", tokens))
        .await
        .expect("append should succeed");
    assert_eq!(converter.balance("p1").await, 200);

    let balance = converter
        .reconcile("p1", &store)
        .await
        .expect("reconcile should succeed");

    assert_eq!(balance, 100);
    assert_eq!(converter.balance("p1").await, 100);
}

#[tokio::test]
async fn given_repeated_reconcile_when_history_unchanged_then_result_is_stable() {
    let converter = converter();
    let store = InMemoryUsageStore::new();
    let tokens = TokenUsage {
        prompt_tokens: 2_500,
        completion_tokens: 500,
    };
    store
        .append(usage_record("rec-1", "p1", tokens))
        .await
        .expect("append should succeed");

    let first = converter
        .reconcile("p1", &store)
        .await
        .expect("reconcile should succeed");
    let second = converter
        .reconcile("p1", &store)
        .await
        .expect("reconcile should succeed");

    assert_eq!(first, 300);
    assert_eq!(first, second);
}
