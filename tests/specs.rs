// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios from spec §8, each exercising the full composition
//! root (`Store` + `TypeRegistry` + `EngineConfig` + the four operation
//! surfaces) the way a real deployment would wire them.

use std::sync::Arc;

use serde_json::json;

use wocp_core::test_support::NoopType;
use wocp_core::{EngineConfig, EventName, ItemState, OrderConfig, OrderState, TypeRegistry};
use wocp_engine::lease::{FastLeaseBackend, LeaseBackend};
use wocp_engine::{CheckoutFilters, Executor, FinalizeMode, IdempotencyGuard, LeaseService};
use wocp_storage::Store;

fn fixture() -> (Store, TypeRegistry, EngineConfig) {
    let store = Store::new();
    let mut registry = TypeRegistry::new();
    registry.register(Arc::new(NoopType::new("t"))).unwrap();
    (store, registry, EngineConfig::default())
}

/// Scenario 1: happy path, single item, no partials.
#[tokio::test]
async fn happy_path_single_item_no_partials() {
    let (store, registry, config) = fixture();
    let guard = IdempotencyGuard::new(&store, &config);
    let executor = Executor::new(&store, &registry, &config);
    let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
    let lease_service = LeaseService::new(&store, backend, &config);

    let order = wocp_core::Order::new(OrderConfig::builder("t", json!({"msg": "hi"})).build(), 0);
    let order_id = order.id;
    let item_config = wocp_core::ItemConfig::builder(order_id, "t", json!({"msg": "hi"})).build();
    store.propose(order, vec![item_config], None, 0);

    let leased = lease_service.checkout("agent-A", CheckoutFilters::default(), 0).await.unwrap();
    assert_eq!(leased.lease_expires_at_ms, Some(600_000));

    let expiry = lease_service.heartbeat(&leased.id, "agent-A", 300_000).await.unwrap();
    assert_eq!(expiry, 300_000 + 600_000);

    executor
        .submit(&guard, &leased.id, "agent-A", json!({"ok": true}), None, Some("submit-k"), 900_000)
        .await
        .unwrap();

    let order = store.get_order(&order_id).unwrap();
    assert_eq!(order.state, OrderState::Completed);
    let item = store.get_item(&leased.id).unwrap();
    assert_eq!(item.state, ItemState::Completed);

    let events: Vec<EventName> = store.with_state(|state| state.events.iter().map(|e| e.event).collect());
    for expected in [
        EventName::Proposed,
        EventName::Planned,
        EventName::Leased,
        EventName::Heartbeat,
        EventName::Submitted,
        EventName::Approved,
        EventName::Applied,
        EventName::Accepted,
        EventName::Completed,
    ] {
        assert!(events.contains(&expected), "missing event {expected}");
    }
}

/// Scenario 2: idempotent submit replay with a divergent payload.
#[tokio::test]
async fn idempotent_submit_replay_returns_original_snapshot() {
    let (store, registry, config) = fixture();
    let guard = IdempotencyGuard::new(&store, &config);
    let executor = Executor::new(&store, &registry, &config);

    let order = wocp_core::Order::new(OrderConfig::builder("t", json!({})).build(), 0);
    let order_id = order.id;
    let item_config = wocp_core::ItemConfig::builder(order_id, "t", json!({})).build();
    let item_id = item_config.id;
    store.propose(order, vec![item_config], None, 0);
    store.cas_acquire_item_lease(&item_id, "agent-A", 600, 0);
    store
        .transition_item(&item_id, ItemState::Leased, EventName::Leased, None, None, None, None, 0)
        .unwrap();

    let first = executor
        .submit(&guard, &item_id, "agent-A", json!({"value": 1}), None, Some("K1"), 0)
        .await
        .unwrap();
    let second = executor
        .submit(&guard, &item_id, "agent-A", json!({"value": 2}), None, Some("K1"), 0)
        .await
        .unwrap();

    assert_eq!(first.result, second.result);
    assert_eq!(second.result, Some(json!({"value": 1})));
    let submitted_count = store.with_state(|state| {
        state.events.iter().filter(|e| e.event == EventName::Submitted).count()
    });
    assert_eq!(submitted_count, 1);
}

/// Scenario 3: lease expiration, retry, and eventual dead-lettering.
#[tokio::test]
async fn lease_expiration_retries_then_dead_letters() {
    let store = Store::new();
    let mut registry = TypeRegistry::new();
    registry.register(Arc::new(NoopType::new("t"))).unwrap();
    let mut config = EngineConfig::default();
    config.maintenance.dead_letter_after_hours = 0;
    config.retry.backoff_seconds = 0;
    config.retry.jitter_seconds = 0;

    let order = wocp_core::Order::new(OrderConfig::builder("t", json!({})).build(), 0);
    let order_id = order.id;
    let item_config = wocp_core::ItemConfig::builder(order_id, "t", json!({})).max_attempts(2).build();
    let item_id = item_config.id;
    store.propose(order, vec![item_config], None, 0);

    let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
    let lease_service = LeaseService::new(&store, backend, &config);
    let maintenance = wocp_engine::Maintenance::new(&store, &config);

    lease_service.checkout("agent-A", CheckoutFilters::default(), 0).await.unwrap();
    let report = maintenance.run(&lease_service, 700_000).await;
    assert_eq!(report.leases_reclaimed, 1);
    let item = store.get_item(&item_id).unwrap();
    assert_eq!(item.state, ItemState::Queued);
    assert_eq!(item.attempts, 1);

    lease_service.checkout("agent-B", CheckoutFilters::default(), 700_000).await.unwrap();
    let report = maintenance.run(&lease_service, 1_400_000).await;
    assert_eq!(report.leases_reclaimed, 1);
    let item = store.get_item(&item_id).unwrap();
    assert_eq!(item.state, ItemState::Failed);
    assert_eq!(item.attempts, 2);

    let report = maintenance.run(&lease_service, 1_400_001).await;
    assert_eq!(report.items_dead_lettered, 1);
    let item = store.get_item(&item_id).unwrap();
    assert_eq!(item.state, ItemState::DeadLettered);
}

/// Scenario 4: partial finalize in strict mode.
#[tokio::test]
async fn partial_finalize_strict_mode_requires_every_part() {
    use std::collections::HashSet;
    let store = Store::new();
    let mut registry = TypeRegistry::new();
    registry
        .register(Arc::new(NoopType::new("t").with_parts_required(["a", "b"])))
        .unwrap();
    let config = EngineConfig::default();
    let guard = IdempotencyGuard::new(&store, &config);
    let executor = Executor::new(&store, &registry, &config);

    let order = wocp_core::Order::new(OrderConfig::builder("t", json!({})).build(), 0);
    let order_id = order.id;
    let parts_required: HashSet<String> = ["a", "b"].into_iter().map(String::from).collect();
    let item_config = wocp_core::ItemConfig::builder(order_id, "t", json!({}))
        .parts_required(parts_required)
        .build();
    let item_id = item_config.id;
    store.propose(order, vec![item_config], None, 0);
    store.cas_acquire_item_lease(&item_id, "agent-A", 600, 0);
    store
        .transition_item(&item_id, ItemState::Leased, EventName::Leased, None, None, None, None, 0)
        .unwrap();

    executor
        .submit_part(&guard, &item_id, "agent-A", "a", None, json!({"a": 1}), None, None, None, Some("pa"), 0)
        .await
        .unwrap();

    let err = executor.finalize(&guard, &item_id, "agent-A", FinalizeMode::Strict, None, Some("f1"), 0).await.unwrap_err();
    assert_eq!(err.kind.code(), "validation-failed");

    executor
        .submit_part(&guard, &item_id, "agent-A", "b", None, json!({"b": 2}), None, None, None, Some("pb"), 0)
        .await
        .unwrap();

    let item = executor.finalize(&guard, &item_id, "agent-A", FinalizeMode::Strict, None, Some("f2"), 0).await.unwrap();
    assert_eq!(item.state, ItemState::Submitted);
    assert_eq!(item.assembled_result, Some(json!({"a": {"a": 1}, "b": {"b": 2}})));
}

/// Scenario 5: illegal transition is rejected with no mutation, no event.
#[tokio::test]
async fn illegal_transition_is_rejected_without_mutation() {
    let (store, _registry, _config) = fixture();
    let order = wocp_core::Order::new(OrderConfig::builder("t", json!({})).build(), 0);
    let order_id = order.id;
    store.propose(order, vec![], None, 0);

    let events_before = store.with_state(|state| state.events.len());
    let err = store
        .transition_order(&order_id, OrderState::Applied, EventName::Applied, None, None, None, None, 0)
        .unwrap_err();
    assert_eq!(err.kind.code(), "illegal-transition");

    let order = store.get_order(&order_id).unwrap();
    assert_eq!(order.state, OrderState::Queued);
    let events_after = store.with_state(|state| state.events.len());
    assert_eq!(events_before, events_after);
}

/// Scenario 6: checkout priority ordering plus a min_priority filter.
#[tokio::test]
async fn checkout_honors_priority_and_min_priority_filter() {
    let store = Store::new();
    let mut registry = TypeRegistry::new();
    registry.register(Arc::new(NoopType::new("X"))).unwrap();
    registry.register(Arc::new(NoopType::new("Y"))).unwrap();
    let config = EngineConfig::default();
    let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
    let lease_service = LeaseService::new(&store, backend, &config);

    for (priority, type_id) in [(100, "X"), (50, "Y"), (80, "X")] {
        let order = wocp_core::Order::new(OrderConfig::builder(type_id, json!({})).priority(priority).build(), 0);
        let order_id = order.id;
        let item_config = wocp_core::ItemConfig::builder(order_id, type_id, json!({})).build();
        store.propose(order, vec![item_config], None, 0);
    }

    let filters = CheckoutFilters { type_id: Some("X".to_string()), ..Default::default() };
    let leased = lease_service.checkout("agent-A", filters, 0).await.unwrap();
    let order = store.get_order(&leased.order_id).unwrap();
    assert_eq!(order.priority, 100);

    let filters = CheckoutFilters { type_id: Some("X".to_string()), min_priority: Some(90), ..Default::default() };
    let err = lease_service.checkout("agent-B", filters, 0).await.unwrap_err();
    assert_eq!(err.kind.code(), "no-items-available");
}
