// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Maintenance` (§4.8): the stateless periodic driver an external
//! scheduler invokes on a tick. Every pass is independent; nothing here
//! keeps state across calls.

use tracing::{info, warn};

use wocp_core::{EngineConfig, EventName, ItemState, OrderState};
use wocp_storage::Store;

use crate::lease_service::LeaseService;

/// Summary of one maintenance pass, for the caller to log/expose as metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub leases_reclaimed: usize,
    pub items_dead_lettered: usize,
    pub orders_dead_lettered: usize,
    pub stale_orders_reported: usize,
}

pub struct Maintenance<'a> {
    store: &'a Store,
    config: &'a EngineConfig,
}

impl<'a> Maintenance<'a> {
    pub fn new(store: &'a Store, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Runs one full pass: reclaim expired leases, dead-letter stale
    /// failures, and report (without mutating) orders stuck in a
    /// non-terminal state past the staleness threshold.
    pub async fn run(&self, lease_service: &LeaseService<'_>, now_ms: u64) -> MaintenanceReport {
        let leases_reclaimed = lease_service.reclaim_expired(now_ms).await;
        let items_dead_lettered = self.dead_letter_failed_items(now_ms);
        let orders_dead_lettered = self.dead_letter_failed_orders(now_ms);
        let stale_orders_reported = self.report_stale_orders(now_ms);

        let report = MaintenanceReport {
            leases_reclaimed,
            items_dead_lettered,
            orders_dead_lettered,
            stale_orders_reported,
        };
        info!(?report, "maintenance pass complete");
        report
    }

    /// **Dead-letter** (§4.8): items in `failed` older than
    /// `dead_letter_after_hours` transition `failed -> dead_lettered`.
    fn dead_letter_failed_items(&self, now_ms: u64) -> usize {
        let threshold_ms = self.config.maintenance.dead_letter_after_hours * 3_600_000;
        let candidates: Vec<_> = self.store.with_state(|state| {
            state
                .items
                .values()
                .filter(|item| item.state == ItemState::Failed)
                .filter(|item| now_ms.saturating_sub(item.updated_at_ms) >= threshold_ms)
                .map(|item| item.id)
                .collect()
        });
        let mut count = 0;
        for item_id in candidates {
            if self
                .store
                .transition_item(&item_id, ItemState::DeadLettered, EventName::DeadLettered, None, None, None, None, now_ms)
                .is_ok()
            {
                count += 1;
            }
        }
        count
    }

    /// Same as [`Self::dead_letter_failed_items`] for orders.
    fn dead_letter_failed_orders(&self, now_ms: u64) -> usize {
        let threshold_ms = self.config.maintenance.dead_letter_after_hours * 3_600_000;
        let candidates: Vec<_> = self.store.with_state(|state| {
            state
                .orders
                .values()
                .filter(|order| order.state == OrderState::Failed)
                .filter(|order| now_ms.saturating_sub(order.updated_at_ms) >= threshold_ms)
                .map(|order| order.id)
                .collect()
        });
        let mut count = 0;
        for order_id in candidates {
            if self
                .store
                .transition_order(&order_id, OrderState::DeadLettered, EventName::DeadLettered, None, None, None, None, now_ms)
                .is_ok()
            {
                count += 1;
            }
        }
        count
    }

    /// **Stale detection** (§4.8): non-terminal orders older than
    /// `stale_order_threshold_hours` are reported (event + log line) but
    /// never mutated — an operator decides what to do.
    fn report_stale_orders(&self, now_ms: u64) -> usize {
        let threshold_ms = self.config.maintenance.stale_order_threshold_hours * 3_600_000;
        let stale: Vec<_> = self.store.with_state(|state| {
            state
                .orders
                .values()
                .filter(|order| !order.state.is_terminal())
                .filter(|order| now_ms.saturating_sub(order.last_transitioned_at_ms) >= threshold_ms)
                .cloned()
                .collect()
        });
        for order in &stale {
            warn!(order_id = %order.id, state = %order.state, "order stale past threshold");
            self.store.record_event(
                order.id,
                None,
                EventName::StaleDetected,
                None,
                None,
                Some(format!("stale: no transition in {threshold_ms}ms")),
                now_ms,
            );
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::FastLeaseBackend;
    use serde_json::json;
    use std::sync::Arc;
    use wocp_core::{ItemConfig, Order, OrderConfig};

    fn propose_order_with_item(store: &Store, now_ms: u64) -> (wocp_core::OrderId, wocp_core::ItemId) {
        let order = Order::new(OrderConfig::builder("t", json!({})).build(), now_ms);
        let order_id = order.id;
        let item_config = ItemConfig::builder(order_id, "t", json!({})).max_attempts(1).build();
        let item_id = item_config.id;
        store.propose(order, vec![item_config], None, now_ms);
        (order_id, item_id)
    }

    #[tokio::test]
    async fn dead_letters_items_failed_past_the_threshold() {
        let store = Store::new();
        let mut config = EngineConfig::default();
        config.maintenance.dead_letter_after_hours = 1;
        let (_, item_id) = propose_order_with_item(&store, 0);
        store
            .transition_item(&item_id, ItemState::Failed, EventName::Failed, None, None, None, None, 0)
            .unwrap();

        let backend: Arc<dyn crate::lease::LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let lease_service = LeaseService::new(&store, backend, &config);
        let maintenance = Maintenance::new(&store, &config);

        let report = maintenance.run(&lease_service, 4_000_000).await;
        assert_eq!(report.items_dead_lettered, 1);
        let item = store.get_item(&item_id).unwrap();
        assert_eq!(item.state, ItemState::DeadLettered);
    }

    #[tokio::test]
    async fn does_not_dead_letter_recently_failed_items() {
        let store = Store::new();
        let config = EngineConfig::default();
        let (_, item_id) = propose_order_with_item(&store, 0);
        store
            .transition_item(&item_id, ItemState::Failed, EventName::Failed, None, None, None, None, 0)
            .unwrap();

        let backend: Arc<dyn crate::lease::LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let lease_service = LeaseService::new(&store, backend, &config);
        let maintenance = Maintenance::new(&store, &config);

        let report = maintenance.run(&lease_service, 1_000).await;
        assert_eq!(report.items_dead_lettered, 0);
        let item = store.get_item(&item_id).unwrap();
        assert_eq!(item.state, ItemState::Failed);
    }

    #[tokio::test]
    async fn reports_stale_orders_without_mutating_them() {
        let store = Store::new();
        let mut config = EngineConfig::default();
        config.maintenance.stale_order_threshold_hours = 1;
        let (order_id, _) = propose_order_with_item(&store, 0);

        let backend: Arc<dyn crate::lease::LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let lease_service = LeaseService::new(&store, backend, &config);
        let maintenance = Maintenance::new(&store, &config);

        let report = maintenance.run(&lease_service, 4_000_000).await;
        assert_eq!(report.stale_orders_reported, 1);
        let order = store.get_order(&order_id).unwrap();
        assert_eq!(order.state, OrderState::Queued);
    }
}
