// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `LeaseService` (§4.7): the leasing surface atop [`crate::lease::LeaseBackend`]
//! and the Item automaton. `Maintenance` drives `reclaim_expired` on a
//! schedule; everything else here is called directly by workers.

use std::sync::Arc;

use wocp_core::{EngineConfig, EngineError, EventName, Item, ItemId, ItemState, OrderId};
use wocp_storage::Store;

use crate::lease::LeaseBackend;

/// The effective owner of a leased item is its current holder, if the lease
/// has not expired (§5). Mirrors the private check in `wocp-storage`'s
/// `store.rs`, needed here because `heartbeat`/`release` must fail before
/// touching the backend at all when the caller never held the lease.
fn require_lease_holder(item: &Item, agent_id: &str, now_ms: u64) -> Result<(), EngineError> {
    if item.is_leased_by(agent_id, now_ms) {
        return Ok(());
    }
    let reason = match &item.leased_by {
        Some(holder) if holder == agent_id => wocp_core::LeaseErrorKind::Expired,
        _ => wocp_core::LeaseErrorKind::NotHolder,
    };
    Err(EngineError::lease_error(reason, item.leased_by.clone(), agent_id, item.lease_expires_at_ms))
}

/// Optional predicates narrowing `checkout` to a subset of queued items
/// (§4.7). All present filters must match; `None` leaves that axis
/// unconstrained.
#[derive(Debug, Clone, Default)]
pub struct CheckoutFilters {
    pub order_id: Option<OrderId>,
    pub type_id: Option<String>,
    pub min_priority: Option<i64>,
}

pub struct LeaseService<'a> {
    store: &'a Store,
    backend: Arc<dyn LeaseBackend>,
    config: &'a EngineConfig,
}

impl<'a> LeaseService<'a> {
    pub fn new(store: &'a Store, backend: Arc<dyn LeaseBackend>, config: &'a EngineConfig) -> Self {
        Self { store, backend, config }
    }

    /// Whether `item` is checkout-eligible right now: `queued`, lease absent
    /// or expired, and — if it was previously failed back to `queued` — past
    /// the retry-backoff window (§4.8 Retry backoff).
    fn is_eligible(&self, item: &Item, now_ms: u64) -> bool {
        if item.state != ItemState::Queued {
            return false;
        }
        if item.leased_by.is_some() && !item.lease_is_expired(now_ms) {
            return false;
        }
        if item.attempts == 0 {
            return true;
        }
        let backoff = self.config.retry.backoff_seconds * 1000
            + uniform_jitter(self.config.retry.jitter_seconds * 1000, item.id.as_str());
        now_ms.saturating_sub(item.updated_at_ms) >= backoff
    }

    fn matches_filters(&self, item: &Item, filters: &CheckoutFilters, order_priority: i64) -> bool {
        if let Some(order_id) = filters.order_id {
            if item.order_id != order_id {
                return false;
            }
        }
        if let Some(type_id) = &filters.type_id {
            if &item.type_id != type_id {
                return false;
            }
        }
        if let Some(min_priority) = filters.min_priority {
            if order_priority < min_priority {
                return false;
            }
        }
        true
    }

    fn agent_lease_count(&self, agent_id: &str) -> u32 {
        self.store.with_state(|state| {
            state.items.values().filter(|item| item.leased_by.as_deref() == Some(agent_id)).count() as u32
        })
    }

    fn type_lease_count(&self, type_id: &str) -> u32 {
        self.store.with_state(|state| {
            state.items.values().filter(|item| item.leased_by.is_some() && item.type_id == type_id).count() as u32
        })
    }

    /// **checkout(agent_id, filters)** (§4.7): among eligible items matching
    /// `filters`, picks the one whose owning order has the highest
    /// `priority`, breaking ties by older `item.created_at_ms`. Applies
    /// per-agent/per-type concurrency caps before attempting acquisition; on
    /// an `acquire` race loss, tries the next candidate.
    pub async fn checkout(
        &self,
        agent_id: &str,
        filters: CheckoutFilters,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        if let Some(cap) = self.config.lease.max_leases_per_agent {
            if self.agent_lease_count(agent_id) >= cap {
                return Err(EngineError::no_items_available());
            }
        }

        let mut candidates: Vec<Item> = self.store.with_state(|state| {
            state
                .items
                .values()
                .filter(|item| self.is_eligible(item, now_ms))
                .filter_map(|item| {
                    let order_priority = state.orders.get(&item.order_id)?.priority;
                    self.matches_filters(item, &filters, order_priority).then(|| (item.clone(), order_priority))
                })
                .map(|(item, _)| item)
                .collect()
        });
        candidates.sort_by(|a, b| {
            let pa = self.store.with_state(|s| s.orders.get(&a.order_id).map(|o| o.priority)).unwrap_or_default();
            let pb = self.store.with_state(|s| s.orders.get(&b.order_id).map(|o| o.priority)).unwrap_or_default();
            pb.cmp(&pa).then(a.created_at_ms.cmp(&b.created_at_ms)).then(a.id.as_str().cmp(b.id.as_str()))
        });

        let ttl = self.config.lease.ttl_seconds;
        for item in candidates {
            if let Some(cap) = self.config.lease.max_leases_per_type {
                if self.type_lease_count(&item.type_id) >= cap {
                    continue;
                }
            }
            if !self.backend.acquire(&item.id, agent_id, ttl, now_ms).await {
                continue;
            }
            self.store.mirror_item_lease(&item.id, Some(agent_id), Some(now_ms + ttl * 1000), Some(now_ms));
            let leased = self.store.transition_item(
                &item.id,
                ItemState::Leased,
                EventName::Leased,
                None,
                None,
                None,
                None,
                now_ms,
            )?;
            return Ok(leased);
        }
        Err(EngineError::no_items_available())
    }

    /// **heartbeat(item_id, agent_id)** (§4.7): extends the lease, fails if
    /// not held by `agent_id` or already expired.
    pub async fn heartbeat(&self, item_id: &ItemId, agent_id: &str, now_ms: u64) -> Result<u64, EngineError> {
        let item = self
            .store
            .get_item(item_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        require_lease_holder(&item, agent_id, now_ms)?;

        let ttl = self.config.lease.ttl_seconds;
        if !self.backend.extend(item_id, agent_id, ttl, now_ms).await {
            return Err(EngineError::lease_error(
                wocp_core::LeaseErrorKind::Expired,
                item.leased_by.clone(),
                agent_id,
                item.lease_expires_at_ms,
            ));
        }
        let new_expiry = now_ms + ttl * 1000;
        self.store.mirror_item_lease(item_id, Some(agent_id), Some(new_expiry), Some(now_ms));
        self.store.record_event(
            item.order_id,
            Some(*item_id),
            EventName::Heartbeat,
            None,
            None,
            None,
            now_ms,
        );
        Ok(new_expiry)
    }

    /// **release(item_id, agent_id)** (§4.7): releases the lease and
    /// transitions `leased|in_progress -> queued`. Fails if not held by the
    /// caller.
    pub async fn release(&self, item_id: &ItemId, agent_id: &str, now_ms: u64) -> Result<Item, EngineError> {
        let item = self
            .store
            .get_item(item_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        require_lease_holder(&item, agent_id, now_ms)?;

        if !self.backend.release(item_id, agent_id).await {
            return Err(EngineError::lease_error(
                wocp_core::LeaseErrorKind::NotHolder,
                item.leased_by.clone(),
                agent_id,
                item.lease_expires_at_ms,
            ));
        }
        self.store.mirror_item_lease(item_id, None, None, None);
        self.store.transition_item(item_id, ItemState::Queued, EventName::Released, None, None, None, None, now_ms)
    }

    /// **reclaim_expired()** (§4.7): the only path that mutates ownership
    /// without caller consent. Delegates the field-level reclaim to the
    /// backend (a no-op for [`crate::lease::DurableLeaseBackend`], whose
    /// lease fields live on the Item row already) and transitions each
    /// affected item via the store.
    pub async fn reclaim_expired(&self, now_ms: u64) -> usize {
        let expired = self.store.expired_leased_items(now_ms);
        let keys: Vec<ItemId> = expired.iter().map(|item| item.id).collect();
        self.backend.reclaim(&keys, now_ms).await;

        let mut reclaimed = 0;
        for item_id in keys {
            if self.store.reclaim_expired_item(&item_id, now_ms).is_some() {
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

/// Deterministic pseudo-jitter in `[0, max_ms)`, seeded from `seed` so the
/// same item always waits the same backoff window (§4.8
/// "uniform_jitter(0..jitter_seconds)"). `seed` is hashed into a `u64` and
/// fed to a `StdRng`, so the draw is reproducible across calls for the same
/// item but still varies item-to-item.
fn uniform_jitter(max_ms: u64, seed: &str) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    use rand::{Rng, SeedableRng};
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    let mut rng = rand::rngs::StdRng::seed_from_u64(hasher.finish());
    rng.gen_range(0..max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::FastLeaseBackend;
    use serde_json::json;
    use wocp_core::{ItemConfig, Order, OrderConfig};

    fn propose_order_with_item(store: &Store, priority: i64, now_ms: u64) -> (OrderId, ItemId) {
        let order = Order::new(OrderConfig::builder("t", json!({})).priority(priority).build(), now_ms);
        let order_id = order.id;
        let item_config = ItemConfig::builder(order_id, "t", json!({})).build();
        let item_id = item_config.id;
        store.propose(order, vec![item_config], None, now_ms);
        (order_id, item_id)
    }

    #[tokio::test]
    async fn checkout_picks_higher_priority_order_first() {
        let store = Store::new();
        let config = EngineConfig::default();
        let (_, low_item) = propose_order_with_item(&store, 1, 0);
        let (_, high_item) = propose_order_with_item(&store, 10, 0);
        let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let service = LeaseService::new(&store, backend, &config);

        let leased = service.checkout("agent-a", CheckoutFilters::default(), 0).await.unwrap();
        assert_eq!(leased.id, high_item);
        assert_ne!(leased.id, low_item);
    }

    #[tokio::test]
    async fn checkout_with_no_eligible_items_reports_no_items_available() {
        let store = Store::new();
        let config = EngineConfig::default();
        let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let service = LeaseService::new(&store, backend, &config);

        let err = service.checkout("agent-a", CheckoutFilters::default(), 0).await.unwrap_err();
        assert_eq!(err.kind.code(), "no-items-available");
    }

    #[tokio::test]
    async fn heartbeat_requires_holding_the_lease() {
        let store = Store::new();
        let config = EngineConfig::default();
        let (_, item_id) = propose_order_with_item(&store, 0, 0);
        let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let service = LeaseService::new(&store, backend, &config);

        service.checkout("agent-a", CheckoutFilters::default(), 0).await.unwrap();
        let err = service.heartbeat(&item_id, "agent-b", 100).await.unwrap_err();
        assert_eq!(err.kind.code(), "lease-error");

        let expiry = service.heartbeat(&item_id, "agent-a", 100).await.unwrap();
        assert!(expiry > 100);
    }

    #[tokio::test]
    async fn release_requeues_the_item() {
        let store = Store::new();
        let config = EngineConfig::default();
        let (_, item_id) = propose_order_with_item(&store, 0, 0);
        let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let service = LeaseService::new(&store, backend, &config);

        service.checkout("agent-a", CheckoutFilters::default(), 0).await.unwrap();
        let item = service.release(&item_id, "agent-a", 0).await.unwrap();
        assert_eq!(item.state, ItemState::Queued);
        assert!(item.leased_by.is_none());
    }

    #[tokio::test]
    async fn reclaim_expired_requeues_items_past_their_lease() {
        let store = Store::new();
        let config = EngineConfig::default();
        let (_, item_id) = propose_order_with_item(&store, 0, 0);
        let backend: Arc<dyn LeaseBackend> = Arc::new(FastLeaseBackend::new());
        let service = LeaseService::new(&store, backend, &config);

        service.checkout("agent-a", CheckoutFilters::default(), 0).await.unwrap();
        let reclaimed = service.reclaim_expired(10_000_000).await;
        assert_eq!(reclaimed, 1);
        let item = store.get_item(&item_id).unwrap();
        assert_eq!(item.state, ItemState::Queued);
        assert!(item.leased_by.is_none());
    }
}
