// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The materialized state: one map per §3 entity, kept consistent by
//! `Store`'s critical sections. Never constructed or mutated directly by
//! callers outside this crate — go through [`crate::store::Store`].

use std::collections::HashMap;

use wocp_core::{Event, IdempotencyRecord, Item, ItemId, ItemPart, Order, OrderId, PartId, Provenance, ProvenanceId};

/// All six entity collections, held behind one lock by [`crate::store::Store`].
#[derive(Debug, Default)]
pub struct MaterializedState {
    pub orders: HashMap<OrderId, Order>,
    pub items: HashMap<ItemId, Item>,
    pub parts: HashMap<PartId, ItemPart>,
    pub events: Vec<Event>,
    pub provenances: HashMap<ProvenanceId, Provenance>,
    /// Keyed by `(scope, key_hash)`, matching the unique index in §6.
    pub idempotency: HashMap<(String, String), IdempotencyRecord>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items belonging to `order_id`, in no particular order. Callers that
    /// need creation order should sort by `created_at_ms`.
    pub fn items_for_order(&self, order_id: &OrderId) -> Vec<&Item> {
        self.items.values().filter(|item| &item.order_id == order_id).collect()
    }

    /// The latest validated-or-rejected part rows for `item_id`, one per
    /// `part_key` (largest `created_at_ms`, ties broken by id).
    pub fn latest_parts_for_item(&self, item_id: &ItemId) -> HashMap<String, &ItemPart> {
        let mut latest: HashMap<String, &ItemPart> = HashMap::new();
        for part in self.parts.values().filter(|p| &p.item_id == item_id) {
            match latest.get(&part.part_key) {
                Some(existing)
                    if (existing.created_at_ms, existing.id.as_str())
                        >= (part.created_at_ms, part.id.as_str()) => {}
                _ => {
                    latest.insert(part.part_key.clone(), part);
                }
            }
        }
        latest
    }

    pub fn events_for_order(&self, order_id: &OrderId) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.events.iter().filter(|e| &e.order_id == order_id).collect();
        events.sort_by(|a, b| (a.created_at_ms, a.id.as_str()).cmp(&(b.created_at_ms, b.id.as_str())));
        events
    }
}
