// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Store`: the transactional facade over [`MaterializedState`]. Every
//! method here names the atomic unit it implements from §5; callers outside
//! this crate never touch `MaterializedState` directly.
//!
//! Mutations live as inherent methods on [`MaterializedState`] (the `do_*`
//! family below) that take the transition tables as explicit arguments and
//! never lock anything themselves. `Store`'s public methods lock once and
//! delegate; `IdempotencyGuard`'s `op` closures (in `wocp-engine`) also call
//! these directly against the `&mut MaterializedState` they are handed,
//! since `parking_lot::Mutex` is not reentrant and calling back into a
//! locking `Store` method from inside `guarded`/`run_once` would deadlock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use wocp_core::state_machine::{is_legal, item_transitions, order_transitions, Transition};
use wocp_core::{
    ActorRef, EngineError, Event, EventName, Item, ItemConfig, ItemId, ItemPart, ItemState,
    LeaseErrorKind, Order, OrderId, OrderState, PartStatus, PartSummary, PartsState, Provenance,
};

use crate::idempotency::IdempotencyOutcome;
use crate::query::{ListOrdersQuery, ListOrdersResult};
use crate::state::MaterializedState;

/// How many times `guarded` waits on a concurrent in-flight reservation
/// before giving up and reporting `idempotency-conflict` (§4.3 step 4b,
/// "recommended: short bounded wait then conflict").
const GUARD_WAIT_ATTEMPTS: u32 = 5;
const GUARD_WAIT: Duration = Duration::from_millis(20);

/// The effective owner of an item during `leased|in_progress` is its lease
/// holder (§5); every Executor/LeaseService mutation but `checkout` and
/// `reclaim_expired` requires this to hold.
fn require_lease_holder(item: &Item, agent_id: &str, now_ms: u64) -> Result<(), EngineError> {
    if item.is_leased_by(agent_id, now_ms) {
        return Ok(());
    }
    let reason = match &item.leased_by {
        None => LeaseErrorKind::NotHolder,
        Some(holder) if holder != agent_id => LeaseErrorKind::NotHolder,
        Some(_) => LeaseErrorKind::Expired,
    };
    Err(EngineError::lease_error(reason, item.leased_by.clone(), agent_id, item.lease_expires_at_ms))
}

// ---- Lock-free mutation bodies, reusable from inside a guard closure -------

impl MaterializedState {
    /// Inserts the order plus its planned items and the `proposed`/`planned`
    /// events as a single atomic unit (§4.5, §5). `order` is a value the
    /// caller has already constructed (typically via [`Order::new`]) so it
    /// can be handed to `OrderTypeContract::plan` before this call.
    pub fn do_propose(&mut self, order: Order, item_configs: Vec<ItemConfig>, actor: Option<ActorRef>, now_ms: u64) -> Order {
        self.orders.insert(order.id, order.clone());
        self.events.push(Event::new(
            order.id, None, EventName::Proposed, actor.clone(), Some(order.payload.clone()), None, None, now_ms,
        ));
        for item_config in item_configs {
            let item = Item::new(item_config, now_ms);
            self.items.insert(item.id, item);
        }
        self.events.push(Event::new(order.id, None, EventName::Planned, actor, None, None, None, now_ms));
        order
    }

    #[allow(clippy::too_many_arguments)]
    pub fn do_transition_order(
        &mut self,
        table: &[Transition<OrderState>],
        order_id: &OrderId,
        to: OrderState,
        event_name: EventName,
        actor: Option<ActorRef>,
        payload: Option<Value>,
        diff: Option<Value>,
        message: Option<String>,
        now_ms: u64,
    ) -> Result<Order, EngineError> {
        let order = self
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_query(format!("unknown order: {order_id}")))?;
        if !is_legal(table, order.state, to) {
            return Err(EngineError::illegal_transition("order", order.state, to));
        }
        let mut updated = order;
        updated.state = to;
        updated.last_transitioned_at_ms = now_ms;
        updated.updated_at_ms = now_ms;
        match to {
            OrderState::Applied => updated.applied_at_ms = Some(now_ms),
            OrderState::Completed => updated.completed_at_ms = Some(now_ms),
            _ => {}
        }
        self.orders.insert(*order_id, updated.clone());
        self.events.push(Event::new(*order_id, None, event_name, actor, payload, diff, message, now_ms));
        debug!(order_id = %order_id, to = %to, "order transitioned");
        Ok(updated)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn do_transition_item(
        &mut self,
        table: &[Transition<ItemState>],
        item_id: &ItemId,
        to: ItemState,
        event_name: EventName,
        actor: Option<ActorRef>,
        payload: Option<Value>,
        diff: Option<Value>,
        message: Option<String>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        let item = self
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        if !is_legal(table, item.state, to) {
            return Err(EngineError::illegal_transition("item", item.state, to));
        }
        let order_id = item.order_id;
        let mut updated = item;
        updated.state = to;
        updated.updated_at_ms = now_ms;
        if to == ItemState::Accepted {
            updated.accepted_at_ms = Some(now_ms);
        }
        self.items.insert(*item_id, updated.clone());
        self.events.push(Event::new(order_id, Some(*item_id), event_name, actor, payload, diff, message, now_ms));
        debug!(item_id = %item_id, to = %to, "item transitioned");
        Ok(updated)
    }

    /// Appends an Event without changing state (heartbeats, lease-expired,
    /// released, diagnostics).
    #[allow(clippy::too_many_arguments)]
    pub fn do_record_event(
        &mut self,
        order_id: OrderId,
        item_id: Option<ItemId>,
        event_name: EventName,
        actor: Option<ActorRef>,
        payload: Option<Value>,
        message: Option<String>,
        now_ms: u64,
    ) {
        self.events.push(Event::new(order_id, item_id, event_name, actor, payload, None, message, now_ms));
    }

    /// Inserts a provenance row (§3 Provenance entity). Never read back by
    /// the engine itself — this is audit metadata for external consumers.
    pub fn do_record_provenance(&mut self, provenance: Provenance) {
        self.provenances.insert(provenance.id, provenance);
    }

    /// `submit(item, result, agent_id)` persistence half (§4.6 step 3):
    /// writes `result`, transitions `leased|in_progress -> submitted`,
    /// records the event. Requires `agent_id` to hold a live lease.
    pub fn do_submit_item_result(
        &mut self,
        table: &[Transition<ItemState>],
        item_id: &ItemId,
        agent_id: &str,
        result: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        let item = self
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        require_lease_holder(&item, agent_id, now_ms)?;
        if !is_legal(table, item.state, ItemState::Submitted) {
            return Err(EngineError::illegal_transition("item", item.state, ItemState::Submitted));
        }
        let order_id = item.order_id;
        let mut updated = item;
        updated.result = Some(result.clone());
        updated.state = ItemState::Submitted;
        updated.updated_at_ms = now_ms;
        self.items.insert(*item_id, updated.clone());
        self.events.push(Event::new(
            order_id, Some(*item_id), EventName::Submitted, actor, Some(result), None, None, now_ms,
        ));
        Ok(updated)
    }

    /// `submit_part` persistence half (§4.6): inserts one part row and, if
    /// validated, recomputes the item's `parts_state` materialized summary,
    /// atomically with the `part-submitted`/`part-validated`/`part-rejected`
    /// events. Requires `agent_id` to hold a live lease.
    pub fn do_record_part(
        &mut self,
        item_id: &ItemId,
        agent_id: &str,
        part: ItemPart,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<ItemPart, EngineError> {
        let item = self
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        require_lease_holder(&item, agent_id, now_ms)?;
        let order_id = item.order_id;
        let validated = part.status == PartStatus::Validated;
        self.parts.insert(part.id, part.clone());
        self.events.push(Event::new(
            order_id, Some(*item_id), EventName::PartSubmitted, actor.clone(), Some(part.payload.clone()), None, None, now_ms,
        ));
        if validated {
            let latest: std::collections::HashMap<String, PartSummary> = self
                .latest_parts_for_item(item_id)
                .into_iter()
                .map(|(key, p)| {
                    (
                        key,
                        PartSummary {
                            part_id: p.id.to_string(),
                            status: p.status,
                            checksum: p.checksum.clone(),
                            created_at_ms: p.created_at_ms,
                        },
                    )
                })
                .collect();
            if let Some(item) = self.items.get_mut(item_id) {
                item.parts_state = PartsState { latest };
                item.updated_at_ms = now_ms;
            }
            self.events.push(Event::new(
                order_id, Some(*item_id), EventName::PartValidated, actor, None, None, None, now_ms,
            ));
        } else {
            let errors = serde_json::to_value(&part.errors).unwrap_or(Value::Null);
            self.events.push(Event::new(
                order_id, Some(*item_id), EventName::PartRejected, actor, Some(errors), None, None, now_ms,
            ));
        }
        Ok(part)
    }

    /// `finalize` persistence half (§4.6): writes `assembled_result` (and
    /// copies it into `result`), transitions `in_progress -> submitted`,
    /// records `finalized` then `submitted`, atomically. Requires
    /// `agent_id` to hold a live lease.
    pub fn do_finalize_item(
        &mut self,
        table: &[Transition<ItemState>],
        item_id: &ItemId,
        agent_id: &str,
        assembled_result: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        let item = self
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        require_lease_holder(&item, agent_id, now_ms)?;
        if !is_legal(table, item.state, ItemState::Submitted) {
            return Err(EngineError::illegal_transition("item", item.state, ItemState::Submitted));
        }
        let order_id = item.order_id;
        let mut updated = item;
        updated.assembled_result = Some(assembled_result.clone());
        updated.result = Some(assembled_result.clone());
        updated.state = ItemState::Submitted;
        updated.updated_at_ms = now_ms;
        self.items.insert(*item_id, updated.clone());
        self.events.push(Event::new(
            order_id, Some(*item_id), EventName::Finalized, actor.clone(), Some(assembled_result.clone()), None, None, now_ms,
        ));
        self.events.push(Event::new(
            order_id, Some(*item_id), EventName::Submitted, actor, Some(assembled_result), None, None, now_ms,
        ));
        Ok(updated)
    }

    /// The `apply` cascade (§4.6.1): `approved -> applied` (carrying
    /// `diff`), then every `submitted` item of the order `-> accepted ->
    /// completed`, then the order `applied -> completed`. One atomic unit;
    /// the caller has already run `type.apply`/`before_apply`/`after_apply`
    /// outside the lock.
    pub fn do_apply_cascade(
        &mut self,
        table: &[Transition<OrderState>],
        order_id: &OrderId,
        diff: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Order, EngineError> {
        let order = self
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_query(format!("unknown order: {order_id}")))?;
        if !is_legal(table, order.state, OrderState::Applied) {
            return Err(EngineError::illegal_transition("order", order.state, OrderState::Applied));
        }

        let mut updated_order = order;
        updated_order.state = OrderState::Applied;
        updated_order.applied_at_ms = Some(now_ms);
        updated_order.last_transitioned_at_ms = now_ms;
        updated_order.updated_at_ms = now_ms;
        self.orders.insert(*order_id, updated_order.clone());
        self.events.push(Event::new(*order_id, None, EventName::Applied, actor.clone(), None, Some(diff), None, now_ms));

        let item_ids: Vec<ItemId> = self
            .items
            .values()
            .filter(|item| &item.order_id == order_id && item.state == ItemState::Submitted)
            .map(|item| item.id)
            .collect();
        for item_id in item_ids {
            if let Some(item) = self.items.get_mut(&item_id) {
                item.state = ItemState::Accepted;
                item.accepted_at_ms = Some(now_ms);
                item.updated_at_ms = now_ms;
            }
            self.events.push(Event::new(*order_id, Some(item_id), EventName::Accepted, actor.clone(), None, None, None, now_ms));
            if let Some(item) = self.items.get_mut(&item_id) {
                item.state = ItemState::Completed;
                item.updated_at_ms = now_ms;
            }
            self.events.push(Event::new(*order_id, Some(item_id), EventName::Completed, actor.clone(), None, None, None, now_ms));
        }

        updated_order.state = OrderState::Completed;
        updated_order.completed_at_ms = Some(now_ms);
        updated_order.last_transitioned_at_ms = now_ms;
        updated_order.updated_at_ms = now_ms;
        self.orders.insert(*order_id, updated_order.clone());
        self.events.push(Event::new(*order_id, None, EventName::Completed, actor, None, None, None, now_ms));

        Ok(updated_order)
    }

    /// `reject(order, allow_rework)` (§4.6). When `allow_rework`,
    /// transitions to `queued`; items are left untouched, preserving their
    /// `result` per the reference implementation (§9 Open Questions).
    /// Otherwise transitions to `rejected`.
    pub fn do_reject_order(
        &mut self,
        table: &[Transition<OrderState>],
        order_id: &OrderId,
        allow_rework: bool,
        errors: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Order, EngineError> {
        let to = if allow_rework { OrderState::Queued } else { OrderState::Rejected };
        self.do_transition_order(table, order_id, to, EventName::Rejected, actor, Some(errors), None, None, now_ms)
    }

    /// `fail(item, error)` (§4.6): increments `attempts`; transitions to
    /// `failed` once `attempts >= max_attempts`, else back to `queued`
    /// (retry-eligible after the backoff window, §4.8).
    pub fn do_fail_item(
        &mut self,
        table: &[Transition<ItemState>],
        item_id: &ItemId,
        error: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        let item = self
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        let attempts = item.attempts + 1;
        let to = if attempts >= item.max_attempts { ItemState::Failed } else { ItemState::Queued };
        if !is_legal(table, item.state, to) {
            return Err(EngineError::illegal_transition("item", item.state, to));
        }
        let order_id = item.order_id;
        let mut updated = item;
        updated.attempts = attempts;
        updated.state = to;
        updated.error = Some(error.clone());
        updated.updated_at_ms = now_ms;
        if to == ItemState::Queued {
            updated.leased_by = None;
            updated.lease_expires_at_ms = None;
            updated.last_heartbeat_at_ms = None;
        }
        self.items.insert(*item_id, updated.clone());
        self.events.push(Event::new(order_id, Some(*item_id), EventName::Failed, actor, Some(error), None, None, now_ms));
        Ok(updated)
    }

    /// Lease field CAS (§4.2 durable-store backend authority). Succeeds iff
    /// `item_id`'s lease is absent or expired; stamps `leased_by`/
    /// `lease_expires_at_ms`. Does not touch `state`.
    pub fn do_cas_acquire_item_lease(&mut self, item_id: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        let Some(item) = self.items.get_mut(item_id) else { return false };
        let live = item.leased_by.is_some() && item.lease_expires_at_ms.is_some_and(|exp| exp > now_ms);
        if live {
            return false;
        }
        item.leased_by = Some(owner.to_string());
        item.lease_expires_at_ms = Some(now_ms + ttl_seconds * 1000);
        item.last_heartbeat_at_ms = Some(now_ms);
        true
    }

    pub fn do_cas_extend_item_lease(&mut self, item_id: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        let Some(item) = self.items.get_mut(item_id) else { return false };
        let held_by_owner = item.leased_by.as_deref() == Some(owner);
        let live = item.lease_expires_at_ms.is_some_and(|exp| exp > now_ms);
        if !held_by_owner || !live {
            return false;
        }
        item.lease_expires_at_ms = Some(now_ms + ttl_seconds * 1000);
        item.last_heartbeat_at_ms = Some(now_ms);
        true
    }

    pub fn do_cas_release_item_lease(&mut self, item_id: &ItemId, owner: &str) -> bool {
        let Some(item) = self.items.get_mut(item_id) else { return false };
        if item.leased_by.as_deref() != Some(owner) {
            return false;
        }
        item.leased_by = None;
        item.lease_expires_at_ms = None;
        true
    }

    /// One step of `reclaim_expired()` (§4.7): bumps `attempts`, transitions
    /// to `failed` or back to `queued`, clears lease fields, records
    /// `lease-expired`. Returns `None` if the item no longer has an expired
    /// lease (already reclaimed by a concurrent maintenance pass).
    pub fn do_reclaim_expired_item(&mut self, item_id: &ItemId, now_ms: u64) -> Option<Item> {
        let item = self.items.get(item_id)?.clone();
        let expired = item.leased_by.is_some() && item.lease_expires_at_ms.is_some_and(|exp| exp < now_ms);
        if !expired {
            return None;
        }
        let attempts = item.attempts + 1;
        let to = if attempts >= item.max_attempts { ItemState::Failed } else { ItemState::Queued };
        let order_id = item.order_id;
        let mut updated = item;
        updated.attempts = attempts;
        updated.state = to;
        updated.leased_by = None;
        updated.lease_expires_at_ms = None;
        updated.last_heartbeat_at_ms = None;
        updated.updated_at_ms = now_ms;
        self.items.insert(*item_id, updated.clone());
        self.events.push(Event::new(order_id, Some(*item_id), EventName::LeaseExpired, None, None, None, None, now_ms));
        Some(updated)
    }

    /// Orders whose items all live in `submitted`/`accepted` (§4.6 step 4:
    /// "if all items of the order are in submitted or accepted, transition
    /// the order `* -> submitted` if not already").
    pub fn all_items_submitted_or_accepted(&self, order_id: &OrderId) -> bool {
        let items = self.items_for_order(order_id);
        !items.is_empty() && items.iter().all(|item| matches!(item.state, ItemState::Submitted | ItemState::Accepted))
    }
}

pub struct Store {
    inner: Arc<Mutex<MaterializedState>>,
    order_table: Vec<Transition<OrderState>>,
    item_table: Vec<Transition<ItemState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MaterializedState::new())),
            order_table: order_transitions(),
            item_table: item_transitions(),
        }
    }

    /// Override the declarative transition tables (§6 `state_machine.*`
    /// config). Transitions not present in the default table are never
    /// exercised by the engine regardless of override.
    pub fn with_tables(order_table: Vec<Transition<OrderState>>, item_table: Vec<Transition<ItemState>>) -> Self {
        Self { inner: Arc::new(Mutex::new(MaterializedState::new())), order_table, item_table }
    }

    /// Run `f` with exclusive access to the whole materialized state. Used
    /// by read-only query paths and by callers assembling a multi-entity
    /// view; mutating callers should prefer the named methods below so the
    /// atomic unit they implement is self-documenting.
    pub fn with_state<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        f(&self.inner.lock())
    }

    /// The order-transition table this store enforces. Exposed so
    /// `IdempotencyGuard` closures can call `MaterializedState::do_*`
    /// methods directly without re-locking through `Store`.
    pub fn order_table(&self) -> Vec<Transition<OrderState>> {
        self.order_table.clone()
    }

    /// The item-transition table this store enforces. See [`Store::order_table`].
    pub fn item_table(&self) -> Vec<Transition<ItemState>> {
        self.item_table.clone()
    }

    // ---- propose (§4.5, §5 atomicity boundary) ----------------------------

    pub fn propose(&self, order: Order, item_configs: Vec<ItemConfig>, actor: Option<ActorRef>, now_ms: u64) -> Order {
        self.inner.lock().do_propose(order, item_configs, actor, now_ms)
    }

    // ---- StateMachine operations (§4.1) ------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn transition_order(
        &self,
        order_id: &OrderId,
        to: OrderState,
        event_name: EventName,
        actor: Option<ActorRef>,
        payload: Option<Value>,
        diff: Option<Value>,
        message: Option<String>,
        now_ms: u64,
    ) -> Result<Order, EngineError> {
        self.inner.lock().do_transition_order(&self.order_table, order_id, to, event_name, actor, payload, diff, message, now_ms)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transition_item(
        &self,
        item_id: &ItemId,
        to: ItemState,
        event_name: EventName,
        actor: Option<ActorRef>,
        payload: Option<Value>,
        diff: Option<Value>,
        message: Option<String>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        self.inner.lock().do_transition_item(&self.item_table, item_id, to, event_name, actor, payload, diff, message, now_ms)
    }

    /// Appends an Event without changing state (heartbeats, lease-expired,
    /// released, diagnostics).
    pub fn record_event(
        &self,
        order_id: OrderId,
        item_id: Option<ItemId>,
        event_name: EventName,
        actor: Option<ActorRef>,
        payload: Option<Value>,
        message: Option<String>,
        now_ms: u64,
    ) {
        self.inner.lock().do_record_event(order_id, item_id, event_name, actor, payload, message, now_ms);
    }

    /// Inserts a provenance row (§3 Provenance entity).
    pub fn record_provenance(&self, provenance: Provenance) {
        self.inner.lock().do_record_provenance(provenance);
    }

    // ---- Executor operations (§4.6) ----------------------------------------

    pub fn submit_item_result(
        &self,
        item_id: &ItemId,
        agent_id: &str,
        result: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        self.inner.lock().do_submit_item_result(&self.item_table, item_id, agent_id, result, actor, now_ms)
    }

    pub fn record_part(
        &self,
        item_id: &ItemId,
        agent_id: &str,
        part: ItemPart,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<ItemPart, EngineError> {
        self.inner.lock().do_record_part(item_id, agent_id, part, actor, now_ms)
    }

    pub fn finalize_item(
        &self,
        item_id: &ItemId,
        agent_id: &str,
        assembled_result: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        self.inner.lock().do_finalize_item(&self.item_table, item_id, agent_id, assembled_result, actor, now_ms)
    }

    /// Transitions `submitted -> approved`, atomically with the event.
    /// Readiness (`ready_for_approval`) is checked by the caller before this
    /// call since it requires invoking the async type hook outside the lock.
    pub fn approve_order(&self, order_id: &OrderId, actor: Option<ActorRef>, now_ms: u64) -> Result<Order, EngineError> {
        self.transition_order(order_id, OrderState::Approved, EventName::Approved, actor, None, None, None, now_ms)
    }

    pub fn apply_cascade(&self, order_id: &OrderId, diff: Value, actor: Option<ActorRef>, now_ms: u64) -> Result<Order, EngineError> {
        self.inner.lock().do_apply_cascade(&self.order_table, order_id, diff, actor, now_ms)
    }

    /// Records `apply-failed` without mutating the order, which stays
    /// `approved` (§4.6 Failure semantics: "abort apply... surfaced to
    /// caller for retry").
    pub fn record_apply_failed(&self, order_id: OrderId, actor: Option<ActorRef>, message: String, now_ms: u64) {
        self.record_event(order_id, None, EventName::ApplyFailed, actor, None, Some(message), now_ms);
    }

    pub fn reject_order(
        &self,
        order_id: &OrderId,
        allow_rework: bool,
        errors: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Order, EngineError> {
        self.inner.lock().do_reject_order(&self.order_table, order_id, allow_rework, errors, actor, now_ms)
    }

    pub fn fail_item(&self, item_id: &ItemId, error: Value, actor: Option<ActorRef>, now_ms: u64) -> Result<Item, EngineError> {
        self.inner.lock().do_fail_item(&self.item_table, item_id, error, actor, now_ms)
    }

    // ---- LeaseService operations (§4.7) ------------------------------------

    /// Keeps the item row's lease fields consistent with a `LeaseBackend`
    /// external to the item row (`FastLeaseBackend`) after acquire/extend/
    /// release; redundant but harmless for `DurableLeaseBackend`, whose CAS
    /// methods below already write these fields directly.
    pub fn mirror_item_lease(&self, item_id: &ItemId, owner: Option<&str>, expires_at_ms: Option<u64>, heartbeat_at_ms: Option<u64>) {
        let mut state = self.inner.lock();
        if let Some(item) = state.items.get_mut(item_id) {
            item.leased_by = owner.map(str::to_string);
            item.lease_expires_at_ms = expires_at_ms;
            if heartbeat_at_ms.is_some() {
                item.last_heartbeat_at_ms = heartbeat_at_ms;
            }
        }
    }

    pub fn reclaim_expired_item(&self, item_id: &ItemId, now_ms: u64) -> Option<Item> {
        self.inner.lock().do_reclaim_expired_item(item_id, now_ms)
    }

    pub fn order_items_all_submitted_or_accepted(&self, order_id: &OrderId) -> bool {
        self.inner.lock().all_items_submitted_or_accepted(order_id)
    }

    // ---- Idempotency guard storage half (§4.3) -----------------------------

    /// Runs `op` atomically with reserving `(scope, key_hash)`. If a
    /// settled record already exists, `op` is never invoked and the cached
    /// response is returned instead. On a concurrent in-flight reservation,
    /// waits briefly before reporting `idempotency-conflict`.
    pub async fn guarded<F>(&self, scope: &str, key_hash: &str, now_ms: u64, op: F) -> Result<Value, EngineError>
    where
        F: FnOnce(&mut MaterializedState) -> Result<Value, EngineError>,
    {
        for attempt in 0..=GUARD_WAIT_ATTEMPTS {
            let outcome = {
                let mut state = self.inner.lock();
                state.reserve_idempotency(scope, key_hash, now_ms)
            };
            match outcome {
                IdempotencyOutcome::CachedHit(value) => return Ok(value),
                IdempotencyOutcome::Reserved => {
                    let mut state = self.inner.lock();
                    let result = op(&mut state);
                    match &result {
                        Ok(value) => state.settle_idempotency(scope, key_hash, value.clone()),
                        Err(_) => {
                            state.idempotency.remove(&(scope.to_string(), key_hash.to_string()));
                        }
                    }
                    return result;
                }
                IdempotencyOutcome::Conflict => {
                    if attempt == GUARD_WAIT_ATTEMPTS {
                        return Err(EngineError::idempotency_conflict(scope));
                    }
                    tokio::time::sleep(GUARD_WAIT).await;
                }
            }
        }
        unreachable!("loop always returns or sleeps and retries")
    }

    /// Read-only lookup of a settled `(scope, key_hash)` response. See
    /// [`MaterializedState::peek_idempotency`]; used by callers that cannot
    /// run their operation body inside the lock (`approve`, which awaits a
    /// type's async hooks between preconditions and the commit).
    pub fn peek_idempotency(&self, scope: &str, key_hash: &str) -> Option<Value> {
        self.inner.lock().peek_idempotency(scope, key_hash)
    }

    /// Runs `op` under the store lock without any idempotency bookkeeping;
    /// used when the caller supplied no client key on an endpoint that does
    /// not require one.
    pub fn run_once<F>(&self, op: F) -> Result<Value, EngineError>
    where
        F: FnOnce(&mut MaterializedState) -> Result<Value, EngineError>,
    {
        let mut state = self.inner.lock();
        op(&mut state)
    }

    // ---- Lease field CAS (§4.2 durable-store backend authority) -----------

    pub fn cas_acquire_item_lease(&self, item_id: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        self.inner.lock().do_cas_acquire_item_lease(item_id, owner, ttl_seconds, now_ms)
    }

    pub fn cas_extend_item_lease(&self, item_id: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        self.inner.lock().do_cas_extend_item_lease(item_id, owner, ttl_seconds, now_ms)
    }

    pub fn cas_release_item_lease(&self, item_id: &ItemId, owner: &str) -> bool {
        self.inner.lock().do_cas_release_item_lease(item_id, owner)
    }

    /// Clears lease fields without regard to current holder; used by
    /// reclamation after the backend-level lease has already expired.
    pub fn clear_item_lease(&self, item_id: &ItemId) {
        let mut state = self.inner.lock();
        if let Some(item) = state.items.get_mut(item_id) {
            item.leased_by = None;
            item.lease_expires_at_ms = None;
        }
    }

    /// Increments `attempts` and returns `(attempts, max_attempts)`. Used by
    /// `fail()` and `reclaim_expired()` to decide `queued` vs `failed`.
    pub fn bump_item_attempts(&self, item_id: &ItemId) -> Option<(u32, u32)> {
        let mut state = self.inner.lock();
        let item = state.items.get_mut(item_id)?;
        item.attempts += 1;
        Some((item.attempts, item.max_attempts))
    }

    /// Items whose lease has expired as of `now_ms` and are still marked
    /// leased — candidates for `LeaseService::reclaim_expired`.
    pub fn expired_leased_items(&self, now_ms: u64) -> Vec<Item> {
        self.inner
            .lock()
            .items
            .values()
            .filter(|item| item.leased_by.is_some() && item.lease_expires_at_ms.is_some_and(|exp| exp < now_ms))
            .cloned()
            .collect()
    }

    // ---- Queries -------------------------------------------------------------

    pub fn list_orders(&self, query: &ListOrdersQuery, now_ms: u64) -> Result<ListOrdersResult, EngineError> {
        let state = self.inner.lock();
        crate::query::run(&state, query, now_ms)
    }

    pub fn get_order(&self, order_id: &OrderId) -> Option<Order> {
        self.inner.lock().orders.get(order_id).cloned()
    }

    pub fn get_item(&self, item_id: &ItemId) -> Option<Item> {
        self.inner.lock().items.get(item_id).cloned()
    }
}
