// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Executor` (§4.6): drives an item/order through submission, partial
//! assembly, approval, apply, rejection, and failure.

use std::collections::HashMap;

use serde_json::Value;

use wocp_core::{
    ActorRef, EngineConfig, EngineError, FieldError, Item, ItemId, ItemPart, ItemPartBuilder, Order,
    OrderId, PartStatus, TypeRegistry,
};
use wocp_storage::Store;

use crate::idempotency::IdempotencyGuard;

/// Strictness mode for `finalize` (§4.6). A tagged sum type standing in for
/// the source's ad hoc string/enum argument (§9 "Variants are tagged sum
/// types").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Every key in `required_parts(item)` must have a validated part.
    Strict,
    /// Assembles from whatever validated parts exist, even if empty.
    BestEffort,
}

pub struct Executor<'a> {
    store: &'a Store,
    registry: &'a TypeRegistry,
    config: &'a EngineConfig,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a Store, registry: &'a TypeRegistry, config: &'a EngineConfig) -> Self {
        Self { store, registry, config }
    }

    fn contract_for_item(&self, item: &Item) -> Result<std::sync::Arc<dyn wocp_core::OrderTypeContract>, EngineError> {
        self.registry.get(&item.type_id).map_err(|_| EngineError::type_not_found(&item.type_id))
    }

    /// Step 5 of `submit`/`finalize`: auto-approve when the order's items are
    /// all settled, the owning order is `submitted`, and the type requests
    /// auto-approve via `ready_for_approval`.
    async fn maybe_advance_order_and_auto_approve(
        &self,
        order_id: &OrderId,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        if !self.store.order_items_all_submitted_or_accepted(order_id) {
            return Ok(());
        }
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown order: {order_id}")))?;
        if order.state != wocp_core::OrderState::Submitted {
            self.store
                .transition_order(
                    order_id,
                    wocp_core::OrderState::Submitted,
                    wocp_core::EventName::Submitted,
                    actor.clone(),
                    None,
                    None,
                    None,
                    now_ms,
                )
                .ok();
        }
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown order: {order_id}")))?;
        let contract = self.contract_for_item_type(&order.type_id)?;
        if contract.ready_for_approval(&order).await {
            self.approve_internal(&order, actor, now_ms).await?;
        }
        Ok(())
    }

    fn contract_for_item_type(&self, type_id: &str) -> Result<std::sync::Arc<dyn wocp_core::OrderTypeContract>, EngineError> {
        self.registry.get(type_id).map_err(|_| EngineError::type_not_found(type_id))
    }

    /// Records a [`wocp_core::Provenance`] row tying a client-supplied
    /// idempotency key back to the agent that supplied it. A no-op when no
    /// key was given — an unkeyed call has nothing worth attributing.
    fn record_provenance_if_keyed(
        &self,
        order_id: Option<OrderId>,
        item_id: Option<ItemId>,
        agent_id: &str,
        client_key: Option<&str>,
        now_ms: u64,
    ) {
        if let Some(key) = client_key {
            let provenance = wocp_core::Provenance::new(
                order_id,
                item_id,
                Some(key.to_string()),
                Some(agent_id.to_string()),
                now_ms,
            );
            self.store.record_provenance(provenance);
        }
    }

    /// `submit(item, result, agent_id)` (§4.6).
    pub async fn submit(
        &self,
        idempotency: &IdempotencyGuard<'_>,
        item_id: &ItemId,
        agent_id: &str,
        result: Value,
        actor: Option<ActorRef>,
        client_key: Option<&str>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        let contract = {
            let item = self
                .store
                .get_item(item_id)
                .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
            self.contract_for_item(&item)?
        };
        let outcome = contract.validate_submission(item_id, &result).await;
        if !outcome.is_ok() {
            return Err(EngineError::validation(outcome.errors));
        }

        let scope = format!("item:{item_id}");
        let item_table = self.store.item_table();
        let item_id_owned = *item_id;
        let agent_id_owned = agent_id.to_string();
        let actor_for_guard = actor.clone();
        let response = idempotency
            .guard("submit", &scope, client_key, now_ms, move |state| {
                let item = state.do_submit_item_result(
                    &item_table,
                    &item_id_owned,
                    &agent_id_owned,
                    result,
                    actor_for_guard,
                    now_ms,
                )?;
                Ok(serde_json::to_value(&item).unwrap_or(Value::Null))
            })
            .await?;
        let item: Item = serde_json::from_value(response).map_err(|err| {
            EngineError::invalid_query(format!("corrupt cached submit response: {err}"))
        })?;

        self.record_provenance_if_keyed(Some(item.order_id), Some(*item_id), agent_id, client_key, now_ms);
        self.maybe_advance_order_and_auto_approve(&item.order_id, actor, now_ms).await?;
        Ok(self.store.get_item(item_id).unwrap_or(item))
    }

    /// `submit_part(item, part_key, seq?, payload, agent_id)` (§4.6). Records
    /// exactly one part row per `(scope, key)` regardless of validation
    /// outcome, so a replay with a different payload returns the originally
    /// stored response rather than inserting a second row (§8).
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_part(
        &self,
        idempotency: &IdempotencyGuard<'_>,
        item_id: &ItemId,
        agent_id: &str,
        part_key: &str,
        seq: Option<u64>,
        payload: Value,
        evidence: Option<Value>,
        notes: Option<String>,
        actor: Option<ActorRef>,
        client_key: Option<&str>,
        now_ms: u64,
    ) -> Result<ItemPart, EngineError> {
        if !self.config.partials.enabled {
            return Err(EngineError::validation(vec![FieldError::new(
                "part_key",
                "partial submission is disabled",
            )]));
        }

        let item = self
            .store
            .get_item(item_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        let contract = self.contract_for_item(&item)?;

        let payload_bytes = serde_json::to_vec(&payload).unwrap_or_default().len() as u64;
        if payload_bytes > self.config.partials.max_payload_bytes {
            return Err(EngineError::validation(vec![FieldError::new(
                "payload",
                format!(
                    "payload is {payload_bytes} bytes, exceeds max_payload_bytes of {}",
                    self.config.partials.max_payload_bytes
                ),
            )]));
        }
        let existing_parts = self.store.with_state(|state| {
            state.parts.values().filter(|part| part.item_id == *item_id && part.part_key != part_key).count()
        }) as u32;
        if existing_parts >= self.config.partials.max_parts_per_item {
            return Err(EngineError::validation(vec![FieldError::new(
                "part_key",
                format!(
                    "item already has {existing_parts} distinct parts, at max_parts_per_item of {}",
                    self.config.partials.max_parts_per_item
                ),
            )]));
        }

        let outcome = contract.validate_part(item_id, part_key, &payload, seq).await;
        let checksum = checksum_of(&payload);
        let mut builder = ItemPartBuilder::default()
            .part_key(part_key)
            .submitted_by(agent_id)
            .checksum(&checksum)
            .payload(payload.clone())
            .item_id(*item_id);
        if let Some(seq) = seq {
            builder = builder.seq(seq);
        }
        if let Some(evidence) = evidence {
            builder = builder.evidence(evidence);
        }
        if let Some(notes) = notes {
            builder = builder.notes(notes);
        }
        builder = builder.created_at_ms(now_ms);
        let part = if outcome.is_ok() {
            builder.status(PartStatus::Validated).build()
        } else {
            builder.status(PartStatus::Rejected).errors(outcome.errors.clone()).build()
        };

        let scope = format!("item:{item_id}:part:{part_key}");
        let item_id_owned = *item_id;
        let agent_id_owned = agent_id.to_string();
        let response = idempotency
            .guard("submit-part", &scope, client_key, now_ms, move |state| {
                let recorded = state.do_record_part(&item_id_owned, &agent_id_owned, part, actor, now_ms)?;
                Ok(serde_json::to_value(&recorded).unwrap_or(Value::Null))
            })
            .await?;
        let recorded: ItemPart = serde_json::from_value(response).map_err(|err| {
            EngineError::invalid_query(format!("corrupt cached submit-part response: {err}"))
        })?;

        if recorded.status == PartStatus::Rejected {
            return Err(EngineError::validation(recorded.errors));
        }
        self.record_provenance_if_keyed(Some(item.order_id), Some(*item_id), agent_id, client_key, now_ms);
        Ok(recorded)
    }

    /// `finalize(item, mode)` (§4.6).
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize(
        &self,
        idempotency: &IdempotencyGuard<'_>,
        item_id: &ItemId,
        agent_id: &str,
        mode: FinalizeMode,
        actor: Option<ActorRef>,
        client_key: Option<&str>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        let item = self
            .store
            .get_item(item_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown item: {item_id}")))?;
        let contract = self.contract_for_item(&item)?;

        let latest_parts: HashMap<String, &ItemPart> =
            self.store.with_state(|state| state.latest_parts_for_item(item_id)).into_iter().collect();
        let latest_validated: HashMap<String, Value> = latest_parts
            .iter()
            .filter(|(_, part)| part.status == PartStatus::Validated)
            .map(|(key, part)| (key.clone(), part.payload.clone()))
            .collect();

        if mode == FinalizeMode::Strict {
            let required = contract.required_parts(item.parts_required.as_ref()).await;
            let mut missing: Vec<String> =
                required.iter().filter(|key| !latest_validated.contains_key(key.as_str())).cloned().collect();
            missing.sort();
            if !missing.is_empty() {
                let errors = missing
                    .into_iter()
                    .map(|key| FieldError::new(key, "required part missing"))
                    .collect();
                return Err(EngineError::validation(errors));
            }
        }

        let candidate = contract.assemble(item_id, &latest_validated).await;
        let outcome = contract.validate_assembled(item_id, &candidate).await;
        if !outcome.is_ok() {
            return Err(EngineError::validation(outcome.errors));
        }

        let scope = format!("item:{item_id}");
        let item_table = self.store.item_table();
        let item_id_owned = *item_id;
        let agent_id_owned = agent_id.to_string();
        let actor_for_guard = actor.clone();
        let response = idempotency
            .guard("finalize", &scope, client_key, now_ms, move |state| {
                let item = state.do_finalize_item(&item_table, &item_id_owned, &agent_id_owned, candidate, actor_for_guard, now_ms)?;
                Ok(serde_json::to_value(&item).unwrap_or(Value::Null))
            })
            .await?;
        let updated: Item = serde_json::from_value(response).map_err(|err| {
            EngineError::invalid_query(format!("corrupt cached finalize response: {err}"))
        })?;

        self.record_provenance_if_keyed(Some(updated.order_id), Some(*item_id), agent_id, client_key, now_ms);
        self.maybe_advance_order_and_auto_approve(&updated.order_id, actor, now_ms).await?;
        Ok(self.store.get_item(item_id).unwrap_or(updated))
    }

    /// `approve(order, actor)` (§4.6). `apply`'s hooks are async and cannot
    /// run inside the storage lock, so this endpoint cannot wrap its whole
    /// body in one `guard` closure the way `submit`/`finalize` do. Instead it
    /// peeks the cache first and, on a miss, commits normally and settles
    /// the cache afterward — per §4.6's note that repeated `apply` calls are
    /// safe because `type.apply` is required idempotent.
    pub async fn approve(
        &self,
        idempotency: &IdempotencyGuard<'_>,
        order_id: &OrderId,
        actor: Option<ActorRef>,
        client_key: Option<&str>,
        now_ms: u64,
    ) -> Result<(Order, Value), EngineError> {
        let scope = format!("order:{order_id}");
        if let Some(cached) = idempotency.peek("approve", &scope, client_key) {
            return decode_approve_response(cached);
        }
        if client_key.is_none() && idempotency.requires_key("approve") {
            return Err(EngineError::idempotency_required("approve"));
        }

        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown order: {order_id}")))?;
        let (updated, diff) = self.approve_internal(&order, actor, now_ms).await?;

        let response = serde_json::json!({ "order": updated, "diff": diff });
        idempotency.guard("approve", &scope, client_key, now_ms, move |_state| Ok(response)).await?;
        Ok((updated, diff))
    }

    /// Core of `approve`, reused by the `submit`/`finalize` auto-approve
    /// cascade (§4.6 step 5), which is a system-triggered call and so is not
    /// itself subject to the client-key enforcement policy.
    async fn approve_internal(
        &self,
        order: &Order,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<(Order, Value), EngineError> {
        if order.state != wocp_core::OrderState::Submitted {
            return Err(EngineError::illegal_transition("order", order.state, wocp_core::OrderState::Approved));
        }
        let contract = self.contract_for_item_type(&order.type_id)?;
        if !contract.ready_for_approval(order).await {
            return Err(EngineError::not_ready(order.state));
        }

        self.store.approve_order(&order.id, actor.clone(), now_ms)?;
        self.apply(&order.id, actor, now_ms).await
    }

    /// Internal `apply(order)` (§4.6.1): idempotent by construction of
    /// `type.apply`; callers wrap this in an `IdempotencyGuard` for the
    /// `approve` endpoint so retries observe the cached `(order, diff)`.
    async fn apply(
        &self,
        order_id: &OrderId,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<(Order, Value), EngineError> {
        let order = self
            .store
            .get_order(order_id)
            .ok_or_else(|| EngineError::invalid_query(format!("unknown order: {order_id}")))?;
        let contract = self.contract_for_item_type(&order.type_id)?;

        if let Err(message) = contract.before_apply(&order).await {
            self.store.record_apply_failed(order.id, actor.clone(), message.clone(), now_ms);
            return Err(EngineError::validation(vec![FieldError::new("apply", message)]));
        }
        let diff = match contract.apply(&order).await {
            Ok(diff) => diff,
            Err(message) => {
                self.store.record_apply_failed(order.id, actor.clone(), message.clone(), now_ms);
                return Err(EngineError::validation(vec![FieldError::new("apply", message)]));
            }
        };

        let updated = self.store.apply_cascade(order_id, diff.clone(), actor.clone(), now_ms)?;
        contract.after_apply(&order, &diff).await;
        Ok((updated, diff))
    }

    /// `reject(order, errors, actor, allow_rework)` (§4.6).
    pub async fn reject(
        &self,
        idempotency: &IdempotencyGuard<'_>,
        order_id: &OrderId,
        errors: Value,
        actor: Option<ActorRef>,
        allow_rework: bool,
        client_key: Option<&str>,
        now_ms: u64,
    ) -> Result<Order, EngineError> {
        let scope = format!("order:{order_id}");
        let order_table = self.store.order_table();
        let order_id_owned = *order_id;
        let response = idempotency
            .guard("reject", &scope, client_key, now_ms, move |state| {
                let order = state.do_reject_order(&order_table, &order_id_owned, allow_rework, errors, actor, now_ms)?;
                Ok(serde_json::to_value(&order).unwrap_or(Value::Null))
            })
            .await?;
        serde_json::from_value(response)
            .map_err(|err| EngineError::invalid_query(format!("corrupt cached reject response: {err}")))
    }

    /// `fail(item, error)` (§4.6).
    pub fn fail(
        &self,
        item_id: &ItemId,
        error: Value,
        actor: Option<ActorRef>,
        now_ms: u64,
    ) -> Result<Item, EngineError> {
        self.store.fail_item(item_id, error, actor, now_ms)
    }
}

fn checksum_of(payload: &Value) -> String {
    use sha2::{Digest, Sha256};
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

fn decode_approve_response(cached: Value) -> Result<(Order, Value), EngineError> {
    let order: Order = serde_json::from_value(
        cached.get("order").cloned().ok_or_else(|| EngineError::invalid_query("corrupt cached approve response"))?,
    )
    .map_err(|err| EngineError::invalid_query(format!("corrupt cached approve response: {err}")))?;
    let diff = cached.get("diff").cloned().unwrap_or(Value::Null);
    Ok((order, diff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wocp_core::{test_support::NoopType, EngineConfig, ItemConfig, OrderConfig};

    fn setup() -> (Store, TypeRegistry, EngineConfig) {
        let store = Store::new();
        let mut registry = TypeRegistry::new();
        registry.register(Arc::new(NoopType::new("t"))).unwrap();
        (store, registry, EngineConfig::default())
    }

    fn propose_order_with_item(store: &Store, now_ms: u64) -> (OrderId, ItemId) {
        let order = Order::new(OrderConfig::builder("t", json!({"msg": "hi"})).build(), now_ms);
        let order_id = order.id;
        let item_config = ItemConfig::builder(order_id, "t", json!({"msg": "hi"})).build();
        let item_id = item_config.id;
        store.propose(order, vec![item_config], None, now_ms);
        (order_id, item_id)
    }

    #[tokio::test]
    async fn submit_requires_lease() {
        let (store, registry, config) = setup();
        let (_, item_id) = propose_order_with_item(&store, 0);
        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        let err = executor
            .submit(&guard, &item_id, "agent-a", json!({"ok": true}), None, Some("k"), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind.code(), "lease-error");
    }

    #[tokio::test]
    async fn happy_path_submit_approve_apply_completes_order() {
        let (store, registry, config) = setup();
        let (order_id, item_id) = propose_order_with_item(&store, 0);
        store.cas_acquire_item_lease(&item_id, "agent-a", 600, 0);
        store
            .transition_item(&item_id, wocp_core::ItemState::Leased, wocp_core::EventName::Leased, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        executor
            .submit(&guard, &item_id, "agent-a", json!({"ok": true}), None, Some("k1"), 1_000)
            .await
            .unwrap();

        let order = store.get_order(&order_id).unwrap();
        assert_eq!(order.state, wocp_core::OrderState::Completed);
        let item = store.get_item(&item_id).unwrap();
        assert_eq!(item.state, wocp_core::ItemState::Completed);

        let provenances = store.with_state(|state| state.provenances.len());
        assert_eq!(provenances, 1);
    }

    #[tokio::test]
    async fn submit_part_rejected_when_partials_disabled() {
        let (store, registry, mut config) = setup();
        config.partials.enabled = false;
        let (_, item_id) = propose_order_with_item(&store, 0);
        store.cas_acquire_item_lease(&item_id, "agent-a", 600, 0);
        store
            .transition_item(&item_id, wocp_core::ItemState::Leased, wocp_core::EventName::Leased, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        let err = executor
            .submit_part(&guard, &item_id, "agent-a", "a", None, json!({"v": 1}), None, None, None, Some("pk1"), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind.code(), "validation-failed");
    }

    #[tokio::test]
    async fn submit_part_rejected_over_max_parts_per_item() {
        let (store, registry, mut config) = setup();
        config.partials.max_parts_per_item = 1;
        let (_, item_id) = propose_order_with_item(&store, 0);
        store.cas_acquire_item_lease(&item_id, "agent-a", 600, 0);
        store
            .transition_item(&item_id, wocp_core::ItemState::Leased, wocp_core::EventName::Leased, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        executor
            .submit_part(&guard, &item_id, "agent-a", "a", None, json!({"v": 1}), None, None, None, Some("pk1"), 0)
            .await
            .unwrap();
        let err = executor
            .submit_part(&guard, &item_id, "agent-a", "b", None, json!({"v": 2}), None, None, None, Some("pk2"), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind.code(), "validation-failed");
    }

    #[tokio::test]
    async fn submit_part_rejected_over_max_payload_bytes() {
        let (store, registry, mut config) = setup();
        config.partials.max_payload_bytes = 4;
        let (_, item_id) = propose_order_with_item(&store, 0);
        store.cas_acquire_item_lease(&item_id, "agent-a", 600, 0);
        store
            .transition_item(&item_id, wocp_core::ItemState::Leased, wocp_core::EventName::Leased, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        let err = executor
            .submit_part(&guard, &item_id, "agent-a", "a", None, json!({"value": "too long"}), None, None, None, Some("pk1"), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind.code(), "validation-failed");
    }

    #[tokio::test]
    async fn submit_part_replay_with_same_key_does_not_insert_second_row() {
        let (store, registry, config) = setup();
        let (_, item_id) = propose_order_with_item(&store, 0);
        store.cas_acquire_item_lease(&item_id, "agent-a", 600, 0);
        store
            .transition_item(&item_id, wocp_core::ItemState::Leased, wocp_core::EventName::Leased, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        let first = executor
            .submit_part(&guard, &item_id, "agent-a", "a", None, json!({"v": 1}), None, None, None, Some("pk1"), 0)
            .await
            .unwrap();
        let second = executor
            .submit_part(&guard, &item_id, "agent-a", "a", None, json!({"v": 2}), None, None, None, Some("pk1"), 0)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.payload, json!({"v": 1}));
        let row_count = store.with_state(|state| state.parts.len());
        assert_eq!(row_count, 1);
    }

    #[tokio::test]
    async fn reject_allow_rework_requeues_order_and_leaves_item_untouched() {
        let (store, registry, config) = setup();
        let (order_id, item_id) = propose_order_with_item(&store, 0);
        store
            .transition_order(&order_id, wocp_core::OrderState::Submitted, wocp_core::EventName::Submitted, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        let order = executor.reject(&guard, &order_id, json!({"reason": "bad"}), None, true, Some("rk"), 0).await.unwrap();
        assert_eq!(order.state, wocp_core::OrderState::Queued);
        let item = store.get_item(&item_id).unwrap();
        assert_eq!(item.state, wocp_core::ItemState::Queued);
    }

    #[tokio::test]
    async fn approve_without_client_key_is_rejected() {
        let (store, registry, config) = setup();
        let (order_id, _) = propose_order_with_item(&store, 0);
        store
            .transition_order(&order_id, wocp_core::OrderState::Submitted, wocp_core::EventName::Submitted, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        let err = executor.approve(&guard, &order_id, None, None, 0).await.unwrap_err();
        assert_eq!(err.kind.code(), "idempotency-required");
    }

    #[tokio::test]
    async fn apply_failure_leaves_order_approved_and_records_apply_failed_event() {
        let store = Store::new();
        let mut registry = TypeRegistry::new();
        registry.register(Arc::new(NoopType::new("t").failing_apply())).unwrap();
        let config = EngineConfig::default();
        let (order_id, _) = propose_order_with_item(&store, 0);
        store
            .transition_order(&order_id, wocp_core::OrderState::Submitted, wocp_core::EventName::Submitted, None, None, None, None, 0)
            .unwrap();

        let guard = IdempotencyGuard::new(&store, &config);
        let executor = Executor::new(&store, &registry, &config);

        let err = executor.approve(&guard, &order_id, None, Some("ak"), 0).await.unwrap_err();
        assert_eq!(err.kind.code(), "validation-failed");

        let order = store.get_order(&order_id).unwrap();
        assert_eq!(order.state, wocp_core::OrderState::Approved);
        let events = store.with_state(|state| state.events.clone());
        assert!(events.iter().any(|event| event.event == wocp_core::EventName::ApplyFailed));
    }
}
