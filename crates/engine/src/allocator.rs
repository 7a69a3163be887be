// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Allocator` (§4.5): turns a proposal into a queued order plus its planned
//! items.

use serde_json::{json, Value};

use wocp_core::{ActorRef, EngineError, Order, OrderConfig, TypeRegistry};
use wocp_storage::Store;

use crate::idempotency::IdempotencyGuard;
use crate::schema;

pub struct Allocator<'a> {
    store: &'a Store,
    registry: &'a TypeRegistry,
}

impl<'a> Allocator<'a> {
    pub fn new(store: &'a Store, registry: &'a TypeRegistry) -> Self {
        Self { store, registry }
    }

    /// Resolves `type_id`, validates `payload` against its schema, then
    /// inside one transaction inserts the order, records `proposed`, invokes
    /// `plan()`, materializes the returned item specs, and records
    /// `planned`. Returns the fully-populated order.
    #[allow(clippy::too_many_arguments)]
    pub async fn propose(
        &self,
        idempotency: &IdempotencyGuard<'_>,
        type_id: &str,
        payload: Value,
        requested_by: Option<ActorRef>,
        meta: Value,
        priority: i64,
        client_key: Option<&str>,
        now_ms: u64,
    ) -> Result<Order, EngineError> {
        let contract = self.registry.get(type_id).map_err(|_| EngineError::type_not_found(type_id))?;

        let schema_errors = schema::validate(&contract.schema(), &payload);
        if !schema_errors.is_empty() {
            return Err(EngineError::validation(schema_errors));
        }

        let mut config_builder = OrderConfig::builder(type_id, payload).priority(priority).meta(meta);
        if let Some(actor) = requested_by.clone() {
            config_builder = config_builder.requested_by(actor);
        }
        let order = Order::new(config_builder.build(), now_ms);

        let item_specs = contract.plan(&order).await;
        let item_configs = item_specs
            .into_iter()
            .map(|spec| {
                let mut builder =
                    wocp_core::ItemConfig::builder(order.id, spec.type_id, spec.input).max_attempts(spec.max_attempts);
                if let Some(parts_required) = spec.parts_required {
                    builder = builder.parts_required(parts_required);
                }
                builder.build()
            })
            .collect();

        let order_id = order.id;
        let response = json!({ "order_id": order_id.to_string() });
        let scope = format!("order:{order_id}");

        idempotency
            .guard("propose", &scope, client_key, now_ms, move |state| {
                state.do_propose(order, item_configs, requested_by, now_ms);
                Ok(response)
            })
            .await?;

        self.store
            .get_order(&order_id)
            .ok_or_else(|| EngineError::invalid_query("order vanished after propose"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wocp_core::{test_support::NoopType, EngineConfig};

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register(Arc::new(NoopType::new("t"))).unwrap();
        registry
    }

    #[tokio::test]
    async fn propose_materializes_one_item_from_plan() {
        let store = Store::new();
        let registry = registry();
        let config = EngineConfig::default();
        let guard = IdempotencyGuard::new(&store, &config);
        let allocator = Allocator::new(&store, &registry);

        let order = allocator
            .propose(
                &guard,
                "t",
                json!({"msg": "hi"}),
                None,
                Value::Null,
                0,
                Some("client-key-1"),
                1_000,
            )
            .await
            .unwrap();

        let items = store.with_state(|state| state.items_for_order(&order.id).len());
        assert_eq!(items, 1);
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let store = Store::new();
        let registry = registry();
        let config = EngineConfig::default();
        let guard = IdempotencyGuard::new(&store, &config);
        let allocator = Allocator::new(&store, &registry);

        let err = allocator
            .propose(&guard, "missing", json!({}), None, Value::Null, 0, Some("k"), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind.code(), "type-not-found");
    }
}
