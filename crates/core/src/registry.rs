// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The order-type contract and the process-wide registry that maps a type id
//! to its implementation (§4.4). This is the only coupling point between the
//! engine and domain logic — the engine itself is pure coordination.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::FieldError;
use crate::item::ItemId;
use crate::order::Order;

/// One item specification returned by `plan()`; materialized into a Queued
/// Item by the Allocator.
#[derive(Debug, Clone)]
pub struct ItemSpec {
    pub type_id: String,
    pub input: Value,
    pub max_attempts: u32,
    pub parts_required: Option<HashSet<String>>,
}

impl ItemSpec {
    pub fn new(type_id: impl Into<String>, input: Value) -> Self {
        Self { type_id: type_id.into(), input, max_attempts: 3, parts_required: None }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_parts_required(mut self, parts_required: HashSet<String>) -> Self {
        self.parts_required = Some(parts_required);
        self
    }
}

/// An opaque worker-visible result plus the structured field errors reported
/// against it, if any.
pub struct SubmissionOutcome {
    pub errors: Vec<FieldError>,
}

impl SubmissionOutcome {
    pub fn ok() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn rejected(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The only coupling between the engine and a domain order type (§4.4).
///
/// Implementations are plugged in at startup and looked up by `type_id()`
/// through [`TypeRegistry`]. Every hook is invoked by the Allocator/Executor
/// inside the transactional boundary named in the spec for that call; an
/// implementation must not perform its own side-channel persistence.
#[async_trait]
pub trait OrderTypeContract: Send + Sync {
    /// Stable identifier this type is registered under.
    fn type_id(&self) -> &str;

    /// Declarative payload schema consumed by the Allocator to validate
    /// proposals before an Order row is ever created.
    fn schema(&self) -> Value;

    /// Materializes one or more item specifications for a freshly-proposed
    /// order. Called inside the propose transaction (§4.5).
    async fn plan(&self, order: &Order) -> Vec<ItemSpec>;

    /// Validates a worker's full-result submission. A non-empty error list
    /// aborts the submit with `validation-failed`; the item is not mutated.
    async fn validate_submission(&self, item_id: &ItemId, result: &Value) -> SubmissionOutcome;

    /// Cross-item readiness predicate consulted by `approve` (§4.6).
    async fn ready_for_approval(&self, order: &Order) -> bool;

    /// Must be idempotent: repeated calls for the same order produce the
    /// same diff and perform the domain mutation at most once. An `Err`
    /// aborts the apply; the order remains `approved` and an
    /// `apply-failed` event is recorded with the message (§4.6 Failure
    /// semantics).
    async fn apply(&self, order: &Order) -> Result<Value, String>;

    /// Part keys required before `finalize(strict)` succeeds. Defaults to
    /// the item's own `parts_required`, so most types need not override it.
    async fn required_parts(&self, item_parts_required: Option<&HashSet<String>>) -> HashSet<String> {
        item_parts_required.cloned().unwrap_or_default()
    }

    /// Validates one partial submission before it is recorded as a part row.
    async fn validate_part(
        &self,
        _item_id: &ItemId,
        _part_key: &str,
        _payload: &Value,
        _seq: Option<u64>,
    ) -> SubmissionOutcome {
        SubmissionOutcome::ok()
    }

    /// Assembles the finalize-time candidate result from the latest
    /// validated parts. The default concatenates them into a JSON object
    /// keyed by part_key.
    async fn assemble(&self, _item_id: &ItemId, latest_parts: &HashMap<String, Value>) -> Value {
        Value::Object(latest_parts.clone().into_iter().collect())
    }

    /// Validates the assembled result produced by `assemble`.
    async fn validate_assembled(&self, _item_id: &ItemId, _result: &Value) -> SubmissionOutcome {
        SubmissionOutcome::ok()
    }

    /// Invoked immediately before `apply`. Errors from this hook abort
    /// apply and leave the order in `approved`.
    async fn before_apply(&self, _order: &Order) -> Result<(), String> {
        Ok(())
    }

    /// Invoked immediately after `apply` commits.
    async fn after_apply(&self, _order: &Order, _diff: &Value) {}
}

/// Lookup failure against the [`TypeRegistry`] (§4.4).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("order type already registered: {0}")]
    AlreadyRegistered(String),
    #[error("unknown order type: {0}")]
    NotFound(String),
}

/// Process-wide mapping `type_id -> OrderTypeContract`, populated at startup
/// and thereafter read-only (§9 Global mutable state).
#[derive(Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<dyn OrderTypeContract>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, contract: Arc<dyn OrderTypeContract>) -> Result<(), RegistryError> {
        let type_id = contract.type_id().to_string();
        if self.types.contains_key(&type_id) {
            return Err(RegistryError::AlreadyRegistered(type_id));
        }
        self.types.insert(type_id, contract);
        Ok(())
    }

    pub fn get(&self, type_id: &str) -> Result<Arc<dyn OrderTypeContract>, RegistryError> {
        self.types
            .get(type_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(type_id.to_string()))
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoType;

    #[async_trait]
    impl OrderTypeContract for EchoType {
        fn type_id(&self) -> &str {
            "echo"
        }

        fn schema(&self) -> Value {
            Value::Object(Default::default())
        }

        async fn plan(&self, order: &Order) -> Vec<ItemSpec> {
            vec![ItemSpec::new("echo", order.payload.clone())]
        }

        async fn validate_submission(&self, _item_id: &ItemId, _result: &Value) -> SubmissionOutcome {
            SubmissionOutcome::ok()
        }

        async fn ready_for_approval(&self, _order: &Order) -> bool {
            true
        }

        async fn apply(&self, _order: &Order) -> Result<Value, String> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = TypeRegistry::new();
        assert!(registry.register(Arc::new(EchoType)).is_ok());
        assert!(matches!(
            registry.register(Arc::new(EchoType)),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn unknown_type_lookup_fails() {
        let registry = TypeRegistry::new();
        assert!(matches!(registry.get("missing"), Err(RegistryError::NotFound(_))));
    }
}
