// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test fixtures consumed by `wocp-storage` and `wocp-engine`'s test
//! suites. Gated behind `test-support` so downstream crates can depend on it
//! without pulling test-only code into release builds.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::item::ItemId;
use crate::order::Order;
use crate::registry::{ItemSpec, OrderTypeContract, SubmissionOutcome};

/// A minimal order type used across test suites: `plan()` returns one item
/// whose input is the order payload verbatim; `apply()` echoes the payload
/// back as the diff. `ready_for_approval` and validation always succeed
/// unless explicitly configured otherwise via [`NoopType::failing`].
pub struct NoopType {
    type_id: String,
    parts_required: Option<HashSet<String>>,
    always_reject_submission: bool,
    always_fail_apply: bool,
}

impl NoopType {
    pub fn new(type_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            parts_required: None,
            always_reject_submission: false,
            always_fail_apply: false,
        }
    }

    pub fn with_parts_required(mut self, keys: impl IntoIterator<Item = &'static str>) -> Self {
        self.parts_required = Some(keys.into_iter().map(String::from).collect());
        self
    }

    pub fn failing(mut self) -> Self {
        self.always_reject_submission = true;
        self
    }

    /// Makes `apply()` always return `Err`, for exercising the
    /// apply-failed path (§4.6 Failure semantics).
    pub fn failing_apply(mut self) -> Self {
        self.always_fail_apply = true;
        self
    }
}

#[async_trait]
impl OrderTypeContract for NoopType {
    fn type_id(&self) -> &str {
        &self.type_id
    }

    fn schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn plan(&self, order: &Order) -> Vec<ItemSpec> {
        let mut spec = ItemSpec::new(self.type_id.clone(), order.payload.clone());
        if let Some(keys) = &self.parts_required {
            spec = spec.with_parts_required(keys.clone());
        }
        vec![spec]
    }

    async fn validate_submission(&self, _item_id: &ItemId, _result: &Value) -> SubmissionOutcome {
        if self.always_reject_submission {
            SubmissionOutcome::rejected(vec![crate::error::FieldError::new(
                "result",
                "rejected by test fixture",
            )])
        } else {
            SubmissionOutcome::ok()
        }
    }

    async fn ready_for_approval(&self, _order: &Order) -> bool {
        true
    }

    async fn apply(&self, order: &Order) -> Result<Value, String> {
        if self.always_fail_apply {
            return Err("rejected by test fixture".to_string());
        }
        Ok(json!({ "echoed": order.payload }))
    }

    async fn required_parts(&self, item_parts_required: Option<&HashSet<String>>) -> HashSet<String> {
        self.parts_required.clone().or_else(|| item_parts_required.cloned()).unwrap_or_default()
    }

    async fn assemble(&self, _item_id: &ItemId, latest_parts: &HashMap<String, Value>) -> Value {
        Value::Object(latest_parts.clone().into_iter().collect())
    }
}

/// Builds a [`TypeRegistry`](crate::registry::TypeRegistry) pre-populated
/// with a single [`NoopType`] registered as `"test-type"`.
pub fn registry_with_noop_type() -> crate::registry::TypeRegistry {
    let mut registry = crate::registry::TypeRegistry::new();
    let _ = registry.register(Arc::new(NoopType::new("test-type")));
    registry
}
