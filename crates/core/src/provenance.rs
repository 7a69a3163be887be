// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provenance rows — metadata about the agent, fingerprint, and idempotency
//! key associated with an operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::item::ItemId;
use crate::order::OrderId;

crate::define_id! {
    /// Unique identifier for a provenance row.
    pub struct ProvenanceId("prv-");
}

/// A provenance row (§3 Provenance entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub id: ProvenanceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    /// Globally unique when present (the client-supplied idempotency key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
    pub created_at_ms: u64,
}

impl Provenance {
    /// A provenance row tying a client-supplied idempotency key to the agent
    /// that made the call (§3 Provenance entity).
    pub fn new(
        order_id: Option<OrderId>,
        item_id: Option<ItemId>,
        idempotency_key: Option<String>,
        agent_name: Option<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ProvenanceId::new(),
            order_id,
            item_id,
            idempotency_key,
            agent_name,
            agent_version: None,
            request_fingerprint: None,
            extra: None,
            created_at_ms: now_ms,
        }
    }
}
