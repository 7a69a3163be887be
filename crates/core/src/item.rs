// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Item identifier, lifecycle state, and row type.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::order::OrderId;
use crate::part::PartStatus;

crate::define_id! {
    /// Unique identifier for a leasable item.
    pub struct ItemId("itm-");
}

/// Lifecycle state of an item. See `state_machine::item_transitions` for the
/// permitted edges between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Queued,
    Leased,
    InProgress,
    Submitted,
    Accepted,
    Rejected,
    Completed,
    Failed,
    DeadLettered,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Completed | ItemState::DeadLettered)
    }
}

crate::simple_display! {
    ItemState {
        Queued => "queued",
        Leased => "leased",
        InProgress => "in_progress",
        Submitted => "submitted",
        Accepted => "accepted",
        Rejected => "rejected",
        Completed => "completed",
        Failed => "failed",
        DeadLettered => "dead_lettered",
    }
}

/// Materialized summary of the latest validated part per `part_key`, kept on
/// the item row so readers never need to re-scan the part log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartsState {
    #[serde(default)]
    pub latest: HashMap<String, PartSummary>,
}

impl PartsState {
    pub fn missing_keys(&self, required: &HashSet<String>) -> Vec<String> {
        let mut missing: Vec<String> = required
            .iter()
            .filter(|key| {
                !self
                    .latest
                    .get(key.as_str())
                    .is_some_and(|s| s.status == PartStatus::Validated)
            })
            .cloned()
            .collect();
        missing.sort();
        missing
    }
}

/// Pointer to the latest validated/rejected part row for a given key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSummary {
    pub part_id: String,
    pub status: PartStatus,
    pub checksum: String,
    pub created_at_ms: u64,
}

/// Configuration for creating a new item (produced by an order type's
/// `plan()` during Allocator.plan).
#[derive(Debug, Clone)]
pub struct ItemConfig {
    pub id: ItemId,
    pub order_id: OrderId,
    pub type_id: String,
    pub input: Value,
    pub max_attempts: u32,
    pub parts_required: Option<HashSet<String>>,
}

impl ItemConfig {
    pub fn builder(order_id: OrderId, type_id: impl Into<String>, input: Value) -> ItemConfigBuilder {
        ItemConfigBuilder {
            id: ItemId::new(),
            order_id,
            type_id: type_id.into(),
            input,
            max_attempts: 3,
            parts_required: None,
        }
    }
}

pub struct ItemConfigBuilder {
    id: ItemId,
    order_id: OrderId,
    type_id: String,
    input: Value,
    max_attempts: u32,
    parts_required: Option<HashSet<String>>,
}

impl ItemConfigBuilder {
    crate::setters! {
        set {
            max_attempts: u32,
        }
        option {
            parts_required: HashSet<String>,
        }
    }

    pub fn build(self) -> ItemConfig {
        ItemConfig {
            id: self.id,
            order_id: self.order_id,
            type_id: self.type_id,
            input: self.input,
            max_attempts: self.max_attempts,
            parts_required: self.parts_required,
        }
    }
}

/// An item row (§3 Item entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub order_id: OrderId,
    #[serde(rename = "type")]
    pub type_id: String,
    pub state: ItemState,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembled_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts_required: Option<HashSet<String>>,
    #[serde(default)]
    pub parts_state: PartsState,
    #[serde(default)]
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leased_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Item {
    pub fn new(config: ItemConfig, now_ms: u64) -> Self {
        Self {
            id: config.id,
            order_id: config.order_id,
            type_id: config.type_id,
            state: ItemState::Queued,
            input: config.input,
            result: None,
            assembled_result: None,
            parts_required: config.parts_required,
            parts_state: PartsState::default(),
            attempts: 0,
            max_attempts: config.max_attempts,
            leased_by: None,
            lease_expires_at_ms: None,
            last_heartbeat_at_ms: None,
            accepted_at_ms: None,
            error: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// The lease holder is the item's effective owner while it is leased or
    /// in progress; anyone else attempting to mutate it gets `lease-error`.
    pub fn is_leased_by(&self, agent_id: &str, now_ms: u64) -> bool {
        self.leased_by.as_deref() == Some(agent_id) && !self.lease_is_expired(now_ms)
    }

    pub fn lease_is_expired(&self, now_ms: u64) -> bool {
        match self.lease_expires_at_ms {
            Some(expires) => now_ms >= expires,
            None => true,
        }
    }
}

crate::builder! {
    pub struct ItemBuilder => Item {
        into {
            type_id: String = "test-item-type",
        }
        set {
            state: ItemState = ItemState::Queued,
            input: Value = Value::Null,
            parts_state: PartsState = PartsState::default(),
            attempts: u32 = 0,
            max_attempts: u32 = 3,
            created_at_ms: u64 = 0,
            updated_at_ms: u64 = 0,
        }
        option {
            result: Value = None,
            assembled_result: Value = None,
            parts_required: HashSet<String> = None,
            leased_by: String = None,
            lease_expires_at_ms: u64 = None,
            last_heartbeat_at_ms: u64 = None,
            accepted_at_ms: u64 = None,
            error: Value = None,
        }
        computed {
            id: ItemId = ItemId::new(),
            order_id: OrderId = OrderId::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_reports_unvalidated_and_absent() {
        let mut parts = PartsState::default();
        parts.latest.insert(
            "a".to_string(),
            PartSummary {
                part_id: "prt-a".to_string(),
                status: PartStatus::Validated,
                checksum: "x".to_string(),
                created_at_ms: 1,
            },
        );
        let required: HashSet<String> = ["a", "b"].into_iter().map(String::from).collect();
        assert_eq!(parts.missing_keys(&required), vec!["b".to_string()]);
    }

    #[test]
    fn lease_expiry_without_expiry_is_treated_as_expired() {
        let item = ItemBuilder::default().build();
        assert!(item.lease_is_expired(0));
        assert!(!item.is_leased_by("agent-a", 0));
    }

    #[test]
    fn lease_ownership_checks_agent_and_expiry() {
        let item = ItemBuilder::default()
            .leased_by("agent-a")
            .lease_expires_at_ms(1_000u64)
            .build();
        assert!(item.is_leased_by("agent-a", 500));
        assert!(!item.is_leased_by("agent-a", 1_000));
        assert!(!item.is_leased_by("agent-b", 500));
    }
}
