// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Order identifier, lifecycle state, and row type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::ActorRef;

crate::define_id! {
    /// Unique identifier for an order.
    pub struct OrderId("ord-");
}

/// Lifecycle state of an order. See `state_machine::order_transitions` for
/// the permitted edges between these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Queued,
    CheckedOut,
    InProgress,
    Submitted,
    Approved,
    Applied,
    Rejected,
    Failed,
    Completed,
    DeadLettered,
}

impl OrderState {
    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Completed | OrderState::DeadLettered)
    }
}

crate::simple_display! {
    OrderState {
        Queued => "queued",
        CheckedOut => "checked_out",
        InProgress => "in_progress",
        Submitted => "submitted",
        Approved => "approved",
        Applied => "applied",
        Rejected => "rejected",
        Failed => "failed",
        Completed => "completed",
        DeadLettered => "dead_lettered",
    }
}

/// Configuration for creating a new order (used by the Allocator).
#[derive(Debug, Clone)]
pub struct OrderConfig {
    pub id: OrderId,
    pub type_id: String,
    pub priority: i64,
    pub payload: Value,
    pub meta: Value,
    pub requested_by: Option<ActorRef>,
}

impl OrderConfig {
    pub fn builder(type_id: impl Into<String>, payload: Value) -> OrderConfigBuilder {
        OrderConfigBuilder {
            id: OrderId::new(),
            type_id: type_id.into(),
            priority: 0,
            payload,
            meta: Value::Null,
            requested_by: None,
        }
    }
}

pub struct OrderConfigBuilder {
    id: OrderId,
    type_id: String,
    priority: i64,
    payload: Value,
    meta: Value,
    requested_by: Option<ActorRef>,
}

impl OrderConfigBuilder {
    crate::setters! {
        set {
            priority: i64,
            meta: Value,
        }
        option {
            requested_by: ActorRef,
        }
    }

    pub fn build(self) -> OrderConfig {
        OrderConfig {
            id: self.id,
            type_id: self.type_id,
            priority: self.priority,
            payload: self.payload,
            meta: self.meta,
            requested_by: self.requested_by,
        }
    }
}

/// An order row (§3 Order entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(rename = "type")]
    pub type_id: String,
    pub state: OrderState,
    pub priority: i64,
    pub payload: Value,
    #[serde(default)]
    pub meta: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<ActorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    pub last_transitioned_at_ms: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Order {
    pub fn new(config: OrderConfig, now_ms: u64) -> Self {
        Self {
            id: config.id,
            type_id: config.type_id,
            state: OrderState::Queued,
            priority: config.priority,
            payload: config.payload,
            meta: config.meta,
            requested_by: config.requested_by,
            applied_at_ms: None,
            completed_at_ms: None,
            last_transitioned_at_ms: now_ms,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

crate::builder! {
    pub struct OrderBuilder => Order {
        into {
            type_id: String = "test-type",
        }
        set {
            state: OrderState = OrderState::Queued,
            priority: i64 = 0,
            payload: Value = Value::Null,
            meta: Value = Value::Null,
            last_transitioned_at_ms: u64 = 0,
            created_at_ms: u64 = 0,
            updated_at_ms: u64 = 0,
        }
        option {
            requested_by: ActorRef = None,
            applied_at_ms: u64 = None,
            completed_at_ms: u64 = None,
        }
        computed {
            id: OrderId = OrderId::new(),
        }
    }
}
