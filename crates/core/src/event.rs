// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The audit event stream. Every state transition and every notable
//! non-transitioning occurrence (heartbeat, lease-expired, released) is
//! recorded as one immutable `Event` row.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::ActorRef;
use crate::item::ItemId;
use crate::order::OrderId;

crate::define_id! {
    /// Unique, monotonically-assigned identifier for an event row.
    pub struct EventId("evt-");
}

/// The stable event-name vocabulary from the external-interface contract (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    Proposed,
    Planned,
    CheckedOut,
    Leased,
    InProgress,
    Heartbeat,
    Submitted,
    PartSubmitted,
    PartValidated,
    PartRejected,
    Finalized,
    Accepted,
    Approved,
    Applied,
    ApplyFailed,
    Rejected,
    LeaseExpired,
    Released,
    Failed,
    Completed,
    DeadLettered,
    /// Diagnostic: a non-terminal order has exceeded
    /// `maintenance.stale_order_threshold_hours` (§4.8 Stale detection).
    /// Never a state-machine transition; never mutates the order.
    StaleDetected,
}

crate::simple_display! {
    EventName {
        Proposed => "proposed",
        Planned => "planned",
        CheckedOut => "checked-out",
        Leased => "leased",
        InProgress => "in-progress",
        Heartbeat => "heartbeat",
        Submitted => "submitted",
        PartSubmitted => "part-submitted",
        PartValidated => "part-validated",
        PartRejected => "part-rejected",
        Finalized => "finalized",
        Accepted => "accepted",
        Approved => "approved",
        Applied => "applied",
        ApplyFailed => "apply-failed",
        Rejected => "rejected",
        LeaseExpired => "lease-expired",
        Released => "released",
        Failed => "failed",
        Completed => "completed",
        DeadLettered => "dead-lettered",
        StaleDetected => "stale-detected",
    }
}

/// An immutable audit event row (§3 Event entity).
///
/// An event without an `item_id` is an order-level event; with one, it is an
/// item-level event still linked to the owning order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<ItemId>,
    pub event: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at_ms: u64,
}

impl Event {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        item_id: Option<ItemId>,
        event: EventName,
        actor: Option<ActorRef>,
        payload: Option<Value>,
        diff: Option<Value>,
        message: Option<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: EventId::new(),
            order_id,
            item_id,
            event,
            actor,
            payload,
            diff,
            message,
            created_at_ms: now_ms,
        }
    }
}

crate::builder! {
    pub struct EventBuilder => Event {
        set {
            event: EventName = EventName::Proposed,
            created_at_ms: u64 = 0,
        }
        option {
            item_id: ItemId = None,
            actor: ActorRef = None,
            payload: Value = None,
            diff: Value = None,
            message: String = None,
        }
        computed {
            id: EventId = EventId::new(),
            order_id: OrderId = OrderId::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_stable_vocabulary() {
        assert_eq!(EventName::CheckedOut.to_string(), "checked-out");
        assert_eq!(EventName::PartRejected.to_string(), "part-rejected");
        assert_eq!(EventName::DeadLettered.to_string(), "dead-lettered");
        assert_eq!(EventName::StaleDetected.to_string(), "stale-detected");
    }

    #[test]
    fn order_level_event_has_no_item_id() {
        let event = EventBuilder::default().event(EventName::Proposed).build();
        assert!(event.item_id.is_none());
    }
}
