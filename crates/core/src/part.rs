// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Item part rows — append-only incremental contributions to an item's result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FieldError;
use crate::item::ItemId;

crate::define_id! {
    /// Unique identifier for an item part row.
    pub struct PartId("prt-");
}

/// Status of a single part row. Parts are append-only: a later submission
/// for the same `(item_id, part_key)` is a new row, never an in-place update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    Draft,
    Validated,
    Rejected,
}

crate::simple_display! {
    PartStatus {
        Draft => "draft",
        Validated => "validated",
        Rejected => "rejected",
    }
}

/// An item part row (§3 ItemPart entity).
///
/// Invariant: `(item_id, part_key, seq)` is unique. "Latest part per
/// `part_key`" is the row with the largest `created_at_ms`, ties broken by
/// `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPart {
    pub id: PartId,
    pub item_id: ItemId,
    pub part_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub status: PartStatus,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    pub checksum: String,
    pub submitted_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key_hash: Option<String>,
    pub created_at_ms: u64,
}

crate::builder! {
    pub struct ItemPartBuilder => ItemPart {
        into {
            part_key: String = "a",
            submitted_by: String = "agent-test",
            checksum: String = "deadbeef",
        }
        set {
            status: PartStatus = PartStatus::Validated,
            payload: Value = Value::Null,
            errors: Vec<FieldError> = Vec::new(),
            created_at_ms: u64 = 0,
        }
        option {
            seq: u64 = None,
            evidence: Value = None,
            notes: String = None,
            idempotency_key_hash: String = None,
        }
        computed {
            id: PartId = PartId::new(),
            item_id: ItemId = ItemId::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_stable_names() {
        assert_eq!(PartStatus::Validated.to_string(), "validated");
        assert_eq!(PartStatus::Rejected.to_string(), "rejected");
    }
}
