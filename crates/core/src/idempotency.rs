// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotency records — `(scope, key_hash)` reservations that make a mutating
//! operation safe to retry with the same client-supplied key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

crate::define_id! {
    /// Unique identifier for an idempotency record.
    pub struct IdempotencyRecordId("idm-");
}

/// Salt prepended to the client key before hashing, so stored hashes cannot
/// be reversed into (or confused with) hashes computed elsewhere for the
/// same input.
const SALT: &str = "wocp-idempotency-v1";

/// Hash a client-supplied idempotency key for storage. Stable across
/// processes: the same `client_key` always yields the same `key_hash`.
pub fn salted_hash(client_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SALT.as_bytes());
    hasher.update(b":");
    hasher.update(client_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// An idempotency reservation (§3 IdempotencyRecord entity, §4.3).
///
/// `(scope, key_hash)` is unique. The first caller to reserve a key commits
/// its `response_snapshot` once the operation completes; every later caller
/// with the same key in the same scope gets that snapshot back instead of
/// re-running the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub id: IdempotencyRecordId,
    pub scope: String,
    pub key_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_snapshot: Option<Value>,
    pub created_at_ms: u64,
}

impl IdempotencyRecord {
    pub fn reserve(scope: impl Into<String>, key_hash: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: IdempotencyRecordId::new(),
            scope: scope.into(),
            key_hash: key_hash.into(),
            response_snapshot: None,
            created_at_ms: now_ms,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.response_snapshot.is_some()
    }
}

crate::builder! {
    pub struct IdempotencyRecordBuilder => IdempotencyRecord {
        into {
            scope: String = "order.propose",
            key_hash: String = "deadbeef",
        }
        set {
            created_at_ms: u64 = 0,
        }
        option {
            response_snapshot: Value = None,
        }
        computed {
            id: IdempotencyRecordId = IdempotencyRecordId::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salted_hash_is_stable_and_key_sensitive() {
        let a = salted_hash("client-key-1");
        let b = salted_hash("client-key-1");
        let c = salted_hash("client-key-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fresh_reservation_is_unsettled() {
        let record = IdempotencyRecord::reserve("order.propose", salted_hash("k"), 10);
        assert!(!record.is_settled());
    }
}
