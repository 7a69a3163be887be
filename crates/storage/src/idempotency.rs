// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage-level half of the idempotency guard (§4.3): the atomic
//! insert-or-read against the `(scope, key_hash)` unique index. The policy
//! decision of what to do with the operation's return value lives in
//! `wocp-engine`'s `IdempotencyGuard`; this module only owns the map.

use serde_json::Value;
use wocp_core::IdempotencyRecord;

use crate::state::MaterializedState;

/// Result of attempting to reserve `(scope, key_hash)`.
pub enum IdempotencyOutcome {
    /// No record existed; one was inserted with a null snapshot. The caller
    /// now owns running the operation and must call
    /// [`Store::settle_idempotency`](crate::store::Store::settle_idempotency).
    Reserved,
    /// A record exists and already has a response snapshot: replay it
    /// verbatim instead of re-running the operation.
    CachedHit(Value),
    /// A record exists but has no snapshot yet — another caller is
    /// currently executing the guarded operation (§4.3 step 4b).
    Conflict,
}

impl MaterializedState {
    pub(crate) fn reserve_idempotency(
        &mut self,
        scope: &str,
        key_hash: &str,
        now_ms: u64,
    ) -> IdempotencyOutcome {
        let map_key = (scope.to_string(), key_hash.to_string());
        if let Some(existing) = self.idempotency.get(&map_key) {
            return match &existing.response_snapshot {
                Some(snapshot) => IdempotencyOutcome::CachedHit(snapshot.clone()),
                None => IdempotencyOutcome::Conflict,
            };
        }
        self.idempotency.insert(map_key, IdempotencyRecord::reserve(scope, key_hash, now_ms));
        IdempotencyOutcome::Reserved
    }

    pub(crate) fn settle_idempotency(&mut self, scope: &str, key_hash: &str, response: Value) {
        let map_key = (scope.to_string(), key_hash.to_string());
        if let Some(record) = self.idempotency.get_mut(&map_key) {
            record.response_snapshot = Some(response);
        }
    }

    /// Read-only lookup of a settled response, used by callers (`approve`)
    /// whose operation body cannot run inside the lock because it awaits a
    /// type's async hooks. Does not reserve.
    pub(crate) fn peek_idempotency(&self, scope: &str, key_hash: &str) -> Option<Value> {
        let map_key = (scope.to_string(), key_hash.to_string());
        self.idempotency.get(&map_key).and_then(|record| record.response_snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reservation_succeeds_then_replays_after_settle() {
        let mut state = MaterializedState::new();
        assert!(matches!(
            state.reserve_idempotency("submit", "hash-1", 0),
            IdempotencyOutcome::Reserved
        ));
        assert!(matches!(
            state.reserve_idempotency("submit", "hash-1", 0),
            IdempotencyOutcome::Conflict
        ));
        state.settle_idempotency("submit", "hash-1", serde_json::json!({"ok": true}));
        match state.reserve_idempotency("submit", "hash-1", 0) {
            IdempotencyOutcome::CachedHit(value) => {
                assert_eq!(value, serde_json::json!({"ok": true}));
            }
            _ => panic!("expected cached hit"),
        }
    }

    #[test]
    fn distinct_scopes_do_not_collide() {
        let mut state = MaterializedState::new();
        assert!(matches!(
            state.reserve_idempotency("submit", "hash-1", 0),
            IdempotencyOutcome::Reserved
        ));
        assert!(matches!(
            state.reserve_idempotency("approve", "hash-1", 0),
            IdempotencyOutcome::Reserved
        ));
    }
}
