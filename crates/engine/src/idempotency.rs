// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `IdempotencyGuard` (§4.3): the enforcement policy layered on top of
//! `wocp-storage`'s `(scope, key_hash)` reservation map.

use serde_json::Value;

use wocp_core::{salted_hash, EngineConfig, EngineError};
use wocp_storage::{MaterializedState, Store};

pub struct IdempotencyGuard<'a> {
    store: &'a Store,
    config: &'a EngineConfig,
}

impl<'a> IdempotencyGuard<'a> {
    pub fn new(store: &'a Store, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Read-only lookup of a settled response for `(endpoint, scope,
    /// client_key)`, without reserving. For endpoints whose operation body
    /// awaits a type's async hooks and so cannot run as a `guard` closure
    /// (`approve`): callers peek first and skip straight to returning the
    /// cached value on a hit, precondition checks included.
    pub fn peek(&self, endpoint: &str, scope: &str, client_key: Option<&str>) -> Option<Value> {
        let key = client_key?;
        let key_hash = salted_hash(key);
        let full_scope = format!("{endpoint}:{scope}");
        self.store.peek_idempotency(&full_scope, &key_hash)
    }

    /// Whether `endpoint` is in the configured `enforce_on` set (§4.3
    /// Enforcement policy).
    pub fn requires_key(&self, endpoint: &str) -> bool {
        self.config.idempotency.requires_key(endpoint)
    }

    /// Runs `op` once per `(endpoint, client_key)`, replaying the cached
    /// response on retry. `endpoint` both selects the enforcement policy
    /// (§4.3 Enforcement policy) and is folded into the dedup scope, so the
    /// same client key may be legally reused across different endpoints.
    pub async fn guard<F>(
        &self,
        endpoint: &str,
        scope: &str,
        client_key: Option<&str>,
        now_ms: u64,
        op: F,
    ) -> Result<Value, EngineError>
    where
        F: FnOnce(&mut MaterializedState) -> Result<Value, EngineError>,
    {
        match client_key {
            None => {
                if self.config.idempotency.requires_key(endpoint) {
                    return Err(EngineError::idempotency_required(endpoint));
                }
                self.store.run_once(op)
            }
            Some(key) => {
                let key_hash = salted_hash(key);
                let full_scope = format!("{endpoint}:{scope}");
                self.store.guarded(&full_scope, &key_hash, now_ms, op).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_key_on_required_endpoint_is_rejected() {
        let store = Store::new();
        let config = EngineConfig::default();
        let guard = IdempotencyGuard::new(&store, &config);
        let err = guard
            .guard("propose", "order:new", None, 0, |_| Ok(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.kind.code(), "idempotency-required");
    }

    #[tokio::test]
    async fn replay_with_same_key_returns_cached_response() {
        let store = Store::new();
        let config = EngineConfig::default();
        let guard = IdempotencyGuard::new(&store, &config);
        let first = guard
            .guard("submit", "item:1", Some("client-key"), 0, |_| Ok(json!({"call": 1})))
            .await
            .unwrap();
        let second = guard
            .guard("submit", "item:1", Some("client-key"), 0, |_| Ok(json!({"call": 2})))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first, json!({"call": 1}));
    }
}
