// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `LeaseBackend` (§4.2): the pluggable exclusive-ownership primitive
//! underneath `LeaseService`. Two variants are provided; an engine is wired
//! to exactly one, never chosen per-request.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use wocp_core::ItemId;
use wocp_storage::Store;

/// Acquire/extend/release/reclaim exclusive ownership of a key with a TTL.
/// Implementations must make `acquire`/`extend`/`release` atomic against
/// concurrent callers.
#[async_trait]
pub trait LeaseBackend: Send + Sync {
    /// Succeeds iff no live lease exists for `key`. On success the key is
    /// held by `owner` until `now_ms + ttl_seconds * 1000`.
    async fn acquire(&self, key: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool;

    /// Succeeds iff `key` is currently held by `owner`; resets expiration.
    async fn extend(&self, key: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool;

    /// Succeeds iff `key` is held by `owner`; removes it.
    async fn release(&self, key: &ItemId, owner: &str) -> bool;

    /// For stores that do not auto-expire, removes `keys` whose leases are
    /// expired as of `now_ms`, returning how many were removed. For
    /// self-expiring stores this is a no-op that always returns 0.
    async fn reclaim(&self, keys: &[ItemId], now_ms: u64) -> usize;
}

/// Uses a transactional CAS on the Item row itself; lease fields live on the
/// Item. Simpler, higher latency (~50ms in a real backing store), same
/// transactional guarantees as the rest of the system.
pub struct DurableLeaseBackend {
    store: Arc<Store>,
}

impl DurableLeaseBackend {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LeaseBackend for DurableLeaseBackend {
    async fn acquire(&self, key: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        self.store.cas_acquire_item_lease(key, owner, ttl_seconds, now_ms)
    }

    async fn extend(&self, key: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        self.store.cas_extend_item_lease(key, owner, ttl_seconds, now_ms)
    }

    async fn release(&self, key: &ItemId, owner: &str) -> bool {
        self.store.cas_release_item_lease(key, owner)
    }

    /// The item row itself is the source of truth: expiry is a read-time
    /// check, never a separate reclaim pass.
    async fn reclaim(&self, _keys: &[ItemId], _now_ms: u64) -> usize {
        0
    }
}

struct LeaseEntry {
    owner: String,
    expires_at_ms: u64,
}

/// An in-process conditional-set-with-expiry store standing in for a fast
/// external key/value store (native TTL, ~5ms latency). The Item row is
/// still mirrored with `leased_by`/`lease_expires_at` for observability by
/// `LeaseService`, but authority lives entirely in this map.
#[derive(Default)]
pub struct FastLeaseBackend {
    leases: Mutex<HashMap<ItemId, LeaseEntry>>,
}

impl FastLeaseBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &LeaseEntry, now_ms: u64) -> bool {
        entry.expires_at_ms > now_ms
    }
}

#[async_trait]
impl LeaseBackend for FastLeaseBackend {
    async fn acquire(&self, key: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        let mut leases = self.leases.lock();
        if let Some(existing) = leases.get(key) {
            if Self::is_live(existing, now_ms) {
                return false;
            }
        }
        leases.insert(
            *key,
            LeaseEntry { owner: owner.to_string(), expires_at_ms: now_ms + ttl_seconds * 1000 },
        );
        true
    }

    async fn extend(&self, key: &ItemId, owner: &str, ttl_seconds: u64, now_ms: u64) -> bool {
        let mut leases = self.leases.lock();
        match leases.get_mut(key) {
            Some(entry) if entry.owner == owner && Self::is_live(entry, now_ms) => {
                entry.expires_at_ms = now_ms + ttl_seconds * 1000;
                true
            }
            _ => false,
        }
    }

    async fn release(&self, key: &ItemId, owner: &str) -> bool {
        let mut leases = self.leases.lock();
        match leases.get(key) {
            Some(entry) if entry.owner == owner => {
                leases.remove(key);
                true
            }
            _ => false,
        }
    }

    async fn reclaim(&self, keys: &[ItemId], now_ms: u64) -> usize {
        let mut leases = self.leases.lock();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = leases.get(key) {
                if !Self::is_live(entry, now_ms) {
                    leases.remove(key);
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fast_backend_acquire_extend_release_roundtrip() {
        let backend = FastLeaseBackend::new();
        let key = ItemId::new();
        assert!(backend.acquire(&key, "agent-a", 60, 0).await);
        assert!(!backend.acquire(&key, "agent-b", 60, 0).await);
        assert!(backend.extend(&key, "agent-a", 60, 30_000).await);
        assert!(!backend.release(&key, "agent-b").await);
        assert!(backend.release(&key, "agent-a").await);
        assert!(backend.acquire(&key, "agent-b", 60, 30_000).await);
    }

    #[tokio::test]
    async fn fast_backend_reclaim_removes_only_expired() {
        let backend = FastLeaseBackend::new();
        let key = ItemId::new();
        backend.acquire(&key, "agent-a", 10, 0).await;
        assert_eq!(backend.reclaim(&[key], 5_000).await, 0);
        assert_eq!(backend.reclaim(&[key], 20_000).await, 1);
        assert!(backend.acquire(&key, "agent-b", 10, 20_000).await);
    }
}
