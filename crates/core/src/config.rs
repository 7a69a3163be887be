// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration surface (§6 Configuration surface). Every knob listed
//! here has a documented effect; nothing in the engine reads ambient
//! environment state directly.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Which `LeaseBackend` variant the engine is wired to. Callers never pick
/// per-request — the engine documents which one is in use (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseBackendKind {
    /// Transactional row lock on the Item row itself.
    DurableStore,
    /// Conditional-set-with-expiry against a fast key/value store.
    FastStore,
}

/// `lease.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub ttl_seconds: u64,
    pub heartbeat_every_seconds: u64,
    pub backend: LeaseBackendKind,
    pub max_leases_per_agent: Option<u32>,
    pub max_leases_per_type: Option<u32>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 600,
            heartbeat_every_seconds: 120,
            backend: LeaseBackendKind::DurableStore,
            max_leases_per_agent: None,
            max_leases_per_type: None,
        }
    }
}

/// `retry.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub default_max_attempts: u32,
    pub backoff_seconds: u64,
    pub jitter_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { default_max_attempts: 3, backoff_seconds: 30, jitter_seconds: 10 }
    }
}

/// `idempotency.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Endpoint identifiers that require a client-supplied key (§4.3
    /// Enforcement policy).
    pub enforce_on: HashSet<String>,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enforce_on: [
                "propose",
                "submit",
                "submit-part",
                "finalize",
                "approve",
                "reject",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl IdempotencyConfig {
    pub fn requires_key(&self, endpoint: &str) -> bool {
        self.enforce_on.contains(endpoint)
    }
}

/// `partials.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialsConfig {
    pub enabled: bool,
    pub max_parts_per_item: u32,
    pub max_payload_bytes: u64,
}

impl Default for PartialsConfig {
    fn default() -> Self {
        Self { enabled: true, max_parts_per_item: 64, max_payload_bytes: 1_048_576 }
    }
}

/// `maintenance.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub dead_letter_after_hours: u64,
    pub stale_order_threshold_hours: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { dead_letter_after_hours: 24, stale_order_threshold_hours: 72 }
    }
}

/// The full engine configuration. `state_machine.order_transitions` and
/// `state_machine.item_transitions` are intentionally not part of this
/// struct: they are declarative tables (`state_machine::order_transitions`,
/// `state_machine::item_transitions`) that may be overridden by constructing
/// a [`crate::state_machine::Transition`] table directly, not by config value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lease: LeaseConfig,
    pub retry: RetryConfig,
    pub idempotency: IdempotencyConfig,
    pub partials: PartialsConfig,
    pub maintenance: MaintenanceConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enforcement_set_matches_typical_set() {
        let config = IdempotencyConfig::default();
        assert!(config.requires_key("propose"));
        assert!(config.requires_key("approve"));
        assert!(!config.requires_key("get-order"));
    }

    #[test]
    fn default_lease_backend_is_durable_store() {
        assert_eq!(LeaseConfig::default().backend, LeaseBackendKind::DurableStore);
    }
}
