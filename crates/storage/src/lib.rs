// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wocp-storage: the materialized, mutex-guarded backing store. Every
//! multi-row mutation named in the spec (transition + event, propose's
//! four-way insert, apply's item cascade) is performed as one critical
//! section under a single lock, which is this engine's stand-in for a
//! transactional backing store.

pub mod idempotency;
pub mod query;
pub mod state;
pub mod store;

pub use idempotency::IdempotencyOutcome;
pub use query::{ListOrdersQuery, ListOrdersResult, OrderFilter, SortField, SortOrder};
pub use state::MaterializedState;
pub use store::Store;
