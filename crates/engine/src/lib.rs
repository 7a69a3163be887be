// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wocp-engine: the operations surface (§4) atop `wocp-storage`'s
//! transactional facade — `Allocator::propose`, `Executor::{submit,
//! submit_part, finalize, approve, reject, fail}`, `LeaseService::{checkout,
//! heartbeat, release, reclaim_expired}`, and the `Maintenance` driver.

pub mod allocator;
pub mod executor;
pub mod idempotency;
pub mod lease;
pub mod lease_service;
pub mod maintenance;
pub mod schema;

pub use allocator::Allocator;
pub use executor::{Executor, FinalizeMode};
pub use idempotency::IdempotencyGuard;
pub use lease::{DurableLeaseBackend, FastLeaseBackend, LeaseBackend};
pub use lease_service::{CheckoutFilters, LeaseService};
pub use maintenance::{Maintenance, MaintenanceReport};
pub use schema::validate as validate_schema;
