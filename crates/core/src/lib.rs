// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wocp-core: data model, state-machine tables, and the order-type contract
//! for the work-order control plane.

pub mod macros;

pub mod actor;
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod idempotency;
pub mod item;
pub mod order;
pub mod part;
pub mod provenance;
pub mod registry;
pub mod state_machine;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use actor::{ActorRef, ActorType};
pub use config::{
    EngineConfig, IdempotencyConfig, LeaseConfig, MaintenanceConfig, PartialsConfig, RetryConfig,
};
pub use error::{EngineError, ErrorKind, FieldError, LeaseErrorKind};
pub use event::{Event, EventId, EventName};
pub use id::short;
pub use idempotency::{salted_hash, IdempotencyRecord, IdempotencyRecordId};
#[cfg(any(test, feature = "test-support"))]
pub use item::ItemBuilder;
pub use item::{Item, ItemConfig, ItemConfigBuilder, ItemId, ItemState, PartSummary, PartsState};
#[cfg(any(test, feature = "test-support"))]
pub use order::OrderBuilder;
pub use order::{Order, OrderConfig, OrderConfigBuilder, OrderId, OrderState};
#[cfg(any(test, feature = "test-support"))]
pub use part::ItemPartBuilder;
pub use part::{ItemPart, PartId, PartStatus};
pub use provenance::{Provenance, ProvenanceId};
pub use registry::{ItemSpec, OrderTypeContract, RegistryError, TypeRegistry};
pub use state_machine::{item_transitions, order_transitions, Transition};
