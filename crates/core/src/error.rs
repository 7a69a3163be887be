// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy every fallible engine operation reports through.
//!
//! Every mutating operation either completes successfully or returns exactly
//! one [`EngineError`] without side effects on the entity involved (the
//! idempotency record may still be created as a reservation, see
//! `wocp-engine`'s `IdempotencyGuard`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::OrderState;

/// A single field-level validation error, used by `validation-failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Why a lease operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseErrorKind {
    /// Another owner currently holds a live lease on the key.
    Conflict,
    /// The caller's lease has expired.
    Expired,
    /// The caller does not hold the lease at all.
    NotHolder,
}

crate::simple_display! {
    LeaseErrorKind {
        Conflict => "conflict",
        Expired => "expired",
        NotHolder => "not_holder",
    }
}

/// The stable error-kind vocabulary from the external-interface contract (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ErrorKind {
    #[serde(rename = "validation-failed")]
    ValidationFailed { errors: Vec<FieldError> },

    #[serde(rename = "illegal-transition")]
    IllegalTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[serde(rename = "lease-error")]
    LeaseError {
        reason: LeaseErrorKind,
        holder: Option<String>,
        caller: String,
        expired_at_ms: Option<u64>,
    },

    #[serde(rename = "idempotency-required")]
    IdempotencyRequired { scope: String },

    #[serde(rename = "idempotency-conflict")]
    IdempotencyConflict { scope: String },

    #[serde(rename = "type-not-found")]
    TypeNotFound { type_id: String },

    #[serde(rename = "not-ready")]
    NotReady { order_state: OrderState },

    #[serde(rename = "no-items-available")]
    NoItemsAvailable,

    #[serde(rename = "invalid-query")]
    InvalidQuery { message: String },
}

impl ErrorKind {
    /// The stable code string from §6/§7.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ValidationFailed { .. } => "validation-failed",
            ErrorKind::IllegalTransition { .. } => "illegal-transition",
            ErrorKind::LeaseError { .. } => "lease-error",
            ErrorKind::IdempotencyRequired { .. } => "idempotency-required",
            ErrorKind::IdempotencyConflict { .. } => "idempotency-conflict",
            ErrorKind::TypeNotFound { .. } => "type-not-found",
            ErrorKind::NotReady { .. } => "not-ready",
            ErrorKind::NoItemsAvailable => "no-items-available",
            ErrorKind::InvalidQuery { .. } => "invalid-query",
        }
    }
}

/// Top-level engine error: a stable code plus a human-readable message.
///
/// Validation, lease, and transition failures are recovered at the engine
/// boundary — the entity involved is never mutated when this is returned.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        let message = if errors.is_empty() {
            "validation failed".to_string()
        } else {
            format!(
                "validation failed: {}",
                errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        Self::new(ErrorKind::ValidationFailed { errors }, message)
    }

    pub fn illegal_transition(entity: &str, from: impl ToString, to: impl ToString) -> Self {
        let (from, to) = (from.to_string(), to.to_string());
        let message = format!("illegal {entity} transition: {from} -> {to}");
        Self::new(
            ErrorKind::IllegalTransition { entity: entity.to_string(), from, to },
            message,
        )
    }

    pub fn lease_error(
        reason: LeaseErrorKind,
        holder: Option<String>,
        caller: impl Into<String>,
        expired_at_ms: Option<u64>,
    ) -> Self {
        let caller = caller.into();
        let message = format!("lease error ({reason}) for caller {caller}");
        Self::new(
            ErrorKind::LeaseError { reason, holder, caller, expired_at_ms },
            message,
        )
    }

    pub fn idempotency_required(scope: impl Into<String>) -> Self {
        let scope = scope.into();
        let message = format!("idempotency key required for scope {scope}");
        Self::new(ErrorKind::IdempotencyRequired { scope }, message)
    }

    pub fn idempotency_conflict(scope: impl Into<String>) -> Self {
        let scope = scope.into();
        let message = format!("idempotency key reused with a different payload in scope {scope}");
        Self::new(ErrorKind::IdempotencyConflict { scope }, message)
    }

    pub fn type_not_found(type_id: impl Into<String>) -> Self {
        let type_id = type_id.into();
        let message = format!("unknown order type: {type_id}");
        Self::new(ErrorKind::TypeNotFound { type_id }, message)
    }

    pub fn not_ready(order_state: OrderState) -> Self {
        let message = format!("order not ready for approval (state={order_state})");
        Self::new(ErrorKind::NotReady { order_state }, message)
    }

    pub fn no_items_available() -> Self {
        Self::new(ErrorKind::NoItemsAvailable, "no items available for checkout")
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorKind::InvalidQuery { message: message.clone() }, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_external_vocabulary() {
        assert_eq!(EngineError::no_items_available().kind.code(), "no-items-available");
        assert_eq!(
            EngineError::type_not_found("x").kind.code(),
            "type-not-found"
        );
    }

    #[test]
    fn validation_message_lists_fields() {
        let err = EngineError::validation(vec![FieldError::new("a", "missing")]);
        assert!(err.message.contains("a: missing"));
    }
}
