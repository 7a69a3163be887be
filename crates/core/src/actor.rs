// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor descriptors attached to transitions and events for audit purposes.
//!
//! An actor is never consulted for authorization — that is a transport-layer
//! concern outside this engine. It is carried purely so events can record
//! who triggered a mutation.

use serde::{Deserialize, Serialize};

/// The kind of caller that triggered an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Agent,
    System,
}

crate::simple_display! {
    ActorType {
        User => "user",
        Agent => "agent",
        System => "system",
    }
}

/// An actor descriptor: a type tag plus an opaque id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: String,
}

impl ActorRef {
    pub fn new(actor_type: ActorType, id: impl Into<String>) -> Self {
        Self { actor_type, id: id.into() }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(ActorType::User, id)
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self::new(ActorType::Agent, id)
    }

    /// The actor the engine itself uses when it mutates state without an
    /// external caller (maintenance, auto-approve, reclamation).
    pub fn system() -> Self {
        Self::new(ActorType::System, "engine")
    }
}

impl std::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.actor_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let actor = ActorRef::agent("agt-1");
        assert_eq!(actor.to_string(), "agent:agt-1");
    }

    #[test]
    fn system_actor_is_system_type() {
        let actor = ActorRef::system();
        assert_eq!(actor.actor_type, ActorType::System);
    }
}
