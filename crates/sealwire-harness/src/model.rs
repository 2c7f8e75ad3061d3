//! Reference model of the session registry.
//!
//! [`RegistryModel`] is the obviously-correct version: a flat list of slots,
//! each live or removed, each bound to at most one identity. Model-based tests
//! apply the same [`Operation`] sequence to the model and to a
//! [`RealRegistry`] and compare every result.

use std::sync::Arc;

use arbitrary::Arbitrary;
use sealwire_core::{Departure, Identity, Session, SessionRegistry};

use crate::sim_env::SimEnv;

/// Identity index in the model; kept small so collisions are common.
pub type ModelIdentity = u8;

/// Number of distinct identities operations draw from
const IDENTITY_POOL: u8 = 4;

/// One registry operation.
///
/// Session references are slot indices taken modulo the number of sessions
/// created so far; operations before the first create are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// Create a session
    Create,
    /// Bind a session to an identity
    Bind {
        /// Session slot
        session: u8,
        /// Identity, modulo the identity pool
        identity: ModelIdentity,
    },
    /// Unbind a session
    Unbind {
        /// Session slot
        session: u8,
    },
    /// Remove a session
    Remove {
        /// Session slot
        session: u8,
    },
}

/// Observable outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Nothing observable happened
    Ok,
    /// A session was created in this slot
    Created(usize),
    /// A binding ended
    Departed {
        /// Identity that was bound
        identity: ModelIdentity,
        /// No other session remains bound to it
        last_session: bool,
    },
}

impl OperationResult {
    fn from_departure(departure: Option<Departure>) -> Self {
        match departure {
            Some(Departure { identity, last_session }) => Self::Departed {
                identity: parse_identity(&identity),
                last_session,
            },
            None => Self::Ok,
        }
    }
}

fn identity_name(identity: ModelIdentity) -> Identity {
    Identity::new(format!("user-{}", identity % IDENTITY_POOL))
}

fn parse_identity(identity: &Identity) -> ModelIdentity {
    identity.as_str().trim_start_matches("user-").parse().unwrap_or(u8::MAX)
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    live: bool,
    identity: Option<ModelIdentity>,
}

/// Reference model.
#[derive(Debug, Clone, Default)]
pub struct RegistryModel {
    slots: Vec<Slot>,
}

impl RegistryModel {
    /// Empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one operation
    pub fn apply(&mut self, op: Operation) -> OperationResult {
        match op {
            Operation::Create => {
                self.slots.push(Slot { live: true, identity: None });
                OperationResult::Created(self.slots.len() - 1)
            },
            Operation::Bind { session, identity } => {
                let Some(index) = self.slot(session) else { return OperationResult::Ok };
                let identity = identity % IDENTITY_POOL;
                let slot = self.slots[index];
                if !slot.live || slot.identity == Some(identity) {
                    return OperationResult::Ok;
                }
                let result = self.depart(index);
                self.slots[index].identity = Some(identity);
                result
            },
            Operation::Unbind { session } => match self.slot(session) {
                Some(index) => self.depart(index),
                None => OperationResult::Ok,
            },
            Operation::Remove { session } => {
                let Some(index) = self.slot(session) else { return OperationResult::Ok };
                if !self.slots[index].live {
                    return OperationResult::Ok;
                }
                let result = self.depart(index);
                self.slots[index].live = false;
                result
            },
        }
    }

    /// True if some live slot is bound to `identity`
    pub fn is_reachable(&self, identity: ModelIdentity) -> bool {
        self.bound_count(identity % IDENTITY_POOL) > 0
    }

    /// Live slot count
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.live).count()
    }

    fn slot(&self, session: u8) -> Option<usize> {
        if self.slots.is_empty() { None } else { Some(session as usize % self.slots.len()) }
    }

    fn bound_count(&self, identity: ModelIdentity) -> usize {
        self.slots.iter().filter(|slot| slot.live && slot.identity == Some(identity)).count()
    }

    fn depart(&mut self, index: usize) -> OperationResult {
        match self.slots[index].identity.take() {
            Some(identity) => OperationResult::Departed {
                identity,
                last_session: self.bound_count(identity) == 0,
            },
            None => OperationResult::Ok,
        }
    }
}

/// Real registry driven through the same operations.
pub struct RealRegistry {
    registry: SessionRegistry,
    env: SimEnv,
    slots: Vec<Arc<Session>>,
}

impl RealRegistry {
    /// Empty registry with a seeded environment
    pub fn new(seed: u64) -> Self {
        Self { registry: SessionRegistry::new(1), env: SimEnv::with_seed(seed), slots: Vec::new() }
    }

    /// Apply one operation
    pub fn apply(&mut self, op: Operation) -> OperationResult {
        match op {
            Operation::Create => {
                let (session, _mailbox) = self.registry.create_session(&self.env);
                self.slots.push(session);
                OperationResult::Created(self.slots.len() - 1)
            },
            Operation::Bind { session, identity } => match self.slot(session) {
                Some(session) => {
                    OperationResult::from_departure(
                        self.registry.bind(&session, identity_name(identity)),
                    )
                },
                None => OperationResult::Ok,
            },
            Operation::Unbind { session } => match self.slot(session) {
                Some(session) => OperationResult::from_departure(self.registry.unbind(&session)),
                None => OperationResult::Ok,
            },
            Operation::Remove { session } => match self.slot(session) {
                Some(session) => OperationResult::from_departure(self.registry.remove(session.id())),
                None => OperationResult::Ok,
            },
        }
    }

    /// True if the registry reports `identity` reachable
    pub fn is_reachable(&self, identity: ModelIdentity) -> bool {
        self.registry.is_reachable(&identity_name(identity))
    }

    /// Underlying registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn slot(&self, session: u8) -> Option<Arc<Session>> {
        if self.slots.is_empty() {
            return None;
        }
        self.slots.get(session as usize % self.slots.len()).cloned()
    }
}
