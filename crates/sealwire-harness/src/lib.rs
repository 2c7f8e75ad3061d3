//! Deterministic test harness for sealwire.
//!
//! Seeded implementations of the Environment trait, an in-memory Transport
//! and a sans-IO client so dispatcher scenarios run without sockets and
//! reproduce from a seed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod memory;
pub mod model;
pub mod sim_env;

pub use client::{ClientError, SimClient, TestClient};
pub use memory::{ClientEnd, Delivery, MemoryConnection, MemoryConnector, MemoryTransport};
pub use model::{ModelIdentity, Operation, OperationResult, RealRegistry, RegistryModel};
pub use sim_env::SimEnv;
