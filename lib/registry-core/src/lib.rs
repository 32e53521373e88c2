//! Core abstractions for the service registration layer
//!
//! This library provides:
//! - The coordination-store client trait consumed by registration and resolution
//! - Path construction for service roots and protected ephemeral nodes
//! - The shared error taxonomy
//! - An in-memory store backend for tests and local runs

pub mod error;
pub mod memory;
pub mod path;
pub mod snapshot;
pub mod store;

pub use error::{RegistryError, Result};
pub use memory::MemoryStore;
pub use snapshot::ServiceSnapshot;
pub use store::{ChildWatch, CoordinationStore, CreateMode};
