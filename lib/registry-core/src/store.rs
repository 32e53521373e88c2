//! Coordination-store client trait
//!
//! The replicated coordination store (session management, consensus,
//! replication) is an external collaborator; this layer consumes exactly
//! the primitives below. Watches are one-shot: a `ChildWatch` fires at
//! most once and must be re-armed by calling `children_and_watch` again.

use crate::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// One-shot notification that the child list of a watched path changed.
pub type ChildWatch = oneshot::Receiver<()>;

/// Creation mode for a node. All nodes are created with open ACLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// Plain persistent node; survives the creating session.
    Persistent,
    /// Ephemeral node with a store-assigned monotonic sequence suffix;
    /// deleted automatically when the creating session expires.
    EphemeralSequential,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create a node, returning the path actually created (for sequential
    /// nodes this includes the store-assigned suffix). Fails with the
    /// `NodeExists` sentinel if a persistent node is already present.
    async fn create(&self, path: &str, payload: &[u8], mode: CreateMode) -> Result<String>;

    /// Delete a node. `version: -1` deletes unconditionally, skipping the
    /// optimistic-concurrency version check.
    async fn delete(&self, path: &str, version: i32) -> Result<()>;

    /// Child node names under a path, in store order.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Payload of a node.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Child list plus a one-shot watch armed before the list was read, so
    /// no change between the read and the watch registration is missed.
    async fn children_and_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch)>;

    /// Whether a node exists.
    async fn exists(&self, path: &str) -> Result<bool>;
}
