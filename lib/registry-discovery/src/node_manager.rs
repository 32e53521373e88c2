//! Ephemeral node management for service registration
//!
//! Each registered process advertises its address as a protected ephemeral
//! sequential node under the service root. The embedded GUID lets this
//! client recognize its own node after a retried or timed-out create;
//! the store's sequence suffix keeps concurrent instances from colliding;
//! ephemerality deletes the node automatically when the session expires.

use registry_core::path;
use registry_core::{CoordinationStore, CreateMode, RegistryError, Result};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct EphemeralNodeManager {
    store: Arc<dyn CoordinationStore>,
    namespace: String,
}

impl EphemeralNodeManager {
    pub fn new(store: Arc<dyn CoordinationStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Fresh protection GUID for one registration attempt.
    pub fn new_guid() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn root_path(&self, service: &str) -> String {
        path::service_root(&self.namespace, service)
    }

    /// Create the service root if absent; an existing root is success.
    pub async fn ensure_root(&self, service: &str) -> Result<()> {
        let root = self.root_path(service);
        match self
            .store
            .create(&root, &[], CreateMode::Persistent)
            .await
        {
            Ok(_) => {
                debug!("Created service root {}", root);
                Ok(())
            }
            Err(e) if e.is_node_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Create the protected ephemeral sequential node advertising `addr`.
    /// Not retried here; retry policy belongs to the caller.
    pub async fn create_node(&self, service: &str, addr: &str, guid: &str) -> Result<String> {
        let prefix = path::protected_node_path(&self.namespace, service, guid, addr);
        let node = self
            .store
            .create(&prefix, addr.as_bytes(), CreateMode::EphemeralSequential)
            .await
            .map_err(|e| RegistryError::store("create_node", prefix.clone(), e))?;
        debug!("Created registration node {}", node);
        Ok(node)
    }

    /// Find this client's node under the service root, by protection GUID.
    pub async fn find_own_node(&self, service: &str, guid: &str) -> Result<Option<String>> {
        let root = self.root_path(service);
        let children = self.store.children(&root).await?;
        Ok(children
            .into_iter()
            .find(|name| path::is_protected_by(name, guid))
            .map(|name| format!("{}/{}", root, name)))
    }

    /// Delete a node this client may have created but never learned the
    /// path of, after a cancelled or timed-out create.
    pub async fn cleanup_orphan(&self, service: &str, guid: &str) -> Result<bool> {
        match self.find_own_node(service, guid).await? {
            Some(node) => {
                self.store.delete(&node, -1).await?;
                warn!("Deleted orphaned registration node {}", node);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Unconditional delete; only this process's session can own the node,
    /// so the version check is skipped.
    pub async fn delete_node(&self, node: &str) -> Result<()> {
        self.store.delete(node, -1).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, EphemeralNodeManager) {
        let store = Arc::new(MemoryStore::new());
        let mgr = EphemeralNodeManager::new(store.clone(), "/services");
        (store, mgr)
    }

    #[tokio::test]
    async fn test_ensure_root_is_idempotent() {
        let (_, mgr) = manager();
        mgr.ensure_root("chat").await.unwrap();
        mgr.ensure_root("chat").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_node_stores_address_payload() {
        let (store, mgr) = manager();
        mgr.ensure_root("chat").await.unwrap();
        let guid = EphemeralNodeManager::new_guid();
        let node = mgr.create_node("chat", "10.0.0.1:9000", &guid).await.unwrap();
        assert!(node.starts_with("/services/chat/_c_"));
        assert!(node.contains(&guid));
        assert_eq!(store.get(&node).await.unwrap(), b"10.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_cleanup_orphan_matches_only_own_guid() {
        let (store, mgr) = manager();
        mgr.ensure_root("chat").await.unwrap();
        let mine = EphemeralNodeManager::new_guid();
        let theirs = EphemeralNodeManager::new_guid();
        mgr.create_node("chat", "10.0.0.1:9000", &mine).await.unwrap();
        mgr.create_node("chat", "10.0.0.2:9000", &theirs).await.unwrap();
        assert!(mgr.cleanup_orphan("chat", &mine).await.unwrap());
        assert!(!mgr.cleanup_orphan("chat", &mine).await.unwrap());
        let remaining = store.children("/services/chat").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].contains(&theirs));
    }

    #[tokio::test]
    async fn test_delete_node_removes_registration() {
        let (store, mgr) = manager();
        mgr.ensure_root("chat").await.unwrap();
        let guid = EphemeralNodeManager::new_guid();
        let node = mgr.create_node("chat", "10.0.0.1:9000", &guid).await.unwrap();
        mgr.delete_node(&node).await.unwrap();
        assert!(store.children("/services/chat").await.unwrap().is_empty());
    }
}
