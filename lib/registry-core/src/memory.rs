//! In-memory coordination store backend
//!
//! Implements the `CoordinationStore` contract for tests and local runs:
//! per-parent sequence counters, ephemeral ownership tied to a simulated
//! session, and one-shot child watches. Missing parent paths are created
//! implicitly, which real deployments would reject.

use crate::error::{RegistryError, Result};
use crate::path;
use crate::store::{ChildWatch, CoordinationStore, CreateMode};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Clone, Debug)]
struct NodeRecord {
    payload: Vec<u8>,
    ephemeral: bool,
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, NodeRecord>,
    counters: HashMap<String, u64>,
    watches: HashMap<String, Vec<oneshot::Sender<()>>>,
}

impl Inner {
    fn fire_watches(&mut self, path: &str) {
        if let Some(senders) = self.watches.remove(path) {
            for tx in senders {
                let _ = tx.send(());
            }
        }
    }

    fn child_names(&self, parent: &str) -> Vec<String> {
        let prefix = format!("{}/", parent);
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('/'))
            .map(|(k, _)| k[prefix.len()..].to_string())
            .collect()
    }

    fn insert_with_parents(&mut self, path: &str, record: NodeRecord) {
        if let Some(parent) = path::parent(path) {
            if !self.nodes.contains_key(parent) {
                self.insert_with_parents(
                    parent,
                    NodeRecord {
                        payload: Vec::new(),
                        ephemeral: false,
                    },
                );
            }
        }
        self.nodes.insert(path.to_string(), record);
    }
}

/// Lock discipline: the mutex is held only for in-memory map transitions,
/// never across an await point.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Simulate session expiry: every ephemeral node disappears and the
    /// affected child watches fire, exactly as the real store would do
    /// when the owning session is lost.
    pub fn expire_session(&self) {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .nodes
            .iter()
            .filter(|(_, rec)| rec.ephemeral)
            .map(|(k, _)| k.clone())
            .collect();
        for path in &expired {
            inner.nodes.remove(path);
        }
        debug!("Expired session, removed {} ephemeral nodes", expired.len());
        let mut touched: Vec<String> = expired
            .iter()
            .filter_map(|p| path::parent(p).map(str::to_string))
            .collect();
        touched.extend(expired);
        touched.sort();
        touched.dedup();
        for path in touched {
            inner.fire_watches(&path);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn create(&self, path: &str, payload: &[u8], mode: CreateMode) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        let created = match mode {
            CreateMode::Persistent => {
                if inner.nodes.contains_key(path) {
                    return Err(RegistryError::NodeExists(path.to_string()));
                }
                inner.insert_with_parents(
                    path,
                    NodeRecord {
                        payload: payload.to_vec(),
                        ephemeral: false,
                    },
                );
                path.to_string()
            }
            CreateMode::EphemeralSequential => {
                let parent = path::parent(path)
                    .ok_or_else(|| RegistryError::store("create", path, "no parent path"))?
                    .to_string();
                let seq = inner.counters.entry(parent).or_insert(0);
                let created = format!("{}{:010}", path, *seq);
                *seq += 1;
                inner.insert_with_parents(
                    &created,
                    NodeRecord {
                        payload: payload.to_vec(),
                        ephemeral: true,
                    },
                );
                created
            }
        };
        if let Some(parent) = path::parent(&created).map(str::to_string) {
            inner.fire_watches(&parent);
        }
        debug!("Created node {}", created);
        Ok(created)
    }

    async fn delete(&self, path: &str, _version: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.nodes.remove(path).is_none() {
            return Err(RegistryError::NodeNotFound(path.to_string()));
        }
        if let Some(parent) = path::parent(path).map(str::to_string) {
            inner.fire_watches(&parent);
        }
        inner.fire_watches(path);
        debug!("Deleted node {}", path);
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(path) {
            return Err(RegistryError::NodeNotFound(path.to_string()));
        }
        Ok(inner.child_names(path))
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(path)
            .map(|rec| rec.payload.clone())
            .ok_or_else(|| RegistryError::NodeNotFound(path.to_string()))
    }

    async fn children_and_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch)> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(path) {
            return Err(RegistryError::NodeNotFound(path.to_string()));
        }
        // Watch registration and the snapshot read happen under one lock,
        // so a change cannot slip between them.
        let (tx, rx) = oneshot::channel();
        inner.watches.entry(path.to_string()).or_default().push(tx);
        let children = inner.child_names(path);
        Ok((children, rx))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.nodes.contains_key(path))
    }
}
