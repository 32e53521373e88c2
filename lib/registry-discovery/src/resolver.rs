//! Per-service address resolution
//!
//! One background task per watched service root. Watches in the store are
//! one-shot, so every iteration re-arms the watch and immediately takes a
//! fresh snapshot; a notification arriving while a snapshot is being
//! processed only causes an extra iteration, and the latest completed
//! snapshot always wins. A failed snapshot read keeps the previously
//! published set (fail-stale) and retries after a backoff, so a transient
//! store error never empties the address set.

use registry_core::{CoordinationStore, RegistryError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

/// Handle to a background resolver task. Dropping the handle stops the task.
pub struct Resolver {
    rx: watch::Receiver<Vec<String>>,
    handle: JoinHandle<()>,
}

impl Resolver {
    /// Spawn the watch loop for one service root.
    pub fn spawn(
        store: Arc<dyn CoordinationStore>,
        root: String,
        retry_backoff: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(run(store, root, retry_backoff, tx));
        Self { rx, handle }
    }

    /// Latest published address set.
    pub fn addresses(&self) -> Vec<String> {
        self.rx.borrow().clone()
    }

    /// Subscribe to address-set snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.rx.clone()
    }

    /// Stop the watch loop.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// Stopped by aborting the task; every iteration awaits, so cancellation
// lands promptly.
async fn run(
    store: Arc<dyn CoordinationStore>,
    root: String,
    retry_backoff: Duration,
    tx: watch::Sender<Vec<String>>,
) {
    loop {
        match snapshot(store.as_ref(), &root).await {
            Ok((addrs, armed)) => {
                if *tx.borrow() != addrs {
                    debug!("Resolved {} -> {:?}", root, addrs);
                    tx.send_replace(addrs);
                }
                // Fires on change, or immediately if the store dropped the
                // watch; either way the loop re-arms and re-reads.
                let _ = armed.await;
            }
            Err(e) => {
                warn!("Snapshot read for {} failed, keeping previous set: {}", root, e);
                time::sleep(retry_backoff).await;
            }
        }
    }
}

/// Arm a fresh watch and read the full child list plus payloads.
async fn snapshot(
    store: &dyn CoordinationStore,
    root: &str,
) -> Result<(Vec<String>, registry_core::ChildWatch)> {
    let (children, armed) = store.children_and_watch(root).await?;
    let mut addrs = Vec::with_capacity(children.len());
    for child in children {
        let node = format!("{}/{}", root, child);
        match store.get(&node).await {
            Ok(payload) => addrs.push(String::from_utf8_lossy(&payload).into_owned()),
            // The child was deleted between the list and the read; the
            // deletion's own notification covers it.
            Err(RegistryError::NodeNotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    addrs.sort();
    addrs.dedup();
    Ok((addrs, armed))
}
