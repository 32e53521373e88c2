//! Maybe-transactional execution over a document store
//!
//! Single-node deployments of the backing document store cannot support
//! multi-document transactions, so callers get a uniform contract: the
//! first `run` probes the deployment topology once and the result decides
//! whether later closures are wrapped in a store transaction or invoked
//! directly. A failed probe is not cached and is retried on the next call.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Work to run under the maybe-transactional contract.
pub type TxFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Document-store operations this facade needs: one topology probe and
/// one session-scoped transactional runner. The backend opens a session,
/// runs the closure inside a store-managed transaction, and ends the
/// session regardless of outcome.
#[async_trait]
pub trait TxBackend: Send + Sync {
    /// Whether the deployment is a replica set / cluster that supports
    /// multi-document transactions.
    async fn supports_transactions(&self) -> Result<bool>;

    /// Run the closure inside a store transaction.
    async fn with_transaction(&self, f: TxFn) -> Result<()>;
}

/// Probe-once capability: `None` until the first successful probe.
pub struct MaybeTx {
    backend: Arc<dyn TxBackend>,
    decided: Mutex<Option<bool>>,
}

impl MaybeTx {
    pub fn new(backend: Arc<dyn TxBackend>) -> Self {
        Self {
            backend,
            decided: Mutex::new(None),
        }
    }

    /// Run `f`, wrapped in a store transaction when the deployment
    /// supports one, directly otherwise.
    pub async fn run(&self, f: TxFn) -> Result<()> {
        if self.capability().await? {
            self.backend
                .with_transaction(f)
                .await
                .context("document-store transaction failed")
        } else {
            f().await
        }
    }

    async fn capability(&self) -> Result<bool> {
        let mut decided = self.decided.lock().await;
        if let Some(wrap) = *decided {
            return Ok(wrap);
        }
        match self.backend.supports_transactions().await {
            Ok(wrap) => {
                debug!(
                    "Document store {} multi-document transactions",
                    if wrap { "supports" } else { "does not support" }
                );
                *decided = Some(wrap);
                Ok(wrap)
            }
            Err(e) => {
                // Not cached; the next call probes again.
                warn!("Topology probe failed: {}", e);
                Err(e).context("probing document-store topology")
            }
        }
    }
}
