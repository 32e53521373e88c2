//! Service registration and address resolution
//!
//! This library provides:
//! - Ephemeral node management for advertising this process's RPC address
//! - Per-service resolvers turning coordination-store watches into address sets
//! - A connection cache converged against the latest resolved addresses
//! - The `RegistryClient` facade tying registration and resolution together

pub mod client;
pub mod config;
pub mod conn_cache;
pub mod node_manager;
pub mod resolver;
pub mod transport;

pub use client::{RegisteredNode, RegistryClient};
pub use config::RegistryConfig;
pub use conn_cache::{ConnectionCache, DialFailure};
pub use node_manager::EphemeralNodeManager;
pub use resolver::Resolver;
pub use transport::{Connection, TcpTransport, Transport};

#[cfg(test)]
pub(crate) mod test_util {
    use crate::transport::{Connection, Transport};
    use async_trait::async_trait;
    use registry_core::{RegistryError, Result};
    use std::collections::{HashMap, HashSet};
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub struct MockConnection {
        addr: String,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connection for MockConnection {
        fn addr(&self) -> &str {
            &self.addr
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Transport double recording every dial and close.
    #[derive(Default)]
    pub struct MockTransport {
        fail: Mutex<HashSet<String>>,
        dialed: Mutex<Vec<String>>,
        closed: Mutex<HashMap<String, Arc<AtomicBool>>>,
    }

    impl MockTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fail_addr(&self, addr: &str) {
            self.fail.lock().unwrap().insert(addr.to_string());
        }

        pub fn dial_count(&self, addr: &str) -> usize {
            self.dialed
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.as_str() == addr)
                .count()
        }

        pub fn is_closed(&self, addr: &str) -> bool {
            self.closed
                .lock()
                .unwrap()
                .get(addr)
                .map(|flag| flag.load(Ordering::SeqCst))
                .unwrap_or(false)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn dial(&self, addr: &str) -> Result<Arc<dyn Connection>> {
            self.dialed.lock().unwrap().push(addr.to_string());
            if self.fail.lock().unwrap().contains(addr) {
                return Err(RegistryError::Dial {
                    addr: addr.to_string(),
                    reason: "mock dial refused".to_string(),
                });
            }
            let closed = Arc::new(AtomicBool::new(false));
            self.closed
                .lock()
                .unwrap()
                .insert(addr.to_string(), closed.clone());
            Ok(Arc::new(MockConnection {
                addr: addr.to_string(),
                closed,
            }))
        }
    }

    /// Poll an async condition until it holds or two seconds elapse.
    pub async fn wait_until<F, Fut>(mut cond: F, what: &str)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if cond().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }
}
