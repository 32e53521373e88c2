//! Registration facade
//!
//! `RegistryClient` composes node management, resolution and the
//! connection cache behind the public register/unregister/resolve surface.
//! The registration state machine is Unregistered -> Pending -> Registered;
//! a failed registration restores exactly the pre-call state.

use crate::config::RegistryConfig;
use crate::conn_cache::ConnectionCache;
use crate::node_manager::EphemeralNodeManager;
use crate::resolver::Resolver;
use crate::transport::{Connection, Transport};
use registry_core::path;
use registry_core::{CoordinationStore, RegistryError, Result, ServiceSnapshot};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// This process's advertised registration.
#[derive(Clone, Debug, Serialize)]
pub struct RegisteredNode {
    pub service: String,
    pub address: String,
    pub node_path: String,
}

enum RegistrationState {
    Unregistered,
    /// A register or unregister transition is in flight.
    Pending,
    Registered(RegisteredNode),
}

struct WatchedService {
    resolver: Resolver,
    converge_task: JoinHandle<()>,
}

pub struct RegistryClient {
    store: Arc<dyn CoordinationStore>,
    transport: Arc<dyn Transport>,
    config: RegistryConfig,
    nodes: EphemeralNodeManager,
    state: Mutex<RegistrationState>,
    cache: Arc<ConnectionCache>,
    watched: Mutex<HashMap<String, WatchedService>>,
}

impl RegistryClient {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        transport: Arc<dyn Transport>,
        config: RegistryConfig,
    ) -> Self {
        let nodes = EphemeralNodeManager::new(store.clone(), config.namespace.clone());
        let cache = Arc::new(ConnectionCache::new(transport.clone()));
        Self {
            store,
            transport,
            config,
            nodes,
            state: Mutex::new(RegistrationState::Unregistered),
            cache,
            watched: Mutex::new(HashMap::new()),
        }
    }

    /// Best-effort batch creation of service roots; roots that already
    /// exist are not an error.
    pub async fn create_root_nodes(&self, services: &[&str]) -> Result<()> {
        for service in services {
            self.nodes.ensure_root(service).await?;
        }
        Ok(())
    }

    /// Advertise this process under `service`. The address must be
    /// dialable before the node is created, and the in-memory registration
    /// is committed only after every step succeeded.
    pub async fn register(&self, service: &str, host: &str, port: u16) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match &*state {
                RegistrationState::Registered(node) => {
                    return Err(RegistryError::AlreadyRegistered(node.service.clone()))
                }
                RegistrationState::Pending => return Err(RegistryError::RegistrationBusy),
                RegistrationState::Unregistered => *state = RegistrationState::Pending,
            }
        }
        let result = self.do_register(service, host, port).await;
        let mut state = self.state.lock().await;
        match result {
            Ok(node) => {
                info!(
                    "Registered service {} at {} ({})",
                    node.service, node.address, node.node_path
                );
                *state = RegistrationState::Registered(node);
                Ok(())
            }
            Err(e) => {
                *state = RegistrationState::Unregistered;
                Err(e)
            }
        }
    }

    async fn do_register(&self, service: &str, host: &str, port: u16) -> Result<RegisteredNode> {
        self.nodes.ensure_root(service).await?;
        let addr = path::advertised_addr(host, port);

        // Fail fast if the local listener is not actually reachable.
        let probe = self.transport.dial(&addr).await?;
        probe.close().await;

        let guid = EphemeralNodeManager::new_guid();
        let node_path = match time::timeout(
            self.config.register_timeout,
            self.nodes.create_node(service, &addr, &guid),
        )
        .await
        {
            Ok(created) => created?,
            Err(_) => {
                // The create may still have landed in the store after the
                // deadline; sweep for our GUID so no node leaks untracked.
                if let Err(e) = self.nodes.cleanup_orphan(service, &guid).await {
                    warn!("Orphan sweep for service {} failed: {}", service, e);
                }
                return Err(RegistryError::Timeout {
                    op: "create_node",
                    millis: self.config.register_timeout.as_millis() as u64,
                });
            }
        };
        Ok(RegisteredNode {
            service: service.to_string(),
            address: addr,
            node_path,
        })
    }

    /// Delete this process's registration node, wait out the propagation
    /// grace period, then clear every resolver and cached connection.
    pub async fn unregister(&self) -> Result<()> {
        let node = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, RegistrationState::Pending) {
                RegistrationState::Registered(node) => node,
                RegistrationState::Pending => return Err(RegistryError::RegistrationBusy),
                RegistrationState::Unregistered => {
                    *state = RegistrationState::Unregistered;
                    return Err(RegistryError::NotRegistered);
                }
            }
        };
        if let Err(e) = self.nodes.delete_node(&node.node_path).await {
            // Delete failed; the registration still stands.
            *self.state.lock().await = RegistrationState::Registered(node);
            return Err(e);
        }
        // Let in-flight deletion notifications settle before tearing the
        // local caches down.
        time::sleep(self.config.unregister_grace).await;
        self.clear_local_state().await;
        *self.state.lock().await = RegistrationState::Unregistered;
        info!("Unregistered service {} at {}", node.service, node.address);
        Ok(())
    }

    /// The current registration, if any.
    pub async fn registered(&self) -> Option<RegisteredNode> {
        match &*self.state.lock().await {
            RegistrationState::Registered(node) => Some(node.clone()),
            _ => None,
        }
    }

    /// Subscribe to the address set of a service, starting its resolver
    /// and convergence task on first use.
    pub async fn watch_service(&self, service: &str) -> Result<watch::Receiver<Vec<String>>> {
        if let Some(watched) = self.watched.lock().await.get(service) {
            return Ok(watched.resolver.subscribe());
        }
        // Root creation happens outside the watched lock; no lock across
        // store I/O.
        self.nodes.ensure_root(service).await?;
        let mut watched = self.watched.lock().await;
        if let Some(existing) = watched.get(service) {
            return Ok(existing.resolver.subscribe());
        }
        let root = self.nodes.root_path(service);
        debug!("Starting resolver for {}", root);
        let resolver = Resolver::spawn(
            self.store.clone(),
            root,
            self.config.resolve_retry_backoff,
        );
        let subscription = resolver.subscribe();
        let converge_task = tokio::spawn(converge_loop(
            self.cache.clone(),
            service.to_string(),
            resolver.subscribe(),
        ));
        watched.insert(
            service.to_string(),
            WatchedService {
                resolver,
                converge_task,
            },
        );
        Ok(subscription)
    }

    /// Latest resolved address set for a service.
    pub async fn addresses(&self, service: &str) -> Result<Vec<String>> {
        let rx = self.watch_service(service).await?;
        let addrs = rx.borrow().clone();
        Ok(addrs)
    }

    /// Serializable view of the latest resolved state of a service.
    pub async fn snapshot(&self, service: &str) -> Result<ServiceSnapshot> {
        Ok(ServiceSnapshot::new(service, self.addresses(service).await?))
    }

    /// Live connections for a service.
    pub async fn connections(&self, service: &str) -> Result<Vec<Arc<dyn Connection>>> {
        self.watch_service(service).await?;
        Ok(self.cache.connections(service).await)
    }

    /// Stop every resolver and convergence task and drop every cached
    /// connection. Resolvers are stopped before the cache is cleared so a
    /// late snapshot cannot repopulate it.
    async fn clear_local_state(&self) {
        let mut watched = self.watched.lock().await;
        for (service, entry) in watched.drain() {
            debug!("Stopping resolver for service {}", service);
            entry.converge_task.abort();
            entry.resolver.shutdown();
        }
        self.cache.clear_all().await;
    }
}

/// Converge the connection cache every time the resolver publishes a new
/// address set.
async fn converge_loop(
    cache: Arc<ConnectionCache>,
    service: String,
    mut rx: watch::Receiver<Vec<String>>,
) {
    loop {
        let addrs = rx.borrow_and_update().clone();
        match cache.converge(&service, &addrs).await {
            Ok(failures) => {
                for failure in failures {
                    warn!(
                        "Service {}: address {} not converged: {}",
                        service, failure.addr, failure.reason
                    );
                }
            }
            Err(e) => warn!("Convergence for service {} failed: {}", service, e),
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
