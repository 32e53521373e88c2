//! RPC transport abstraction
//!
//! The registry only decides which addresses to dial and undial; how a
//! dial works belongs to the transport. Connections are not health-checked
//! here either, that is the transport layer's concern.

use async_trait::async_trait;
use registry_core::{RegistryError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;
use tracing::debug;

/// A live connection to a peer's advertised address.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The address this connection was dialed against.
    fn addr(&self) -> &str;

    /// Release the connection. Idempotent.
    async fn close(&self);
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Connection>>;
}

/// Plain TCP transport
pub struct TcpTransport {
    dial_timeout: Duration,
}

impl TcpTransport {
    pub fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Connection>> {
        let stream = match time::timeout(self.dial_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(RegistryError::Dial {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(RegistryError::Dial {
                    addr: addr.to_string(),
                    reason: format!("timed out after {:?}", self.dial_timeout),
                })
            }
        };
        debug!("Dialed {}", addr);
        Ok(Arc::new(TcpConnection {
            addr: addr.to_string(),
            stream: Mutex::new(Some(stream)),
        }))
    }
}

struct TcpConnection {
    addr: String,
    stream: Mutex<Option<TcpStream>>,
}

#[async_trait]
impl Connection for TcpConnection {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn close(&self) {
        if self.stream.lock().await.take().is_some() {
            debug!("Closed connection to {}", self.addr);
        }
    }
}
