//! Operator-facing view of a resolved service
use serde::{Deserialize, Serialize};

/// The latest resolved address set for one service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub service: String,
    pub addresses: Vec<String>,
}

impl ServiceSnapshot {
    pub fn new(service: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            service: service.into(),
            addresses,
        }
    }
}
