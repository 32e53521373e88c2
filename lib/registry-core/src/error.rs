use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Store operation {op} failed for {path}: {reason}")]
    Store {
        op: &'static str,
        path: String,
        reason: String,
    },

    #[error("Dial failed for {addr}: {reason}")]
    Dial { addr: String, reason: String },

    #[error("Already registered as {0}")]
    AlreadyRegistered(String),

    #[error("Not registered")]
    NotRegistered,

    #[error("Registration state is busy, another transition is in flight")]
    RegistrationBusy,

    #[error("Operation {op} timed out after {millis}ms")]
    Timeout { op: &'static str, millis: u64 },
}

impl RegistryError {
    /// Build a store failure carrying the operation and path context.
    pub fn store(op: &'static str, path: impl Into<String>, reason: impl ToString) -> Self {
        RegistryError::Store {
            op,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for the "node exists" sentinel, which idempotent creation treats as success.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, RegistryError::NodeExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_exists_sentinel() {
        let err = RegistryError::NodeExists("/services/chat".to_string());
        assert!(err.is_node_exists());
        assert!(!RegistryError::NotRegistered.is_node_exists());
    }

    #[test]
    fn test_store_error_carries_context() {
        let err = RegistryError::store("create", "/services/chat", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("create"));
        assert!(msg.contains("/services/chat"));
        assert!(msg.contains("connection refused"));
    }
}
