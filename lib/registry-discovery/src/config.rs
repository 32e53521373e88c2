//! Registry configuration

use std::time::Duration;

/// Configuration for registration and resolution
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Namespace prefix under which all service roots live
    pub namespace: String,
    /// Upper bound for creating the ephemeral registration node
    pub register_timeout: Duration,
    /// Upper bound for a single dial attempt
    pub dial_timeout: Duration,
    /// Fixed delay after deleting the registration node, absorbing
    /// propagation of the deletion notification before caches are cleared
    pub unregister_grace: Duration,
    /// Delay before a resolver retries after a failed snapshot read
    pub resolve_retry_backoff: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "/services".to_string(),
            register_timeout: Duration::from_secs(5),
            dial_timeout: Duration::from_secs(5),
            unregister_grace: Duration::from_secs(1),
            resolve_retry_backoff: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.namespace, "/services");
        assert_eq!(config.register_timeout, Duration::from_secs(5));
        assert_eq!(config.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.unregister_grace, Duration::from_secs(1));
        assert_eq!(config.resolve_retry_backoff, Duration::from_millis(500));
    }
}
