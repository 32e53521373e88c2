//! Path construction for service roots and protected ephemeral nodes

/// Prefix marking a protected node; the GUID after it lets the creating
/// client recognize its own node after a retried create.
const PROTECTED_PREFIX: &str = "_c_";

/// Root path for a service under the configured namespace.
pub fn service_root(namespace: &str, service: &str) -> String {
    format!("{}/{}", namespace.trim_end_matches('/'), service)
}

/// Advertised address in `host:port` form.
pub fn advertised_addr(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Name prefix for a protected ephemeral sequential node; the store appends
/// the monotonic sequence suffix.
pub fn protected_node_prefix(guid: &str, addr: &str) -> String {
    format!("{}{}-{}_", PROTECTED_PREFIX, guid, addr)
}

/// Full path prefix handed to the store's create call.
pub fn protected_node_path(namespace: &str, service: &str, guid: &str, addr: &str) -> String {
    format!(
        "{}/{}",
        service_root(namespace, service),
        protected_node_prefix(guid, addr)
    )
}

/// Whether a child node name was created under the given protection GUID.
pub fn is_protected_by(node_name: &str, guid: &str) -> bool {
    node_name
        .strip_prefix(PROTECTED_PREFIX)
        .map(|rest| rest.starts_with(guid))
        .unwrap_or(false)
}

/// The parent path of a node path, if it has one.
pub fn parent(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

/// The final component of a node path.
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
