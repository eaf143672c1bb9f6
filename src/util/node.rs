//! Name of the node the collector runs on.
//!
//! Used as a path component of the output tree so that bundles collected on
//! several nodes do not overwrite each other.

use std::env;
use std::fs;
use std::sync::LazyLock;

/// Cached result of node name detection.
static NODE_NAME: LazyLock<String> = LazyLock::new(detect_node_name);

/// Fallback when nothing else is available.
const DEFAULT_NODE_NAME: &str = "localhost";

/// Returns the node name.
///
/// The result is cached after the first call.
pub fn node_name() -> &'static str {
    &NODE_NAME
}

/// Tries, in order: `NODE_NAME` (downward API), `HOSTNAME`, `/etc/hostname`.
fn detect_node_name() -> String {
    from_env("NODE_NAME")
        .or_else(|| from_env("HOSTNAME"))
        .or_else(from_hostname_file)
        .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string())
}

fn from_env(var: &str) -> Option<String> {
    env::var(var).ok().and_then(|v| non_empty(&v))
}

fn from_hostname_file() -> Option<String> {
    fs::read_to_string("/etc/hostname")
        .ok()
        .and_then(|content| non_empty(&content))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_trims() {
        assert_eq!(non_empty("  node-1\n"), Some("node-1".to_string()));
        assert_eq!(non_empty(" \n"), None);
    }

    #[test]
    fn test_node_name_returns_consistent_result() {
        let first = node_name();
        let second = node_name();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
