//! URL-Path Access Key
//!
//! Public RPC endpoints are usually shared as a single URL, so the balancer
//! accepts its access key as the first path segment instead of a header:
//! `http://balancer:8080/<key>`. The gate runs before the forwarder and
//! short-circuits with HTTP 401 when the key does not match.
//!
//! - **No key configured**: every request passes through
//! - **Key configured**: the first path segment must equal the key
//!
//! Keys are compared in constant time.
//!
//! # Example
//!
//! ```
//! use rpcbalancer_common::auth::AuthConfig;
//!
//! let auth = AuthConfig::with_url_key("s3cret");
//! assert!(auth.validate_path("/s3cret"));
//! assert!(!auth.validate_path("/other"));
//!
//! let open = AuthConfig::disabled();
//! assert!(open.validate_path("/anything"));
//! ```

use std::fmt;

/// Access-key configuration for the RPC listener.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    url_key: Option<String>,
}

impl AuthConfig {
    /// Requires `url_key` as the first path segment.
    pub fn with_url_key(url_key: impl Into<String>) -> Self {
        Self {
            url_key: Some(url_key.into()),
        }
    }

    /// Accepts every request.
    pub fn disabled() -> Self {
        Self { url_key: None }
    }

    /// Builds from an optional flag value; an empty key disables the gate.
    pub fn from_optional(url_key: Option<String>) -> Self {
        match url_key {
            Some(key) if !key.is_empty() => Self::with_url_key(key),
            _ => Self::disabled(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.url_key.is_some()
    }

    /// Checks the first segment of a request path against the configured key.
    ///
    /// Always `true` when no key is configured.
    pub fn validate_path(&self, path: &str) -> bool {
        match &self.url_key {
            Some(expected) => constant_time_eq(expected, first_path_segment(path)),
            None => true,
        }
    }
}

impl fmt::Display for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url_key {
            Some(_key) => write!(f, "UrlKey(*****)"),
            None => write!(f, "Disabled"),
        }
    }
}

/// `/key/rest` → `key`, `/` → ``.
pub fn first_path_segment(path: &str) -> &str {
    path.trim_start_matches('/').split('/').next().unwrap_or("")
}

/// Compares every byte regardless of where the first mismatch is.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_with_url_key() {
        let auth = AuthConfig::with_url_key("test-key");
        assert!(auth.requires_auth());
        assert!(auth.validate_path("/test-key"));
        assert!(auth.validate_path("/test-key/"));
        assert!(auth.validate_path("/test-key/extra/segments"));
        assert!(!auth.validate_path("/wrong-key"));
        assert!(!auth.validate_path("/"));
        assert!(!auth.validate_path("/test-key-longer"));
    }

    #[test]
    fn test_auth_config_disabled() {
        let auth = AuthConfig::disabled();
        assert!(!auth.requires_auth());
        assert!(auth.validate_path("/"));
        assert!(auth.validate_path("/anything/at/all"));
    }

    #[test]
    fn test_from_optional_treats_empty_as_disabled() {
        assert!(!AuthConfig::from_optional(None).requires_auth());
        assert!(!AuthConfig::from_optional(Some(String::new())).requires_auth());
        assert!(AuthConfig::from_optional(Some("k".into())).requires_auth());
    }

    #[test]
    fn test_first_path_segment() {
        assert_eq!(first_path_segment("/abc/def"), "abc");
        assert_eq!(first_path_segment("abc"), "abc");
        assert_eq!(first_path_segment("/"), "");
        assert_eq!(first_path_segment(""), "");
        assert_eq!(first_path_segment("//abc"), "abc");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("same-key-123", "same-key-123"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("key1", "key2"));
        assert!(!constant_time_eq("short", "longer"));
    }

    #[test]
    fn test_auth_config_display() {
        assert_eq!(AuthConfig::with_url_key("secret").to_string(), "UrlKey(*****)");
        assert_eq!(AuthConfig::disabled().to_string(), "Disabled");
    }
}
