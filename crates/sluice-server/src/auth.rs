use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use sluice_types::Principal;

use crate::error::ServerResult;

/// Maps an API key to the principal that owns it.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// `Ok(None)` means the key is unknown.
    async fn resolve(&self, key: &str) -> ServerResult<Option<Principal>>;
}

/// Fixed table of keys, for tests and single-tenant deployments.
#[derive(Debug, Default)]
pub struct StaticKeys {
    keys: RwLock<HashMap<String, Principal>>,
}

impl StaticKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, key: impl Into<String>, principal: Principal) -> Self {
        self.insert(key, principal);
        self
    }

    pub fn insert(&self, key: impl Into<String>, principal: Principal) {
        self.keys
            .write()
            .expect("keys lock poisoned")
            .insert(key.into(), principal);
    }
}

#[async_trait]
impl KeyResolver for StaticKeys {
    async fn resolve(&self, key: &str) -> ServerResult<Option<Principal>> {
        Ok(self.keys.read().expect("keys lock poisoned").get(key).cloned())
    }
}

/// Accepts any key; the key itself becomes the principal ID.
pub struct AllowAllKeys;

#[async_trait]
impl KeyResolver for AllowAllKeys {
    async fn resolve(&self, key: &str) -> ServerResult<Option<Principal>> {
        let short: String = key.chars().take(8).collect();
        Ok(Some(Principal::new(key, format!("key-{short}"))))
    }
}

/// The API key carried in `Authorization`. Accepts `Bearer <key>`, `Basic
/// <key>`, or a bare key.
pub fn api_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let key = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("Basic "))
        .unwrap_or(value)
        .trim();
    (!key.is_empty()).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn api_key_forms() {
        assert_eq!(api_key(&headers("Bearer SLA123")), Some("SLA123"));
        assert_eq!(api_key(&headers("Basic SLA123")), Some("SLA123"));
        assert_eq!(api_key(&headers("SLA123")), Some("SLA123"));
        assert_eq!(api_key(&headers("   ")), None);
        assert_eq!(api_key(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn static_keys() {
        let keys = StaticKeys::new().with_key("k1", Principal::new("u1", "alice"));
        assert_eq!(keys.resolve("k1").await.unwrap().unwrap().username, "alice");
        assert!(keys.resolve("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn allow_all_keys() {
        let p = AllowAllKeys.resolve("abcdefghijkl").await.unwrap().unwrap();
        assert_eq!(p.id, "abcdefghijkl");
        assert_eq!(p.username, "key-abcdefgh");
    }
}
