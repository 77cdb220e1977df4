use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::ProxyConfig;
use crate::error::ConfigError;

/// Holds the single live chaos configuration.
///
/// Readers get an owned copy, so nothing they do can leak back into the
/// store. Writers swap the whole value under the write lock; a reader
/// either sees the previous config or the new one, never a mix.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    config: Arc<RwLock<ProxyConfig>>,
}

impl ConfigStore {
    /// Create a store holding the safe default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `config`
    pub fn with_config(config: ProxyConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Snapshot of the current configuration
    pub async fn get(&self) -> ProxyConfig {
        self.config.read().await.clone()
    }

    /// Atomically replace the whole configuration
    pub async fn replace(&self, config: ProxyConfig) {
        let mut current = self.config.write().await;
        *current = config;
        tracing::info!(
            mode = ?current.mode,
            failure_mode = %current.failure_mode,
            "Chaos configuration replaced"
        );
    }

    /// Parse, validate and install a JSON document.
    ///
    /// The store is untouched when the document is rejected.
    pub async fn replace_from_json(&self, data: &[u8]) -> Result<ProxyConfig, ConfigError> {
        let config: ProxyConfig = serde_json::from_slice(data)?;
        config.validate()?;
        self.replace(config.clone()).await;
        Ok(config)
    }

    /// Load a JSON document from disk into the store
    pub async fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<ProxyConfig, ConfigError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;
        self.replace_from_json(&data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailureMode, ProxyMode};

    #[tokio::test]
    async fn test_get_returns_independent_copy() {
        let store = ConfigStore::new();

        let mut snapshot = store.get().await;
        snapshot.mode = ProxyMode::Unified;
        snapshot.chaos_routes.push("/api".to_string());
        snapshot.lag_to_resp = 999;

        let fresh = store.get().await;
        assert_eq!(fresh.mode, ProxyMode::Split);
        assert!(fresh.chaos_routes.is_empty());
        assert_eq!(fresh.lag_to_resp, 0);
    }

    #[tokio::test]
    async fn test_replace_swaps_everything() {
        let store = ConfigStore::new();
        let config = ProxyConfig {
            mode: ProxyMode::Unified,
            target_unified: "http://localhost:3000".to_string(),
            failure_mode: FailureMode::HangBody,
            ..Default::default()
        };

        store.replace(config.clone()).await;
        assert_eq!(store.get().await, config);
    }

    #[tokio::test]
    async fn test_replace_from_json_rejects_without_touching_store() {
        let store = ConfigStore::new();
        store
            .replace_from_json(br#"{"mode": "unified", "targetUnified": "http://localhost:3000"}"#)
            .await
            .unwrap();

        let err = store.replace_from_json(b"{not json").await.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));

        let err = store
            .replace_from_json(br#"{"targetFrontend": "ftp://files"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        assert_eq!(store.get().await.target_unified, "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_configs() {
        let store = ConfigStore::new();
        let a = ProxyConfig {
            lag_to_req: 1,
            lag_to_resp: 1,
            ..Default::default()
        };
        let b = ProxyConfig {
            lag_to_req: 2,
            lag_to_resp: 2,
            ..Default::default()
        };

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    let next = if i % 2 == 0 { a.clone() } else { b.clone() };
                    store.replace(next).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let cfg = store.get().await;
                    assert_eq!(cfg.lag_to_req, cfg.lag_to_resp);
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_load_from_missing_file() {
        let store = ConfigStore::new();
        let err = store.load_from_file("/definitely/not/here.json").await.unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
