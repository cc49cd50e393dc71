// Namespaced view over a StorageBackend
//
// Server codes and client codes share one backend; each gets its own key
// prefix so a full scan only ever sees its own namespace.

use crate::store::backend::StorageBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CodeStoreError {
    #[error("storage backend: {0}")]
    Backend(String),
    #[error("malformed value under {key}: {reason}")]
    Codec { key: String, reason: String },
}

#[derive(Clone)]
pub struct CodeStore {
    backend: Arc<dyn StorageBackend>,
    namespace: String,
    prefix: Vec<u8>,
}

impl CodeStore {
    pub fn new(backend: Arc<dyn StorageBackend>, namespace: &str) -> Self {
        let prefix = format!("{}/", namespace).into_bytes();
        Self {
            backend,
            namespace: namespace.to_string(),
            prefix,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, key: &str) -> Vec<u8> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key.as_bytes());
        full
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CodeStoreError> {
        let Some(bytes) = self
            .backend
            .get(&self.key(key))
            .map_err(CodeStoreError::Backend)?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CodeStoreError::Codec {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CodeStoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CodeStoreError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.backend
            .put(&self.key(key), &bytes)
            .map_err(CodeStoreError::Backend)
    }

    pub fn del(&self, key: &str) -> Result<(), CodeStoreError> {
        self.backend
            .remove(&self.key(key))
            .map_err(CodeStoreError::Backend)
    }

    /// Full scan of this namespace, keys stripped of the prefix.
    /// Values that no longer decode are logged and skipped.
    pub fn scan<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>, CodeStoreError> {
        let raw = self
            .backend
            .scan_prefix(&self.prefix)
            .map_err(CodeStoreError::Backend)?;

        let mut entries = Vec::with_capacity(raw.len());
        for (full_key, bytes) in raw {
            let key = String::from_utf8_lossy(&full_key[self.prefix.len()..]).into_owned();
            match serde_json::from_slice(&bytes) {
                Ok(value) => entries.push((key, value)),
                Err(e) => warn!("skipping malformed value under {}/{}: {}", self.namespace, key, e),
            }
        }
        Ok(entries)
    }
}
