// Identity storage on top of the node's StorageBackend

use super::IdentityKeys;
use crate::store::backend::StorageBackend;
use crate::InviteError;
use std::sync::Arc;

const IDENTITY_KEY: &[u8] = b"identity/keys";

pub struct IdentityStore {
    db: Arc<dyn StorageBackend>,
}

impl IdentityStore {
    pub fn new(db: Arc<dyn StorageBackend>) -> Self {
        Self { db }
    }

    /// Save keys to storage
    pub fn save_keys(&self, keys: &IdentityKeys) -> Result<(), InviteError> {
        let bytes = keys.to_bytes();
        self.db
            .put(IDENTITY_KEY, &bytes)
            .map_err(|e| InviteError::store("Could not save identity", e))?;
        self.db
            .flush()
            .map_err(|e| InviteError::store("Could not save identity", e))
    }

    /// Load keys from storage
    pub fn load_keys(&self) -> Result<Option<IdentityKeys>, InviteError> {
        let Some(bytes) = self
            .db
            .get(IDENTITY_KEY)
            .map_err(|e| InviteError::store("Could not load identity", e))?
        else {
            return Ok(None);
        };
        IdentityKeys::from_bytes(&bytes)
            .map(Some)
            .ok_or_else(|| InviteError::store("Could not load identity", "invalid key bytes"))
    }
}
