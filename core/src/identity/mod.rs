// Node identity: the public feed id other peers follow

mod keys;
mod store;

pub use keys::IdentityKeys;
pub use store::IdentityStore;

use crate::store::backend::StorageBackend;
use crate::InviteError;
use std::sync::Arc;

/// Identity of the local node
#[derive(Clone)]
pub struct NodeIdentity {
    keys: IdentityKeys,
}

impl NodeIdentity {
    /// Fresh identity that is never persisted
    pub fn ephemeral() -> Self {
        Self {
            keys: IdentityKeys::generate(),
        }
    }

    /// Load the identity stored in `backend`, generating one on first use
    pub fn load_or_generate(backend: Arc<dyn StorageBackend>) -> Result<Self, InviteError> {
        let store = IdentityStore::new(backend);
        if let Some(keys) = store.load_keys()? {
            tracing::info!("Loaded existing identity");
            return Ok(Self { keys });
        }

        tracing::info!("Generating new identity");
        let keys = IdentityKeys::generate();
        store.save_keys(&keys)?;
        Ok(Self { keys })
    }

    pub fn feed_id(&self) -> String {
        self.keys.feed_id()
    }

    pub fn keys(&self) -> &IdentityKeys {
        &self.keys
    }
}
