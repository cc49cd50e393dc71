// Store module: invite code persistence

pub mod backend;
pub mod codes;

pub use backend::{MemoryStorage, SledStorage, StorageBackend};
pub use codes::{CodeStore, CodeStoreError};
