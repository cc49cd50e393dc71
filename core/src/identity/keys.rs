// Node identity keys

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::SigningKey;
use zeroize::{Zeroize, Zeroizing};

/// Signing key that backs the node's public feed identity
#[derive(Clone)]
pub struct IdentityKeys {
    pub signing_key: SigningKey,
}

impl IdentityKeys {
    /// Generate new identity keys
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut secret_key_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret_key_bytes);
        let signing_key = SigningKey::from_bytes(&secret_key_bytes);
        secret_key_bytes.zeroize();
        Self { signing_key }
    }

    /// Public identity in feed form: `@<base64 public key>.ed25519`
    pub fn feed_id(&self) -> String {
        let public_key = self.signing_key.verifying_key().to_bytes();
        format!("@{}.ed25519", STANDARD.encode(public_key))
    }

    /// Serialize keys to bytes.
    /// Returns a `Zeroizing<Vec<u8>>` that wipes secret key material on drop.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.signing_key.to_bytes().to_vec())
    }

    /// Deserialize keys from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let secret: [u8; 32] = bytes.try_into().ok()?;
        Some(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }
}
