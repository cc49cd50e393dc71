//! Invite codes and invite strings
//!
//! ```text
//! invite := "dht" ":" seed ":" remoteIdentity
//! ```
//!
//! The seed is 32 random bytes, base64 encoded. The rendezvous channel for
//! a code is `seed:issuer` and the dial address is the invite string with a
//! `~shs:<issuer>` suffix selecting the handshake keyed to the issuer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Scheme prefix of every invite string
pub const INVITE_PREFIX: &str = "dht";

/// Transport-selection scheme appended to the dial address
pub const HANDSHAKE_SCHEME: &str = "shs";

const SEED_BYTES: usize = 32;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("Cannot `accept` the DHT invite, it is missing")]
    Missing,
    #[error("Cannot `accept` the DHT invite, it is missing some parts")]
    WrongPartCount,
    #[error("Cannot `accept` the DHT invite, it should start with \"dht\"")]
    WrongPrefix,
    #[error("Cannot `accept` the DHT invite, the seed part is missing")]
    EmptySeed,
    #[error("Cannot `accept` the DHT invite, the feed id part is missing")]
    EmptyRemoteId,
}

/// High-entropy token identifying one hosting slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InviteCode(String);

impl InviteCode {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SEED_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A parsed `dht:<seed>:<issuer>` invite string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invite {
    seed: String,
    remote_id: String,
}

impl Invite {
    pub fn new(seed: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            remote_id: remote_id.into(),
        }
    }

    pub fn parse(invite: &str) -> Result<Self, ParseError> {
        if invite.is_empty() {
            return Err(ParseError::Missing);
        }
        let parts: Vec<&str> = invite.split(':').collect();
        let [prefix, seed, remote_id] = parts.as_slice() else {
            return Err(ParseError::WrongPartCount);
        };
        if *prefix != INVITE_PREFIX {
            return Err(ParseError::WrongPrefix);
        }
        if seed.is_empty() {
            return Err(ParseError::EmptySeed);
        }
        if remote_id.is_empty() {
            return Err(ParseError::EmptyRemoteId);
        }
        Ok(Self::new(*seed, *remote_id))
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Identity of the issuer
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Rendezvous channel the issuer listens on for this code
    pub fn channel(&self) -> String {
        channel_id(&self.seed, &self.remote_id)
    }

    /// Address to dial the issuer through the rendezvous transport
    pub fn dial_address(&self) -> String {
        format!("{}~{}:{}", self, HANDSHAKE_SCHEME, self.remote_id)
    }
}

impl fmt::Display for Invite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", INVITE_PREFIX, self.seed, self.remote_id)
    }
}

impl FromStr for Invite {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn channel_id(seed: &str, issuer: &str) -> String {
    format!("{}:{}", seed, issuer)
}
