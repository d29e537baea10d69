use std::str::FromStr;

use anyhow::anyhow;
use bitcoin::hashes::{sha256, Hash as _};
use once_cell::sync::OnceCell;
use secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::serde_utils::SliceHex;

pub fn secp256k1_instance() -> &'static Secp256k1<All> {
    static INSTANCE: OnceCell<Secp256k1<All>> = OnceCell::new();
    INSTANCE.get_or_init(Secp256k1::new)
}

/// A secp256k1 private key. Used both for the channel keys that make up the
/// 2-of-2 escrow and for the revocation keys that are rotated on every
/// update. Serialized as the raw 32-byte scalar.
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Privkey(pub SecretKey);

impl From<SecretKey> for Privkey {
    fn from(key: SecretKey) -> Self {
        Self(key)
    }
}

impl From<Privkey> for SecretKey {
    fn from(key: Privkey) -> Self {
        key.0
    }
}

impl AsRef<[u8; 32]> for Privkey {
    fn as_ref(&self) -> &[u8; 32] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for Privkey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // Never print key material.
        write!(f, "Privkey(<secret>)")
    }
}

impl Privkey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        Self(SecretKey::new(&mut rand::thread_rng()))
    }

    /// Parses a raw 32-byte scalar, e.g. a revocation secret revealed by the
    /// remote peer. Fails on out-of-range scalars.
    pub fn from_slice(key: &[u8]) -> Result<Self, secp256k1::Error> {
        SecretKey::from_slice(key).map(Self)
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.0.public_key(secp256k1_instance()))
    }

    pub fn serialize(&self) -> [u8; 32] {
        self.0.secret_bytes()
    }
}

/// A secp256k1 public key, serialized in its compressed 33-byte form.
#[derive(Copy, Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pubkey(pub PublicKey);

impl From<PublicKey> for Pubkey {
    fn from(key: PublicKey) -> Self {
        Self(key)
    }
}

impl From<Pubkey> for PublicKey {
    fn from(key: Pubkey) -> Self {
        key.0
    }
}

impl Pubkey {
    pub fn from_slice(data: &[u8]) -> Result<Self, secp256k1::Error> {
        PublicKey::from_slice(data).map(Self)
    }

    pub fn serialize(&self) -> [u8; 33] {
        self.0.serialize()
    }
}

/// A 32-byte hash, displayed big-endian as hex. Channel and journal
/// identifiers are of this type.
#[serde_as]
#[derive(Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Hash256(#[serde_as(as = "SliceHex")] [u8; 32]);

impl From<[u8; 32]> for Hash256 {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Hash256 {
    /// SHA-256 of `data`.
    pub fn digest(data: &[u8]) -> Self {
        Self(sha256::Hash::hash(data).to_byte_array())
    }
}

impl std::fmt::LowerHex for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Hash256({:#x})", self)
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:x}", self)
    }
}

impl FromStr for Hash256 {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_start_matches("0x");
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(anyhow!("invalid hash length"));
        }
        let mut data = [0u8; 32];
        data.copy_from_slice(&bytes);
        Ok(Hash256(data))
    }
}

/// A peer's routing identity on the overlay, derived as the SHA-256 of its
/// identity public key. Resolution of a peer id into network addresses is
/// the overlay's business.
#[serde_as]
#[derive(Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeerId(#[serde_as(as = "SliceHex")] [u8; 32]);

impl PeerId {
    pub fn from_public_key(pubkey: &[u8]) -> Self {
        Self(sha256::Hash::hash(pubkey).to_byte_array())
    }
}

impl From<[u8; 32]> for PeerId {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // The short form is plenty for log lines.
        write!(f, "{}", &hex::encode(self.0)[..16])
    }
}
