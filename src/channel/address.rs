use std::str::FromStr;

use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::PeerId;

/// Human-readable part of the encoded form.
const ADDRESS_HRP: &str = "bchpc";

/// Destination identifier handed out by a payee. The body binds the payee's
/// overlay identity key together with a 16-byte tag the payee can use to
/// correlate incoming channels to external events (an order on a website,
/// say). Encoding is bech32m over the concatenated body:
///
///     bech32m(hrp, peer_pubkey (32 bytes) || address_id (16 bytes))
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAddress {
    /// The payee's overlay identity public key.
    pub peer_pubkey: [u8; 32],
    /// Opaque tag chosen by the payee.
    pub address_id: [u8; 16],
}

#[derive(Error, Debug)]
pub enum AddressError {
    #[error("bech32 error: {0}")]
    Bech32(#[from] bech32::Error),
    #[error("invalid human-readable part: {0}")]
    InvalidHrp(String),
    #[error("invalid checksum variant")]
    InvalidVariant,
    #[error("invalid payload length: {0}")]
    InvalidLength(usize),
}

impl ChannelAddress {
    pub fn new(peer_pubkey: [u8; 32], address_id: [u8; 16]) -> Self {
        Self {
            peer_pubkey,
            address_id,
        }
    }

    /// The routing identity to open streams to.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.peer_pubkey)
    }
}

impl std::fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut body = Vec::with_capacity(48);
        body.extend_from_slice(&self.peer_pubkey);
        body.extend_from_slice(&self.address_id);
        let encoded = bech32::encode(ADDRESS_HRP, body.to_base32(), Variant::Bech32m)
            .expect("hrp is valid");
        write!(f, "{}", encoded)
    }
}

impl FromStr for ChannelAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, data, variant) = bech32::decode(s)?;
        if hrp != ADDRESS_HRP {
            return Err(AddressError::InvalidHrp(hrp));
        }
        if variant != Variant::Bech32m {
            return Err(AddressError::InvalidVariant);
        }
        let body = Vec::<u8>::from_base32(&data)?;
        if body.len() != 48 {
            return Err(AddressError::InvalidLength(body.len()));
        }
        let mut peer_pubkey = [0u8; 32];
        peer_pubkey.copy_from_slice(&body[..32]);
        let mut address_id = [0u8; 16];
        address_id.copy_from_slice(&body[32..]);
        Ok(Self {
            peer_pubkey,
            address_id,
        })
    }
}
