use std::str::FromStr;

use crate::channel::address::{AddressError, ChannelAddress};
use crate::channel::types::PeerId;

#[test]
fn encode_decode_round_trip() {
    let address = ChannelAddress::new([0xab; 32], [0xcd; 16]);
    let encoded = address.to_string();
    assert!(encoded.starts_with("bchpc1"));

    let decoded = ChannelAddress::from_str(&encoded).unwrap();
    assert_eq!(decoded, address);
    assert_eq!(decoded.peer_id(), PeerId::from_public_key(&[0xab; 32]));
}

#[test]
fn rejects_foreign_hrp() {
    let address = ChannelAddress::new([1; 32], [2; 16]);
    let encoded = address.to_string();
    let foreign = encoded.replacen("bchpc1", "other1", 1);
    assert!(matches!(
        ChannelAddress::from_str(&foreign),
        Err(AddressError::InvalidHrp(_)) | Err(AddressError::Bech32(_))
    ));
}

#[test]
fn rejects_corrupted_checksum() {
    let address = ChannelAddress::new([1; 32], [2; 16]);
    let mut encoded = address.to_string();
    // Flip the final checksum character.
    let last = encoded.pop().unwrap();
    encoded.push(if last == 'q' { 'p' } else { 'q' });
    assert!(ChannelAddress::from_str(&encoded).is_err());
}

#[test]
fn rejects_short_payload() {
    use bech32::{ToBase32, Variant};
    let truncated = bech32::encode("bchpc", [0u8; 20].to_base32(), Variant::Bech32m).unwrap();
    assert!(matches!(
        ChannelAddress::from_str(&truncated),
        Err(AddressError::InvalidLength(20))
    ));
}

#[test]
fn distinct_ids_yield_distinct_addresses() {
    let one = ChannelAddress::new([1; 32], [1; 16]);
    let two = ChannelAddress::new([1; 32], [2; 16]);
    assert_ne!(one.to_string(), two.to_string());
    assert_eq!(one.peer_id(), two.peer_id());
}
