//! Dogecoin base58check address validation.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Version byte for pay-to-pubkey-hash addresses ("D...").
pub const P2PKH_VERSION: u8 = 0x1e;
/// Version byte for pay-to-script-hash addresses.
pub const P2SH_VERSION: u8 = 0x16;

const DECODED_LEN: usize = 25;
const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("not valid base58: {0}")]
    Encoding(String),
    #[error("decoded to {0} bytes, expected 25")]
    Length(usize),
    #[error("checksum mismatch")]
    Checksum,
    #[error("unknown version byte {0:#04x}")]
    Version(u8),
}

/// Checks base58check structure, checksum, and the Dogecoin version byte.
pub fn validate(address: &str) -> Result<(), AddressError> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|err| AddressError::Encoding(err.to_string()))?;

    if decoded.len() != DECODED_LEN {
        return Err(AddressError::Length(decoded.len()));
    }

    let (payload, checksum) = decoded.split_at(DECODED_LEN - CHECKSUM_LEN);
    if double_sha256(payload)[..CHECKSUM_LEN] != *checksum {
        return Err(AddressError::Checksum);
    }

    match payload[0] {
        P2PKH_VERSION | P2SH_VERSION => Ok(()),
        other => Err(AddressError::Version(other)),
    }
}

/// Encode a 20-byte public-key hash as a base58check address.
pub fn encode(version: u8, hash160: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(DECODED_LEN);
    payload.push(version);
    payload.extend_from_slice(hash160);
    let checksum = double_sha256(&payload);
    payload.extend_from_slice(&checksum[..CHECKSUM_LEN]);

    bs58::encode(payload).into_string()
}

fn double_sha256(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    Sha256::digest(first).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_p2pkh_address_validates() {
        let address = encode(P2PKH_VERSION, &[0x11; 20]);

        assert!(address.starts_with('D'));
        assert_eq!(validate(&address), Ok(()));
    }

    #[test]
    fn encoded_p2sh_address_validates() {
        let address = encode(P2SH_VERSION, &[0x42; 20]);

        assert_eq!(validate(&address), Ok(()));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let address = encode(P2PKH_VERSION, &[0x11; 20]);
        let mut decoded = bs58::decode(&address).into_vec().unwrap();
        decoded[10] ^= 0xff;
        let corrupted = bs58::encode(decoded).into_string();

        assert_eq!(validate(&corrupted), Err(AddressError::Checksum));
    }

    #[test]
    fn foreign_version_byte_is_rejected() {
        // bitcoin mainnet P2PKH version
        let address = encode(0x00, &[0x11; 20]);

        assert_eq!(validate(&address), Err(AddressError::Version(0x00)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(validate("not-an-address"), Err(AddressError::Encoding(_))));
        assert!(matches!(validate("Doge"), Err(AddressError::Length(_))));
    }
}
