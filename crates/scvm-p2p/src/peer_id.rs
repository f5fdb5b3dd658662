//! Peer identifiers derived from secp256k1 public keys.
//!
//! A peer id is a multihash of the protobuf-encoded public key. Keys
//! short enough are inlined with the identity hash; longer ones are
//! hashed with sha2-256.

use crate::error::P2pError;
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const MULTIHASH_IDENTITY: u8 = 0x00;
const MULTIHASH_SHA2_256: u8 = 0x12;
const MAX_INLINE_KEY_LENGTH: usize = 42;
const KEY_TYPE_SECP256K1: u8 = 2;

/// Raw multihash bytes of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(Vec<u8>);

impl PeerId {
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let compressed = key.to_encoded_point(true);
        let data = compressed.as_bytes();

        let mut encoded = Vec::with_capacity(4 + data.len());
        encoded.extend_from_slice(&[0x08, KEY_TYPE_SECP256K1, 0x12, data.len() as u8]);
        encoded.extend_from_slice(data);

        let mut id = Vec::with_capacity(2 + encoded.len().max(32));
        if encoded.len() <= MAX_INLINE_KEY_LENGTH {
            id.push(MULTIHASH_IDENTITY);
            id.push(encoded.len() as u8);
            id.extend_from_slice(&encoded);
        } else {
            id.push(MULTIHASH_SHA2_256);
            id.push(32);
            id.extend_from_slice(&Sha256::digest(&encoded));
        }
        Self(id)
    }

    /// Parses raw multihash bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, P2pError> {
        match bytes {
            [code, len, digest @ ..]
                if (*code == MULTIHASH_IDENTITY || *code == MULTIHASH_SHA2_256)
                    && *len as usize == digest.len()
                    && !digest.is_empty() =>
            {
                Ok(Self(bytes.to_vec()))
            }
            _ => Err(P2pError::InvalidPeerId),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    #[test]
    fn test_secp256k1_id_is_inlined() {
        let key = SigningKey::from_slice(&[3u8; 32]).unwrap();
        let id = PeerId::from_public_key(key.verifying_key());
        let bytes = id.as_bytes();
        assert_eq!(bytes.len(), 2 + 37);
        assert_eq!(&bytes[..6], &[0x00, 37, 0x08, 0x02, 0x12, 33]);
        // secp256k1 ids print with the familiar 16Uiu2 prefix
        assert!(id.to_string().starts_with("16Uiu2"));
        assert_eq!(PeerId::from_bytes(bytes).unwrap(), id);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert_eq!(PeerId::from_bytes(&[]), Err(P2pError::InvalidPeerId));
        assert_eq!(PeerId::from_bytes(&[0x00, 5, 1]), Err(P2pError::InvalidPeerId));
        assert_eq!(PeerId::from_bytes(&[0x99, 1, 1]), Err(P2pError::InvalidPeerId));
    }
}
