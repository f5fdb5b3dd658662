use crate::error::TypesError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a raw account address (compressed secp256k1 key or contract id).
pub const ADDRESS_LENGTH: usize = 33;
/// Length of the base58check text form of a raw address.
pub const ENCODED_ADDRESS_LENGTH: usize = 52;
/// Length of a registered account name.
pub const NAME_LENGTH: usize = 12;
/// Base58check version byte of account addresses.
pub const ADDRESS_VERSION: u8 = 0x42;
/// Leading byte of contract ids.
pub const CONTRACT_ID_PREFIX: u8 = 0x0C;

pub const AERGO_SYSTEM: &str = "aergo.system";
pub const AERGO_NAME: &str = "aergo.name";
pub const AERGO_ENTERPRISE: &str = "aergo.enterprise";
pub const AERGO_VAULT: &str = "aergo.vault";

/// Returns true for the built-in system accounts addressed by name.
pub fn is_special_account(name: &[u8]) -> bool {
    [AERGO_SYSTEM, AERGO_NAME, AERGO_ENTERPRISE, AERGO_VAULT]
        .iter()
        .any(|s| s.as_bytes() == name)
}

/// Encodes a raw id to its text form.
///
/// 33-byte ids become base58check with [`ADDRESS_VERSION`]; anything else
/// (names, empty ids) is returned as the raw string.
pub fn encode_address(raw: &[u8]) -> String {
    if raw.len() != ADDRESS_LENGTH {
        return String::from_utf8_lossy(raw).into_owned();
    }
    let mut versioned = Vec::with_capacity(ADDRESS_LENGTH + 1);
    versioned.push(ADDRESS_VERSION);
    versioned.extend_from_slice(raw);
    bs58::encode(versioned).with_check().into_string()
}

/// Decodes the text form produced by [`encode_address`].
pub fn decode_address(encoded: &str) -> Result<Vec<u8>, TypesError> {
    if is_special_account(encoded.as_bytes()) {
        return Ok(encoded.as_bytes().to_vec());
    }
    let decoded = bs58::decode(encoded).with_check(None).into_vec()?;
    let (version, body) = decoded
        .split_first()
        .ok_or_else(|| TypesError::InvalidAddressFormat(encoded.to_string()))?;
    if *version != ADDRESS_VERSION {
        return Err(TypesError::InvalidAddressVersion(*version));
    }
    if body.len() != ADDRESS_LENGTH {
        return Err(TypesError::InvalidAddressLength(body.len()));
    }
    Ok(body.to_vec())
}

/// Hashes an arbitrary string to a storage id: encoded addresses decode to
/// their raw bytes, everything else is `0x0C || sha256(s)`.
pub fn str_hash(s: &str) -> Vec<u8> {
    if s.len() == ENCODED_ADDRESS_LENGTH && s.chars().all(|c| c.is_ascii_alphanumeric()) {
        if let Ok(raw) = decode_address(s) {
            return raw;
        }
    }
    let mut out = Vec::with_capacity(ADDRESS_LENGTH);
    out.push(CONTRACT_ID_PREFIX);
    out.extend_from_slice(&Sha256::digest(s.as_bytes()));
    out
}

/// Derives the address of a contract deployed by `creator` at `nonce`.
///
/// `0x0C || sha256(creator || decimal(nonce))`
pub fn create_contract_id(creator: &[u8], nonce: u64) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(creator);
    hasher.update(nonce.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut id = Vec::with_capacity(ADDRESS_LENGTH);
    id.push(CONTRACT_ID_PREFIX);
    id.extend_from_slice(&digest);
    id
}

/// Storage key of an account: sha256 of its raw id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hashes a raw account id.
    pub fn from_id(raw: &[u8]) -> Self {
        Self(Sha256::digest(raw).into())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> Vec<u8> {
        let mut raw = vec![0x03u8];
        raw.extend((1..=32).map(|i| i as u8));
        raw
    }

    #[test]
    fn test_encode_decode_address() {
        let raw = sample_raw();
        let encoded = encode_address(&raw);
        assert_eq!(encoded.len(), ENCODED_ADDRESS_LENGTH);
        assert_eq!(decode_address(&encoded).unwrap(), raw);
    }

    #[test]
    fn test_encode_name_passthrough() {
        assert_eq!(encode_address(AERGO_SYSTEM.as_bytes()), AERGO_SYSTEM);
        assert_eq!(encode_address(&[]), "");
        assert_eq!(decode_address(AERGO_SYSTEM).unwrap(), AERGO_SYSTEM.as_bytes());
    }

    #[test]
    fn test_decode_rejects_other_version() {
        let mut versioned = vec![0x01u8];
        versioned.extend(sample_raw());
        let encoded = bs58::encode(versioned).with_check().into_string();
        assert_eq!(decode_address(&encoded), Err(TypesError::InvalidAddressVersion(0x01)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_address("not-an-address").is_err());
    }

    #[test]
    fn test_create_contract_id_vectors() {
        let cases: [(&[u8], u64, [u8; 33]); 4] = [
            (&[0x01], 0, [
                0x0c, 0x44, 0xc8, 0x08, 0xfd, 0x16, 0x6d, 0xbb, 0x89, 0x61, 0xfb, 0x79, 0x55, 0x87, 0xe5, 0xee,
                0x00, 0x82, 0xf8, 0xa2, 0xdc, 0x78, 0x1f, 0xf0, 0x6a, 0x3f, 0x02, 0x22, 0x3d, 0xcc, 0x06, 0xa7, 0xda,
            ]),
            (&[0x01], 1, [
                0x0c, 0xf1, 0x6b, 0xa6, 0xfa, 0x61, 0xda, 0x33, 0x98, 0x81, 0x5b, 0xe2, 0xa6, 0xc0, 0xf7, 0xcb,
                0x13, 0x51, 0x98, 0x2d, 0xbc, 0xc6, 0xc6, 0x4b, 0xbe, 0xb9, 0xb6, 0x5f, 0x67, 0x2a, 0x8b, 0x10, 0x2a,
            ]),
            (&[0xFF], 0, [
                0x0c, 0x65, 0x1c, 0xb3, 0x16, 0x99, 0xd4, 0x0d, 0xd0, 0xd0, 0x94, 0x44, 0xc7, 0xd7, 0x41, 0x87,
                0xa0, 0xee, 0xcb, 0x4c, 0xbc, 0x2b, 0x1b, 0x04, 0x61, 0xbc, 0x4a, 0x3f, 0x1a, 0x5f, 0x97, 0x2e, 0xdb,
            ]),
            (&[0xFF], 1, [
                0x0c, 0x71, 0x36, 0x9f, 0x7c, 0x97, 0x5c, 0x0f, 0x86, 0x19, 0x57, 0xbc, 0x06, 0x04, 0x28, 0x1e,
                0x86, 0x37, 0x6a, 0x12, 0xd7, 0x1e, 0xe7, 0xf6, 0x2f, 0x98, 0xab, 0x14, 0xbe, 0x4d, 0xf5, 0xd4, 0x56,
            ]),
        ];
        for (creator, nonce, expected) in cases {
            assert_eq!(create_contract_id(creator, nonce), expected.to_vec());
        }
    }

    #[test]
    fn test_create_contract_id_distinct() {
        let a = create_contract_id(&sample_raw(), 7);
        let b = create_contract_id(&sample_raw(), 8);
        assert_ne!(a, b);
        assert_eq!(a.len(), ADDRESS_LENGTH);
        assert_eq!(a[0], CONTRACT_ID_PREFIX);
    }

    #[test]
    fn test_str_hash() {
        let raw = sample_raw();
        assert_eq!(str_hash(&encode_address(&raw)), raw);
        let hashed = str_hash("my-name");
        assert_eq!(hashed.len(), ADDRESS_LENGTH);
        assert_eq!(hashed[0], CONTRACT_ID_PREFIX);
    }

    #[test]
    fn test_account_id() {
        let a = AccountId::from_id(b"abc");
        assert_eq!(a, AccountId::from_id(b"abc"));
        assert_ne!(a, AccountId::from_id(b"abd"));
        assert!(!a.to_string().is_empty());
    }
}
