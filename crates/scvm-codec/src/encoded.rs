//! Text form of contract code: base58check with version byte `0xC0`.

use crate::error::CodecError;

/// Version byte of encoded contract code.
pub const CODE_VERSION: u8 = 0xC0;

pub fn encode_code(code: &[u8]) -> String {
    let mut versioned = Vec::with_capacity(code.len() + 1);
    versioned.push(CODE_VERSION);
    versioned.extend_from_slice(code);
    bs58::encode(versioned).with_check().into_string()
}

pub fn decode_code(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let decoded = bs58::decode(encoded).with_check(None).into_vec()?;
    match decoded.split_first() {
        Some((&CODE_VERSION, body)) => Ok(body.to_vec()),
        _ => Err(CodecError::InvalidVersion),
    }
}
