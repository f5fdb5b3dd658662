//! SCVM Codec - contract code artifacts.
//!
//! - `LuaCode`: bytecode and ABI in one length-prefixed buffer
//! - `LuaCodePayload`: deployment payload with constructor arguments
//! - `encode_code` / `decode_code`: base58check text form
//!
//! All multi-byte integers are little-endian. Accessors return empty
//! slices for malformed input; validators return a [`CodecError`].

pub mod encoded;
pub mod error;
pub mod lua_code;

pub use encoded::{decode_code, encode_code, CODE_VERSION};
pub use error::CodecError;
pub use lua_code::{LuaCode, LuaCodePayload};

/// Splits a deploy payload into code and constructor arguments.
///
/// A payload that is not a valid `LuaCodePayload` but is valid `LuaCode`
/// is accepted as code without arguments.
pub fn split_deploy_payload(payload: &[u8]) -> Result<(LuaCode, Vec<u8>), CodecError> {
    let wrapped = LuaCodePayload::from_bytes(payload.to_vec());
    if wrapped.is_valid_format().is_ok() {
        let code = wrapped.code();
        if code.is_valid_format() {
            return Ok((code, wrapped.args().to_vec()));
        }
    }
    let bare = LuaCode::from_bytes(payload.to_vec());
    if bare.is_valid_format() {
        return Ok((bare, Vec::new()));
    }
    wrapped.is_valid_format()?;
    Err(CodecError::InvalidFormat)
}
