//! Compiled contract code and deployment payloads.
//!
//! ```text
//! LuaCode        = u32_le(bytecode_len) || bytecode || abi
//! LuaCodePayload = u32_le(4 + code_len) || code || constructor_args
//! ```

use crate::error::CodecError;

const LEN_PREFIX: usize = 4;

fn read_u32_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; LEN_PREFIX];
    buf.copy_from_slice(&bytes[..LEN_PREFIX]);
    u32::from_le_bytes(buf) as u64
}

/// Bytecode plus ABI of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LuaCode(Vec<u8>);

impl LuaCode {
    pub fn new(bytecode: &[u8], abi: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(LEN_PREFIX + bytecode.len() + abi.len());
        buf.extend_from_slice(&(bytecode.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytecode);
        buf.extend_from_slice(abi);
        Self(buf)
    }

    /// Wraps already-encoded code without checking it.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn is_valid_format(&self) -> bool {
        if self.0.len() <= LEN_PREFIX {
            return false;
        }
        let len = read_u32_le(&self.0);
        (self.0.len() as u64) > len + LEN_PREFIX as u64
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bytecode slice; empty when the format is invalid.
    pub fn byte_code(&self) -> &[u8] {
        if !self.is_valid_format() {
            return &[];
        }
        let len = read_u32_le(&self.0) as usize;
        &self.0[LEN_PREFIX..LEN_PREFIX + len]
    }

    /// ABI slice; empty when the format is invalid.
    pub fn abi(&self) -> &[u8] {
        if !self.is_valid_format() {
            return &[];
        }
        let len = read_u32_le(&self.0) as usize;
        &self.0[LEN_PREFIX + len..]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Deployment payload: code followed by optional constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LuaCodePayload(Vec<u8>);

impl LuaCodePayload {
    pub fn new(code: &LuaCode, args: &[u8]) -> Self {
        let head_len = (LEN_PREFIX + code.len()) as u32;
        let mut buf = Vec::with_capacity(head_len as usize + args.len());
        buf.extend_from_slice(&head_len.to_le_bytes());
        buf.extend_from_slice(code.bytes());
        buf.extend_from_slice(args);
        Self(buf)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    fn head_len(&self) -> u64 {
        read_u32_le(&self.0)
    }

    pub fn is_valid_format(&self) -> Result<(), CodecError> {
        if self.0.len() <= LEN_PREFIX {
            return Err(CodecError::TooShort(self.0.len()));
        }
        let head_len = self.head_len();
        if (self.0.len() as u64) < head_len {
            return Err(CodecError::LengthMismatch {
                expected: head_len,
                actual: self.0.len(),
            });
        }
        Ok(())
    }

    /// Contract code; empty when the format is invalid.
    pub fn code(&self) -> LuaCode {
        if self.is_valid_format().is_err() {
            return LuaCode::default();
        }
        let head_len = self.head_len() as usize;
        // a head shorter than its own prefix carries no code
        if head_len < LEN_PREFIX {
            return LuaCode::default();
        }
        LuaCode(self.0[LEN_PREFIX..head_len].to_vec())
    }

    /// Constructor arguments (JSON); empty when absent or invalid.
    pub fn args(&self) -> &[u8] {
        if self.is_valid_format().is_err() {
            return &[];
        }
        let head_len = (self.head_len() as usize).max(LEN_PREFIX);
        &self.0[head_len..]
    }

    pub fn has_args(&self) -> bool {
        self.is_valid_format().is_ok() && (self.0.len() as u64) > self.head_len().max(LEN_PREFIX as u64)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}
