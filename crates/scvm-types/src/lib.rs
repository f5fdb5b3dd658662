//! SCVM Types - Core type definitions for contract execution.
//!
//! This crate provides the types shared by every execution layer:
//! - Addresses (33-byte raw, 52-char base58check encoded) and account ids
//! - Accounting units (aer, gaer, aergo)
//! - Call payloads with numeric-preserving argument values
//! - Contract ABI
//! - Events, receipts, transactions and block info

pub mod abi;
pub mod address;
pub mod block;
pub mod call_info;
pub mod error;
pub mod event;
pub mod receipt;
pub mod transaction;
pub mod units;

pub use abi::{Abi, Function, CHECK_DELEGATION_FUNCTION, CONSTRUCTOR, DEFAULT_FUNCTION};
pub use address::{
    create_contract_id, decode_address, encode_address, is_special_account, str_hash, AccountId,
    ADDRESS_LENGTH, AERGO_SYSTEM, ENCODED_ADDRESS_LENGTH, NAME_LENGTH,
};
pub use block::{BlockHeader, BlockInfo, ForkVersion};
pub use call_info::{decode_args, CallInfo, Value};
pub use error::TypesError;
pub use event::Event;
pub use receipt::{Receipt, ReceiptStatus};
pub use transaction::{Tx, TxBody, TxType};

/// Storage key holding the encoded address of a contract's creator.
pub const CREATOR_META_KEY: &[u8] = b"Creator";

/// Length of a state variable key hash; used in update-size accounting.
pub const HASH_ID_LENGTH: usize = 32;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        encode_address, decode_address, AccountId, BlockInfo, CallInfo, Event, ForkVersion,
        Receipt, ReceiptStatus, Tx, TxBody, TxType, TypesError, Value,
    };
}
