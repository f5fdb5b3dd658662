//! SCVM State - in-memory state of the block being built.
//!
//! - `AccountState`: balance, nonce, code hash and SQL recovery point
//! - `ContractState`: key/value storage and code with a revision journal
//! - `BlockState`: committed accounts, staged contracts and the code cache

pub mod account;
pub mod block;
pub mod contract;
pub mod error;

pub use account::{send_balance, AccountData, AccountState};
pub use block::BlockState;
pub use contract::{code_hash, var_key_hash, ContractState, Revision};
pub use error::StateError;
