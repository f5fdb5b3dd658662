//! Collaborators the execution core consumes but does not implement.

use num_bigint::BigUint;
use scvm_state::{AccountData, AccountState, BlockState, ContractState};
use scvm_types::{is_special_account, AccountId, BlockHeader, BlockInfo, Event, TxBody};
use std::collections::HashMap;

/// Account data read through a historical state root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountProof {
    pub inclusion: bool,
    pub data: AccountData,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarProof {
    pub inclusion: bool,
    pub value: Vec<u8>,
}

/// Read access to the stored chain.
pub trait ChainAccessor: Send + Sync {
    fn best_block(&self) -> Result<BlockHeader, String>;
    fn block_by_no(&self, no: u64) -> Result<BlockHeader, String>;
    fn account_and_proof(&self, aid: &AccountId, root: &[u8]) -> Result<AccountProof, String>;
    fn var_and_proof(&self, key_hash: &[u8], storage_root: &[u8]) -> Result<VarProof, String>;
}

/// Name service lookups.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, bs: &BlockState, name: &[u8]) -> Option<Vec<u8>>;
}

/// The chain's built-in system contract (staking and voting).
pub trait SystemContract: Send + Sync {
    fn validate(
        &self,
        body: &TxBody,
        sender: &AccountState,
        state: &ContractState,
        block: &BlockInfo,
    ) -> Result<(), String>;

    fn execute(
        &self,
        state: &mut ContractState,
        body: &TxBody,
        sender: &mut AccountState,
        receiver: &mut AccountState,
        block: &BlockInfo,
    ) -> Result<Vec<Event>, String>;

    /// Staked amount and the time of the last staking change.
    fn staking(&self, state: &ContractState, account: &[u8]) -> Result<(BigUint, u64), String>;
}

/// Embedded SQL database of contracts.
pub trait SqlEngine: Send + Sync {
    fn begin_tx(&self, aid: &AccountId, rp: u64) -> Result<Box<dyn SqlTx>, String>;
    fn begin_read_only(&self, aid: &AccountId, rp: u64) -> Result<Box<dyn SqlTx>, String>;
}

/// A transaction on one contract's database.
pub trait SqlTx {
    fn savepoint(&mut self) -> Result<(), String>;
    fn sub_savepoint(&mut self, name: &str) -> Result<(), String>;
    fn rollback_to_savepoint(&mut self) -> Result<(), String>;
    fn rollback_to_sub_savepoint(&mut self, name: &str) -> Result<(), String>;
    fn release(&mut self) -> Result<(), String>;
    fn close(&mut self);
    /// Runs a database host command and returns its encoded result.
    fn command(&mut self, cmd: &str, args: &[String]) -> Result<Vec<u8>, String>;
}

/// Name table kept in memory. Special accounts resolve to themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticNames {
    names: HashMap<Vec<u8>, Vec<u8>>,
}

impl StaticNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &[u8], address: Vec<u8>) {
        self.names.insert(name.to_vec(), address);
    }
}

impl NameResolver for StaticNames {
    fn resolve(&self, _bs: &BlockState, name: &[u8]) -> Option<Vec<u8>> {
        if is_special_account(name) {
            return Some(name.to_vec());
        }
        self.names.get(name).cloned()
    }
}

/// Chain view with only a best block and no history.
#[derive(Debug, Clone, Default)]
pub struct StaticChain {
    pub best: BlockHeader,
}

impl ChainAccessor for StaticChain {
    fn best_block(&self) -> Result<BlockHeader, String> {
        Ok(self.best.clone())
    }

    fn block_by_no(&self, no: u64) -> Result<BlockHeader, String> {
        if no == self.best.no {
            return Ok(self.best.clone());
        }
        Err(format!("block {} not found", no))
    }

    fn account_and_proof(&self, _aid: &AccountId, _root: &[u8]) -> Result<AccountProof, String> {
        Err("historical state is not available".into())
    }

    fn var_and_proof(&self, _key_hash: &[u8], _storage_root: &[u8]) -> Result<VarProof, String> {
        Err("historical state is not available".into())
    }
}

/// System contract that rejects every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSystemContract;

impl SystemContract for NoSystemContract {
    fn validate(&self, _: &TxBody, _: &AccountState, _: &ContractState, _: &BlockInfo) -> Result<(), String> {
        Err("system contract is not available".into())
    }

    fn execute(
        &self,
        _: &mut ContractState,
        _: &TxBody,
        _: &mut AccountState,
        _: &mut AccountState,
        _: &BlockInfo,
    ) -> Result<Vec<Event>, String> {
        Err("system contract is not available".into())
    }

    fn staking(&self, _: &ContractState, _: &[u8]) -> Result<(BigUint, u64), String> {
        Err("system contract is not available".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_names() {
        let bs = BlockState::default();
        let mut names = StaticNames::new();
        names.insert(b"alicealiceal", vec![7; 33]);
        assert_eq!(names.resolve(&bs, b"alicealiceal"), Some(vec![7; 33]));
        assert_eq!(names.resolve(&bs, b"aergo.system"), Some(b"aergo.system".to_vec()));
        assert_eq!(names.resolve(&bs, b"bobbobbobbob"), None);
    }

    #[test]
    fn test_static_chain() {
        let chain = StaticChain { best: BlockHeader { no: 5, ..Default::default() } };
        assert_eq!(chain.best_block().unwrap().no, 5);
        assert!(chain.block_by_no(4).is_err());
        assert!(chain.var_and_proof(b"k", b"r").is_err());
    }
}
