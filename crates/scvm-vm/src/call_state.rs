use crate::backend::SqlTx;
use num_bigint::BigUint;
use scvm_state::{AccountState, ContractState};
use scvm_types::AccountId;
use std::fmt;

/// Working state of one account touched by a transaction.
pub struct CallState {
    pub account: AccountState,
    pub ctr_state: Option<ContractState>,
    pub tx: Option<Box<dyn SqlTx>>,
    pub is_callback: bool,
    pub is_deploy: bool,
    /// Loaded during execution; written back to the block state on commit
    pub(crate) write_back: bool,
}

impl CallState {
    pub fn new(account: AccountState) -> Self {
        Self {
            account,
            ctr_state: None,
            tx: None,
            is_callback: false,
            is_deploy: false,
            write_back: false,
        }
    }

    pub fn with_contract(account: AccountState, ctr_state: ContractState) -> Self {
        Self { ctr_state: Some(ctr_state), ..Self::new(account) }
    }

    pub(crate) fn loaded(account: AccountState) -> Self {
        Self { write_back: true, ..Self::new(account) }
    }

    /// Replaces the contract code and keeps the account's code hash in step.
    pub fn set_code(&mut self, code: Option<Vec<u8>>) {
        let ctr = self
            .ctr_state
            .get_or_insert_with(|| ContractState::new(self.account.id().to_vec()));
        let hash = ctr.set_code(code);
        self.account.set_code_hash(hash);
    }
}

impl fmt::Debug for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallState")
            .field("account", &self.account)
            .field("has_ctr_state", &self.ctr_state.is_some())
            .field("has_tx", &self.tx.is_some())
            .field("is_callback", &self.is_callback)
            .field("is_deploy", &self.is_deploy)
            .finish()
    }
}

/// The contract frame currently executing.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractInfo {
    /// Key of the frame's call state
    pub aid: AccountId,
    pub sender: Vec<u8>,
    pub contract_id: Vec<u8>,
    /// SQL recovery point of the contract
    pub rp: u64,
    pub amount: BigUint,
}
