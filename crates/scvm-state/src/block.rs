use crate::account::{AccountData, AccountState};
use crate::contract::ContractState;
use num_bigint::BigUint;
use scvm_types::AccountId;
use std::collections::HashMap;
use tracing::trace;

/// State of the block under construction.
///
/// Holds the committed account data, staged contract states and the
/// per-block code cache.
#[derive(Debug, Default)]
pub struct BlockState {
    accounts: HashMap<AccountId, AccountData>,
    contracts: HashMap<AccountId, ContractState>,
    code_cache: HashMap<AccountId, Vec<u8>>,
    gas_price: BigUint,
}

impl BlockState {
    pub fn new(gas_price: BigUint) -> Self {
        Self { gas_price, ..Default::default() }
    }

    pub fn gas_price(&self) -> &BigUint {
        &self.gas_price
    }

    pub fn set_gas_price(&mut self, price: BigUint) {
        self.gas_price = price;
    }

    pub fn account_data(&self, aid: &AccountId) -> Option<&AccountData> {
        self.accounts.get(aid)
    }

    /// Loads the account for `id`, or a fresh one marked new.
    pub fn get_account_state(&self, id: &[u8]) -> AccountState {
        let aid = AccountId::from_id(id);
        match self.accounts.get(&aid) {
            Some(data) => AccountState::new(id.to_vec(), data.clone(), false),
            None => AccountState::new(id.to_vec(), AccountData::default(), true),
        }
    }

    pub fn create_account_state(&self, id: &[u8]) -> AccountState {
        AccountState::new(id.to_vec(), AccountData::default(), true)
    }

    pub fn put_state(&mut self, account: &AccountState) {
        trace!(aid = %account.aid(), balance = %account.balance(), "put state");
        self.accounts.insert(account.aid(), account.data().clone());
    }

    pub fn balance(&self, id: &[u8]) -> BigUint {
        self.accounts
            .get(&AccountId::from_id(id))
            .map(|d| d.balance.clone())
            .unwrap_or_default()
    }

    /// Opens the staged contract state for `id`, or an empty one.
    pub fn open_contract_state(&self, id: &[u8]) -> ContractState {
        let aid = AccountId::from_id(id);
        self.contracts
            .get(&aid)
            .cloned()
            .unwrap_or_else(|| ContractState::new(id.to_vec()))
    }

    /// Stages a contract state; multicall scratch states are dropped.
    pub fn stage_contract_state(&mut self, mut state: ContractState) {
        if state.is_multicall() {
            return;
        }
        state.commit();
        self.contracts.insert(state.aid(), state);
    }

    pub fn multicall_state(&self, sender: &[u8]) -> ContractState {
        ContractState::multicall(sender.to_vec())
    }

    pub fn get_cached_code(&self, aid: &AccountId) -> Option<&[u8]> {
        self.code_cache.get(aid).map(Vec::as_slice)
    }

    pub fn add_cache(&mut self, aid: AccountId, code: Vec<u8>) {
        self.code_cache.insert(aid, code);
    }

    pub fn remove_cache(&mut self, aid: &AccountId) {
        self.code_cache.remove(aid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_roundtrip() {
        let mut bs = BlockState::new(BigUint::from(50u32));
        let mut acc = bs.get_account_state(b"alice");
        assert!(acc.is_new());
        acc.add_balance(&BigUint::from(100u32));
        bs.put_state(&acc);

        let loaded = bs.get_account_state(b"alice");
        assert!(!loaded.is_new());
        assert_eq!(bs.balance(b"alice"), BigUint::from(100u32));
        assert_eq!(bs.balance(b"bob"), BigUint::default());
        assert_eq!(bs.gas_price(), &BigUint::from(50u32));
    }

    #[test]
    fn test_stage_contract_state() {
        let mut bs = BlockState::default();
        let mut cs = bs.open_contract_state(b"ctr");
        cs.set_data(b"k", b"v");
        bs.stage_contract_state(cs);
        assert_eq!(bs.open_contract_state(b"ctr").get_data(b"k"), Some(&b"v"[..]));

        let mut mc = bs.multicall_state(b"ctr");
        mc.set_data(b"k", b"other");
        bs.stage_contract_state(mc);
        assert_eq!(bs.open_contract_state(b"ctr").get_data(b"k"), Some(&b"v"[..]));
    }

    #[test]
    fn test_code_cache() {
        let mut bs = BlockState::default();
        let aid = AccountId::from_id(b"ctr");
        bs.add_cache(aid, b"code".to_vec());
        assert_eq!(bs.get_cached_code(&aid), Some(&b"code"[..]));
        bs.remove_cache(&aid);
        assert_eq!(bs.get_cached_code(&aid), None);
    }
}
