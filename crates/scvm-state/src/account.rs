use crate::error::StateError;
use num_bigint::BigUint;
use scvm_types::AccountId;

/// Persisted fields of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountData {
    pub balance: BigUint,
    pub nonce: u64,
    /// Hash of the deployed code; empty for plain accounts
    pub code_hash: Vec<u8>,
    pub storage_root: Vec<u8>,
    /// Recovery point of the contract's SQL database
    pub sql_recovery_point: u64,
}

/// Working copy of an account during execution.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    id: Vec<u8>,
    aid: AccountId,
    data: AccountData,
    is_new: bool,
}

impl AccountState {
    pub fn new(id: Vec<u8>, data: AccountData, is_new: bool) -> Self {
        let aid = AccountId::from_id(&id);
        Self { id, aid, data, is_new }
    }

    /// Raw id (address or name bytes).
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn aid(&self) -> AccountId {
        self.aid
    }

    pub fn data(&self) -> &AccountData {
        &self.data
    }

    pub fn into_data(self) -> AccountData {
        self.data
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn balance(&self) -> &BigUint {
        &self.data.balance
    }

    pub fn add_balance(&mut self, amount: &BigUint) {
        self.data.balance += amount;
    }

    pub fn sub_balance(&mut self, amount: &BigUint) -> Result<(), StateError> {
        if self.data.balance < *amount {
            return Err(StateError::InsufficientBalance {
                balance: self.data.balance.to_string(),
                amount: amount.to_string(),
            });
        }
        self.data.balance -= amount;
        Ok(())
    }

    pub fn nonce(&self) -> u64 {
        self.data.nonce
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.data.nonce = nonce;
    }

    pub fn code_hash(&self) -> &[u8] {
        &self.data.code_hash
    }

    pub fn set_code_hash(&mut self, hash: Vec<u8>) {
        self.data.code_hash = hash;
    }

    pub fn is_contract(&self) -> bool {
        !self.data.code_hash.is_empty()
    }

    pub fn rp(&self) -> u64 {
        self.data.sql_recovery_point
    }

    pub fn set_rp(&mut self, rp: u64) {
        self.data.sql_recovery_point = rp;
    }
}

/// Moves `amount` from `sender` to `receiver`.
///
/// The balance check happens before anything is modified. Transfers between
/// two copies of the same account leave both untouched.
pub fn send_balance(
    sender: &mut AccountState,
    receiver: &mut AccountState,
    amount: &BigUint,
) -> Result<(), StateError> {
    if sender.balance() < amount {
        return Err(StateError::InsufficientBalance {
            balance: sender.balance().to_string(),
            amount: amount.to_string(),
        });
    }
    if sender.aid() == receiver.aid() {
        return Ok(());
    }
    sender.sub_balance(amount)?;
    receiver.add_balance(amount);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &[u8], balance: u64) -> AccountState {
        AccountState::new(
            id.to_vec(),
            AccountData { balance: BigUint::from(balance), ..Default::default() },
            false,
        )
    }

    #[test]
    fn test_sub_balance_insufficient() {
        let mut a = account(b"alice", 10);
        let err = a.sub_balance(&BigUint::from(11u32)).unwrap_err();
        assert!(matches!(err, StateError::InsufficientBalance { .. }));
        assert_eq!(a.balance(), &BigUint::from(10u32));
    }

    #[test]
    fn test_send_balance() {
        let mut a = account(b"alice", 10);
        let mut b = account(b"bob", 1);
        send_balance(&mut a, &mut b, &BigUint::from(4u32)).unwrap();
        assert_eq!(a.balance(), &BigUint::from(6u32));
        assert_eq!(b.balance(), &BigUint::from(5u32));

        assert!(send_balance(&mut a, &mut b, &BigUint::from(7u32)).is_err());
        assert_eq!(a.balance(), &BigUint::from(6u32));
    }

    #[test]
    fn test_send_balance_to_self() {
        let mut a = account(b"alice", 10);
        let mut a2 = a.clone();
        send_balance(&mut a, &mut a2, &BigUint::from(3u32)).unwrap();
        assert_eq!(a.balance(), &BigUint::from(10u32));
        assert_eq!(a2.balance(), &BigUint::from(10u32));
    }

    #[test]
    fn test_is_contract() {
        let mut a = account(b"c", 0);
        assert!(!a.is_contract());
        a.set_code_hash(vec![1; 32]);
        assert!(a.is_contract());
        assert_eq!(a.aid(), AccountId::from_id(b"c"));
    }
}
