use crate::error::StateError;
use sha2::{Digest, Sha256};
use scvm_types::AccountId;
use std::collections::BTreeMap;

/// Position in a contract's change journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(usize);

impl Revision {
    pub fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Change {
    Data { key: Vec<u8>, prev: Option<Vec<u8>> },
    Code { prev: Option<Vec<u8>> },
    Source { prev: Option<Vec<u8>> },
}

/// Storage and code of one contract account.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractState {
    id: Vec<u8>,
    aid: AccountId,
    storage: BTreeMap<Vec<u8>, Vec<u8>>,
    code: Option<Vec<u8>>,
    source: Option<Vec<u8>>,
    is_multicall: bool,
    journal: Vec<Change>,
}

/// Hash under which a state variable is proven in the storage trie.
pub fn var_key_hash(key: &[u8]) -> Vec<u8> {
    Sha256::digest(key).to_vec()
}

/// Hash stored in the account for a piece of code.
pub fn code_hash(code: &[u8]) -> Vec<u8> {
    Sha256::digest(code).to_vec()
}

impl ContractState {
    pub fn new(id: Vec<u8>) -> Self {
        let aid = AccountId::from_id(&id);
        Self {
            id,
            aid,
            storage: BTreeMap::new(),
            code: None,
            source: None,
            is_multicall: false,
            journal: Vec::new(),
        }
    }

    /// Scratch state used by multicall transactions; never persisted.
    pub fn multicall(sender: Vec<u8>) -> Self {
        Self { is_multicall: true, ..Self::new(sender) }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn aid(&self) -> AccountId {
        self.aid
    }

    pub fn is_multicall(&self) -> bool {
        self.is_multicall
    }

    pub fn get_data(&self, key: &[u8]) -> Option<&[u8]> {
        self.storage.get(key).map(Vec::as_slice)
    }

    pub fn set_data(&mut self, key: &[u8], value: &[u8]) {
        let prev = self.storage.insert(key.to_vec(), value.to_vec());
        self.journal.push(Change::Data { key: key.to_vec(), prev });
    }

    pub fn delete_data(&mut self, key: &[u8]) {
        let prev = self.storage.remove(key);
        self.journal.push(Change::Data { key: key.to_vec(), prev });
    }

    pub fn get_code(&self) -> Option<&[u8]> {
        self.code.as_deref()
    }

    /// Replaces the code and returns the new code hash (empty when cleared).
    pub fn set_code(&mut self, code: Option<Vec<u8>>) -> Vec<u8> {
        let hash = code.as_deref().map(code_hash).unwrap_or_default();
        let prev = std::mem::replace(&mut self.code, code);
        self.journal.push(Change::Code { prev });
        hash
    }

    /// Lua source the code was compiled from, when it was deployed as source.
    pub fn source_code(&self) -> Option<&[u8]> {
        self.source.as_deref()
    }

    pub fn set_source_code(&mut self, source: Option<Vec<u8>>) {
        let prev = std::mem::replace(&mut self.source, source);
        self.journal.push(Change::Source { prev });
    }

    pub fn snapshot(&self) -> Revision {
        Revision(self.journal.len())
    }

    /// Undoes every change made after `revision`.
    pub fn rollback(&mut self, revision: Revision) -> Result<(), StateError> {
        if revision.0 > self.journal.len() {
            return Err(StateError::InvalidRevision {
                revision: revision.0,
                len: self.journal.len(),
            });
        }
        while self.journal.len() > revision.0 {
            match self.journal.pop() {
                Some(Change::Data { key, prev: Some(v) }) => {
                    self.storage.insert(key, v);
                }
                Some(Change::Data { key, prev: None }) => {
                    self.storage.remove(&key);
                }
                Some(Change::Code { prev }) => self.code = prev,
                Some(Change::Source { prev }) => self.source = prev,
                None => break,
            }
        }
        Ok(())
    }

    /// Drops the journal once the state is staged.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}
