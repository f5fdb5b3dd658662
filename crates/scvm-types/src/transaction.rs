use num_bigint::BigUint;
use std::fmt;

/// Transaction kinds recognised by the execution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxType {
    Normal = 0,
    Governance = 1,
    Redeploy = 2,
    FeeDelegation = 3,
    Transfer = 4,
    Call = 5,
    Deploy = 6,
    MultiCall = 7,
}

impl TxType {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => TxType::Normal,
            1 => TxType::Governance,
            2 => TxType::Redeploy,
            3 => TxType::FeeDelegation,
            4 => TxType::Transfer,
            5 => TxType::Call,
            6 => TxType::Deploy,
            7 => TxType::MultiCall,
            _ => return None,
        })
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxType::Normal => "NORMAL",
            TxType::Governance => "GOVERNANCE",
            TxType::Redeploy => "REDEPLOY",
            TxType::FeeDelegation => "FEEDELEGATION",
            TxType::Transfer => "TRANSFER",
            TxType::Call => "CALL",
            TxType::Deploy => "DEPLOY",
            TxType::MultiCall => "MULTICALL",
        };
        f.write_str(s)
    }
}

/// Signed transaction body, reduced to what execution reads.
#[derive(Debug, Clone, PartialEq)]
pub struct TxBody {
    pub nonce: u64,
    /// Raw id of the sender
    pub account: Vec<u8>,
    /// Raw id of the recipient (empty for deploys)
    pub recipient: Vec<u8>,
    pub amount: BigUint,
    pub payload: Vec<u8>,
    pub gas_limit: u64,
    pub gas_price: BigUint,
    pub tx_type: TxType,
}

impl Default for TxBody {
    fn default() -> Self {
        Self {
            nonce: 0,
            account: Vec::new(),
            recipient: Vec::new(),
            amount: BigUint::default(),
            payload: Vec::new(),
            gas_limit: 0,
            gas_price: BigUint::default(),
            tx_type: TxType::Normal,
        }
    }
}

/// Transaction with its hash.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tx {
    pub hash: Vec<u8>,
    pub body: TxBody,
}

impl Tx {
    pub fn new(hash: Vec<u8>, body: TxBody) -> Self {
        Self { hash, body }
    }

    pub fn tx_type(&self) -> TxType {
        self.body.tx_type
    }

    pub fn is_fee_delegation(&self) -> bool {
        self.body.tx_type == TxType::FeeDelegation
    }

    pub fn is_multicall(&self) -> bool {
        self.body.tx_type == TxType::MultiCall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_type_roundtrip() {
        for v in 0..8 {
            let t = TxType::from_i32(v).unwrap();
            assert_eq!(t as i32, v);
        }
        assert!(TxType::from_i32(8).is_none());
        assert_eq!(TxType::FeeDelegation.to_string(), "FEEDELEGATION");
    }

    #[test]
    fn test_tx_flags() {
        let tx = Tx::new(vec![1], TxBody { tx_type: TxType::FeeDelegation, ..Default::default() });
        assert!(tx.is_fee_delegation());
        assert!(!tx.is_multicall());
    }
}
