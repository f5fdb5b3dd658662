use crate::address::encode_address;
use crate::event::Event;
use num_bigint::BigUint;
use std::fmt;

/// Outcome recorded for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Created,
    Error,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Success => "SUCCESS",
            ReceiptStatus::Created => "CREATED",
            ReceiptStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    /// Raw id of the receiving contract
    pub contract_address: Vec<u8>,
    pub status: ReceiptStatus,
    /// JSON result, or the error message for `ERROR`
    pub ret: String,
    pub tx_hash: Vec<u8>,
    /// Total fee charged
    pub fee_used: BigUint,
    pub gas_used: u64,
    pub fee_delegation: bool,
    /// Events in emission order
    pub events: Vec<Event>,
    /// Internal operations trace (empty when disabled)
    pub internal_ops: String,
}

impl Receipt {
    pub fn new(contract_address: Vec<u8>, status: ReceiptStatus, ret: String) -> Self {
        Self {
            contract_address,
            status,
            ret,
            tx_hash: Vec::new(),
            fee_used: BigUint::default(),
            gas_used: 0,
            fee_delegation: false,
            events: Vec::new(),
            internal_ops: String::new(),
        }
    }

    /// Builder: set the transaction hash
    pub fn with_tx_hash(mut self, tx_hash: Vec<u8>) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    /// Builder: set fee and gas accounting
    pub fn with_fee(mut self, fee_used: BigUint, gas_used: u64) -> Self {
        self.fee_used = fee_used;
        self.gas_used = gas_used;
        self
    }

    /// Builder: attach events, stamping them with this receipt's tx hash
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events
            .into_iter()
            .map(|e| e.with_tx_hash(self.tx_hash.clone()))
            .collect();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status != ReceiptStatus::Error
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Receipt {{ contract: {}, status: {}, ret: {}, gas_used: {} }}",
            encode_address(&self.contract_address),
            self.status,
            self.ret,
            self.gas_used
        )
    }
}
