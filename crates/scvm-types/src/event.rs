use crate::address::encode_address;
use serde::Serialize;
use std::fmt;

/// Event emitted by a contract during a transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    /// Raw id of the emitting contract
    pub contract_address: Vec<u8>,
    /// Event name (at most 64 bytes)
    pub event_name: String,
    /// JSON encoded arguments
    pub json_args: String,
    /// Position of the event within the transaction
    pub event_idx: i32,
    pub tx_hash: Vec<u8>,
    pub block_hash: Vec<u8>,
    pub block_no: u64,
    pub tx_index: i32,
}

#[derive(Serialize)]
struct EventJson<'a> {
    #[serde(rename = "contractAddress")]
    contract_address: String,
    #[serde(rename = "eventName")]
    event_name: &'a str,
    #[serde(rename = "Args")]
    args: serde_json::Value,
    #[serde(rename = "txHash")]
    tx_hash: String,
    #[serde(rename = "EventIdx")]
    event_idx: i32,
    #[serde(rename = "BlockHash")]
    block_hash: String,
    #[serde(rename = "BlockNo")]
    block_no: u64,
    #[serde(rename = "TxIndex")]
    tx_index: i32,
}

impl Event {
    pub fn new(contract_address: Vec<u8>, event_name: String, json_args: String, event_idx: i32) -> Self {
        Self {
            contract_address,
            event_name,
            json_args,
            event_idx,
            ..Default::default()
        }
    }

    /// Builder: set the transaction hash
    pub fn with_tx_hash(mut self, tx_hash: Vec<u8>) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    /// External JSON form. Arguments are embedded raw when they parse.
    pub fn to_json(&self) -> String {
        let args = serde_json::from_str(&self.json_args)
            .unwrap_or_else(|_| serde_json::Value::String(self.json_args.clone()));
        let view = EventJson {
            contract_address: encode_address(&self.contract_address),
            event_name: &self.event_name,
            args,
            tx_hash: bs58::encode(&self.tx_hash).into_string(),
            event_idx: self.event_idx,
            block_hash: bs58::encode(&self.block_hash).into_string(),
            block_no: self.block_no,
            tx_index: self.tx_index,
        };
        serde_json::to_string(&view).unwrap_or_default()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
