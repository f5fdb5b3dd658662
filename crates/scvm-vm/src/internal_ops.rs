//! Tree of contract-to-contract activity recorded for a transaction.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

const MAX_OP_ID: i64 = 1_000_000_000_000_000_000;

static NEXT_OP_ID: Lazy<Mutex<i64>> = Lazy::new(|| Mutex::new(0));

fn next_op_id() -> i64 {
    let mut id = NEXT_OP_ID.lock();
    *id += 1;
    if *id > MAX_OP_ID {
        *id = 1;
    }
    *id
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InternalOperation {
    #[serde(skip)]
    pub id: i64,
    #[serde(rename = "op")]
    pub operation: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub amount: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<Box<InternalCall>>,
    #[serde(skip_serializing_if = "is_false")]
    pub reverted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InternalCall {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub contract: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub function: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub args: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub amount: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<InternalOperation>,
}

impl InternalCall {
    fn mark_reverted(&mut self) {
        for op in &mut self.operations {
            op.reverted = true;
            if let Some(call) = op.call.as_mut() {
                call.mark_reverted();
            }
        }
    }
}

#[derive(Serialize)]
struct Wrapper<'a> {
    txhash: String,
    call: &'a InternalCall,
}

/// Operation log of one transaction. Depth 1 is the root call.
#[derive(Debug, Clone, Default)]
pub struct InternalOps {
    root: InternalCall,
}

impl InternalOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &InternalCall {
        &self.root
    }

    fn call_at(&mut self, depth: i32) -> Option<&mut InternalCall> {
        if depth < 1 {
            return None;
        }
        let mut call = &mut self.root;
        let mut cur = 1;
        while cur < depth {
            call = call.operations.last_mut()?.call.as_deref_mut()?;
            cur += 1;
        }
        Some(call)
    }

    /// Appends an operation to the call running at `depth`; returns its id.
    pub fn log_operation(&mut self, depth: i32, amount: &str, operation: &str, args: Vec<String>) -> i64 {
        let Some(call) = self.call_at(depth) else {
            warn!(depth, "no internal call found");
            return 0;
        };
        let id = next_op_id();
        call.operations.push(InternalOperation {
            id,
            operation: operation.to_string(),
            amount: amount.to_string(),
            args,
            ..Default::default()
        });
        id
    }

    pub fn log_operation_result(&mut self, depth: i32, id: i64, result: &str) {
        for d in [depth, depth - 1] {
            if let Some(call) = self.call_at(d) {
                if let Some(op) = call.operations.iter_mut().find(|op| op.id == id) {
                    op.result = result.to_string();
                    return;
                }
            }
        }
        warn!(id, "no internal operation found to store result");
    }

    /// Records a call entered at `depth`. The first call fills the root;
    /// later ones hang off the last operation of the caller.
    pub fn log_call(&mut self, depth: i32, contract: &str, function: &str, args: &str, amount: &str) {
        let call = InternalCall {
            contract: contract.to_string(),
            function: function.to_string(),
            args: args.to_string(),
            amount: amount.to_string(),
            operations: Vec::new(),
        };
        if self.root.contract.is_empty() {
            self.root = call;
            return;
        }
        match self.call_at(depth - 1).and_then(|c| c.operations.last_mut()) {
            Some(op) => op.call = Some(Box::new(call)),
            None => warn!(depth, "no internal operation to attach call"),
        }
    }

    /// Marks the last operation of the call at `depth` and everything
    /// below it as reverted.
    pub fn mark_reverted(&mut self, depth: i32) {
        if let Some(op) = self.call_at(depth).and_then(|c| c.operations.last_mut()) {
            op.reverted = true;
            if let Some(call) = op.call.as_mut() {
                call.mark_reverted();
            }
        }
    }

    /// JSON form, or an empty string when nothing was called.
    pub fn to_json(&self, tx_hash: &[u8]) -> String {
        if self.root.contract.is_empty() {
            return String::new();
        }
        let wrapper = Wrapper {
            txhash: bs58::encode(tx_hash).into_string(),
            call: &self.root,
        };
        serde_json::to_string(&wrapper).unwrap_or_default()
    }
}
