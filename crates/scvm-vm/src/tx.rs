//! Execution of a whole transaction against a contract recipient.

use crate::context::{TxEnv, VmContext};
use crate::entry;
use crate::error::VmError;
use crate::settings::Services;
use num_bigint::BigUint;
use num_traits::Zero;
use scvm_fee::{gas_limit, receipt_gas_used, tx_base_fee};
use scvm_state::{send_balance, AccountState, BlockState, ContractState};
use scvm_types::{
    encode_address, BlockInfo, Event, ForkVersion, Receipt, ReceiptStatus, Tx, TxType, CREATOR_META_KEY,
};
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of [`execute`]. The fee is reported even when execution fails.
#[derive(Debug)]
pub struct Execution {
    pub result: Result<String, VmError>,
    pub events: Vec<Event>,
    /// Internal operations JSON, empty when not recorded
    pub internal_ops: String,
    pub used_fee: BigUint,
}

impl Execution {
    fn stopped(result: Result<String, VmError>, used_fee: BigUint) -> Self {
        Self {
            result,
            events: Vec::new(),
            internal_ops: String::new(),
            used_fee,
        }
    }

    /// Receipt of a transaction that ended with this execution.
    pub fn into_receipt(
        self,
        contract_address: Vec<u8>,
        tx: &Tx,
        fork: ForkVersion,
        gas_price: &BigUint,
        is_deploy: bool,
    ) -> Receipt {
        let (status, ret) = match self.result {
            Ok(ret) if is_deploy => (ReceiptStatus::Created, ret),
            Ok(ret) => (ReceiptStatus::Success, ret),
            Err(e) => (ReceiptStatus::Error, e.to_string()),
        };
        let is_governance = tx.tx_type() == TxType::Governance;
        let gas_used = receipt_gas_used(fork, is_governance, &self.used_fee, gas_price);
        let mut receipt = Receipt::new(contract_address, status, ret)
            .with_tx_hash(tx.hash.clone())
            .with_fee(self.used_fee, gas_used)
            .with_events(self.events);
        receipt.fee_delegation = tx.is_fee_delegation();
        receipt.internal_ops = self.internal_ops;
        receipt
    }
}

/// Transaction-level parameters supplied by block production.
#[derive(Debug, Clone, Default)]
pub struct ExecParams {
    pub block: BlockInfo,
    pub service: usize,
    pub block_deadline: Option<Instant>,
}

/// Whether a transaction of `tx_type` runs contract code.
///
/// `Ok(false)` means the transaction is a plain transfer.
pub fn check_execution(
    tx_type: TxType,
    amount: &BigUint,
    payload_len: usize,
    fork: ForkVersion,
    is_deploy: bool,
    is_contract: bool,
) -> Result<bool, VmError> {
    if tx_type == TxType::MultiCall {
        return Ok(true);
    }
    if fork >= 4 && is_contract {
        let transfer_only = tx_type == TxType::Transfer && (payload_len > 0 || amount.is_zero());
        if tx_type == TxType::Normal || transfer_only {
            return Err(VmError::TxNotAllowedRecipient);
        }
    }
    if !is_deploy && !is_contract {
        // a CALL without code still runs so that it fails in the lookup
        return Ok(fork >= 3 && tx_type == TxType::Call);
    }
    Ok(true)
}

/// A redeploy must target a live contract created by `sender`.
pub fn check_redeploy(
    sender: &AccountState,
    receiver: &AccountState,
    ctr_state: &ContractState,
) -> Result<(), VmError> {
    if !receiver.is_contract() || receiver.is_new() {
        let addr = encode_address(receiver.id());
        warn!(contract = %addr, "redeploy target not found");
        return Err(VmError::catchable(format!("not found contract {}", addr)));
    }
    let creator = ctr_state.get_data(CREATOR_META_KEY).unwrap_or_default();
    if creator != encode_address(sender.id()).as_bytes() {
        return Err(VmError::CreatorNotMatch);
    }
    Ok(())
}

/// True when the transaction installs code at its recipient.
pub fn is_deploy_tx(tx: &Tx) -> bool {
    matches!(tx.tx_type(), TxType::Deploy | TxType::Redeploy) || tx.body.recipient.is_empty()
}

/// Executes `tx` and writes the resulting balances back to `sender` and
/// `receiver`.
pub fn execute(
    bs: &mut BlockState,
    services: Services<'_>,
    tx: &Tx,
    sender: &mut AccountState,
    receiver: &mut AccountState,
    params: ExecParams,
) -> Execution {
    let body = &tx.body;
    let fork = params.block.fork_version;
    let is_multicall = tx.is_multicall();
    let is_fee_delegation = tx.is_fee_delegation();
    let is_deploy = is_deploy_tx(tx);
    let gas_price = bs.gas_price().clone();

    let mut used_fee = tx_base_fee(fork, &gas_price, body.payload.len());

    if let Err(e) = send_balance(sender, receiver, &body.amount) {
        return Execution::stopped(Err(e.into()), used_fee);
    }

    match check_execution(
        body.tx_type,
        &body.amount,
        body.payload.len(),
        fork,
        is_deploy,
        receiver.is_contract(),
    ) {
        Ok(true) => {}
        Ok(false) => return Execution::stopped(Ok(String::new()), used_fee),
        Err(e) => return Execution::stopped(Err(e), used_fee),
    }

    let limit = match gas_limit(
        fork,
        is_fee_delegation,
        body.gas_limit,
        body.payload.len(),
        &gas_price,
        &used_fee,
        sender.balance(),
        receiver.balance(),
    ) {
        Ok(limit) => limit,
        Err(e) => {
            debug!(error = %e, "gas limit");
            return Execution::stopped(Err(VmError::NotEnoughGas), used_fee);
        }
    };

    let ctr_state = if is_multicall {
        bs.multicall_state(sender.id())
    } else {
        bs.open_contract_state(receiver.id())
    };

    if tx.tx_type() == TxType::Redeploy {
        if let Err(e) = check_redeploy(sender, receiver, &ctr_state) {
            return Execution::stopped(Err(e), used_fee);
        }
        bs.remove_cache(&receiver.aid());
    }

    let env = TxEnv {
        origin: sender.id().to_vec(),
        tx_hash: tx.hash.clone(),
        block: params.block,
        amount: body.amount.clone(),
        gas_limit: limit,
        is_fee_delegation,
        is_multicall,
        service: params.service,
        block_deadline: params.block_deadline,
    };
    let receiver_id = receiver.id().to_vec();
    let mut ctx = VmContext::new(bs, services, env, sender.clone(), receiver.clone(), ctr_state);

    let output = if is_deploy {
        entry::create(&mut ctx, &body.payload, &receiver_id)
    } else {
        entry::call(&mut ctx, &body.payload, &receiver_id)
    };
    let internal_ops = ctx
        .internal_ops
        .as_ref()
        .map(|ops| ops.to_json(&tx.hash))
        .unwrap_or_default();
    let root = ctx.into_root();

    used_fee += output.used_fee;
    let mut execution = Execution {
        result: output.result,
        events: output.events,
        internal_ops,
        used_fee,
    };
    if execution.result.is_err() {
        return execution;
    }

    if let Some(s) = root.sender {
        *sender = s;
    }
    *receiver = root.receiver;

    let payer = if is_fee_delegation { &*receiver } else { &*sender };
    if payer.balance() < &execution.used_fee {
        execution.result = Err(VmError::InsufficientBalance);
        return execution;
    }

    if !is_multicall {
        if let Some(ctr) = root.ctr_state {
            bs.stage_contract_state(ctr);
        }
    }
    execution
}
