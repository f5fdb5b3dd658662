//! Host commands serviced for a running worker.
//!
//! Each handler takes the raw argument list of a callback frame (without
//! the command name and the trailing view flag) and returns the reply
//! payload. Errors are replied to the worker in their wire form.

mod contract;
mod crypto;
mod db;
pub mod eth_proof;
mod governance;
mod state;
mod system;

pub(crate) use contract::multicall_code;

use crate::context::VmContext;
use crate::error::VmError;
use scvm_types::{decode_address, AccountId, ENCODED_ADDRESS_LENGTH, NAME_LENGTH};

/// Commands recorded in the internal operation log, with the index of
/// their amount argument.
const LOGGED_OPERATIONS: &[(&str, Option<usize>)] = &[
    ("set", None),
    ("del", None),
    ("call", Some(3)),
    ("delegate-call", None),
    ("send", Some(1)),
    ("deploy", Some(2)),
    ("event", None),
    ("governance", None),
];

pub(crate) fn dispatch(ctx: &mut VmContext<'_>, command: &str, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    let op_id = log_operation(ctx, command, args);
    let depth = ctx.call_depth;

    let result = handle(ctx, command, args);

    if let (Some(id), Some(ops)) = (op_id, ctx.internal_ops.as_mut()) {
        match &result {
            Ok(reply) => ops.log_operation_result(depth, id, &String::from_utf8_lossy(reply)),
            Err(_) => ops.mark_reverted(depth),
        }
    }
    result
}

fn handle(ctx: &mut VmContext<'_>, command: &str, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    match command {
        "set" => state::set_variable(ctx, args),
        "get" => state::get_variable(ctx, args),
        "del" => state::del_variable(ctx, args),

        "deploy" => contract::deploy(ctx, args),
        "call" => contract::call(ctx, args),
        "delegate-call" => contract::delegate_call(ctx, args),
        "send" => contract::send(ctx, args),
        "balance" => contract::balance(ctx, args),
        "event" => system::event(ctx, args),
        "getEventCount" => system::event_count(ctx),
        "dropEvent" => system::drop_event(ctx, args),

        "toPubkey" => system::to_pubkey(args),
        "toAddress" => system::to_address(args),
        "isContract" => system::is_contract(ctx, args),
        "getContractId" => system::contract_id(ctx),
        "getSender" => system::sender(ctx),
        "getAmount" => system::amount(ctx),
        "getBlockNo" => system::block_no(ctx),
        "getTimeStamp" => system::timestamp(ctx),
        "getPrevBlockHash" => system::prev_block_hash(ctx),
        "getTxHash" => system::tx_hash(ctx),
        "getOrigin" => system::origin(ctx),
        "isFeeDelegation" => system::is_fee_delegation(ctx),
        "random" => system::random_int(ctx, args),
        "print" => system::print(ctx, args),
        "nameResolve" => system::name_resolve(ctx, args),

        "governance" => governance::governance(ctx, args),
        "getStaking" => governance::get_staking(ctx, args),

        "sha256" => crypto::sha256(args),
        "keccak256" => crypto::keccak256(args),
        "ecVerify" => crypto::ec_verify(args),
        "verifyEthStorageProof" => crypto::verify_eth_storage_proof(args),

        "dbExec" | "dbQuery" | "stmtExec" | "stmtQuery" => db::forward(ctx, command, args, 2),
        "dbPrepare" | "stmtColumnInfo" | "rsNext" | "rsGet" | "rsClose" => db::forward(ctx, command, args, 1),
        "lastInsertRowid" => db::forward(ctx, command, args, 0),
        "dbOpenWithSnapshot" => db::open_with_snapshot(ctx, args),
        "dbGetSnapshot" => db::get_snapshot(ctx),

        "setRecoveryPoint" => contract::set_recovery_point(ctx),
        "clearRecovery" => contract::clear_recovery(ctx, args),

        _ => Err(VmError::catchable(format!("invalid command: {}", command))),
    }
}

fn log_operation(ctx: &mut VmContext<'_>, command: &str, args: &[Vec<u8>]) -> Option<i64> {
    let (_, amount_idx) = LOGGED_OPERATIONS.iter().find(|(name, _)| *name == command)?;
    let depth = ctx.call_depth;
    let ops = ctx.internal_ops.as_mut()?;
    let amount = amount_idx
        .and_then(|i| args.get(i))
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .unwrap_or_default();
    let strings = args.iter().map(|a| String::from_utf8_lossy(a).into_owned()).collect();
    Some(ops.log_operation(depth, &amount, command, strings))
}

/// Fails unless exactly `n` arguments were sent.
pub(crate) fn check_args(args: &[Vec<u8>], n: usize, prefix: &str) -> Result<(), VmError> {
    if args.len() != n {
        return Err(VmError::catchable(format!("{} invalid number of arguments", prefix)));
    }
    Ok(())
}

pub(crate) fn arg_str(args: &[Vec<u8>], i: usize) -> String {
    args.get(i)
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .unwrap_or_default()
}

/// Reads the little-endian gas value of a call argument. Empty means no
/// explicit limit.
pub(crate) fn parse_gas(arg: &[u8]) -> Result<Option<u64>, VmError> {
    if arg.is_empty() {
        return Ok(None);
    }
    let bytes: [u8; 8] = arg
        .try_into()
        .map_err(|_| VmError::catchable("invalid gas value"))?;
    Ok(Some(u64::from_le_bytes(bytes)))
}

/// Resolves a contract argument: encoded addresses are decoded, names go
/// through the name service.
pub(crate) fn resolve_address(ctx: &VmContext<'_>, account: &str) -> Result<Vec<u8>, VmError> {
    match account.len() {
        ENCODED_ADDRESS_LENGTH => {
            decode_address(account).map_err(|e| VmError::catchable(e.to_string()))
        }
        NAME_LENGTH => ctx
            .services
            .names
            .resolve(&*ctx.bs, account.as_bytes())
            .ok_or_else(|| VmError::catchable(format!("name not founded :{}", account))),
        _ => {
            if scvm_types::is_special_account(account.as_bytes()) {
                return Ok(account.as_bytes().to_vec());
            }
            Err(VmError::catchable(format!("invalid account length:{}", account)))
        }
    }
}

pub(crate) fn aid(id: &[u8]) -> AccountId {
    AccountId::from_id(id)
}
