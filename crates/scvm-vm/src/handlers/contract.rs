//! Contract-to-contract calls, transfers, deployment and protected-call
//! savepoints.

use super::{aid, arg_str, check_args, parse_gas, resolve_address};
use crate::call_state::{CallState, ContractInfo};
use crate::context::VmContext;
use crate::entry;
use crate::error::VmError;
use crate::executor::{with_gas_prefix, ExecKind, Executor};
use num_bigint::BigUint;
use num_traits::Zero;
use once_cell::sync::OnceCell;
use scvm_codec::LuaCode;
use scvm_fee::transform_amount;
use scvm_state::ContractState;
use scvm_types::{create_contract_id, decode_args, encode_address, CallInfo, CREATOR_META_KEY, DEFAULT_FUNCTION};
use tracing::warn;

/// Address that selects the built-in multicall code in a delegate call.
pub const MULTICALL_ADDRESS: &str = "multicall";

const MULTICALL_SOURCE: &str = include_str!("../../assets/multicall.lua");

static MULTICALL_CODE: OnceCell<Vec<u8>> = OnceCell::new();

/// Built-in multicall code, compiled once on first use.
pub(crate) fn multicall_code(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    MULTICALL_CODE
        .get_or_try_init(|| {
            entry::compile(ctx.services.workers, ctx.fork(), MULTICALL_SOURCE, true, ctx.deadline)
                .map(LuaCode::into_bytes)
        })
        .cloned()
}

/// Gas budget of a nested call. No value, or zero, hands the callee the
/// caller's remaining gas.
fn check_remaining_gas(ctx: &VmContext<'_>, arg: &[u8]) -> Result<Option<u64>, VmError> {
    let gas = parse_gas(arg)?.filter(|g| *g != 0);
    if let Some(g) = gas {
        if ctx.is_gas_system() && g > ctx.remaining_gas() {
            return Err(VmError::NotEnoughGas);
        }
    }
    Ok(gas)
}

fn call_args(fname: &str, json: &[u8], prefix: &str) -> Result<CallInfo, VmError> {
    let args = decode_args(json).map_err(|e| VmError::catchable(format!("{} invalid arguments: {}", prefix, e)))?;
    Ok(CallInfo::new(fname, args))
}

/// Makes the callee's frame current and returns the caller's.
fn enter(ctx: &mut VmContext<'_>, contract_id: &[u8], amount: &BigUint) -> ContractInfo {
    let rp = ctx.call_state_mut(contract_id).account.rp();
    let next = ContractInfo {
        aid: aid(contract_id),
        sender: ctx.cur_contract.contract_id.clone(),
        contract_id: contract_id.to_vec(),
        rp,
        amount: amount.clone(),
    };
    std::mem::replace(&mut ctx.cur_contract, next)
}

fn balances_line(ctx: &VmContext<'_>, sender: &[u8], receiver: &[u8]) -> String {
    let balance = |id: &[u8]| {
        ctx.call_state(&aid(id))
            .map(|cs| cs.account.balance().to_string())
            .unwrap_or_default()
    };
    format!("After sender: {} receiver: {}", balance(sender), balance(receiver))
}

/// Settles the savepoint of a finished frame: reverted on error, dropped
/// when it was the outermost one.
fn finish(
    ctx: &mut VmContext<'_>,
    seq: i32,
    result: Result<String, VmError>,
    prefix: &str,
    call_err: &str,
) -> Result<String, VmError> {
    match result {
        Err(e) => {
            ctx.clear_recovery(seq, true)
                .map_err(|re| re.wrap(&format!("{} recovery err: ", prefix)))?;
            Err(e.wrap(&format!("{} {}: ", prefix, call_err)))
        }
        Ok(ret) => {
            if seq == 1 {
                ctx.clear_recovery(seq, false)
                    .map_err(|re| re.wrap(&format!("{} recovery err: ", prefix)))?;
            }
            Ok(ret)
        }
    }
}

/// Arguments: address, function, JSON arguments, amount, gas.
pub(super) fn call(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    const PREFIX: &str = "[Contract.Call]";
    check_args(args, 5, PREFIX)?;
    let address = arg_str(args, 0);
    let fname = arg_str(args, 1);

    let cid = resolve_address(ctx, &address)
        .map_err(|e| e.wrap("[Contract.Call] invalid contractId: "))?;
    let amount = transform_amount(&arg_str(args, 3), ctx.fork())
        .map_err(|e| VmError::catchable(format!("{} invalid amount: {}", PREFIX, e)))?;

    ctx.contract_state_mut(&cid);
    let code = ctx
        .load_code(&cid)
        .ok_or_else(|| VmError::catchable(format!("{} cannot find contract {}", PREFIX, address)))?;
    let ci = call_args(&fname, &args[2], PREFIX)?;
    let gas = check_remaining_gas(ctx, &args[4]).map_err(|e| e.wrap("[Contract.Call] "))?;

    let ex = Executor::new(ctx, &LuaCode::from_bytes(code), &cid, &ci, &amount, ExecKind::Call, gas);
    if let Some(e) = ex.pre_error().cloned() {
        ex.close(ctx);
        return Err(e.wrap("[Contract.Call] newExecutor error: "));
    }

    let sender_id = ctx.cur_contract.contract_id.clone();
    if !amount.is_zero() {
        if ctx.is_query() || ctx.in_view() {
            ex.close(ctx);
            return Err(VmError::catchable("[Contract.Call] send not permitted in query"));
        }
        if let Err(e) = ctx.transfer(&sender_id, &cid, &amount) {
            ex.close(ctx);
            return Err(e.wrap("[Contract.Call] "));
        }
    }

    let seq = match ctx.set_recovery_point(aid(&cid), Some(aid(&sender_id)), amount.clone(), false, false) {
        Ok(seq) => seq,
        Err(e) => {
            ex.close(ctx);
            return Err(e.wrap("[Contract.Call] database error: "));
        }
    };
    if ctx.trace.is_some() {
        let line = balances_line(ctx, &sender_id, &cid);
        ctx.trace_line(format!("[CALL Contract {}({}) {}]", address, aid(&cid), fname));
        ctx.trace_line(format!("SendBalance: {}", amount));
        ctx.trace_line(line);
    }

    let prev = enter(ctx, &cid, &amount);
    let (result, used) = ctx.run_executor(ex);
    ctx.cur_contract = prev;

    let ret = finish(ctx, seq, result, PREFIX, "call err")?;
    Ok(with_gas_prefix(used, ret.as_bytes()))
}

/// Arguments: address (or `multicall`), function, JSON arguments, gas.
/// The callee runs on the caller's storage and identity.
pub(super) fn delegate_call(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    const PREFIX: &str = "[Contract.DelegateCall]";
    check_args(args, 4, PREFIX)?;
    let address = arg_str(args, 0);
    let fname = arg_str(args, 1);

    let (cid, code) = if address == MULTICALL_ADDRESS {
        let code = multicall_code(ctx).map_err(|e| e.wrap("[Contract.DelegateCall] "))?;
        (ctx.cur_contract.contract_id.clone(), code)
    } else {
        let cid = resolve_address(ctx, &address)
            .map_err(|e| e.wrap("[Contract.DelegateCall] invalid contractId: "))?;
        let code = ctx
            .load_code(&cid)
            .ok_or_else(|| VmError::catchable(format!("{} cannot find contract {}", PREFIX, address)))?;
        (cid, code)
    };
    let ci = call_args(&fname, &args[2], PREFIX)?;
    let gas = check_remaining_gas(ctx, &args[3]).map_err(|e| e.wrap("[Contract.DelegateCall] "))?;

    let zero = BigUint::default();
    let ex = Executor::new(ctx, &LuaCode::from_bytes(code), &cid, &ci, &zero, ExecKind::Call, gas);
    if let Some(e) = ex.pre_error().cloned() {
        ex.close(ctx);
        return Err(e.wrap("[Contract.DelegateCall] newExecutor error: "));
    }

    let target = ctx.cur_contract.aid;
    let seq = match ctx.set_recovery_point(target, None, zero, false, false) {
        Ok(seq) => seq,
        Err(e) => {
            ex.close(ctx);
            return Err(e.wrap("[Contract.DelegateCall] database error: "));
        }
    };
    ctx.trace_line(format!("[DELEGATECALL Contract {} {}]", address, fname));

    let (result, used) = ctx.run_executor(ex);
    let ret = finish(ctx, seq, result, PREFIX, "call error")?;
    Ok(with_gas_prefix(used, ret.as_bytes()))
}

/// Arguments: address, amount, gas. A contract recipient has its
/// `default` function called with the amount.
pub(super) fn send(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    const PREFIX: &str = "[Contract.Send]";
    check_args(args, 3, PREFIX)?;
    let address = arg_str(args, 0);
    let cid = resolve_address(ctx, &address).map_err(|e| e.wrap("[Contract.Send] "))?;
    let amount = transform_amount(&arg_str(args, 1), ctx.fork())
        .map_err(|e| VmError::catchable(format!("{} invalid amount: {}", PREFIX, e)))?;
    if (ctx.is_query() || ctx.in_view()) && !amount.is_zero() {
        return Err(VmError::catchable("[Contract.Send] send not permitted in query"));
    }

    let sender_id = ctx.cur_contract.contract_id.clone();
    let is_contract = ctx.call_state_mut(&cid).account.is_contract();

    if !is_contract {
        if amount.is_zero() {
            return Ok(Vec::new());
        }
        ctx.transfer(&sender_id, &cid, &amount)
            .map_err(|e| e.wrap("[Contract.Send] "))?;
        if ctx.recovery_depth() > 0 {
            ctx.set_recovery_point(aid(&cid), Some(aid(&sender_id)), amount.clone(), true, false)
                .map_err(|e| e.wrap("[Contract.Send] database error: "))?;
        }
        ctx.trace_line(format!("[Send] {}({}) : {}", address, aid(&cid), amount));
        return Ok(Vec::new());
    }

    ctx.contract_state_mut(&cid);
    let code = match ctx.load_code(&cid) {
        Some(code) => code,
        None => {
            ctx.trace_line(format!("[Send] cannot find contract:{}", address));
            return Err(VmError::catchable(format!("{} cannot find contract:{}", PREFIX, address)));
        }
    };
    let gas = check_remaining_gas(ctx, &args[2]).map_err(|e| e.wrap("[Contract.Send] "))?;
    let ci = CallInfo::new(DEFAULT_FUNCTION, Vec::new());

    let ex = Executor::new(ctx, &LuaCode::from_bytes(code), &cid, &ci, &amount, ExecKind::Call, gas);
    if let Some(e) = ex.pre_error().cloned() {
        ex.close(ctx);
        return Err(e.wrap("[Contract.Send] newExecutor error: "));
    }
    if !amount.is_zero() {
        if let Err(e) = ctx.transfer(&sender_id, &cid, &amount) {
            ex.close(ctx);
            return Err(e.wrap("[Contract.Send] "));
        }
    }
    let seq = match ctx.set_recovery_point(aid(&cid), Some(aid(&sender_id)), amount.clone(), false, false) {
        Ok(seq) => seq,
        Err(e) => {
            ex.close(ctx);
            return Err(e.wrap("[Contract.Send] database error: "));
        }
    };
    if ctx.trace.is_some() {
        let line = balances_line(ctx, &sender_id, &cid);
        ctx.trace_line(format!("[Send Call default] {}({}) : {}", address, aid(&cid), amount));
        ctx.trace_line(line);
    }

    let prev = enter(ctx, &cid, &amount);
    let (result, used) = ctx.run_executor(ex);
    ctx.cur_contract = prev;

    let ret = finish(ctx, seq, result, PREFIX, "call err")?;
    Ok(with_gas_prefix(used, ret.as_bytes()))
}

/// Arguments: address whose code is copied, or source to compile; JSON
/// constructor arguments; amount; gas. Replies with the new address
/// prepended to the constructor's results.
pub(super) fn deploy(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    const PREFIX: &str = "[Contract.Deploy]";
    check_args(args, 4, PREFIX)?;
    if ctx.is_query() || ctx.in_view() {
        return Err(VmError::catchable("[Contract.Deploy] send not permitted in query"));
    }
    let code_or_address = arg_str(args, 0);

    // sources are kept with the code from fork 4
    let keep_source = ctx.fork() >= 4;
    let (code, source) = match resolve_address(ctx, &code_or_address) {
        Ok(src_id) => {
            let code = ctx.load_code(&src_id).unwrap_or_default();
            if code.is_empty() {
                return Err(VmError::catchable("[Contract.Deploy]: not found code"));
            }
            let source = if keep_source { ctx.load_source(&src_id) } else { None };
            (code, source)
        }
        Err(_) => {
            let code = entry::compile(ctx.services.workers, ctx.fork(), &code_or_address, true, ctx.deadline)
                .map_err(|e| match e {
                    VmError::Timeout => VmError::Timeout,
                    VmError::VmStart(_) => VmError::catchable("[Contract.Deploy] get luaState error"),
                    other => {
                        warn!(error = %other, "contract compile failed");
                        other.wrap("[Contract.Deploy] compile error: ")
                    }
                })?;
            let source = keep_source.then(|| code_or_address.clone().into_bytes());
            (code.into_bytes(), source)
        }
    };
    ctx.add_update_size(code.len() as i64)
        .map_err(|e| e.wrap("[Contract.Deploy] "))?;

    let creator_id = ctx.cur_contract.contract_id.clone();
    let creator_nonce = ctx.call_state_mut(&creator_id).account.nonce();
    let new_id = create_contract_id(&creator_id, creator_nonce);
    let new_aid = aid(&new_id);
    let account = ctx.bs.create_account_state(&new_id);
    let mut cs = CallState::with_contract(account, ContractState::new(new_id.clone()));
    cs.is_callback = true;
    cs.is_deploy = true;
    cs.write_back = true;
    ctx.call_states.insert(new_aid, cs);

    let amount = transform_amount(&arg_str(args, 2), ctx.fork())
        .map_err(|e| VmError::catchable(format!("{} value not proper format: {}", PREFIX, e)))?;
    let ci = decode_args(&args[1])
        .map(|a| CallInfo::new("", a))
        .map_err(|e| VmError::catchable(format!("{} invalid args: {}", PREFIX, e)))?;

    if !amount.is_zero() {
        ctx.transfer(&creator_id, &new_id, &amount)
            .map_err(|e| e.wrap("[Contract.Deploy] "))?;
    }
    let seq = ctx
        .set_recovery_point(new_aid, Some(aid(&creator_id)), amount.clone(), false, true)
        .map_err(|e| e.wrap("[System.DeployContract] DB err: "))?;
    if ctx.trace.is_some() {
        let line = balances_line(ctx, &creator_id, &new_id);
        ctx.trace_line(format!("[DEPLOY] {}({})", encode_address(&new_id), new_aid));
        ctx.trace_line(format!("SendBalance : {}", amount));
        ctx.trace_line(line);
    }

    let prev = enter(ctx, &new_id, &amount);
    let deployed = DeployedCode { code, source };
    let result = run_constructor(ctx, seq, &new_id, &creator_id, deployed, &ci, &amount, &args[3]);
    ctx.cur_contract = prev;
    let (ret, used) = result?;

    if seq == 1 {
        ctx.clear_recovery(seq, false)
            .map_err(|re| re.wrap("[Contract.Deploy] recovery error: "))?;
    }
    let json = prepend_address(&encode_address(&new_id), &ret);
    Ok(with_gas_prefix(used, json.as_bytes()))
}

/// Code installed by a deploy, with the source it came from.
struct DeployedCode {
    code: Vec<u8>,
    source: Option<Vec<u8>>,
}

#[allow(clippy::too_many_arguments)]
fn run_constructor(
    ctx: &mut VmContext<'_>,
    seq: i32,
    new_id: &[u8],
    creator_id: &[u8],
    deployed: DeployedCode,
    ci: &CallInfo,
    amount: &BigUint,
    gas_arg: &[u8],
) -> Result<(String, u64), VmError> {
    let lua_code = LuaCode::from_bytes(deployed.code);
    {
        let cs = ctx.call_state_mut(new_id);
        cs.set_code(Some(lua_code.bytes().to_vec()));
        if let Some(ctr) = cs.ctr_state.as_mut() {
            if deployed.source.is_some() {
                ctr.set_source_code(deployed.source);
            }
            ctr.set_data(CREATOR_META_KEY, encode_address(creator_id).as_bytes());
        }
    }
    let gas = check_remaining_gas(ctx, gas_arg).map_err(|e| e.wrap("[Contract.Deploy] "))?;

    let ex = Executor::new(ctx, &lua_code, new_id, ci, amount, ExecKind::Create, gas);
    if let Some(e) = ex.pre_error().cloned() {
        ex.close(ctx);
        ctx.clear_recovery(seq, true)
            .map_err(|re| re.wrap("[Contract.Deploy] recovery error: "))?;
        return Err(e.wrap("[Contract.Deploy] newExecutor Error: "));
    }

    let creator = &mut ctx.call_state_mut(creator_id).account;
    let nonce = creator.nonce();
    creator.set_nonce(nonce + 1);

    let (result, used) = ctx.run_executor(ex);
    match result {
        Ok(ret) => Ok((ret, used)),
        Err(e) => {
            ctx.clear_recovery(seq, true)
                .map_err(|re| re.wrap("[Contract.Deploy] recovery error: "))?;
            Err(e.wrap("[Contract.Deploy] call err: "))
        }
    }
}

/// Puts the quoted address in front of a JSON result list.
fn prepend_address(address: &str, ret: &str) -> String {
    let quoted = format!("\"{}\"", address);
    let trimmed = ret.trim();
    if trimmed.is_empty() || trimmed == "[]" || trimmed == "null" {
        return format!("[{}]", quoted);
    }
    match trimmed.strip_prefix('[') {
        Some(rest) => format!("[{},{}", quoted, rest),
        None => format!("[{},{}]", quoted, trimmed),
    }
}

/// Argument: address, or empty for the current contract.
pub(super) fn balance(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.GetBalance]")?;
    let address = arg_str(args, 0);
    let id = if address.is_empty() {
        ctx.cur_contract.contract_id.clone()
    } else {
        resolve_address(ctx, &address).map_err(|e| e.wrap("[Contract.GetBalance] invalid contractId: "))?
    };
    let balance = match ctx.call_state(&aid(&id)) {
        Some(cs) => cs.account.balance().clone(),
        None => ctx.bs.balance(&id),
    };
    Ok(balance.to_string().into_bytes())
}

/// Opens a savepoint for a protected call; replies with its sequence
/// number, or nothing inside queries and views.
pub(super) fn set_recovery_point(ctx: &mut VmContext<'_>) -> Result<Vec<u8>, VmError> {
    if ctx.is_query() || ctx.in_view() {
        return Ok(Vec::new());
    }
    let target = ctx.cur_contract.aid;
    let seq = ctx
        .set_recovery_point(target, None, BigUint::default(), false, false)
        .map_err(|e| e.wrap("[Contract.pcall] database error: "))?;
    ctx.trace_line(format!("[Pcall] snapshot set {}", seq));
    Ok(seq.to_string().into_bytes())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Arguments: savepoint sequence and whether the protected call failed.
pub(super) fn clear_recovery(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    const PREFIX: &str = "[Contract.ClearRecovery]";
    check_args(args, 2, PREFIX)?;
    let start: i32 = arg_str(args, 0)
        .parse()
        .map_err(|_| VmError::catchable(format!("{} invalid start", PREFIX)))?;
    let failed = parse_bool(&arg_str(args, 1))
        .ok_or_else(|| VmError::catchable(format!("{} invalid failed", PREFIX)))?;
    ctx.clear_recovery(start, failed)?;
    if failed {
        ctx.trace_line(format!("pcall recovery snapshot : {}", start));
    }
    Ok(Vec::new())
}
