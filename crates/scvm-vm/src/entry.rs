//! Entry points that start an outermost contract frame.

use crate::context::VmContext;
use crate::error::VmError;
use crate::executor::{ExecKind, Executor};
use crate::handlers;
use crate::pool::WorkerSource;
use crate::settings::Services;
use crate::slots::alloc_query_slot;
use num_bigint::BigUint;
use scvm_codec::{split_deploy_payload, LuaCode, LuaCodePayload};
use scvm_state::{BlockState, ContractState};
use scvm_types::{
    decode_args, encode_address, Abi, AccountId, BlockInfo, CallInfo, Event, ForkVersion, Value,
    CHECK_DELEGATION_FUNCTION, CREATOR_META_KEY,
};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Result of an outermost call together with what it produced before
/// finishing.
#[derive(Debug)]
pub struct CallOutput {
    pub result: Result<String, VmError>,
    pub events: Vec<Event>,
    pub used_fee: BigUint,
}

impl CallOutput {
    fn failed(ctx: &VmContext<'_>, err: VmError) -> Self {
        Self {
            result: Err(err),
            events: Vec::new(),
            used_fee: ctx.used_fee(),
        }
    }
}

/// Entry function of the built-in multicall code.
const MULTICALL_FUNCTION: &str = "execute";

fn not_found(contract_address: &[u8]) -> VmError {
    VmError::catchable(format!("not found contract {}", encode_address(contract_address)))
}

/// Calls the contract the context was opened for. An empty payload calls
/// the default function.
pub fn call(ctx: &mut VmContext<'_>, payload: &[u8], contract_address: &[u8]) -> CallOutput {
    let code = if ctx.is_multicall {
        handlers::multicall_code(ctx).ok()
    } else {
        ctx.load_code(contract_address)
    };
    let Some(code) = code else {
        warn!(contract = %encode_address(contract_address), "not found contract");
        return CallOutput::failed(ctx, not_found(contract_address));
    };
    let ci = if ctx.is_multicall {
        decode_args(payload).map(|commands| CallInfo::new(MULTICALL_FUNCTION, vec![Value::Array(commands)]))
    } else {
        CallInfo::from_payload(payload)
    };
    let ci = match ci {
        Ok(ci) => ci,
        Err(e) => return CallOutput::failed(ctx, e.into()),
    };
    debug!(
        abi = %String::from_utf8_lossy(payload),
        contract = %encode_address(contract_address),
        "call"
    );

    let amount = ctx.cur_contract.amount.clone();
    let ex = Executor::new(ctx, &LuaCode::from_bytes(code), contract_address, &ci, &amount, ExecKind::Call, None);
    let (result, _) = ctx.run_executor(ex);
    finish_root(ctx, result, contract_address, "CALL END")
}

/// Deploys the code of `payload` to the context's contract and runs its
/// constructor.
pub fn create(ctx: &mut VmContext<'_>, payload: &[u8], contract_address: &[u8]) -> CallOutput {
    if payload.is_empty() {
        return CallOutput::failed(ctx, VmError::catchable("contract code is required"));
    }
    debug!(contract = %encode_address(contract_address), "deploy");

    let (code, args, source) = match resolve_deploy_payload(ctx, payload) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(error = %e, contract = %encode_address(contract_address), "deploy");
            return CallOutput::failed(ctx, e);
        }
    };
    let creator = encode_address(&ctx.cur_contract.sender);
    match ctx.cur_call_state_mut() {
        Ok(cs) => {
            cs.set_code(Some(code.bytes().to_vec()));
            if let Some(ctr) = cs.ctr_state.as_mut() {
                if source.is_some() {
                    ctr.set_source_code(source);
                }
                ctr.set_data(CREATOR_META_KEY, creator.as_bytes());
            }
        }
        Err(e) => return CallOutput::failed(ctx, e),
    }
    if code.byte_code().is_empty() {
        warn!(contract = %encode_address(contract_address), "cannot load contract");
        let err = VmError::catchable(format!("cannot deploy contract {}", encode_address(contract_address)));
        return CallOutput::failed(ctx, err);
    }

    let ci = match decode_args(&args) {
        Ok(args) => CallInfo::new("", args),
        Err(e) => {
            let msg = serde_json::to_string(&format!("constructor call error:{}", e)).unwrap_or_default();
            return CallOutput {
                result: Ok(msg),
                events: Vec::new(),
                used_fee: ctx.used_fee(),
            };
        }
    };

    if ctx.fork() < 2 {
        if let Err(e) = ctx.db_handle() {
            debug!(error = %e, "contract database is unavailable");
            return CallOutput::failed(ctx, VmError::catchable("can't open a database connection"));
        }
    }

    let amount = ctx.cur_contract.amount.clone();
    let ex = Executor::new(ctx, &code, contract_address, &ci, &amount, ExecKind::Create, None);
    let (result, _) = ctx.run_executor(ex);
    if result.is_err() {
        debug!("constructor is failed");
    }
    finish_root(ctx, result, contract_address, "CREATE END")
}

/// Splits a deploy payload into code, constructor arguments and source.
///
/// From fork 4 the code part of a wrapped payload may be Lua source
/// instead of compiled code. It is compiled by a worker and kept as the
/// contract's source.
fn resolve_deploy_payload(
    ctx: &VmContext<'_>,
    payload: &[u8],
) -> Result<(LuaCode, Vec<u8>, Option<Vec<u8>>), VmError> {
    let wrapped = LuaCodePayload::from_bytes(payload.to_vec());
    if ctx.fork() >= 4 && wrapped.is_valid_format().is_ok() {
        let head = wrapped.code();
        if !head.is_valid_format() {
            if let Some(text) = lua_source(head.bytes()) {
                let code = compile(ctx.services.workers, ctx.fork(), text, false, ctx.deadline)
                    .map_err(|e| e.wrap("compile error: "))?;
                return Ok((code, wrapped.args().to_vec(), Some(head.into_bytes())));
            }
        }
    }
    let (code, args) = split_deploy_payload(payload)?;
    Ok((code, args, None))
}

// compiled code always carries NUL bytes in its header
fn lua_source(bytes: &[u8]) -> Option<&str> {
    if bytes.is_empty() || bytes.contains(&0) {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}

/// Commits or rolls back the outermost frame and writes its trace.
fn finish_root(
    ctx: &mut VmContext<'_>,
    result: Result<String, VmError>,
    contract_address: &[u8],
    end_label: &str,
) -> CallOutput {
    let result = match result {
        Err(e) => {
            if let Err(db_err) = ctx.rollback_to_savepoint() {
                error!(error = %db_err, contract = %encode_address(contract_address), "rollback state");
            }
            Err(e)
        }
        Ok(ret) => match ctx.commit_called_contracts() {
            Ok(()) => Ok(ret),
            Err(e) => {
                error!(error = %e, contract = %encode_address(contract_address), "commit state");
                Err(e)
            }
        },
    };

    let used_fee = ctx.used_fee();
    if ctx.trace.is_some() {
        let mut lines = vec![match &result {
            Ok(ret) => format!("[ret] : {}", ret),
            Err(e) => format!("[error] : {}", e),
        }];
        lines.push(format!("[usedFee] : {}", used_fee));
        if !ctx.events().is_empty() {
            lines.push("[Event]".to_string());
            lines.extend(ctx.events().iter().map(Event::to_json));
        }
        lines.push(format!(
            "[{}] : {}({})",
            end_label,
            encode_address(contract_address),
            AccountId::from_id(contract_address)
        ));
        for line in lines {
            ctx.trace_line(line);
        }
    }

    CallOutput {
        result,
        events: ctx.take_events(),
        used_fee,
    }
}

/// Runs a read-only call in a query slot.
pub fn query(
    bs: &mut BlockState,
    services: Services<'_>,
    block: BlockInfo,
    contract_address: &[u8],
    ctr_state: ContractState,
    query_info: &[u8],
) -> Result<String, VmError> {
    let code = code_of(bs, &ctr_state).ok_or_else(|| {
        debug!(contract = %encode_address(contract_address), "not found contract");
        not_found(contract_address)
    })?;
    let ci = CallInfo::from_payload(query_info)?;

    let slot = alloc_query_slot()?;
    let receiver = bs.get_account_state(contract_address);
    let mut ctx = VmContext::new_query(bs, services, block, receiver, ctr_state, slot.service());
    debug!(
        abi = %String::from_utf8_lossy(query_info),
        contract = %encode_address(contract_address),
        service = slot.service(),
        "query"
    );

    let ex = Executor::new(&mut ctx, &LuaCode::from_bytes(code), contract_address, &ci, &BigUint::default(), ExecKind::Call, None);
    let (result, _) = ctx.run_executor(ex);
    ctx.close_query_handles();
    result
}

/// Inputs of a fee delegation check besides the contract itself.
#[derive(Debug, Clone, Default)]
pub struct DelegationRequest {
    pub payload: Vec<u8>,
    pub tx_hash: Vec<u8>,
    pub sender: Vec<u8>,
    pub amount: BigUint,
}

/// Asks the contract whether it pays the fee of a call: the called
/// function must be declared for fee delegation and `check_delegation`
/// must return `true`.
pub fn check_fee_delegation(
    bs: &mut BlockState,
    services: Services<'_>,
    block: BlockInfo,
    contract_address: &[u8],
    ctr_state: ContractState,
    request: &DelegationRequest,
) -> Result<(), VmError> {
    let mut ci = CallInfo::from_payload(&request.payload)?;
    let code = code_of(bs, &ctr_state);
    let abi = match code.as_ref() {
        Some(code) => Abi::from_json(LuaCode::from_bytes(code.clone()).abi())?,
        None => Abi::default(),
    };
    let found = abi
        .function(&ci.name)
        .ok_or_else(|| VmError::catchable(format!("not found function {}", ci.name)))?;
    if !found.fee_delegation {
        return Err(VmError::catchable(format!(
            "{} function is not declared of fee delegation",
            ci.name
        )));
    }
    let code = code.ok_or_else(|| {
        warn!(contract = %encode_address(contract_address), "not found contract");
        not_found(contract_address)
    })?;

    let slot = alloc_query_slot()?;
    let receiver = bs.get_account_state(contract_address);
    let mut ctx = VmContext::new_query(bs, services, block, receiver, ctr_state, slot.service());
    ctx.origin = request.sender.clone();
    ctx.tx_hash = request.tx_hash.clone();
    ctx.cur_contract.amount = request.amount.clone();
    ctx.cur_contract.sender = request.sender.clone();

    ci.args.insert(0, Value::Str(std::mem::take(&mut ci.name)));
    ci.name = CHECK_DELEGATION_FUNCTION.to_string();

    let amount = request.amount.clone();
    let ex = Executor::new(&mut ctx, &LuaCode::from_bytes(code), contract_address, &ci, &amount, ExecKind::CheckDelegation, None);
    let (result, _) = ctx.run_executor(ex);
    ctx.rollback_to_savepoint()?;
    ctx.close_query_handles();

    if result? != "true" {
        return Err(VmError::NotAllowedFeeDelegation);
    }
    Ok(())
}

fn code_of(bs: &BlockState, ctr_state: &ContractState) -> Option<Vec<u8>> {
    bs.get_cached_code(&ctr_state.aid())
        .or_else(|| ctr_state.get_code())
        .map(<[u8]>::to_vec)
}

fn flag(b: bool) -> &'static [u8] {
    if b {
        b"1"
    } else {
        b"0"
    }
}

/// Compiles `source` on a worker. `has_parent` marks a compile requested
/// by a running contract.
pub fn compile(
    workers: &dyn WorkerSource,
    fork: ForkVersion,
    source: &str,
    has_parent: bool,
    deadline: Option<Instant>,
) -> Result<LuaCode, VmError> {
    let instance = workers.acquire(fork)?;
    let result = (|| {
        instance.send(&[b"compile".as_slice(), source.as_bytes(), flag(has_parent)])?;
        let reply = instance.receive(deadline)?;
        match reply.as_slice() {
            [code, err] if err.is_empty() => Ok(LuaCode::from_bytes(code.clone())),
            [_, err] => Err(VmError::from_wire(&String::from_utf8_lossy(err))),
            _ => Err(VmError::system("invalid compile reply from vm")),
        }
    })();
    workers.release(instance);
    result
}
