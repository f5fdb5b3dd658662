//! Staking and voting through the system contract.

use super::{aid, arg_str, check_args};
use crate::context::VmContext;
use crate::error::VmError;
use num_bigint::BigUint;
use scvm_fee::transform_amount;
use scvm_types::{decode_address, TxBody, TxType, AERGO_SYSTEM, ENCODED_ADDRESS_LENGTH};

const PREFIX: &str = "[Contract.Governance]";

fn governance_error(msg: impl std::fmt::Display) -> VmError {
    VmError::catchable(format!("{} {}", PREFIX, msg))
}

/// Arguments: kind (`S` stake, `U` unstake, `V` vote BP, `D` vote DAO)
/// and its amount or JSON vote arguments.
pub(super) fn governance(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 2, PREFIX)?;
    if ctx.is_query() || ctx.in_view() {
        return Err(governance_error("governance not permitted in query"));
    }
    let kind = args[0].first().copied().unwrap_or_default();
    let arg = arg_str(args, 1);

    let (amount, payload) = match kind {
        b'S' | b'U' => {
            let amount = transform_amount(&arg, ctx.fork())
                .map_err(|e| governance_error(format!("invalid amount: {}", e)))?;
            let op = if kind == b'S' { "v1stake" } else { "v1unstake" };
            (amount, format!(r#"{{"Name":"{}"}}"#, op))
        }
        b'V' => (BigUint::default(), format!(r#"{{"Name":"v1voteBP","Args":{}}}"#, arg)),
        b'D' => (BigUint::default(), format!(r#"{{"Name":"v1voteDAO","Args":{}}}"#, arg)),
        _ => {
            return Err(governance_error(format!(
                "invalid governance type: {}",
                String::from_utf8_lossy(&args[0])
            )))
        }
    };

    let system_id = AERGO_SYSTEM.as_bytes();
    let system_aid = aid(system_id);
    let cur_aid = ctx.cur_contract.aid;
    if cur_aid == system_aid {
        return Err(governance_error("system contract cannot call itself"));
    }
    ctx.contract_state_mut(system_id);

    let body = TxBody {
        account: if ctx.fork() >= 2 { ctx.cur_contract.contract_id.clone() } else { Vec::new() },
        recipient: system_id.to_vec(),
        amount: amount.clone(),
        payload: payload.into_bytes(),
        tx_type: TxType::Governance,
        ..Default::default()
    };

    let system = ctx.services.system;
    {
        let sender = &ctx
            .call_state(&cur_aid)
            .ok_or_else(|| VmError::system("call state of the current contract is missing"))?
            .account;
        let state = ctx
            .call_state(&system_aid)
            .and_then(|cs| cs.ctr_state.as_ref())
            .ok_or_else(|| VmError::system("system contract state is missing"))?;
        system
            .validate(&body, sender, state, &ctx.block)
            .map_err(|e| governance_error(format!("error: {}", e)))?;
    }

    let seq = ctx
        .set_recovery_point(system_aid, Some(cur_aid), BigUint::default(), false, false)
        .map_err(|e| e.wrap("[Contract.Governance] database error: "))?;

    let executed = {
        let mut system_cs = ctx
            .call_states
            .remove(&system_aid)
            .ok_or_else(|| VmError::system("system contract state is missing"))?;
        let result = match (ctx.call_states.get_mut(&cur_aid), system_cs.ctr_state.as_mut()) {
            (Some(cur), Some(state)) => {
                system.execute(state, &body, &mut cur.account, &mut system_cs.account, &ctx.block)
            }
            _ => Err("call state is missing".to_string()),
        };
        ctx.call_states.insert(system_aid, system_cs);
        result
    };

    let events = match executed {
        Ok(events) => events,
        Err(e) => {
            ctx.clear_recovery(seq, true)
                .map_err(|re| re.wrap("[Contract.Governance] recovery error: "))?;
            return Err(governance_error(format!("error: {}", e)));
        }
    };

    if seq == 1 {
        ctx.clear_recovery(seq, false)
            .map_err(|re| re.wrap("[Contract.Governance] recovery error: "))?;
    }

    // system contract events keep their own indexes
    ctx.event_count += events.len() as i32;
    ctx.events.extend(events);

    if ctx.recovery_depth() > 0 {
        let (sender, target) = match kind {
            b'S' => (cur_aid, system_aid),
            b'U' => (system_aid, cur_aid),
            _ => return Ok(Vec::new()),
        };
        let seq = ctx.set_recovery_point(target, Some(sender), amount.clone(), true, false)?;
        if ctx.trace.is_some() {
            ctx.trace_line(format!("[GOVERNANCE]aid({})", system_aid));
            ctx.trace_line(format!("snapshot set {}", seq));
            let op = if kind == b'S' { "staking" } else { "unstaking" };
            ctx.trace_line(format!("{} : {}", op, amount));
        }
    }
    Ok(Vec::new())
}

pub(super) fn get_staking(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.GetStaking]")?;
    let addr = arg_str(args, 0);
    let account = if addr.len() == ENCODED_ADDRESS_LENGTH {
        decode_address(&addr).map_err(|e| VmError::catchable(format!("[Contract.GetStaking] {}", e)))?
    } else {
        ctx.services
            .names
            .resolve(&*ctx.bs, addr.as_bytes())
            .unwrap_or_else(|| addr.as_bytes().to_vec())
    };
    let system = ctx.services.system;
    let state = ctx.contract_state_mut(AERGO_SYSTEM.as_bytes());
    let (amount, when) = system
        .staking(state, &account)
        .map_err(|e| VmError::catchable(format!("[Contract.GetStaking] {}", e)))?;
    Ok(format!("{},{}", amount, when).into_bytes())
}
