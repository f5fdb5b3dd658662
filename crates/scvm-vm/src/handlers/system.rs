//! Context getters, events, address helpers and randomness.

use super::{arg_str, check_args, resolve_address};
use crate::context::{max_event_count, VmContext, MAX_EVENT_ARGS_SIZE, MAX_EVENT_NAME_SIZE};
use crate::error::VmError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use scvm_types::{decode_address, encode_address, Event, ADDRESS_LENGTH, ENCODED_ADDRESS_LENGTH};
use tracing::info;

fn flag(b: bool) -> Vec<u8> {
    if b { b"1".to_vec() } else { b"0".to_vec() }
}

pub(super) fn contract_id(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(encode_address(&ctx.cur_contract.contract_id).into_bytes())
}

pub(super) fn sender(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(encode_address(&ctx.cur_contract.sender).into_bytes())
}

pub(super) fn amount(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(ctx.cur_contract.amount.to_string().into_bytes())
}

pub(super) fn block_no(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(ctx.block.no.to_string().into_bytes())
}

pub(super) fn timestamp(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(ctx.block.timestamp_secs().to_string().into_bytes())
}

pub(super) fn prev_block_hash(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(bs58::encode(&ctx.block.prev_block_hash).into_string().into_bytes())
}

pub(super) fn tx_hash(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(bs58::encode(&ctx.tx_hash).into_string().into_bytes())
}

pub(super) fn origin(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(encode_address(&ctx.origin).into_bytes())
}

pub(super) fn is_fee_delegation(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(flag(ctx.is_fee_delegation))
}

pub(super) fn event(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 2, "[Contract.Event]")?;
    if ctx.is_query() || ctx.in_view() {
        return Err(VmError::catchable("[Contract.Event] event not permitted in query"));
    }
    let max_events = max_event_count(ctx.fork());
    if ctx.event_count >= max_events {
        return Err(VmError::catchable(format!(
            "[Contract.Event] exceeded the maximum number of events({})",
            max_events
        )));
    }
    let (name, json_args) = (arg_str(args, 0), arg_str(args, 1));
    if name.len() > MAX_EVENT_NAME_SIZE {
        return Err(VmError::catchable(format!(
            "[Contract.Event] exceeded the maximum length of event name({})",
            MAX_EVENT_NAME_SIZE
        )));
    }
    if json_args.len() > MAX_EVENT_ARGS_SIZE {
        return Err(VmError::catchable(format!(
            "[Contract.Event] exceeded the maximum length of event args({})",
            MAX_EVENT_ARGS_SIZE
        )));
    }
    ctx.trace_line(format!("[Event] {} : {}", name, json_args));
    let event = Event::new(ctx.cur_contract.contract_id.clone(), name, json_args, ctx.event_count)
        .with_tx_hash(ctx.tx_hash.clone());
    ctx.events.push(event);
    ctx.event_count += 1;
    Ok(Vec::new())
}

pub(super) fn event_count(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(ctx.event_count.to_string().into_bytes())
}

/// Discards the events emitted from index `from` on. Malformed requests
/// are ignored.
pub(super) fn drop_event(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    if args.len() != 1 {
        return Ok(Vec::new());
    }
    if let Ok(from) = arg_str(args, 0).parse::<usize>() {
        ctx.drop_events(from);
    }
    Ok(Vec::new())
}

pub(super) fn to_pubkey(args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.ToPubkey]")?;
    let raw = decode_address(&arg_str(args, 0))
        .map_err(|_| VmError::catchable("[Contract.ToPubkey] invalid address"))?;
    if raw.len() != ADDRESS_LENGTH {
        return Err(VmError::catchable("[Contract.ToPubkey] invalid address length"));
    }
    Ok(format!("0x{}", hex::encode(raw)).into_bytes())
}

pub(super) fn to_address(args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.ToAddress]")?;
    let text = arg_str(args, 0);
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(&text);
    let pubkey = hex::decode(digits)
        .map_err(|_| VmError::catchable("[Contract.ToAddress] invalid public key"))?;
    if pubkey.len() != ADDRESS_LENGTH {
        return Err(VmError::catchable("[Contract.ToAddress] invalid public key length"));
    }
    Ok(encode_address(&pubkey).into_bytes())
}

pub(super) fn is_contract(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.IsContract]")?;
    let id = resolve_address(ctx, &arg_str(args, 0))
        .map_err(|e| e.wrap("[Contract.IsContract] invalid contractId: "))?;
    let len = ctx.call_state_mut(&id).account.code_hash().len();
    Ok(len.to_string().into_bytes())
}

pub(super) fn name_resolve(ctx: &VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.NameResolve]")?;
    let account = arg_str(args, 0);
    let id = if account.len() == ENCODED_ADDRESS_LENGTH {
        decode_address(&account).map_err(|e| VmError::catchable(format!("[Contract.NameResolve] {}", e)))?
    } else {
        ctx.services
            .names
            .resolve(&*ctx.bs, account.as_bytes())
            .ok_or_else(|| VmError::catchable(format!("[Contract.NameResolve] name not founded :{}", account)))?
    };
    Ok(encode_address(&id).into_bytes())
}

pub(super) fn print(ctx: &VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    let text = args
        .iter()
        .map(|a| String::from_utf8_lossy(a))
        .collect::<Vec<_>>()
        .join(" ");
    info!(contract = %encode_address(&ctx.cur_contract.contract_id), "{}", text);
    Ok(Vec::new())
}

pub(super) fn random_int(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 2, "[System.RandomInt]")?;
    let min: i64 = arg_str(args, 0)
        .parse()
        .map_err(|_| VmError::catchable("[System.RandomInt] invalid minimum value"))?;
    let max: i64 = arg_str(args, 1)
        .parse()
        .map_err(|_| VmError::catchable("[System.RandomInt] invalid maximum value"))?;
    if min > max {
        return Err(VmError::catchable("[System.RandomInt] minimum is greater than maximum"));
    }
    let seed = random_seed(ctx);
    let rng = ctx.rng.get_or_insert_with(|| ChaCha8Rng::seed_from_u64(seed));
    Ok(rng.gen_range(min..=max).to_string().into_bytes())
}

fn random_seed(ctx: &VmContext<'_>) -> u64 {
    if ctx.is_query() {
        return ctx.block.ts as u64;
    }
    let part = |bytes: &[u8]| {
        let head = &bytes[..bytes.len().min(7)];
        parse_base62(&bs58::encode(head).into_string())
    };
    part(&ctx.block.prev_block_hash).wrapping_add(part(&ctx.tx_hash))
}

/// Reads `s` as a base-62 number over `0-9a-zA-Z`; other characters are
/// skipped.
fn parse_base62(s: &str) -> u64 {
    s.bytes().fold(0u64, |acc, c| {
        let digit = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'z' => c - b'a' + 10,
            b'A'..=b'Z' => c - b'A' + 36,
            _ => return acc,
        };
        acc.wrapping_mul(62).wrapping_add(u64::from(digit))
    })
}
