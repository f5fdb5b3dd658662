//! State variable commands.

use super::{aid, arg_str, check_args};
use crate::context::VmContext;
use crate::error::VmError;
use scvm_state::var_key_hash;
use scvm_types::HASH_ID_LENGTH;

pub(super) fn set_variable(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 2, "[System.SetVariable]")?;
    if ctx.is_query() || ctx.in_view() {
        return Err(VmError::catchable("[System.SetVariable] set not permitted in query"));
    }
    let (key, value) = (&args[0], &args[1]);
    ctx.add_update_size((HASH_ID_LENGTH + value.len()) as i64)?;
    ctx.cur_ctr_state_mut()?.set_data(key, value);
    if ctx.trace.is_some() {
        ctx.trace_line("[Set]");
        ctx.trace_line(format!("Key={}", String::from_utf8_lossy(key)));
        ctx.trace_line(format!("Data={}", String::from_utf8_lossy(value)));
    }
    Ok(Vec::new())
}

pub(super) fn get_variable(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 2, "[System.GetVariable]")?;
    let key = &args[0];
    let blk = arg_str(args, 1);
    if !blk.is_empty() {
        let blk_no: u64 = blk
            .parse()
            .map_err(|_| VmError::catchable(format!("[System.GetVariable] invalid blockheight value :{}", blk)))?;
        let height = if ctx.block.no == 0 {
            ctx.services
                .chain
                .best_block()
                .map_err(|_| VmError::catchable("[System.GetVariable] get best block error"))?
                .no
        } else {
            ctx.block.no
        };
        if blk_no < height {
            return historical_value(ctx, key, blk_no);
        }
    }
    Ok(ctx
        .cur_ctr_state_mut()?
        .get_data(key)
        .map(<[u8]>::to_vec)
        .unwrap_or_default())
}

fn historical_value(ctx: &VmContext<'_>, key: &[u8], blk_no: u64) -> Result<Vec<u8>, VmError> {
    let chain = ctx.services.chain;
    let header = chain
        .block_by_no(blk_no)
        .map_err(|e| VmError::catchable(format!("[System.GetVariable] get block error: {}", e)))?;
    let account = chain
        .account_and_proof(&aid(&ctx.cur_contract.contract_id), &header.blocks_root_hash)
        .map_err(|_| VmError::catchable("[System.GetVariable] failed to get snapshot state for account"))?;
    if !account.inclusion {
        return Ok(Vec::new());
    }
    let var = chain
        .var_and_proof(&var_key_hash(key), &account.data.storage_root)
        .map_err(|_| {
            VmError::catchable("[System.GetVariable] failed to get snapshot state variable in contract")
        })?;
    Ok(if var.inclusion { var.value } else { Vec::new() })
}

pub(super) fn del_variable(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[System.DelVariable]")?;
    if ctx.is_query() || ctx.in_view() {
        return Err(VmError::catchable("[System.DelVariable] delete not permitted in query"));
    }
    ctx.add_update_size(HASH_ID_LENGTH as i64)?;
    ctx.cur_ctr_state_mut()?.delete_data(&args[0]);
    if ctx.trace.is_some() {
        ctx.trace_line("[Del]");
        ctx.trace_line(format!("Key={}", String::from_utf8_lossy(&args[0])));
    }
    Ok(Vec::new())
}
