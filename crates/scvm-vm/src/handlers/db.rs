//! Commands forwarded to the contract's SQL database.

use super::{arg_str, check_args};
use crate::context::VmContext;
use crate::error::VmError;

fn prefix(command: &str) -> &'static str {
    match command {
        "dbExec" => "[DB.Exec]",
        "dbQuery" => "[DB.Query]",
        "dbPrepare" => "[DB.Prepare]",
        "stmtExec" => "[DB.StmtExec]",
        "stmtQuery" => "[DB.StmtQuery]",
        "stmtColumnInfo" => "[DB.StmtColumnInfo]",
        "rsNext" => "[DB.RsNext]",
        "rsGet" => "[DB.RsGet]",
        "rsClose" => "[DB.RsClose]",
        _ => "[DB.LastInsertRowid]",
    }
}

/// Kind of the numeric handle taken as first argument, if any.
fn id_kind(command: &str) -> Option<&'static str> {
    match command {
        "stmtExec" | "stmtQuery" | "stmtColumnInfo" => Some("statement"),
        "rsNext" | "rsClose" => Some("query"),
        "rsGet" => Some("column"),
        _ => None,
    }
}

pub(super) fn forward(ctx: &mut VmContext<'_>, command: &str, args: &[Vec<u8>], n: usize) -> Result<Vec<u8>, VmError> {
    let prefix = prefix(command);
    check_args(args, n, prefix)?;
    let strings: Vec<String> = (0..n).map(|i| arg_str(args, i)).collect();
    if let Some(kind) = id_kind(command) {
        if strings[0].parse::<i32>().is_err() {
            return Err(VmError::catchable(format!("{} invalid {} id", prefix, kind)));
        }
    }
    ctx.db_handle()?
        .command(command, &strings)
        .map_err(VmError::Catchable)
}

/// Opens a read-only handle at an earlier recovery point; queries only.
pub(super) fn open_with_snapshot(ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.SetDbSnap]")?;
    if !ctx.is_query() {
        return Err(VmError::catchable("[Contract.SetDbSnap] not permitted in transaction"));
    }
    let snap = arg_str(args, 0);
    let engine = ctx
        .services
        .sql
        .ok_or_else(|| VmError::catchable("database is not available"))?;
    let aid = ctx.cur_contract.aid;
    let cs = ctx.cur_call_state_mut()?;
    if cs.tx.is_some() {
        return Err(VmError::catchable("[Contract.SetDbSnap] transaction already started"));
    }
    let rp: u64 = snap
        .parse()
        .map_err(|_| VmError::catchable(format!("[Contract.SetDbSnap] snapshot is not valid{}", snap)))?;
    let tx = engine
        .begin_read_only(&aid, rp)
        .map_err(|_| VmError::catchable("Error Begin SQL Transaction"))?;
    cs.tx = Some(tx);
    Ok(Vec::new())
}

pub(super) fn get_snapshot(ctx: &VmContext<'_>) -> Result<Vec<u8>, VmError> {
    Ok(ctx.cur_contract.rp.to_string().into_bytes())
}
