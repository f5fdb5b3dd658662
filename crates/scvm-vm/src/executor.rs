//! One contract frame running on a checked-out worker.

use crate::context::{max_call_depth, VmContext};
use crate::error::VmError;
use crate::handlers;
use crate::pool::VmInstance;
use crate::wire::WireError;
use num_bigint::BigUint;
use num_traits::Zero;
use scvm_codec::LuaCode;
use scvm_types::{encode_address, Abi, CallInfo, Function, CHECK_DELEGATION_FUNCTION, CONSTRUCTOR};
use std::time::Instant;
use tracing::{debug, error};

/// Length of the little-endian gas prefix on results.
pub const GAS_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecKind {
    Call,
    Create,
    CheckDelegation,
}

pub fn check_payable(f: &Function, amount: &BigUint) -> Result<(), VmError> {
    if amount.is_zero() || f.payable {
        return Ok(());
    }
    Err(VmError::catchable(format!("'{}' is not payable", f.name)))
}

fn flag(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

pub struct Executor {
    instance: Option<VmInstance>,
    address: Vec<u8>,
    code: Vec<u8>,
    fname: String,
    args_json: String,
    gas_limit: u64,
    used_gas: u64,
    is_view: bool,
    pre_err: Option<VmError>,
    counted: bool,
}

impl Executor {
    /// Prepares a frame for `code` at `contract_id`. Failures are kept and
    /// reported by [`Executor::run`]; no worker is taken when the call
    /// depth is exceeded.
    pub fn new(
        ctx: &mut VmContext<'_>,
        code: &LuaCode,
        contract_id: &[u8],
        ci: &CallInfo,
        amount: &BigUint,
        kind: ExecKind,
        gas: Option<u64>,
    ) -> Self {
        let mut ex = Executor {
            instance: None,
            address: contract_id.to_vec(),
            code: code.byte_code().to_vec(),
            fname: String::new(),
            args_json: String::new(),
            gas_limit: gas.unwrap_or_else(|| ctx.remaining_gas()),
            used_gas: 0,
            is_view: false,
            pre_err: None,
            counted: false,
        };

        let max_depth = max_call_depth(ctx.fork());
        if ctx.call_depth > max_depth {
            ex.pre_err = Some(VmError::ExceededCallDepth(max_depth));
            return ex;
        }
        ctx.call_depth += 1;
        ex.counted = true;

        match ctx.services.workers.acquire(ctx.fork()) {
            Ok(instance) => ex.instance = Some(instance),
            Err(e) => {
                error!(error = %e, contract = %encode_address(contract_id), "failed to acquire vm instance");
                ex.pre_err = Some(e);
                return ex;
            }
        }

        if let Err(e) = ex.resolve(code, ci, amount, kind) {
            debug!(error = %e, contract = %encode_address(contract_id), "executor rejected call");
            ex.pre_err = Some(e);
            return ex;
        }

        match ci.args_json() {
            Ok(json) => ex.args_json = json,
            Err(e) => ex.pre_err = Some(VmError::catchable(e.to_string())),
        }

        if let Some(ops) = ctx.internal_ops.as_mut() {
            ops.log_call(
                ctx.call_depth,
                &encode_address(contract_id),
                &ex.fname,
                &ex.args_json,
                &amount.to_string(),
            );
        }
        ex
    }

    fn resolve(&mut self, code: &LuaCode, ci: &CallInfo, amount: &BigUint, kind: ExecKind) -> Result<(), VmError> {
        let abi = Abi::from_json(code.abi())?;
        match kind {
            ExecKind::Create => {
                let f = abi
                    .resolve(CONSTRUCTOR, true)
                    .map_err(VmError::Catchable)?
                    .cloned()
                    .unwrap_or_else(|| Function {
                        name: CONSTRUCTOR.to_string(),
                        ..Default::default()
                    });
                check_payable(&f, amount)?;
                self.is_view = f.view;
                self.fname = CONSTRUCTOR.to_string();
            }
            ExecKind::CheckDelegation => {
                abi.resolve(CHECK_DELEGATION_FUNCTION, false)
                    .map_err(VmError::Catchable)?;
                self.is_view = true;
                self.fname = CHECK_DELEGATION_FUNCTION.to_string();
            }
            ExecKind::Call => {
                let f = abi
                    .resolve(&ci.name, false)
                    .map_err(VmError::Catchable)?
                    .ok_or_else(|| VmError::catchable(format!("not found function: {}", ci.name)))?;
                check_payable(f, amount)?;
                self.is_view = f.view;
                self.fname = f.name.clone();
            }
        }
        Ok(())
    }

    pub fn fname(&self) -> &str {
        &self.fname
    }

    pub fn is_view(&self) -> bool {
        self.is_view
    }

    pub fn pre_error(&self) -> Option<&VmError> {
        self.pre_err.as_ref()
    }

    /// Gas reported by the worker for this frame alone.
    pub fn used_gas(&self) -> u64 {
        self.used_gas
    }

    /// Runs the frame to completion and returns its JSON result.
    pub fn run(&mut self, ctx: &mut VmContext<'_>) -> Result<String, VmError> {
        if let Some(e) = self.pre_err.take() {
            return Err(e);
        }
        if self.is_view {
            ctx.nested_view += 1;
        }
        let result = self.execute(ctx);
        if self.is_view {
            ctx.nested_view -= 1;
        }
        if let Err(e) = &result {
            debug!(error = %e, contract = %encode_address(&self.address), "contract is failed");
        }
        result
    }

    fn execute(&mut self, ctx: &mut VmContext<'_>) -> Result<String, VmError> {
        if ctx.call_depth == 1 {
            let deadline = Instant::now() + ctx.services.settings.timeout;
            ctx.deadline = Some(match ctx.block_deadline {
                Some(d) => d.min(deadline),
                None => deadline,
            });
        }
        let gas = if ctx.is_gas_system() { self.gas_limit } else { u64::MAX };
        let caller = encode_address(&ctx.cur_contract.sender);
        let address = encode_address(&self.address);
        let gas_bytes = gas.to_le_bytes();
        let message: [&[u8]; 9] = [
            b"execute",
            address.as_bytes(),
            &self.code,
            self.fname.as_bytes(),
            self.args_json.as_bytes(),
            &gas_bytes,
            caller.as_bytes(),
            flag(ctx.call_depth > 1).as_bytes(),
            flag(ctx.is_fee_delegation).as_bytes(),
        ];
        self.send(&message)?;

        loop {
            let mut msg = match self.receive(ctx.deadline) {
                Ok(msg) => msg,
                Err(WireError::Timeout) => {
                    let _ = self.send(&[b"timeout".as_slice()]);
                    return Err(VmError::Timeout);
                }
                Err(e) => return Err(e.into()),
            };
            if msg.is_empty() {
                return Err(VmError::system("empty message from vm"));
            }
            let command = String::from_utf8_lossy(&msg.remove(0)).into_owned();
            if command == "return" {
                return self.handle_return(ctx, &msg);
            }

            let in_view = msg.pop().map(|v| v == b"1").unwrap_or(false);
            if in_view {
                ctx.nested_view += 1;
            }
            let reply = handlers::dispatch(ctx, &command, &msg);
            if in_view {
                ctx.nested_view -= 1;
            }
            match reply {
                Ok(result) => self.send(&[result.as_slice(), b""])?,
                Err(e) => self.send(&[b"".as_slice(), e.to_wire().as_bytes()])?,
            }
        }
    }

    fn handle_return(&mut self, ctx: &mut VmContext<'_>, args: &[Vec<u8>]) -> Result<String, VmError> {
        if args.len() != 3 {
            return Err(VmError::catchable("invalid return value from contract"));
        }
        let (result, err) = (&args[0], &args[1]);
        let gas_result = self.process_used_gas(ctx, result);
        if !err.is_empty() {
            return Err(VmError::from_wire(&String::from_utf8_lossy(err)));
        }
        gas_result?;
        Ok(String::from_utf8_lossy(&result[GAS_PREFIX_LEN..]).into_owned())
    }

    fn process_used_gas(&mut self, ctx: &mut VmContext<'_>, result: &[u8]) -> Result<(), VmError> {
        let prefix: [u8; GAS_PREFIX_LEN] = result
            .get(..GAS_PREFIX_LEN)
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| VmError::catchable("invalid used gas value"))?;
        let used = u64::from_le_bytes(prefix);
        self.used_gas = used;
        ctx.used_gas = ctx.used_gas.saturating_add(used);
        if !ctx.is_gas_system() {
            return Ok(());
        }
        if ctx.used_gas >= ctx.gas_limit {
            return Err(VmError::catchable("contract ran out of the transaction gas limit"));
        }
        if used >= self.gas_limit {
            return Err(VmError::catchable("contract ran out of the contract gas limit"));
        }
        Ok(())
    }

    fn send(&self, items: &[&[u8]]) -> Result<(), VmError> {
        match self.instance.as_ref() {
            Some(instance) => Ok(instance.send(items)?),
            None => Err(VmError::system("executor has no vm instance")),
        }
    }

    fn receive(&self, deadline: Option<Instant>) -> Result<Vec<Vec<u8>>, WireError> {
        match self.instance.as_ref() {
            Some(instance) => instance.receive(deadline),
            None => Err(WireError::Closed),
        }
    }

    /// Returns the worker to its source and leaves the frame.
    pub fn close(mut self, ctx: &mut VmContext<'_>) {
        if let Some(instance) = self.instance.take() {
            ctx.services.workers.release(instance);
        }
        if self.counted {
            ctx.call_depth -= 1;
        }
    }
}

impl<'a> VmContext<'a> {
    /// Runs and closes `ex`; returns its result and the gas it reported.
    pub(crate) fn run_executor(&mut self, mut ex: Executor) -> (Result<String, VmError>, u64) {
        let result = ex.run(self);
        let used = ex.used_gas();
        ex.close(self);
        (result, used)
    }
}

/// Prefixes a result with the gas used by the frame that produced it.
pub(crate) fn with_gas_prefix(used_gas: u64, json: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(GAS_PREFIX_LEN + json.len());
    out.extend_from_slice(&used_gas.to_le_bytes());
    out.extend_from_slice(json);
    out
}
