//! Per-transaction execution state shared by every frame of a call tree.

use crate::backend::SqlTx;
use crate::call_state::{CallState, ContractInfo};
use crate::error::VmError;
use crate::internal_ops::InternalOps;
use crate::recovery::RecoveryEntry;
use crate::settings::Services;
use crate::trace::TraceFile;
use num_bigint::BigUint;
use rand_chacha::ChaCha8Rng;
use scvm_fee::{is_zero_fee, payment_data_fee, STATE_DB_MAX_UPDATE_SIZE};
use scvm_state::{AccountState, BlockState, ContractState};
use scvm_types::{AccountId, BlockInfo, Event, ForkVersion};
use std::collections::HashMap;
use std::time::Instant;

/// Call depth allowed from fork 3.
pub const MAX_CALL_DEPTH: i32 = 20;
pub const MAX_CALL_DEPTH_OLD: i32 = 5;
pub const MAX_EVENT_COUNT: i32 = 128;
pub const MAX_EVENT_COUNT_OLD: i32 = 50;
pub const MAX_EVENT_NAME_SIZE: usize = 64;
pub const MAX_EVENT_ARGS_SIZE: usize = 4096;

pub fn max_call_depth(fork: ForkVersion) -> i32 {
    if fork >= 3 {
        MAX_CALL_DEPTH
    } else {
        MAX_CALL_DEPTH_OLD
    }
}

pub fn max_event_count(fork: ForkVersion) -> i32 {
    if fork >= 4 {
        MAX_EVENT_COUNT
    } else {
        MAX_EVENT_COUNT_OLD
    }
}

/// Transaction-level inputs of a context.
#[derive(Debug, Clone, Default)]
pub struct TxEnv {
    pub origin: Vec<u8>,
    pub tx_hash: Vec<u8>,
    pub block: BlockInfo,
    pub amount: BigUint,
    pub gas_limit: u64,
    pub is_fee_delegation: bool,
    pub is_multicall: bool,
    pub service: usize,
    /// Hard stop imposed by block production
    pub block_deadline: Option<Instant>,
}

/// Accounts handed back to the caller when a context ends.
#[derive(Debug)]
pub struct RootStates {
    pub sender: Option<AccountState>,
    pub receiver: AccountState,
    pub ctr_state: Option<ContractState>,
}

pub struct VmContext<'a> {
    pub(crate) bs: &'a mut BlockState,
    pub(crate) services: Services<'a>,
    pub(crate) call_states: HashMap<AccountId, CallState>,
    pub(crate) cur_contract: ContractInfo,
    pub(crate) root_sender: Option<AccountId>,
    pub(crate) root_receiver: AccountId,
    pub(crate) recovery: Vec<RecoveryEntry>,
    pub(crate) events: Vec<Event>,
    pub(crate) event_count: i32,
    pub(crate) call_depth: i32,
    pub(crate) nested_view: i32,
    pub(crate) deadline: Option<Instant>,
    pub(crate) block_deadline: Option<Instant>,
    pub(crate) rng: Option<ChaCha8Rng>,
    pub(crate) db_update_total: i64,
    pub(crate) gas_limit: u64,
    pub(crate) used_gas: u64,
    pub(crate) origin: Vec<u8>,
    pub(crate) tx_hash: Vec<u8>,
    pub(crate) block: BlockInfo,
    pub(crate) is_query: bool,
    pub(crate) is_fee_delegation: bool,
    pub(crate) is_multicall: bool,
    pub(crate) service: usize,
    pub(crate) trace: Option<TraceFile>,
    pub(crate) internal_ops: Option<InternalOps>,
    pub(crate) savepoint_seq: u64,
}

impl<'a> VmContext<'a> {
    /// Context of a transaction from `sender` to the contract `receiver`.
    pub fn new(
        bs: &'a mut BlockState,
        services: Services<'a>,
        env: TxEnv,
        sender: AccountState,
        receiver: AccountState,
        ctr_state: ContractState,
    ) -> Self {
        let cur_contract = ContractInfo {
            aid: receiver.aid(),
            sender: sender.id().to_vec(),
            contract_id: receiver.id().to_vec(),
            rp: receiver.rp(),
            amount: env.amount.clone(),
        };
        let mut ctx = Self::empty(bs, services, cur_contract, env);
        let receiver_aid = receiver.aid();
        if sender.aid() != receiver_aid {
            ctx.root_sender = Some(sender.aid());
            ctx.call_states.insert(sender.aid(), CallState::new(sender));
        }
        ctx.call_states
            .insert(receiver_aid, CallState::with_contract(receiver, ctr_state));
        if ctx.services.settings.trace_block_no != 0
            && ctx.services.settings.trace_block_no == ctx.block.no
        {
            ctx.trace = TraceFile::open(ctx.block.no, &ctx.tx_hash);
        }
        ctx
    }

    /// Read-only context for a query against `receiver`.
    pub fn new_query(
        bs: &'a mut BlockState,
        services: Services<'a>,
        block: BlockInfo,
        receiver: AccountState,
        ctr_state: ContractState,
        service: usize,
    ) -> Self {
        let cur_contract = ContractInfo {
            aid: receiver.aid(),
            sender: Vec::new(),
            contract_id: receiver.id().to_vec(),
            rp: receiver.rp(),
            amount: BigUint::default(),
        };
        let env = TxEnv {
            block,
            service,
            ..Default::default()
        };
        let mut ctx = Self::empty(bs, services, cur_contract, env);
        ctx.is_query = true;
        ctx.internal_ops = None;
        ctx.call_states
            .insert(receiver.aid(), CallState::with_contract(receiver, ctr_state));
        ctx
    }

    fn empty(bs: &'a mut BlockState, services: Services<'a>, cur_contract: ContractInfo, env: TxEnv) -> Self {
        let internal_ops = services.settings.internal_ops.then(InternalOps::new);
        Self {
            bs,
            services,
            call_states: HashMap::new(),
            root_receiver: cur_contract.aid,
            cur_contract,
            root_sender: None,
            recovery: Vec::new(),
            events: Vec::new(),
            event_count: 0,
            call_depth: 0,
            nested_view: 0,
            deadline: None,
            block_deadline: env.block_deadline,
            rng: None,
            db_update_total: 0,
            gas_limit: env.gas_limit,
            used_gas: 0,
            origin: env.origin,
            tx_hash: env.tx_hash,
            block: env.block,
            is_query: false,
            is_fee_delegation: env.is_fee_delegation,
            is_multicall: env.is_multicall,
            service: env.service,
            trace: None,
            internal_ops,
            savepoint_seq: 0,
        }
    }

    pub fn fork(&self) -> ForkVersion {
        self.block.fork_version
    }

    pub fn block(&self) -> &BlockInfo {
        &self.block
    }

    pub fn is_query(&self) -> bool {
        self.is_query
    }

    pub fn in_view(&self) -> bool {
        self.nested_view > 0
    }

    pub fn call_depth(&self) -> i32 {
        self.call_depth
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Truncates the event list to its first `from` events.
    pub fn drop_events(&mut self, from: usize) {
        self.events.truncate(from);
        self.event_count = self.events.len() as i32;
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn recovery_depth(&self) -> usize {
        self.recovery.len()
    }

    pub fn used_gas(&self) -> u64 {
        self.used_gas
    }

    pub fn db_update_total(&self) -> i64 {
        self.db_update_total
    }

    /// Gas is metered on public networks from fork 2, outside queries.
    pub fn is_gas_system(&self) -> bool {
        !self.is_query && self.services.settings.pub_net && self.fork() >= 2
    }

    pub fn remaining_gas(&self) -> u64 {
        self.gas_limit.saturating_sub(self.used_gas)
    }

    /// Fee charged for the execution so far.
    pub fn used_fee(&self) -> BigUint {
        if is_zero_fee() {
            return BigUint::default();
        }
        if self.is_gas_system() {
            return self.bs.gas_price() * BigUint::from(self.used_gas);
        }
        payment_data_fee(self.db_update_total)
    }

    /// Accounts for bytes written to the state database; the cap only
    /// applies when gas is not metered.
    pub fn add_update_size(&mut self, size: i64) -> Result<(), VmError> {
        if self.is_gas_system() {
            return Ok(());
        }
        if self.db_update_total + size > STATE_DB_MAX_UPDATE_SIZE {
            return Err(VmError::uncatchable("exceeded size of updates in the state database"));
        }
        self.db_update_total += size;
        Ok(())
    }

    /// Call state of `id`, loaded from the block state on first use.
    pub fn call_state_mut(&mut self, id: &[u8]) -> &mut CallState {
        let aid = AccountId::from_id(id);
        let bs = &*self.bs;
        self.call_states
            .entry(aid)
            .or_insert_with(|| CallState::loaded(bs.get_account_state(id)))
    }

    pub fn call_state(&self, aid: &AccountId) -> Option<&CallState> {
        self.call_states.get(aid)
    }

    /// Contract state of `id`, opened on first use.
    pub fn contract_state_mut(&mut self, id: &[u8]) -> &mut ContractState {
        let bs = &*self.bs;
        let aid = AccountId::from_id(id);
        let cs = self
            .call_states
            .entry(aid)
            .or_insert_with(|| CallState::loaded(bs.get_account_state(id)));
        cs.ctr_state
            .get_or_insert_with(|| bs.open_contract_state(id))
    }

    pub(crate) fn cur_call_state_mut(&mut self) -> Result<&mut CallState, VmError> {
        self.call_states
            .get_mut(&self.cur_contract.aid)
            .ok_or_else(|| VmError::system("call state of the current contract is missing"))
    }

    pub(crate) fn cur_ctr_state_mut(&mut self) -> Result<&mut ContractState, VmError> {
        let id = self.cur_contract.contract_id.clone();
        self.cur_call_state_mut()?;
        Ok(self.contract_state_mut(&id))
    }

    /// Code of the contract at `id`, via the per-block cache.
    pub(crate) fn load_code(&mut self, id: &[u8]) -> Option<Vec<u8>> {
        let aid = AccountId::from_id(id);
        if let Some(code) = self.bs.get_cached_code(&aid) {
            return Some(code.to_vec());
        }
        let code = match self.call_states.get(&aid).and_then(|cs| cs.ctr_state.as_ref()) {
            Some(ctr) => ctr.get_code().map(<[u8]>::to_vec),
            None => self.bs.open_contract_state(id).get_code().map(<[u8]>::to_vec),
        }?;
        self.bs.add_cache(aid, code.clone());
        Some(code)
    }

    /// Source of the contract at `id`, if it was deployed from source.
    pub(crate) fn load_source(&self, id: &[u8]) -> Option<Vec<u8>> {
        let aid = AccountId::from_id(id);
        match self.call_states.get(&aid).and_then(|cs| cs.ctr_state.as_ref()) {
            Some(ctr) => ctr.source_code().map(<[u8]>::to_vec),
            None => self.bs.open_contract_state(id).source_code().map(<[u8]>::to_vec),
        }
    }

    /// Moves `amount` between two call states.
    pub(crate) fn transfer(&mut self, from: &[u8], to: &[u8], amount: &BigUint) -> Result<(), VmError> {
        let from_aid = AccountId::from_id(from);
        let to_aid = AccountId::from_id(to);
        self.call_state_mut(to);
        let sender = self.call_state_mut(from);
        if sender.account.balance() < amount {
            return Err(VmError::catchable(format!(
                "insufficient balance: {} : amount to transfer: {}",
                sender.account.balance(),
                amount
            )));
        }
        if from_aid == to_aid {
            return Ok(());
        }
        sender.account.sub_balance(amount)?;
        if let Some(receiver) = self.call_states.get_mut(&to_aid) {
            receiver.account.add_balance(amount);
        }
        Ok(())
    }

    /// SQL transaction of the current contract, begun on first use.
    pub(crate) fn db_handle(&mut self) -> Result<&mut dyn SqlTx, VmError> {
        let engine = self
            .services
            .sql
            .ok_or_else(|| VmError::catchable("database is not available"))?;
        let is_query = self.is_query;
        let (aid, rp) = (self.cur_contract.aid, self.cur_contract.rp);
        let cs = self.cur_call_state_mut()?;
        if cs.tx.is_none() {
            let tx = if is_query {
                engine.begin_read_only(&aid, rp)
            } else {
                engine.begin_tx(&aid, rp).and_then(|mut tx| {
                    tx.savepoint()?;
                    Ok(tx)
                })
            }
            .map_err(|e| VmError::catchable(format!("can't open a database connection: {}", e)))?;
            cs.tx = Some(tx);
        }
        match cs.tx.as_deref_mut() {
            Some(tx) => Ok(tx),
            None => Err(VmError::system("database handle is missing")),
        }
    }

    pub(crate) fn trace_line(&mut self, text: impl AsRef<str>) {
        if let Some(trace) = self.trace.as_mut() {
            trace.line(text.as_ref());
        }
    }

    /// Rolls back every open SQL transaction and drops cached code of
    /// contracts deployed in this transaction.
    pub(crate) fn rollback_to_savepoint(&mut self) -> Result<(), VmError> {
        let mut result = Ok(());
        for (aid, cs) in self.call_states.iter_mut() {
            if cs.is_deploy {
                self.bs.remove_cache(aid);
            }
            if let Some(tx) = cs.tx.as_mut() {
                if let Err(e) = tx.rollback_to_savepoint() {
                    tracing::error!(error = %e, "failed to roll back contract database");
                    result = Err(VmError::DbSystem(e));
                }
            }
        }
        result
    }

    /// Closes the read-only handles opened by a query.
    pub(crate) fn close_query_handles(&mut self) {
        for cs in self.call_states.values_mut() {
            if let Some(mut tx) = cs.tx.take() {
                tx.close();
            }
        }
    }

    /// Releases SQL transactions, stages contract states other than the
    /// root one and writes back lazily loaded accounts.
    pub(crate) fn commit_called_contracts(&mut self) -> Result<(), VmError> {
        let root = self.root_receiver;
        let mut lines = Vec::new();
        for (aid, cs) in self.call_states.iter_mut() {
            if let Some(tx) = cs.tx.as_mut() {
                tx.release().map_err(VmError::DbSystem)?;
            }
            if *aid == root {
                continue;
            }
            if let Some(ctr) = cs.ctr_state.as_ref() {
                self.bs.stage_contract_state(ctr.clone());
            }
            if cs.write_back {
                self.bs.put_state(&cs.account);
                if self.trace.is_some() {
                    lines.push(format!(
                        "[Put State Balance] : {} : {}",
                        scvm_types::encode_address(cs.account.id()),
                        cs.account.balance()
                    ));
                }
            }
        }
        for line in lines {
            self.trace_line(line);
        }
        Ok(())
    }

    /// Ends the context and returns the root accounts.
    pub fn into_root(mut self) -> RootStates {
        let receiver_cs = self.call_states.remove(&self.root_receiver);
        let sender = match self.root_sender {
            Some(aid) => self.call_states.remove(&aid).map(|cs| cs.account),
            None => receiver_cs.as_ref().map(|cs| cs.account.clone()),
        };
        let (receiver, ctr_state) = match receiver_cs {
            Some(cs) => (cs.account, cs.ctr_state),
            None => (self.bs.get_account_state(&self.cur_contract.contract_id), None),
        };
        RootStates { sender, receiver, ctr_state }
    }
}
