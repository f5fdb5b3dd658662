//! Savepoints spanning balances, nonces, contract storage and SQL.

use crate::context::VmContext;
use crate::error::VmError;
use num_bigint::BigUint;
use num_traits::Zero;
use scvm_state::Revision;
use scvm_types::AccountId;
use tracing::debug;

/// One savepoint on the recovery stack.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryEntry {
    pub seq: i32,
    pub amount: BigUint,
    pub sender: Option<AccountId>,
    pub sender_nonce: u64,
    pub call_state: Option<AccountId>,
    pub only_send: bool,
    pub is_deploy: bool,
    pub sql_save_name: Option<String>,
    pub state_revision: Option<Revision>,
}

impl<'a> VmContext<'a> {
    /// Pushes a savepoint before `amount` moves from `sender` into the
    /// account `target`; returns its sequence number.
    pub fn set_recovery_point(
        &mut self,
        target: AccountId,
        sender: Option<AccountId>,
        amount: BigUint,
        only_send: bool,
        is_deploy: bool,
    ) -> Result<i32, VmError> {
        let seq = self.recovery.last().map(|e| e.seq + 1).unwrap_or(1);
        let sender_nonce = sender
            .and_then(|s| self.call_states.get(&s))
            .map(|cs| cs.account.nonce())
            .unwrap_or_default();
        let mut entry = RecoveryEntry {
            seq,
            amount,
            sender,
            sender_nonce,
            call_state: Some(target),
            only_send,
            is_deploy,
            sql_save_name: None,
            state_revision: None,
        };
        if !only_send {
            if let Some(cs) = self.call_states.get_mut(&target) {
                entry.state_revision = cs.ctr_state.as_ref().map(|c| c.snapshot());
                if let Some(tx) = cs.tx.as_mut() {
                    self.savepoint_seq += 1;
                    let name = format!("{}_{}", target, self.savepoint_seq);
                    tx.sub_savepoint(&name).map_err(VmError::DbSystem)?;
                    entry.sql_save_name = Some(name);
                }
            }
        }
        self.recovery.push(entry);
        self.trace_line(format!("snapshot set {}", seq));
        Ok(seq)
    }

    /// Unwinds the stack down to `start_seq`.
    ///
    /// With `revert` every entry from the top down to `start_seq` is undone
    /// and popped. Without it the entries are kept, unless `start_seq` is
    /// the bottom entry, in which case the whole stack is committed.
    pub fn clear_recovery(&mut self, start_seq: i32, revert: bool) -> Result<(), VmError> {
        let mut idx = self.recovery.len();
        while idx > 0 {
            idx -= 1;
            if revert {
                self.revert_entry(idx)?;
            }
            if self.recovery[idx].seq == start_seq {
                if revert || idx == 0 {
                    self.recovery.truncate(idx);
                }
                return Ok(());
            }
        }
        Err(VmError::system(format!("internal error: recovery point {} not found", start_seq)))
    }

    fn revert_entry(&mut self, idx: usize) -> Result<(), VmError> {
        let entry = self.recovery[idx].clone();
        debug!(seq = entry.seq, "reverting recovery point");

        if !entry.amount.is_zero() {
            if let Some(cs) = entry.sender.and_then(|s| self.call_states.get_mut(&s)) {
                cs.account.add_balance(&entry.amount);
            }
            if let Some(cs) = entry.call_state.and_then(|c| self.call_states.get_mut(&c)) {
                cs.account
                    .sub_balance(&entry.amount)
                    .map_err(|e| VmError::system(e.to_string()))?;
            }
        }
        if entry.only_send {
            return Ok(());
        }
        if let Some(cs) = entry.sender.and_then(|s| self.call_states.get_mut(&s)) {
            cs.account.set_nonce(entry.sender_nonce);
        }
        if let Some(target) = entry.call_state {
            if let Some(cs) = self.call_states.get_mut(&target) {
                if let (Some(ctr), Some(rev)) = (cs.ctr_state.as_mut(), entry.state_revision) {
                    ctr.rollback(rev).map_err(|e| VmError::DbSystem(e.to_string()))?;
                }
                if entry.is_deploy {
                    cs.set_code(None);
                    if let Some(ctr) = cs.ctr_state.as_mut() {
                        ctr.set_source_code(None);
                    }
                    self.bs.remove_cache(&target);
                }
                if let Some(tx) = cs.tx.as_mut() {
                    match entry.sql_save_name.as_deref() {
                        Some(name) => tx.rollback_to_sub_savepoint(name).map_err(VmError::DbSystem)?,
                        None => {
                            tx.rollback_to_savepoint().map_err(VmError::DbSystem)?;
                            tx.close();
                            cs.tx = None;
                        }
                    }
                }
            }
        }
        self.trace_line(format!("recovery snapshot: {}", entry.seq));
        Ok(())
    }
}
