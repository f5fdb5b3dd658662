//! SCVM - Contract execution on out-of-process VM workers.
//!
//! This crate runs compiled contract code for a block producer:
//! - A pool of worker processes reached over abstract Unix sockets
//! - The framed message protocol spoken with each worker
//! - Per-transaction execution context with a savepoint recovery stack
//! - Host commands serviced while a worker runs (state, balances,
//!   nested calls, deploys, events, crypto, governance, SQL)
//! - Transaction-level execution producing fees, events and receipts

pub mod backend;
pub mod call_state;
pub mod context;
pub mod entry;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod internal_ops;
pub mod pool;
pub mod recovery;
pub mod settings;
pub mod slots;
pub mod trace;
pub mod tx;
pub mod wire;

#[cfg(test)]
mod testing;

pub use backend::{
    AccountProof, ChainAccessor, NameResolver, NoSystemContract, SqlEngine, SqlTx, StaticChain, StaticNames,
    SystemContract, VarProof,
};
pub use context::{max_call_depth, max_event_count, RootStates, TxEnv, VmContext};
pub use entry::{call, check_fee_delegation, compile, create, query, CallOutput, DelegationRequest};
pub use error::VmError;
pub use executor::{ExecKind, Executor, GAS_PREFIX_LEN};
pub use pool::{
    find_vm_executable, start_vm_pool, vm_pool, LaunchRequest, Launcher, PoolConfig, ProcessLauncher, VmInstance,
    VmPool, WorkerSource,
};
pub use settings::{Services, VmSettings, DEFAULT_TIMEOUT};
pub use slots::{alloc_query_slot, init_context, BLOCK_FACTORY, CHAIN_SERVICE};
pub use tx::{check_execution, execute, ExecParams, Execution};
pub use wire::WireError;
