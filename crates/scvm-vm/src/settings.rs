use crate::backend::{ChainAccessor, NameResolver, SqlEngine, SystemContract};
use crate::pool::WorkerSource;
use std::time::Duration;

/// Default execution deadline of the outermost call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

/// Node-wide execution settings.
#[derive(Debug, Clone)]
pub struct VmSettings {
    /// Public network; enables gas accounting from fork 2
    pub pub_net: bool,
    /// Block whose transactions are written to a trace file (0 disables)
    pub trace_block_no: u64,
    pub timeout: Duration,
    /// Record internal operations of each transaction
    pub internal_ops: bool,
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            pub_net: false,
            trace_block_no: 0,
            timeout: DEFAULT_TIMEOUT,
            internal_ops: false,
        }
    }
}

/// Handles to everything an execution reaches outside the block state.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub workers: &'a dyn WorkerSource,
    pub chain: &'a dyn ChainAccessor,
    pub names: &'a dyn NameResolver,
    pub system: &'a dyn SystemContract,
    pub sql: Option<&'a dyn SqlEngine>,
    pub settings: &'a VmSettings,
}
