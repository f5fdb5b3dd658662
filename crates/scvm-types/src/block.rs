/// Integer label of a backward-incompatible consensus change.
pub type ForkVersion = i32;

/// Block header fields visible to contract execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInfo {
    /// Block number
    pub no: u64,
    /// Block timestamp in nanoseconds
    pub ts: i64,
    pub prev_block_hash: Vec<u8>,
    pub chain_id: Vec<u8>,
    pub fork_version: ForkVersion,
}

impl BlockInfo {
    pub fn new(no: u64, ts: i64, prev_block_hash: Vec<u8>, fork_version: ForkVersion) -> Self {
        Self {
            no,
            ts,
            prev_block_hash,
            chain_id: Vec::new(),
            fork_version,
        }
    }

    /// Timestamp in whole seconds.
    pub fn timestamp_secs(&self) -> i64 {
        self.ts / 1_000_000_000
    }
}

/// Header of a stored block, as returned by the chain accessor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockHeader {
    pub no: u64,
    pub hash: Vec<u8>,
    pub blocks_root_hash: Vec<u8>,
}
