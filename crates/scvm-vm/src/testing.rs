//! Collaborators for unit tests.

use crate::backend::{NoSystemContract, StaticChain, StaticNames};
use crate::error::VmError;
use crate::pool::{VmInstance, WorkerSource};
use crate::settings::{Services, VmSettings};
use scvm_types::ForkVersion;

/// Worker source that never has a worker.
pub(crate) struct NoWorkers;

impl WorkerSource for NoWorkers {
    fn acquire(&self, _fork: ForkVersion) -> Result<VmInstance, VmError> {
        Err(VmError::VmStart("no workers in tests".into()))
    }

    fn release(&self, _instance: VmInstance) {}
}

pub(crate) struct TestServices {
    pub workers: NoWorkers,
    pub chain: StaticChain,
    pub names: StaticNames,
    pub system: NoSystemContract,
    pub settings: VmSettings,
}

impl TestServices {
    pub fn new() -> Self {
        Self {
            workers: NoWorkers,
            chain: StaticChain::default(),
            names: StaticNames::new(),
            system: NoSystemContract,
            settings: VmSettings::default(),
        }
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            workers: &self.workers,
            chain: &self.chain,
            names: &self.names,
            system: &self.system,
            sql: None,
            settings: &self.settings,
        }
    }
}
