use serde::{Deserialize, Serialize};

use crate::rebalance::Adjustment;

/// Scan loop counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub cycles: u64,
    /// Directories with the container-id shape
    pub candidates: u64,
    pub active: u64,
    pub created: u64,
    pub grown: u64,
    pub shrunk: u64,
    pub host_resets: u64,
    pub vetoed: u64,
    pub write_failures: u64,
    pub read_failures: u64,
    pub reclaimed: u64,
    /// Containers currently holding elastic state
    pub tracked: usize,
    pub last_cycle_ms: u64,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_adjustment(&mut self, adjustment: &Adjustment) {
        match adjustment {
            Adjustment::Created { .. } => self.created += 1,
            Adjustment::Grown { .. } => self.grown += 1,
            Adjustment::Shrunk { .. } => self.shrunk += 1,
            Adjustment::HostReset { .. } => self.host_resets += 1,
            Adjustment::Vetoed { .. } => self.vetoed += 1,
            Adjustment::Unchanged | Adjustment::Untracked => {}
        }
    }

    /// Limit changes written after the first sighting
    pub fn total_adjustments(&self) -> u64 {
        self.grown + self.shrunk + self.host_resets
    }
}
