use crate::error::{Error, Result};
use procfs::{Current, Meminfo};

/// Host-wide memory figures the controller arbitrates against
pub trait HostMemory: Send + Sync {
    /// Total physical memory in bytes
    fn total_bytes(&self) -> Result<u64>;

    /// Currently free physical memory in bytes
    fn free_bytes(&self) -> Result<u64>;
}

/// Host memory read from `/proc/meminfo`
///
/// ```text
/// MemTotal:       16318412 kB
/// MemFree:         1203416 kB
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcMeminfo;

impl ProcMeminfo {
    pub fn new() -> Self {
        Self
    }

    fn read() -> Result<Meminfo> {
        Meminfo::current()
            .map_err(|e| Error::HostMemory(format!("Failed to read /proc/meminfo: {}", e)))
    }
}

impl HostMemory for ProcMeminfo {
    fn total_bytes(&self) -> Result<u64> {
        let total = Self::read()?.mem_total;
        if total == 0 {
            return Err(Error::HostMemory("MemTotal reported as zero".to_string()));
        }
        Ok(total)
    }

    fn free_bytes(&self) -> Result<u64> {
        Ok(Self::read()?.mem_free)
    }
}
