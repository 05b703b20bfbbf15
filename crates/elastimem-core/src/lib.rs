//! elastimem core library
//!
//! Elastic memory limits for container cgroups: watermark model, activity
//! filter, per-container elastic state and the grow/shrink rebalancer.

pub mod activity;
pub mod cache;
pub mod cgroups;
pub mod cpuset;
pub mod error;
pub mod host;
pub mod process;
pub mod rebalance;
pub mod types;
pub mod watermark;

pub use activity::ActivityFilter;
pub use cache::{ContainerId, ContainerState, ElasticCache};
pub use cgroups::{CgroupV1Memory, LimitKind, MemoryCgroupAccess};
pub use error::{Error, Result};
pub use host::{HostMemory, ProcMeminfo};
pub use process::{ProcFs, ProcessProbe};
pub use rebalance::{
    Adjustment, Decision, ElasticPolicy, LimitSample, RebalanceError, Rebalancer, MIN_MEM,
};
pub use types::ScanStats;
pub use watermark::{compute_watermark, WaterMark};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
