//! elastimem Daemon
//!
//! Periodically rebalances the memory limits of active containers.

pub mod config;
pub mod scan;

pub use config::Config;
pub use scan::{CyclePacer, DaemonError, DaemonState, ElasticDaemon, ScanLoop, ScanSettings};
