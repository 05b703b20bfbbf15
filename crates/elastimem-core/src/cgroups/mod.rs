//! Cgroup v1 memory controller integration
//!
//! The elastic controller only needs a narrow view of the memory controller:
//! read the limit and usage files, write limit files, list the tasks of a
//! cgroup and enumerate container directories. [`MemoryCgroupAccess`] is that
//! view; [`CgroupV1Memory`] implements it on top of the mounted hierarchy.

pub mod controller;
pub mod error;
mod utils;

pub use controller::{
    container_cgroup_path, find_controller_root, CgroupEntry, CgroupV1Memory, LimitKind,
    MemoryCgroupAccess, MAX_CGROUP_PATH,
};
pub use error::{CgroupError, Result};
pub use utils::UNLIMITED_THRESHOLD;
