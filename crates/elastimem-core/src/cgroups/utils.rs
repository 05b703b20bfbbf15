//! Utility functions for cgroup operations

use std::fs;
use std::path::{Path, PathBuf};

use super::error::{CgroupError, Result};

/// Values at or above this are treated as "no limit" (v1 reports
/// `PAGE_COUNTER_MAX * PAGE_SIZE`, roughly 2^63).
pub const UNLIMITED_THRESHOLD: u64 = 1 << 62;

/// Parse a single-value cgroup file such as `memory.limit_in_bytes`
///
/// Accepts a decimal byte count or the literal `max` (unlimited).
pub fn parse_bytes(content: &str) -> Result<u64> {
    let value = content.trim();
    if value == "max" {
        return Ok(u64::MAX);
    }

    value
        .parse::<u64>()
        .map_err(|_| CgroupError::ParseError(format!("Invalid byte value: {:?}", value)))
}

/// Parse a `tasks` / `cgroup.procs` listing, skipping malformed lines
pub fn parse_pids(content: &str) -> Vec<u32> {
    content
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Find the mount point of a cgroup v1 controller in a mounts table
///
/// Format (one line per mount):
/// ```text
/// cgroup /sys/fs/cgroup/memory cgroup rw,nosuid,nodev,noexec,relatime,memory 0 0
/// ```
pub fn find_controller_mount(mounts: &str, controller: &str) -> Option<PathBuf> {
    mounts.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let _source = fields.next()?;
        let mount_point = fields.next()?;
        let fs_type = fields.next()?;
        let options = fields.next()?;

        if fs_type == "cgroup" && options.split(',').any(|opt| opt == controller) {
            Some(PathBuf::from(mount_point))
        } else {
            None
        }
    })
}

/// Safe read file to string
pub fn read_cgroup_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CgroupError::NotFound(format!("{:?}", path))
        } else if e.kind() == std::io::ErrorKind::PermissionDenied {
            CgroupError::PermissionDenied(format!("{:?}", path))
        } else {
            CgroupError::Io(e)
        }
    })
}

/// Safe write file
pub fn write_cgroup_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            CgroupError::PermissionDenied(format!("{:?}", path))
        } else {
            CgroupError::Io(e)
        }
    })
}
