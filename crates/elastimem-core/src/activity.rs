//! Activity filter
//!
//! A container cgroup is "active" when at least one of its tasks is alive
//! and has this filesystem instance in its mount table. Only active
//! containers get elastic limits.

use std::path::Path;

use tracing::{debug, trace};

use crate::cgroups::MemoryCgroupAccess;
use crate::process::ProcessProbe;

/// Scopes elastic behaviour to containers that mount `mount_tag`
#[derive(Debug, Clone)]
pub struct ActivityFilter {
    mount_tag: String,
}

impl ActivityFilter {
    pub fn new(mount_tag: impl Into<String>) -> Self {
        Self {
            mount_tag: mount_tag.into(),
        }
    }

    pub fn mount_tag(&self) -> &str {
        &self.mount_tag
    }

    /// Returns true on the first task that is alive and mounts this instance
    ///
    /// An unreadable task list means "not active" rather than an error; the
    /// caller skips the cgroup for this cycle.
    pub fn is_active(
        &self,
        cgroup: &Path,
        access: &dyn MemoryCgroupAccess,
        probe: &dyn ProcessProbe,
    ) -> bool {
        let pids = match access.list_task_pids(cgroup) {
            Ok(pids) => pids,
            Err(e) => {
                debug!(cgroup = %cgroup.display(), error = %e, "Task list unreadable");
                return false;
            }
        };

        pids.into_iter()
            .any(|pid| self.mounts_instance(pid, probe) && probe.is_alive(pid))
    }

    fn mounts_instance(&self, pid: u32, probe: &dyn ProcessProbe) -> bool {
        match probe.mount_table(pid) {
            Ok(lines) => lines.iter().any(|line| line.contains(&self.mount_tag)),
            Err(e) => {
                trace!(pid, error = %e, "Mount table unreadable");
                false
            }
        }
    }
}
