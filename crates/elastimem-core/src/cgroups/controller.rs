//! Memory controller access for cgroup v1 hierarchies

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{CgroupError, Result};
use super::utils::{
    find_controller_mount, parse_bytes, parse_pids, read_cgroup_file, write_cgroup_file,
};

/// Longest cgroup path (relative to the controller root) the scanner will compose
pub const MAX_CGROUP_PATH: usize = 512;

/// Which limit file of the memory controller to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    /// `memory.limit_in_bytes`
    Hard,
    /// `memory.soft_limit_in_bytes`
    Soft,
    /// `memory.memsw.limit_in_bytes` (memory + swap)
    Swap,
}

impl LimitKind {
    pub fn file_name(self) -> &'static str {
        match self {
            LimitKind::Hard => "memory.limit_in_bytes",
            LimitKind::Soft => "memory.soft_limit_in_bytes",
            LimitKind::Swap => "memory.memsw.limit_in_bytes",
        }
    }
}

/// One entry of a controller directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Everything the elastic controller needs from the memory controller
///
/// Cgroup paths are relative to the controller root (e.g. `docker/<id>`).
pub trait MemoryCgroupAccess: Send + Sync {
    fn read_limit(&self, cgroup: &Path, kind: LimitKind) -> Result<u64>;

    fn read_usage(&self, cgroup: &Path) -> Result<u64>;

    fn write_limit(&self, cgroup: &Path, kind: LimitKind, value: u64) -> Result<()>;

    fn list_task_pids(&self, cgroup: &Path) -> Result<Vec<u32>>;

    fn list_children(&self, dir: &Path) -> Result<Vec<CgroupEntry>>;

    /// Whether the task list of `cgroup` can still be opened
    fn tasks_reachable(&self, cgroup: &Path) -> bool {
        self.list_task_pids(cgroup).is_ok()
    }
}

/// Compose `<dir>/<name>` and reject paths longer than [`MAX_CGROUP_PATH`]
pub fn container_cgroup_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let len = path.as_os_str().len();
    if len >= MAX_CGROUP_PATH {
        return Err(CgroupError::PathTooLong {
            path: path.display().to_string(),
            len,
            max: MAX_CGROUP_PATH,
        });
    }
    Ok(path)
}

/// Filesystem-backed memory controller (cgroup v1 layout)
#[derive(Debug, Clone)]
pub struct CgroupV1Memory {
    root: PathBuf,
}

impl CgroupV1Memory {
    /// Use an explicit controller root, e.g. `/sys/fs/cgroup/memory`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the mounted memory controller via `/proc/self/mounts`
    pub fn discover() -> Result<Self> {
        find_controller_root("memory").map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, cgroup: &Path) -> PathBuf {
        // Joining an absolute path would replace the root.
        let relative = cgroup.strip_prefix("/").unwrap_or(cgroup);
        self.root.join(relative)
    }
}

impl MemoryCgroupAccess for CgroupV1Memory {
    fn read_limit(&self, cgroup: &Path, kind: LimitKind) -> Result<u64> {
        let content = read_cgroup_file(&self.resolve(cgroup).join(kind.file_name()))?;
        parse_bytes(&content)
    }

    fn read_usage(&self, cgroup: &Path) -> Result<u64> {
        let content = read_cgroup_file(&self.resolve(cgroup).join("memory.usage_in_bytes"))?;
        parse_bytes(&content)
    }

    fn write_limit(&self, cgroup: &Path, kind: LimitKind, value: u64) -> Result<()> {
        let file = self.resolve(cgroup).join(kind.file_name());
        write_cgroup_file(&file, &value.to_string())
    }

    fn list_task_pids(&self, cgroup: &Path) -> Result<Vec<u32>> {
        let content = read_cgroup_file(&self.resolve(cgroup).join("tasks"))?;
        Ok(parse_pids(&content))
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<CgroupEntry>> {
        let path = self.resolve(dir);
        let entries = fs::read_dir(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CgroupError::NotFound(format!("{:?}", path))
            } else {
                CgroupError::Io(e)
            }
        })?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry?;
            // Non UTF-8 names can never be container ids.
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            children.push(CgroupEntry { name, is_dir });
        }

        Ok(children)
    }
}

/// Mount point of a cgroup v1 controller, from `/proc/self/mounts`
pub fn find_controller_root(controller: &str) -> Result<PathBuf> {
    let mounts = fs::read_to_string("/proc/self/mounts")?;
    find_controller_mount(&mounts, controller)
        .ok_or_else(|| CgroupError::ControllerNotMounted(controller.to_string()))
}
