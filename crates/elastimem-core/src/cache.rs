//! Elastic state cache
//!
//! One entry per active container, owned by the scan loop. Entries are
//! created on first sighting, mutated by the rebalancer and dropped by the
//! reclamation pass once the container's task list disappears.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cgroups::MemoryCgroupAccess;

/// Stable container identity: the full cgroup directory name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Length of a docker-style container id
    pub const LEN: usize = 64;

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Whether a cgroup directory name has the container-id shape
    pub fn matches_shape(name: &str) -> bool {
        name.len() == Self::LEN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, as `docker ps` shows them
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// Elastic limits of one container
///
/// Holds `orig_limit <= soft_limit <= hard_limit` after every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Memory-controller directory, relative to the controller root
    pub cgroup_path: PathBuf,

    /// Limit first observed; shrinking never goes below it
    pub orig_limit: u64,

    /// Currently applied elastic limit
    pub soft_limit: u64,

    /// Ceiling for elastic growth
    pub hard_limit: u64,

    /// Growth back-off exponent
    pub adjustment_step: u32,
}

impl ContainerState {
    pub fn new(cgroup_path: PathBuf, orig_limit: u64, soft_limit: u64, hard_limit: u64) -> Self {
        Self {
            cgroup_path,
            orig_limit,
            soft_limit,
            hard_limit,
            adjustment_step: 0,
        }
    }

    pub fn within_bounds(&self) -> bool {
        self.orig_limit <= self.soft_limit && self.soft_limit <= self.hard_limit
    }
}

/// Container id -> elastic state
#[derive(Debug, Default)]
pub struct ElasticCache {
    entries: HashMap<ContainerId, ContainerState>,
}

impl ElasticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, id: &ContainerId) -> Option<&ContainerState> {
        self.entries.get(id)
    }

    pub fn lookup_mut(&mut self, id: &ContainerId) -> Option<&mut ContainerState> {
        self.entries.get_mut(id)
    }

    pub fn insert(&mut self, id: ContainerId, state: ContainerState) {
        debug!(container = %id, cgroup = %state.cgroup_path.display(), "Tracking container");
        self.entries.insert(id, state);
    }

    pub fn remove(&mut self, id: &ContainerId) -> Option<ContainerState> {
        self.entries.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContainerId, &ContainerState)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose cgroup task list can no longer be opened
    ///
    /// Returns the number of entries removed.
    pub fn reclaim_unused(&mut self, access: &dyn MemoryCgroupAccess) -> usize {
        let before = self.entries.len();

        self.entries.retain(|id, state| {
            let keep = access.tasks_reachable(&state.cgroup_path);
            if !keep {
                info!(container = %id, cgroup = %state.cgroup_path.display(), "Container gone, dropping elastic state");
            }
            keep
        });

        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroups::{CgroupEntry, CgroupError, LimitKind, Result};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    const MIB: u64 = 1024 * 1024;

    #[derive(Default)]
    struct Reachable(Mutex<HashSet<PathBuf>>);

    impl Reachable {
        fn add(&self, path: &str) {
            self.0.lock().unwrap().insert(PathBuf::from(path));
        }
        fn drop_path(&self, path: &str) {
            self.0.lock().unwrap().remove(Path::new(path));
        }
    }

    impl MemoryCgroupAccess for Reachable {
        fn read_limit(&self, _: &Path, _: LimitKind) -> Result<u64> {
            unimplemented!()
        }
        fn read_usage(&self, _: &Path) -> Result<u64> {
            unimplemented!()
        }
        fn write_limit(&self, _: &Path, _: LimitKind, _: u64) -> Result<()> {
            unimplemented!()
        }
        fn list_task_pids(&self, cgroup: &Path) -> Result<Vec<u32>> {
            if self.0.lock().unwrap().contains(cgroup) {
                Ok(vec![1])
            } else {
                Err(CgroupError::NotFound(cgroup.display().to_string()))
            }
        }
        fn list_children(&self, _: &Path) -> Result<Vec<CgroupEntry>> {
            unimplemented!()
        }
    }

    fn id(c: char) -> ContainerId {
        ContainerId::new(c.to_string().repeat(64))
    }

    fn state(path: &str) -> ContainerState {
        ContainerState::new(PathBuf::from(path), 100 * MIB, 100 * MIB, 400 * MIB)
    }

    #[test]
    fn test_container_id_shape() {
        assert!(ContainerId::matches_shape(&"f".repeat(64)));
        assert!(!ContainerId::matches_shape(&"f".repeat(63)));
        assert!(!ContainerId::matches_shape("user.slice"));
    }

    #[test]
    fn test_container_id_display_is_short() {
        let id = ContainerId::new(format!("0123456789ab{}", "c".repeat(52)));
        assert_eq!(id.to_string(), "0123456789ab");
        assert_eq!(id.as_str().len(), 64);
        assert_eq!(ContainerId::new("abc").short(), "abc");
    }

    #[test]
    fn test_ids_do_not_collide_on_shared_prefix() {
        let a = ContainerId::new(format!("{}{}", "1".repeat(16), "a".repeat(48)));
        let b = ContainerId::new(format!("{}{}", "1".repeat(16), "b".repeat(48)));
        let mut cache = ElasticCache::new();
        cache.insert(a.clone(), state("docker/a"));
        cache.insert(b.clone(), state("docker/b"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(&a).unwrap().cgroup_path, PathBuf::from("docker/a"));
        assert_eq!(cache.lookup(&b).unwrap().cgroup_path, PathBuf::from("docker/b"));
    }

    #[test]
    fn test_insert_lookup_remove() {
        let mut cache = ElasticCache::new();
        assert!(cache.is_empty());

        cache.insert(id('a'), state("docker/a"));
        assert!(cache.lookup(&id('a')).is_some());
        assert!(cache.lookup(&id('b')).is_none());

        cache.lookup_mut(&id('a')).unwrap().soft_limit = 120 * MIB;
        assert_eq!(cache.lookup(&id('a')).unwrap().soft_limit, 120 * MIB);

        let removed = cache.remove(&id('a')).unwrap();
        assert_eq!(removed.soft_limit, 120 * MIB);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_state_bounds() {
        let mut s = state("docker/a");
        assert!(s.within_bounds());
        s.soft_limit = 50 * MIB;
        assert!(!s.within_bounds());
        s.soft_limit = 500 * MIB;
        assert!(!s.within_bounds());
    }

    #[test]
    fn test_reclaim_drops_unreachable_only() {
        let access = Reachable::default();
        access.add("docker/a");
        access.add("docker/b");

        let mut cache = ElasticCache::new();
        cache.insert(id('a'), state("docker/a"));
        cache.insert(id('b'), state("docker/b"));

        assert_eq!(cache.reclaim_unused(&access), 0);
        assert_eq!(cache.len(), 2);

        access.drop_path("docker/b");
        assert_eq!(cache.reclaim_unused(&access), 1);
        assert!(cache.lookup(&id('a')).is_some());
        assert!(cache.lookup(&id('b')).is_none());
    }
}
