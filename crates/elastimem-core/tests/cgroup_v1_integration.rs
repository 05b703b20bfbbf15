// Integration tests for the elastic controller over a mock cgroup v1 tree
// Real-hierarchy tests are ignored by default (need a mounted memory controller)

use std::fs;
use std::path::{Path, PathBuf};

use elastimem_core::cgroups::{find_controller_root, LimitKind};
use elastimem_core::{
    Adjustment, CgroupV1Memory, ContainerId, ElasticCache, ElasticPolicy, HostMemory,
    LimitSample, MemoryCgroupAccess, RebalanceError, Rebalancer, WaterMark,
};
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

struct PlentyOfMemory;

impl HostMemory for PlentyOfMemory {
    fn total_bytes(&self) -> elastimem_core::Result<u64> {
        Ok(16 * GIB)
    }
    fn free_bytes(&self) -> elastimem_core::Result<u64> {
        Ok(8 * GIB)
    }
}

fn container_id() -> String {
    "3f4c".repeat(16)
}

fn create_container(root: &Path, id: &str, limit: u64, usage: u64) -> PathBuf {
    let dir = root.join("docker").join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("memory.limit_in_bytes"), format!("{}\n", limit)).unwrap();
    fs::write(dir.join("memory.soft_limit_in_bytes"), format!("{}\n", limit)).unwrap();
    fs::write(dir.join("memory.usage_in_bytes"), format!("{}\n", usage)).unwrap();
    fs::write(dir.join("tasks"), "4242\n").unwrap();
    dir
}

fn read_sample(memory: &CgroupV1Memory, cg: &Path) -> LimitSample {
    LimitSample {
        usage: memory.read_usage(cg).unwrap(),
        hard_limit: memory.read_limit(cg, LimitKind::Hard).unwrap(),
        soft_limit: memory.read_limit(cg, LimitKind::Soft).unwrap(),
        swap_limit: memory.read_limit(cg, LimitKind::Swap).ok(),
    }
}

fn rebalancer() -> Rebalancer {
    Rebalancer::new(ElasticPolicy::default(), WaterMark::for_capacity(16 * GIB))
}

#[test]
fn test_first_sighting_writes_ceiling_and_soft_limit() {
    let tmp = TempDir::new().unwrap();
    let id = container_id();
    let dir = create_container(tmp.path(), &id, 100 * MIB, 40 * MIB);
    let memory = CgroupV1Memory::new(tmp.path());
    let cg = PathBuf::from("docker").join(&id);
    let mut cache = ElasticCache::new();

    let sample = read_sample(&memory, &cg);
    let adj = rebalancer()
        .rebalance(
            &mut cache,
            &memory,
            &PlentyOfMemory,
            &ContainerId::new(id.clone()),
            &cg,
            &sample,
        )
        .unwrap();

    assert_eq!(
        adj,
        Adjustment::Created {
            soft_limit: 100 * MIB,
            hard_limit: 400 * MIB
        }
    );
    assert_eq!(
        fs::read_to_string(dir.join("memory.limit_in_bytes")).unwrap(),
        (400 * MIB).to_string()
    );
    assert_eq!(
        fs::read_to_string(dir.join("memory.soft_limit_in_bytes")).unwrap(),
        (100 * MIB).to_string()
    );
}

#[test]
fn test_grow_is_written_to_soft_limit_file() {
    let tmp = TempDir::new().unwrap();
    let id = container_id();
    let dir = create_container(tmp.path(), &id, 100 * MIB, 95 * MIB);
    let memory = CgroupV1Memory::new(tmp.path());
    let cg = PathBuf::from("docker").join(&id);
    let key = ContainerId::new(id.clone());
    let rb = rebalancer();
    let mut cache = ElasticCache::new();

    let first = read_sample(&memory, &cg);
    rb.rebalance(&mut cache, &memory, &PlentyOfMemory, &key, &cg, &first)
        .unwrap();

    let second = read_sample(&memory, &cg);
    let adj = rb
        .rebalance(&mut cache, &memory, &PlentyOfMemory, &key, &cg, &second)
        .unwrap();

    let Adjustment::Grown { from, to } = adj else {
        panic!("expected growth, got {:?}", adj);
    };
    assert_eq!(from, 100 * MIB);
    assert!(to > from);
    assert_eq!((to - from) % 8192, 0);
    assert_eq!(
        fs::read_to_string(dir.join("memory.soft_limit_in_bytes")).unwrap(),
        to.to_string()
    );
}

#[test]
fn test_rejected_write_keeps_cached_limit() {
    let tmp = TempDir::new().unwrap();
    let id = container_id();
    let dir = create_container(tmp.path(), &id, 100 * MIB, 95 * MIB);
    let memory = CgroupV1Memory::new(tmp.path());
    let cg = PathBuf::from("docker").join(&id);
    let key = ContainerId::new(id.clone());
    let rb = rebalancer();
    let mut cache = ElasticCache::new();

    let first = read_sample(&memory, &cg);
    rb.rebalance(&mut cache, &memory, &PlentyOfMemory, &key, &cg, &first)
        .unwrap();

    // A directory in place of the control file makes every write fail
    let soft_file = dir.join("memory.soft_limit_in_bytes");
    fs::remove_file(&soft_file).unwrap();
    fs::create_dir(&soft_file).unwrap();

    let sample = LimitSample {
        usage: 95 * MIB,
        hard_limit: 400 * MIB,
        soft_limit: 100 * MIB,
        swap_limit: None,
    };
    for _ in 0..2 {
        let err = rb
            .rebalance(&mut cache, &memory, &PlentyOfMemory, &key, &cg, &sample)
            .unwrap_err();
        assert!(matches!(err, RebalanceError::Write { value, .. } if value == 175 * MIB));
        assert_eq!(cache.lookup(&key).unwrap().soft_limit, 100 * MIB);
    }
}

#[test]
fn test_reclaim_after_container_removed() {
    let tmp = TempDir::new().unwrap();
    let id = container_id();
    let dir = create_container(tmp.path(), &id, 100 * MIB, 40 * MIB);
    let memory = CgroupV1Memory::new(tmp.path());
    let cg = PathBuf::from("docker").join(&id);
    let key = ContainerId::new(id.clone());
    let mut cache = ElasticCache::new();

    let sample = read_sample(&memory, &cg);
    rebalancer()
        .rebalance(&mut cache, &memory, &PlentyOfMemory, &key, &cg, &sample)
        .unwrap();

    assert_eq!(cache.reclaim_unused(&memory), 0);
    fs::remove_dir_all(dir).unwrap();
    assert_eq!(cache.reclaim_unused(&memory), 1);
    assert!(cache.lookup(&key).is_none());
}

#[test]
#[ignore] // Requires a mounted cgroup v1 memory controller
fn test_discover_real_memory_controller() {
    match find_controller_root("memory") {
        Ok(root) => {
            println!("memory controller mounted at {:?}", root);
            let memory = CgroupV1Memory::new(&root);
            let children = memory.list_children(Path::new("")).unwrap();
            println!("{} entries under the controller root", children.len());
        }
        Err(e) => println!("memory controller not mounted: {}", e),
    }
}
