use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use elastimem_core::cgroups::container_cgroup_path;
use elastimem_core::{
    compute_watermark, ActivityFilter, ContainerId, ElasticCache, ElasticPolicy, HostMemory,
    LimitKind, LimitSample, MemoryCgroupAccess, ProcessProbe, RebalanceError, Rebalancer,
    ScanStats,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Loop timing and layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Directory under the controller root holding one cgroup per container
    pub container_dir: PathBuf,

    /// Target time between cycle starts
    pub period: Duration,

    /// Run reclamation when this many cycles have passed
    pub reclaim_every: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            container_dir: PathBuf::from("docker"),
            period: Duration::from_secs(3),
            reclaim_every: 16,
        }
    }
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Daemon already running")]
    AlreadyRunning,

    #[error("Daemon not running")]
    NotRunning,

    #[error("Host memory probe failed: {0}")]
    HostProbe(#[source] elastimem_core::Error),

    #[error("Failed to spawn scan thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Scan thread panicked, daemon state unknown")]
    Join,
}

/// Sleeps out the remainder of a scan period
///
/// Cycles that overrun the period are followed immediately by the next one.
#[derive(Debug, Clone, Copy)]
pub struct CyclePacer {
    period: Duration,
}

impl CyclePacer {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.period.saturating_sub(elapsed)
    }

    /// Park until `period` has passed since `started` or `cancel` fires
    ///
    /// Returns false when cancelled.
    pub fn wait(&self, started: Instant, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let remaining = self.remaining(started.elapsed());
            if remaining.is_zero() {
                return true;
            }
            thread::park_timeout(remaining);
        }
    }
}

/// One elastic controller pass over the container directory, repeated
pub struct ScanLoop {
    settings: ScanSettings,
    filter: ActivityFilter,
    rebalancer: Rebalancer,
    cache: ElasticCache,
    access: Arc<dyn MemoryCgroupAccess>,
    probe: Arc<dyn ProcessProbe>,
    host: Arc<dyn HostMemory>,
    cycle: u32,
    stats: ScanStats,
}

impl ScanLoop {
    pub fn new(
        settings: ScanSettings,
        filter: ActivityFilter,
        rebalancer: Rebalancer,
        access: Arc<dyn MemoryCgroupAccess>,
        probe: Arc<dyn ProcessProbe>,
        host: Arc<dyn HostMemory>,
    ) -> Self {
        Self {
            settings,
            filter,
            rebalancer,
            cache: ElasticCache::new(),
            access,
            probe,
            host,
            cycle: 0,
            stats: ScanStats::new(),
        }
    }

    /// Build a loop whose host watermark is computed from the current
    /// physical memory size
    pub fn prepare(
        settings: ScanSettings,
        policy: ElasticPolicy,
        mount_tag: &str,
        access: Arc<dyn MemoryCgroupAccess>,
        probe: Arc<dyn ProcessProbe>,
        host: Arc<dyn HostMemory>,
    ) -> Result<Self, DaemonError> {
        let total = host.total_bytes().map_err(DaemonError::HostProbe)?;
        let physical = compute_watermark(total, policy.watermark_scale);
        info!(
            total,
            min = physical.min,
            low = physical.low,
            high = physical.high,
            "Host memory watermark computed"
        );

        Ok(Self::new(
            settings,
            ActivityFilter::new(mount_tag),
            Rebalancer::new(policy, physical),
            access,
            probe,
            host,
        ))
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn cache(&self) -> &ElasticCache {
        &self.cache
    }

    /// Scan until `cancel` fires, returning the final counters
    pub fn run(mut self, cancel: CancellationToken) -> ScanStats {
        let pacer = CyclePacer::new(self.settings.period);
        info!(
            dir = %self.settings.container_dir.display(),
            period = %humantime::format_duration(self.settings.period),
            mount_tag = self.filter.mount_tag(),
            "Scan loop started"
        );

        while !cancel.is_cancelled() {
            let started = Instant::now();
            self.run_cycle();
            if !pacer.wait(started, &cancel) {
                break;
            }
        }

        info!(
            cycles = self.stats.cycles,
            tracked = self.cache.len(),
            "Scan loop stopped"
        );
        self.stats
    }

    /// Visit every container once, then reclaim if the cadence is due
    pub fn run_cycle(&mut self) {
        let started = Instant::now();
        self.stats.cycles += 1;

        match self.access.list_children(&self.settings.container_dir) {
            Ok(entries) => {
                for entry in entries {
                    if entry.is_dir && ContainerId::matches_shape(&entry.name) {
                        self.stats.candidates += 1;
                        self.visit(entry.name);
                    }
                }
            }
            Err(e) => warn!(
                dir = %self.settings.container_dir.display(),
                "Failed to list containers: {}", e
            ),
        }

        self.cycle = (self.cycle + 1) % self.settings.reclaim_every.max(1);
        if self.cycle == 0 {
            let reclaimed = self.cache.reclaim_unused(self.access.as_ref());
            self.stats.reclaimed += reclaimed as u64;
        }

        self.stats.tracked = self.cache.len();
        self.stats.last_cycle_ms = started.elapsed().as_millis() as u64;
        debug!(
            cycle = self.stats.cycles,
            tracked = self.stats.tracked,
            elapsed_ms = self.stats.last_cycle_ms,
            "Scan cycle complete"
        );
    }

    fn visit(&mut self, name: String) {
        let cgroup = match container_cgroup_path(&self.settings.container_dir, &name) {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping container {}: {}", name, e);
                return;
            }
        };

        if !self
            .filter
            .is_active(&cgroup, self.access.as_ref(), self.probe.as_ref())
        {
            return;
        }
        self.stats.active += 1;

        let sample = match self.read_sample(&cgroup) {
            Ok(sample) => sample,
            Err(e) => {
                debug!(cgroup = %cgroup.display(), "Skipping container, read failed: {}", e);
                self.stats.read_failures += 1;
                return;
            }
        };

        let id = ContainerId::new(name);
        match self.rebalancer.rebalance(
            &mut self.cache,
            self.access.as_ref(),
            self.host.as_ref(),
            &id,
            &cgroup,
            &sample,
        ) {
            Ok(adjustment) => self.stats.record_adjustment(&adjustment),
            Err(e @ RebalanceError::Write { .. }) => {
                warn!(container = %id, "{}", e);
                self.stats.write_failures += 1;
            }
            Err(e @ RebalanceError::HostProbe(_)) => {
                warn!(container = %id, "{}", e);
            }
        }
    }

    fn read_sample(&self, cgroup: &Path) -> elastimem_core::cgroups::Result<LimitSample> {
        Ok(LimitSample {
            usage: self.access.read_usage(cgroup)?,
            hard_limit: self.access.read_limit(cgroup, LimitKind::Hard)?,
            soft_limit: self.access.read_limit(cgroup, LimitKind::Soft)?,
            swap_limit: self.access.read_limit(cgroup, LimitKind::Swap).ok(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    Running,
    Stopping,
    Stopped,
    /// The scan thread could not be joined cleanly
    Unknown,
}

/// Owns the scan thread and its stop flag
pub struct ElasticDaemon {
    settings: ScanSettings,
    policy: ElasticPolicy,
    access: Arc<dyn MemoryCgroupAccess>,
    probe: Arc<dyn ProcessProbe>,
    host: Arc<dyn HostMemory>,
    state: DaemonState,
    cancel: CancellationToken,
    handle: Option<JoinHandle<ScanStats>>,
}

impl ElasticDaemon {
    pub fn new(
        settings: ScanSettings,
        policy: ElasticPolicy,
        access: Arc<dyn MemoryCgroupAccess>,
        probe: Arc<dyn ProcessProbe>,
        host: Arc<dyn HostMemory>,
    ) -> Self {
        Self {
            settings,
            policy,
            access,
            probe,
            host,
            state: DaemonState::Idle,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Compute the host watermark and launch the scan thread
    pub fn start(&mut self, mount_tag: &str) -> Result<(), DaemonError> {
        if self.handle.is_some() {
            return Err(DaemonError::AlreadyRunning);
        }

        let scan = ScanLoop::prepare(
            self.settings.clone(),
            self.policy,
            mount_tag,
            Arc::clone(&self.access),
            Arc::clone(&self.probe),
            Arc::clone(&self.host),
        )?;

        self.cancel = CancellationToken::new();
        let token = self.cancel.clone();
        let handle = thread::Builder::new()
            .name("elastimem-scan".to_string())
            .spawn(move || scan.run(token))
            .map_err(DaemonError::Spawn)?;

        self.handle = Some(handle);
        self.state = DaemonState::Running;
        info!("Elastic daemon started");
        Ok(())
    }

    /// Signal the scan thread and wait for it to finish its current cycle
    pub fn stop(&mut self) -> Result<ScanStats, DaemonError> {
        let handle = self.handle.take().ok_or(DaemonError::NotRunning)?;

        self.state = DaemonState::Stopping;
        self.cancel.cancel();
        handle.thread().unpark();

        match handle.join() {
            Ok(stats) => {
                self.state = DaemonState::Stopped;
                info!(cycles = stats.cycles, "Elastic daemon stopped");
                Ok(stats)
            }
            Err(_) => {
                self.state = DaemonState::Unknown;
                error!("Scan thread panicked");
                Err(DaemonError::Join)
            }
        }
    }
}

impl Drop for ElasticDaemon {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}
