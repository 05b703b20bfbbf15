//! Grow/shrink decisions for a single container
//!
//! Algorithm per cycle:
//! 1. Host free memory at or below the host `low` watermark forces the
//!    container back to its original limit.
//! 2. Otherwise the container's own headroom (`soft_limit - usage`) is
//!    compared against a watermark band derived from its ceiling.
//! 3. Below `low`: grow by a fraction of the remaining headroom to the
//!    ceiling, unless that would push host free memory under the host `min`.
//! 4. Above `high` (and above the original limit): shrink, never below the
//!    original limit.
//!
//! All deltas are rounded down to the controller's alignment; deltas under
//! `min_adjust` are dropped.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{ContainerId, ContainerState, ElasticCache};
use crate::cgroups::{CgroupError, LimitKind, MemoryCgroupAccess, UNLIMITED_THRESHOLD};
use crate::host::HostMemory;
use crate::watermark::{compute_watermark, WaterMark, DEFAULT_WATERMARK_SCALE};

/// Granularity the memory controller accepts for limit changes
pub const DEFAULT_ALIGNMENT: u64 = 8 * 1024;

/// Smallest adjustment worth writing
pub const MIN_MEM: u64 = 8 * 1024;

/// Tunables of the elastic algorithm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticPolicy {
    /// Deltas are rounded down to a multiple of this (bytes)
    pub alignment: u64,

    /// Deltas below this are treated as zero (bytes)
    pub min_adjust: u64,

    /// Share of the headroom to the ceiling added per grow
    pub grow_fraction: f64,

    /// Share of `ceiling - usage` removed per shrink
    pub shrink_fraction: f64,

    /// Initial ceiling as a multiple of the first observed limit
    pub ceiling_multiplier: u64,

    /// Scale factor of the watermark model
    pub watermark_scale: u64,

    /// Upper bound for the growth back-off exponent
    pub max_growth_step: u32,
}

impl Default for ElasticPolicy {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            min_adjust: MIN_MEM,
            grow_fraction: 0.25,
            shrink_fraction: 0.25,
            ceiling_multiplier: 4,
            watermark_scale: DEFAULT_WATERMARK_SCALE,
            max_growth_step: 4,
        }
    }
}

impl ElasticPolicy {
    pub fn align_down(&self, bytes: u64) -> u64 {
        if self.alignment == 0 {
            return bytes;
        }
        bytes / self.alignment * self.alignment
    }

    /// Fraction of `bytes`, truncated and aligned
    fn aligned_fraction(&self, bytes: u64, fraction: f64) -> u64 {
        self.align_down((bytes as f64 * fraction) as u64)
    }

    fn growth_fraction(&self, step: u32) -> f64 {
        let step = step.min(self.max_growth_step).min(62);
        self.grow_fraction / (1u64 << step) as f64
    }
}

/// Limits and usage observed for one container this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSample {
    pub usage: u64,
    pub hard_limit: u64,
    pub soft_limit: u64,
    /// Memory + swap limit, when the controller exposes it
    pub swap_limit: Option<u64>,
}

/// What the algorithm wants to do with a tracked container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    Grow { to: u64, delta: u64 },
    Shrink { to: u64, delta: u64 },
    /// Host is short on memory; fall back to the original limit
    HostReset { to: u64 },
    /// Growth wanted but the host cannot afford it this cycle
    Vetoed { delta: u64 },
}

/// What a rebalance call actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Created { soft_limit: u64, hard_limit: u64 },
    /// No finite limit to work with; container is not tracked
    Untracked,
    Unchanged,
    Vetoed { delta: u64 },
    Grown { from: u64, to: u64 },
    Shrunk { from: u64, to: u64 },
    HostReset { from: u64, to: u64 },
}

#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("Failed to write {kind:?} limit {value}: {source}")]
    Write {
        kind: LimitKind,
        value: u64,
        #[source]
        source: CgroupError,
    },

    #[error("Host memory probe failed: {0}")]
    HostProbe(#[from] crate::Error),
}

/// Applies [`ElasticPolicy`] against the host watermark
#[derive(Debug, Clone)]
pub struct Rebalancer {
    policy: ElasticPolicy,
    physical: WaterMark,
}

impl Rebalancer {
    pub fn new(policy: ElasticPolicy, physical: WaterMark) -> Self {
        Self { policy, physical }
    }

    pub fn policy(&self) -> &ElasticPolicy {
        &self.policy
    }

    pub fn physical(&self) -> WaterMark {
        self.physical
    }

    /// Cache entry for a container seen for the first time
    ///
    /// `None` when the container has no finite limit to be elastic around.
    pub fn initial_state(&self, cgroup: &Path, sample: &LimitSample) -> Option<ContainerState> {
        let effective = sample.hard_limit.min(sample.soft_limit);
        if effective == 0 || effective >= UNLIMITED_THRESHOLD {
            return None;
        }

        let mut ceiling = self
            .policy
            .align_down(effective.saturating_mul(self.policy.ceiling_multiplier));
        if let Some(swap) = sample.swap_limit {
            // memory.limit_in_bytes may not exceed memory.memsw.limit_in_bytes
            if swap >= effective && swap < ceiling {
                ceiling = swap;
            }
        }
        if sample.soft_limit < sample.hard_limit {
            // A hard limit above the soft one is a ceiling set earlier; keep it
            ceiling = ceiling.min(sample.hard_limit);
        }
        let ceiling = ceiling.max(effective);

        Some(ContainerState::new(
            cgroup.to_path_buf(),
            effective,
            effective,
            ceiling,
        ))
    }

    /// Next step for a tracked container; pure
    pub fn plan(&self, state: &ContainerState, usage: u64, host_free: u64) -> Decision {
        if host_free <= self.physical.low {
            return if state.soft_limit > state.orig_limit {
                Decision::HostReset {
                    to: state.orig_limit,
                }
            } else {
                Decision::Hold
            };
        }

        let free = state.soft_limit.saturating_sub(usage);
        let mark = compute_watermark(state.hard_limit, self.policy.watermark_scale);

        if free < mark.low {
            let headroom = state.hard_limit.saturating_sub(state.soft_limit);
            let fraction = self.policy.growth_fraction(state.adjustment_step);
            let delta = self.policy.aligned_fraction(headroom, fraction);
            if delta < self.policy.min_adjust {
                return Decision::Hold;
            }

            if host_free.saturating_sub(delta) < self.physical.min {
                return Decision::Vetoed { delta };
            }

            let to = state.soft_limit.saturating_add(delta).min(state.hard_limit);
            Decision::Grow {
                to,
                delta: to - state.soft_limit,
            }
        } else if free > mark.high && state.soft_limit > state.orig_limit {
            let reclaimable = state.hard_limit.saturating_sub(usage);
            let delta = self
                .policy
                .aligned_fraction(reclaimable, self.policy.shrink_fraction)
                .max(self.policy.min_adjust);
            let to = state.soft_limit.saturating_sub(delta).max(state.orig_limit);
            Decision::Shrink {
                to,
                delta: state.soft_limit - to,
            }
        } else {
            Decision::Hold
        }
    }

    /// Run one rebalance step for `id`, creating its cache entry if needed
    ///
    /// On a failed write the cache is left as it was: a new entry is not
    /// retained, an existing entry keeps its previous limit.
    pub fn rebalance(
        &self,
        cache: &mut ElasticCache,
        access: &dyn MemoryCgroupAccess,
        host: &dyn HostMemory,
        id: &ContainerId,
        cgroup: &Path,
        sample: &LimitSample,
    ) -> Result<Adjustment, RebalanceError> {
        let Some(state) = cache.lookup(id) else {
            return self.first_sighting(cache, access, id, cgroup, sample);
        };

        let host_free = host.free_bytes()?;
        let decision = self.plan(state, sample.usage, host_free);
        let from = state.soft_limit;

        let to = match decision {
            Decision::Hold => return Ok(Adjustment::Unchanged),
            Decision::Vetoed { delta } => {
                debug!(container = %id, delta, host_free, "Growth vetoed by host pressure");
                return Ok(Adjustment::Vetoed { delta });
            }
            Decision::Grow { to, .. }
            | Decision::Shrink { to, .. }
            | Decision::HostReset { to } => to,
        };

        if to == from {
            return Ok(Adjustment::Unchanged);
        }

        access
            .write_limit(&state.cgroup_path, LimitKind::Soft, to)
            .map_err(|source| RebalanceError::Write {
                kind: LimitKind::Soft,
                value: to,
                source,
            })?;

        let max_step = self.policy.max_growth_step;
        let Some(state) = cache.lookup_mut(id) else {
            return Ok(Adjustment::Unchanged);
        };
        state.soft_limit = to;

        let adjustment = match decision {
            Decision::Grow { .. } => {
                state.adjustment_step = (state.adjustment_step + 1).min(max_step);
                Adjustment::Grown { from, to }
            }
            Decision::Shrink { .. } => {
                state.adjustment_step = 0;
                Adjustment::Shrunk { from, to }
            }
            _ => {
                state.adjustment_step = 0;
                Adjustment::HostReset { from, to }
            }
        };

        info!(container = %id, from, to, usage = sample.usage, "{}", describe(&adjustment));
        Ok(adjustment)
    }

    fn first_sighting(
        &self,
        cache: &mut ElasticCache,
        access: &dyn MemoryCgroupAccess,
        id: &ContainerId,
        cgroup: &Path,
        sample: &LimitSample,
    ) -> Result<Adjustment, RebalanceError> {
        let Some(state) = self.initial_state(cgroup, sample) else {
            debug!(container = %id, "No finite memory limit, not tracking");
            return Ok(Adjustment::Untracked);
        };

        // Ceiling first: the soft limit must fit under it.
        if let Err(source) = access.write_limit(cgroup, LimitKind::Hard, state.hard_limit) {
            warn!(container = %id, value = state.hard_limit, error = %source, "Initial ceiling write failed, will retry");
            return Err(RebalanceError::Write {
                kind: LimitKind::Hard,
                value: state.hard_limit,
                source,
            });
        }

        if let Err(source) = access.write_limit(cgroup, LimitKind::Soft, state.soft_limit) {
            warn!(container = %id, value = state.soft_limit, error = %source, "Initial soft limit write failed, will retry");
            if let Err(e) = access.write_limit(cgroup, LimitKind::Hard, sample.hard_limit) {
                error!(
                    container = %id,
                    value = sample.hard_limit,
                    error = %e,
                    "Failed to restore hard limit after rejected soft limit"
                );
            }
            return Err(RebalanceError::Write {
                kind: LimitKind::Soft,
                value: state.soft_limit,
                source,
            });
        }

        let adjustment = Adjustment::Created {
            soft_limit: state.soft_limit,
            hard_limit: state.hard_limit,
        };
        info!(
            container = %id,
            soft_limit = state.soft_limit,
            hard_limit = state.hard_limit,
            "Container now elastic"
        );
        cache.insert(id.clone(), state);
        Ok(adjustment)
    }
}

fn describe(adjustment: &Adjustment) -> &'static str {
    match adjustment {
        Adjustment::Grown { .. } => "Grew memory limit",
        Adjustment::Shrunk { .. } => "Shrank memory limit",
        Adjustment::HostReset { .. } => "Host memory low, limit reset to original",
        _ => "Memory limit unchanged",
    }
}
