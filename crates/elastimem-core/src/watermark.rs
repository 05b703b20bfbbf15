//! Three-tier memory watermarks
//!
//! Same shape as the kernel's `min_free_kbytes` heuristic: the floor grows
//! with the square root of capacity, so large machines (or large containers)
//! keep proportionally smaller reserves.

use serde::{Deserialize, Serialize};

/// Default scale factor `k` in `min = k * sqrt(capacity)`, capacity in bytes
pub const DEFAULT_WATERMARK_SCALE: u64 = 512;

/// Hysteresis band in bytes; `min <= low <= high`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterMark {
    pub min: u64,
    pub low: u64,
    pub high: u64,
}

/// Compute the watermark band for `capacity` bytes
///
/// A capacity of zero yields an all-zero band. Quadrupling the capacity
/// doubles `min` exactly only for perfect-square capacities; otherwise the
/// floored root makes the scaled `min` land on `2 * min` or `2 * min + scale`.
pub fn compute_watermark(capacity: u64, scale: u64) -> WaterMark {
    let root = (capacity as f64).sqrt() as u64;
    let min = scale.saturating_mul(root);
    let low = min.saturating_mul(5) / 4;
    let high = low.saturating_mul(3) / 2;

    WaterMark { min, low, high }
}

impl WaterMark {
    /// Watermark for `capacity` bytes with the default scale
    pub fn for_capacity(capacity: u64) -> Self {
        compute_watermark(capacity, DEFAULT_WATERMARK_SCALE)
    }

    /// Band is ordered and non-degenerate
    pub fn is_valid(&self) -> bool {
        self.min <= self.low && self.low <= self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    #[test]
    fn test_zero_capacity() {
        assert_eq!(compute_watermark(0, DEFAULT_WATERMARK_SCALE), WaterMark::default());
    }

    #[test]
    fn test_container_band() {
        // sqrt(400 MiB) = 20480
        let mark = WaterMark::for_capacity(400 * MIB);
        assert_eq!(mark.min, 10 * MIB);
        assert_eq!(mark.low, 12 * MIB + 512 * 1024);
        assert_eq!(mark.high, 18 * MIB + 768 * 1024);
    }

    #[test]
    fn test_host_band() {
        let mark = WaterMark::for_capacity(16 * GIB);
        assert_eq!(mark.min, 64 * MIB);
        assert_eq!(mark.low, 80 * MIB);
        assert_eq!(mark.high, 120 * MIB);
    }

    #[test]
    fn test_ordering_holds() {
        for capacity in [1, 2, 3, 7, 4096, 8191, 100 * MIB + 3, 64 * GIB, u64::MAX] {
            let mark = compute_watermark(capacity, DEFAULT_WATERMARK_SCALE);
            assert!(mark.is_valid(), "capacity {} gave {:?}", capacity, mark);
        }
    }

    #[test]
    fn test_scaling_off_perfect_squares() {
        let scale = DEFAULT_WATERMARK_SCALE;
        for capacity in [2u64, 3, 5, 1000, 100 * MIB + 3, 3 * GIB + 17] {
            let base = compute_watermark(capacity, scale).min;
            let scaled = compute_watermark(4 * capacity, scale).min;
            assert!(
                scaled == 2 * base || scaled == 2 * base + scale,
                "capacity {}: {} vs {}",
                capacity,
                base,
                scaled
            );
        }
        assert_eq!(compute_watermark(3, scale).min, scale);
        assert_eq!(compute_watermark(12, scale).min, 3 * scale);
    }

    #[test]
    fn test_square_root_scaling() {
        for n in [1u64, 3, 64, 1000, 20480, 131_072] {
            let base = compute_watermark(n * n, 4);
            let scaled = compute_watermark(4 * n * n, 4);
            assert_eq!(scaled.min, 2 * base.min, "n = {}", n);
        }
    }

    #[test]
    fn test_deterministic() {
        let a = compute_watermark(123_456_789, 7);
        let b = compute_watermark(123_456_789, 7);
        assert_eq!(a, b);
    }
}
