//! Part planner
//!
//! Splits a file into fixed-size parts for multipart upload.

use serde::{Deserialize, Serialize};

/// Minimum part size (5MB) - storage backend requirement
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum part size (100MB)
pub const MAX_PART_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum parts allowed
pub const MAX_PARTS: u64 = 10_000;

const MIB: u64 = 1024 * 1024;

/// Device class hint sent to the backend on Init
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Desktop-class device on a reasonable link
    #[default]
    Standard,
    /// Mobile or low-bandwidth device
    Constrained,
}

impl DeviceClass {
    pub fn is_constrained(self) -> bool {
        matches!(self, DeviceClass::Constrained)
    }
}

/// Result of planning a file into parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    pub part_size: u64,
    pub part_count: u32,
}

impl PartPlan {
    /// Build a plan from an explicit part size.
    ///
    /// Returns `None` if `part_size` is zero or above [`MAX_PART_SIZE`], or
    /// if the file would need more than [`MAX_PARTS`] parts.
    pub fn with_part_size(file_size: u64, part_size: u64) -> Option<Self> {
        if part_size == 0 || part_size > MAX_PART_SIZE {
            return None;
        }
        let part_count = file_size.div_ceil(part_size);
        if part_count > MAX_PARTS {
            return None;
        }
        let part_count = u32::try_from(part_count).ok()?;
        Some(Self {
            part_size,
            part_count,
        })
    }

    /// Length in bytes of the given 1-based part.
    pub fn part_len(&self, file_size: u64, part_number: u32) -> u64 {
        if part_number == 0 || part_number > self.part_count {
            return 0;
        }
        let start = u64::from(part_number - 1) * self.part_size;
        self.part_size.min(file_size.saturating_sub(start))
    }
}

/// Compute part size and count for a file.
///
/// Constrained devices always get [`MIN_PART_SIZE`] parts. Standard devices
/// step up with file size (8, 16, then 32 MiB) to cut per-request overhead.
/// Either way the size is raised if the file would otherwise need more than
/// [`MAX_PARTS`] parts, and clamped to `[MIN_PART_SIZE, MAX_PART_SIZE]`.
///
/// Zero-byte files must be rejected by the caller; planning one yields zero parts.
pub fn compute_parts(file_size: u64, is_constrained_device: bool) -> PartPlan {
    let preferred = if is_constrained_device {
        MIN_PART_SIZE
    } else if file_size <= 256 * MIB {
        8 * MIB
    } else if file_size <= 2048 * MIB {
        16 * MIB
    } else {
        32 * MIB
    };

    let part_size = preferred
        .max(file_size.div_ceil(MAX_PARTS))
        .clamp(MIN_PART_SIZE, MAX_PART_SIZE);

    PartPlan {
        part_size,
        part_count: u32::try_from(file_size.div_ceil(part_size)).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_26_mib_standard_device() {
        let plan = compute_parts(26 * MIB, false);
        assert_eq!(plan.part_size, 8 * MIB);
        assert_eq!(plan.part_count, 4);

        let sizes: Vec<u64> = (1..=4).map(|n| plan.part_len(26 * MIB, n)).collect();
        assert_eq!(sizes, vec![8 * MIB, 8 * MIB, 8 * MIB, 2 * MIB]);
    }

    #[test]
    fn test_constrained_device_uses_min_part_size() {
        let plan = compute_parts(26 * MIB, true);
        assert_eq!(plan.part_size, MIN_PART_SIZE);
        assert_eq!(plan.part_count, 6);
    }

    #[test]
    fn test_large_files_get_larger_parts() {
        assert_eq!(compute_parts(1024 * MIB, false).part_size, 16 * MIB);
        assert_eq!(compute_parts(10 * 1024 * MIB, false).part_size, 32 * MIB);
    }

    #[test]
    fn test_part_count_ceiling_raises_part_size() {
        // 500 GiB at 32 MiB would be 16000 parts
        let size = 500 * 1024 * MIB;
        let plan = compute_parts(size, false);
        assert!(plan.part_size > 32 * MIB);
        assert!(u64::from(plan.part_count) <= MAX_PARTS);
    }

    #[test]
    fn test_part_size_bounds_hold() {
        for size in [1, 1024, 5 * MIB, 5 * MIB + 1, 300 * MIB, 5000 * MIB, 4_000_000 * MIB] {
            for constrained in [false, true] {
                let plan = compute_parts(size, constrained);
                assert!(plan.part_size >= MIN_PART_SIZE, "size {size}");
                assert!(plan.part_size <= MAX_PART_SIZE, "size {size}");
                assert_eq!(u64::from(plan.part_count), size.div_ceil(plan.part_size));
            }
        }
    }

    #[test]
    fn test_part_len_out_of_range() {
        let plan = compute_parts(26 * MIB, false);
        assert_eq!(plan.part_len(26 * MIB, 0), 0);
        assert_eq!(plan.part_len(26 * MIB, 5), 0);
    }

    #[test]
    fn test_with_part_size_rejects_zero() {
        assert!(PartPlan::with_part_size(100, 0).is_none());
        let plan = PartPlan::with_part_size(100, 30).unwrap();
        assert_eq!(plan.part_count, 4);
    }

    #[test]
    fn test_with_part_size_rejects_too_many_parts() {
        assert!(PartPlan::with_part_size(26 * MIB, 1).is_none());
        assert!(PartPlan::with_part_size(MAX_PARTS + 1, 1).is_none());
        let plan = PartPlan::with_part_size(MAX_PARTS, 1).unwrap();
        assert_eq!(u64::from(plan.part_count), MAX_PARTS);
    }

    #[test]
    fn test_with_part_size_rejects_oversized_parts() {
        assert!(PartPlan::with_part_size(1024 * MIB, MAX_PART_SIZE + 1).is_none());
        let plan = PartPlan::with_part_size(1024 * MIB, MAX_PART_SIZE).unwrap();
        assert_eq!(plan.part_count, 11);
    }
}
