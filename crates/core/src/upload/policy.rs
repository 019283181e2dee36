//! Part-size policy.

use serde::{Deserialize, Serialize};

/// Initial part size: 8 MiB.
pub const BASE_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Upper bound on parts per upload, matching S3's multipart limit.
pub const MAX_PARTS: u32 = 10_000;

/// Part size and count chosen for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartPlan {
    /// Size of every part except possibly the last.
    pub part_size: u64,
    /// Number of parts, `ceil(file_size / part_size)`.
    pub total_parts: u32,
}

/// Choose the part size for a file: start at 8 MiB and double until the
/// file fits in at most 10 000 parts.
#[must_use]
pub fn plan_parts(file_size: u64) -> PartPlan {
    let mut part_size = BASE_PART_SIZE;
    while file_size.div_ceil(part_size) > u64::from(MAX_PARTS) {
        part_size *= 2;
    }

    let total_parts = u32::try_from(file_size.div_ceil(part_size)).unwrap_or(MAX_PARTS);
    PartPlan {
        part_size,
        total_parts,
    }
}
