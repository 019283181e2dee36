//! Property-based tests for the part-size policy.

use proptest::prelude::*;

use super::policy::{BASE_PART_SIZE, MAX_PARTS, plan_parts};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Any non-empty file fits in at most 10 000 parts.
    #[test]
    fn prop_total_parts_bounded(file_size in 1u64..=u64::MAX / 2) {
        let plan = plan_parts(file_size);
        prop_assert!(plan.total_parts >= 1);
        prop_assert!(plan.total_parts <= MAX_PARTS);
    }

    /// Part size is always 8 MiB times a power of two.
    #[test]
    fn prop_part_size_is_doubling_of_base(file_size in 1u64..=u64::MAX / 2) {
        let plan = plan_parts(file_size);
        prop_assert_eq!(plan.part_size % BASE_PART_SIZE, 0);
        prop_assert!((plan.part_size / BASE_PART_SIZE).is_power_of_two());
    }

    /// The parts cover the file exactly: the last part is non-empty.
    #[test]
    fn prop_parts_cover_file(file_size in 1u64..=1u64 << 50) {
        let plan = plan_parts(file_size);
        let total = u64::from(plan.total_parts);
        prop_assert!(plan.part_size * total >= file_size);
        prop_assert!(plan.part_size * (total - 1) < file_size);
    }

    /// The smallest sufficient part size is chosen.
    #[test]
    fn prop_part_size_is_minimal(file_size in 1u64..=1u64 << 50) {
        let plan = plan_parts(file_size);
        if plan.part_size > BASE_PART_SIZE {
            prop_assert!(file_size.div_ceil(plan.part_size / 2) > u64::from(MAX_PARTS));
        }
    }
}
