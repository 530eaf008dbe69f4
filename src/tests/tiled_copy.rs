use cubecl::Runtime;
use pretty_assertions::assert_eq;

use crate::config::{HarnessConfig, PolicySelection};
use crate::harness::{self, iota};
use crate::layout::{Layout, MajorOrder, Shape};
use crate::partition::{CopyPlan, PartitionPolicy, ThreadArrangement};
use crate::{host, kernel};

fn plan(order: MajorOrder, policy: PartitionPolicy) -> CopyPlan {
    CopyPlan::new(
        Layout::new(Shape::new(128, 96), order),
        Shape::new(64, 32),
        ThreadArrangement::new(Shape::new(8, 4)),
        policy,
    )
    .unwrap()
}

pub fn test_round_trip<R: Runtime>(
    device: &R::Device,
    order: MajorOrder,
    policy: PartitionPolicy,
) {
    let client = R::client(device);
    let plan = plan(order, policy);
    let source = iota(plan.layout().size());

    let actual = kernel::copy::<R, f32>(&client, &plan, &source).unwrap();

    assert_eq!(actual, source, "{policy} copy isn't an identity.");
}

pub fn test_matches_host<R: Runtime>(device: &R::Device, policy: PartitionPolicy) {
    let client = R::client(device);
    let plan = plan(MajorOrder::ColumnMajor, policy);
    let source: Vec<u32> = (0..plan.layout().size() as u32).rev().collect();

    let expected = host::copy(&plan, &source).unwrap();
    let actual = kernel::copy::<R, u32>(&client, &plan, &source).unwrap();

    assert_eq!(actual, expected, "device and host copies differ.");
}

pub fn test_policies_agree<R: Runtime>(device: &R::Device) {
    let config = HarnessConfig {
        policy: PolicySelection::Both,
        ..Default::default()
    };

    let outcome = harness::run::<R>(device, &config).unwrap();

    assert_eq!(outcome.runs.len(), 2);
    assert!(outcome.policies_agree(), "striped and vectorized copies differ.");
    assert_eq!(outcome.exit_code(), 0);
}

#[allow(missing_docs)]
#[macro_export]
macro_rules! testgen_tiled_copy {
    () => {
        mod tiled_copy {
            use super::*;
            use $crate::layout::{MajorOrder, Shape};
            use $crate::partition::PartitionPolicy;

            #[test]
            fn striped_column_major() {
                $crate::tests::tiled_copy::test_round_trip::<TestRuntime>(
                    &Default::default(),
                    MajorOrder::ColumnMajor,
                    PartitionPolicy::Striped,
                );
            }

            #[test]
            fn vectorized_column_major() {
                $crate::tests::tiled_copy::test_round_trip::<TestRuntime>(
                    &Default::default(),
                    MajorOrder::ColumnMajor,
                    PartitionPolicy::Vectorized {
                        vector: Shape::new(4, 1),
                    },
                );
            }

            #[test]
            fn vectorized_column_major_x8() {
                $crate::tests::tiled_copy::test_round_trip::<TestRuntime>(
                    &Default::default(),
                    MajorOrder::ColumnMajor,
                    PartitionPolicy::Vectorized {
                        vector: Shape::new(8, 1),
                    },
                );
            }

            #[test]
            fn striped_row_major() {
                $crate::tests::tiled_copy::test_round_trip::<TestRuntime>(
                    &Default::default(),
                    MajorOrder::RowMajor,
                    PartitionPolicy::Striped,
                );
            }

            #[test]
            fn vectorized_row_major() {
                $crate::tests::tiled_copy::test_round_trip::<TestRuntime>(
                    &Default::default(),
                    MajorOrder::RowMajor,
                    PartitionPolicy::Vectorized {
                        vector: Shape::new(1, 4),
                    },
                );
            }

            #[test]
            fn striped_matches_host() {
                $crate::tests::tiled_copy::test_matches_host::<TestRuntime>(
                    &Default::default(),
                    PartitionPolicy::Striped,
                );
            }

            #[test]
            fn vectorized_matches_host() {
                $crate::tests::tiled_copy::test_matches_host::<TestRuntime>(
                    &Default::default(),
                    PartitionPolicy::Vectorized {
                        vector: Shape::new(4, 1),
                    },
                );
            }

            #[test]
            fn policies_agree() {
                $crate::tests::tiled_copy::test_policies_agree::<TestRuntime>(&Default::default());
            }
        }
    };
}
