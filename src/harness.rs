//! End-to-end copy harness: allocate, fill, copy, wait, verify.

use core::fmt::Display;
use std::io::Write;

use cubecl::Runtime;

use crate::config::HarnessConfig;
use crate::partition::{CopyPlan, PartitionPolicy};
use crate::{TiledCopyError, host, kernel};

/// One element that differs between source and destination.
#[derive(new, Debug, Clone, Copy, PartialEq)]
pub struct Mismatch<E> {
    /// Linear offset.
    pub index: usize,
    /// Source value.
    pub expected: E,
    /// Destination value.
    pub actual: E,
}

impl<E: Display> Display for Mismatch<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Error. S[{}]: {},   D[{}]: {}",
            self.index, self.expected, self.index, self.actual
        )
    }
}

/// Outcome of comparing a destination against its source.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification<E> {
    /// Every element matches.
    Success,
    /// At least one element differs.
    Failed {
        /// Mismatches in offset order, at most `limit` of them.
        mismatches: Vec<Mismatch<E>>,
        /// Whether the comparison stopped at the limit.
        aborted: bool,
    },
}

impl<E> Verification<E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Verification::Success)
    }
}

/// Compare `destination` with `source` element by element, stopping after `limit` mismatches.
///
/// A limit of zero is treated as one. Buffers of different lengths are an error.
pub fn verify<E: PartialEq + Copy>(
    source: &[E],
    destination: &[E],
    limit: usize,
) -> Result<Verification<E>, TiledCopyError> {
    if destination.len() != source.len() {
        return Err(TiledCopyError::BufferSize {
            expected: source.len(),
            actual: destination.len(),
        });
    }

    let limit = limit.max(1);
    let mut mismatches = Vec::new();

    for (index, (expected, actual)) in source.iter().zip(destination).enumerate() {
        if expected != actual {
            log::warn!("Mismatch at offset {index}");
            mismatches.push(Mismatch::new(index, *expected, *actual));

            if mismatches.len() >= limit {
                return Ok(Verification::Failed {
                    mismatches,
                    aborted: true,
                });
            }
        }
    }

    if mismatches.is_empty() {
        Ok(Verification::Success)
    } else {
        Ok(Verification::Failed {
            mismatches,
            aborted: false,
        })
    }
}

/// Source buffer with `value[i] = i`.
pub fn iota(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32).collect()
}

/// The result of one policy.
#[derive(Debug, Clone)]
pub struct PolicyRun {
    pub policy: PartitionPolicy,
    pub verification: Verification<f32>,
    destination: Vec<f32>,
}

impl PolicyRun {
    pub fn destination(&self) -> &[f32] {
        &self.destination
    }
}

/// Everything a harness run produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub runs: Vec<PolicyRun>,
    pub error_limit: usize,
}

impl Outcome {
    /// Whether every policy produced bit-identical destinations.
    pub fn policies_agree(&self) -> bool {
        let Some((first, rest)) = self.runs.split_first() else {
            return true;
        };

        rest.iter().all(|run| {
            run.destination.len() == first.destination.len()
                && run
                    .destination
                    .iter()
                    .zip(&first.destination)
                    .all(|(lhs, rhs)| lhs.to_bits() == rhs.to_bits())
        })
    }

    pub fn is_success(&self) -> bool {
        self.runs.iter().all(|run| run.verification.is_success()) && self.policies_agree()
    }

    /// Process exit code: `0` on success, `-1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { -1 }
    }

    /// Write the console report: mismatches to `errors`, `Success.` to `out`.
    pub fn report<O: Write, W: Write>(&self, out: &mut O, errors: &mut W) -> std::io::Result<()> {
        for run in self.runs.iter() {
            if let Verification::Failed {
                mismatches,
                aborted,
            } = &run.verification
            {
                for mismatch in mismatches {
                    writeln!(errors, "{mismatch}")?;
                }
                if *aborted {
                    writeln!(errors, "Aborting on {}nth error.", self.error_limit)?;
                }
            }
        }

        if self.runs.len() > 1 && !self.policies_agree() {
            writeln!(errors, "Striped and vectorized copies disagree.")?;
        }

        if self.is_success() {
            writeln!(out, "Success.")?;
        }

        Ok(())
    }
}

fn execute<F>(config: &HarnessConfig, mut copy: F) -> Result<Outcome, TiledCopyError>
where
    F: FnMut(&CopyPlan, &[f32]) -> Result<Vec<f32>, TiledCopyError>,
{
    // Validate everything before touching memory.
    let plans = config.plans()?;
    for plan in plans.iter() {
        plan.ownership_map()?;
    }

    let error_limit = config.error_limit.max(1);
    let source = iota(config.shape.size());
    let mut runs = Vec::with_capacity(plans.len());

    for plan in plans {
        log::debug!(
            "Copying {} with tile {} and threads {} ({})",
            plan.layout().shape(),
            plan.view().tile_shape(),
            plan.threads().shape(),
            plan.policy(),
        );

        let destination = copy(&plan, &source)?;
        let verification = verify(&source, &destination, error_limit)?;

        match &verification {
            Verification::Success => log::info!("{} copy verified", plan.policy()),
            Verification::Failed { mismatches, .. } => log::info!(
                "{} copy failed with {} mismatches",
                plan.policy(),
                mismatches.len()
            ),
        }

        runs.push(PolicyRun {
            policy: plan.policy(),
            verification,
            destination,
        });
    }

    Ok(Outcome { runs, error_limit })
}

/// Run the harness on a device of runtime `R`.
///
/// The client is only created once the plans are validated.
pub fn run<R: Runtime>(device: &R::Device, config: &HarnessConfig) -> Result<Outcome, TiledCopyError> {
    let mut client = None;

    execute(config, |plan, source| {
        let client = client.get_or_insert_with(|| R::client(device));
        kernel::copy::<R, f32>(client, plan, source)
    })
}

/// Run the harness with the host reference executor.
pub fn run_host(config: &HarnessConfig) -> Result<Outcome, TiledCopyError> {
    execute(config, |plan, source| host::copy(plan, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identical_buffers_verify() {
        let source = iota(64);

        assert_eq!(verify(&source, &source, 10), Ok(Verification::Success));
    }

    #[test]
    fn mismatches_are_reported_in_order() {
        let source = iota(8);
        let mut destination = source.clone();
        destination[2] = 0.0;
        destination[5] = -1.0;

        assert_eq!(
            verify(&source, &destination, 10),
            Ok(Verification::Failed {
                mismatches: vec![Mismatch::new(2, 2.0, 0.0), Mismatch::new(5, 5.0, -1.0)],
                aborted: false,
            })
        );
    }

    #[test]
    fn verification_stops_at_limit() {
        let source = iota(100);
        let destination = vec![0.5; 100];

        let Verification::Failed {
            mismatches,
            aborted,
        } = verify(&source, &destination, 10).unwrap()
        else {
            panic!("Expected a failed verification");
        };

        assert!(aborted);
        assert_eq!(mismatches.len(), 10);
        assert_eq!(mismatches[9].index, 9);
    }

    #[test]
    fn short_destination_is_rejected() {
        let err = verify(&iota(8), &iota(3), 10).unwrap_err();

        assert_eq!(
            err,
            TiledCopyError::BufferSize {
                expected: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn zero_limit_stops_at_first_mismatch() {
        let source = iota(4);
        let destination = vec![-1.0; 4];

        assert_eq!(
            verify(&source, &destination, 0),
            Ok(Verification::Failed {
                mismatches: vec![Mismatch::new(0, 0.0, -1.0)],
                aborted: true,
            })
        );
    }

    #[test]
    fn zero_limit_is_reported_as_one() {
        let config = HarnessConfig {
            error_limit: 0,
            ..Default::default()
        };

        let outcome = execute(&config, |_, source| Ok(vec![-1.0; source.len()])).unwrap();
        let mut out = Vec::new();
        let mut errors = Vec::new();
        outcome.report(&mut out, &mut errors).unwrap();

        assert_eq!(outcome.error_limit, 1);
        assert_eq!(
            String::from_utf8(errors).unwrap(),
            "Error. S[0]: 0,   D[0]: -1\nAborting on 1nth error.\n"
        );
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_plan_never_reaches_the_executor() {
        let config = HarnessConfig {
            shape: crate::layout::Shape::new(250, 512),
            ..Default::default()
        };

        let err = execute(&config, |_, _| unreachable!("copy ran on an invalid plan")).unwrap_err();

        assert!(matches!(err, TiledCopyError::NotDivisible { .. }));
    }

    #[test]
    fn report_prints_success_only_on_success() {
        let outcome = Outcome {
            runs: vec![PolicyRun {
                policy: PartitionPolicy::Striped,
                verification: Verification::Success,
                destination: iota(4),
            }],
            error_limit: 10,
        };
        let mut out = Vec::new();
        let mut errors = Vec::new();

        outcome.report(&mut out, &mut errors).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Success.\n");
        assert!(errors.is_empty());
    }

    #[test]
    fn report_lists_mismatches_before_aborting() {
        let outcome = Outcome {
            runs: vec![PolicyRun {
                policy: PartitionPolicy::Striped,
                verification: Verification::Failed {
                    mismatches: vec![Mismatch::new(3, 3.0, 0.0), Mismatch::new(4, 4.0, 0.0)],
                    aborted: true,
                },
                destination: vec![0.0; 8],
            }],
            error_limit: 2,
        };
        let mut out = Vec::new();
        let mut errors = Vec::new();

        outcome.report(&mut out, &mut errors).unwrap();

        assert!(out.is_empty());
        assert_eq!(
            String::from_utf8(errors).unwrap(),
            "Error. S[3]: 3,   D[3]: 0\nError. S[4]: 4,   D[4]: 0\nAborting on 2nth error.\n"
        );
        assert_eq!(outcome.exit_code(), -1);
    }

    #[test]
    fn mismatch_formats_like_the_console_report() {
        let mismatch = Mismatch::new(7, 7.0f32, 0.0f32);

        assert_eq!(mismatch.to_string(), "Error. S[7]: 7,   D[7]: 0");
    }

    #[test]
    fn diverging_policies_fail() {
        let outcome = Outcome {
            runs: vec![
                PolicyRun {
                    policy: PartitionPolicy::Striped,
                    verification: Verification::Success,
                    destination: vec![0.0, 0.0],
                },
                PolicyRun {
                    policy: PartitionPolicy::Vectorized {
                        vector: crate::layout::Shape::new(2, 1),
                    },
                    verification: Verification::Success,
                    destination: vec![0.0, -0.0],
                },
            ],
            error_limit: 10,
        };

        assert!(!outcome.policies_agree());
        assert_eq!(outcome.exit_code(), -1);

        let mut out = Vec::new();
        let mut errors = Vec::new();
        outcome.report(&mut out, &mut errors).unwrap();

        assert!(out.is_empty());
        assert_eq!(
            String::from_utf8(errors).unwrap(),
            "Striped and vectorized copies disagree.\n"
        );
    }
}
