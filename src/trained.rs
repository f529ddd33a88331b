//! Immutable trained-statistics snapshots.
//!
//! A [`TrainedStandardizer`] pairs a statistics buffer with the policy that
//! produced it, so a train/test split can standardize held-out data with the
//! training statistics instead of recomputing them. Snapshots are fixed at
//! construction and never mutated; they serialize with serde for reuse across
//! processes.

use crate::dispatch::{StandardizeRequest, Standardizer};
use crate::stats::VariantStats;
use crate::types::{Dosage, Policy, StandardizeError};
use ndarray::ArrayViewMut2;
use serde::{Deserialize, Serialize};

/// A constant standardizer: statistics trained once, re-applied many times.
///
/// Created only as the optional second output of a compute-and-apply call (see
/// [`StandardizeRequest::return_trained`]). It always operates in apply-trained
/// mode and cannot itself be retrained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainedStandardizer<T: Dosage> {
    policy: Policy,
    stats: VariantStats<T>,
}

impl<T: Dosage> TrainedStandardizer<T> {
    pub(crate) fn new(policy: Policy, stats: VariantStats<T>) -> Self {
        Self { policy, stats }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn stats(&self) -> &VariantStats<T> {
        &self.stats
    }

    fn name(&self) -> &'static str {
        match self.policy {
            Policy::Unit => "unit-trained",
            Policy::Beta { .. } => "beta-trained",
        }
    }

    /// Standardizes `matrix` in place with the stored statistics.
    pub fn apply(
        &self,
        engine: &Standardizer,
        matrix: ArrayViewMut2<'_, T>,
    ) -> Result<(), StandardizeError> {
        self.standardize_with(engine, matrix, true, false)?;
        Ok(())
    }

    /// The full standardize contract, pinned to apply-trained mode. Returns
    /// the statistics used (a conforming copy of the stored buffer).
    ///
    /// A snapshot holds fixed statistics that never saw the matrix at hand, so
    /// `return_trained` (a request to train a second snapshot from this one)
    /// fails with the untrainable error kind.
    pub fn standardize_with(
        &self,
        engine: &Standardizer,
        matrix: ArrayViewMut2<'_, T>,
        apply_in_place: bool,
        return_trained: bool,
    ) -> Result<VariantStats<T>, StandardizeError> {
        if return_trained {
            return Err(StandardizeError::Untrainable { name: self.name() });
        }
        let outcome = engine.standardize(
            matrix,
            self.policy,
            StandardizeRequest {
                stats: Some(&self.stats),
                apply_in_place,
                return_trained: false,
            },
        )?;
        Ok(outcome.stats)
    }
}
