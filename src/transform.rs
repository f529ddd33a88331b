//! Portable in-place application of per-variant statistics.
//!
//! These are the reference semantics the vectorized kernel must match. Each
//! transform centers, scales, and zero-fills missing positions so that no NaN
//! or arithmetic residue survives at a masked location.

use crate::density;
use crate::stats::VariantStats;
use crate::types::Dosage;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayViewMut2, Axis, Zip};

/// Unit transform: subtract the per-variant mean, divide by the per-variant
/// spread, then force missing positions to exactly zero. Division by the
/// infinite-spread sentinel maps every entry of a degenerate variant to zero.
pub fn unit_apply<T: Dosage>(
    matrix: &mut ArrayViewMut2<'_, T>,
    missing: &Array2<bool>,
    stats: &VariantStats<T>,
) {
    matrix
        .axis_iter_mut(Axis(1))
        .into_par_iter()
        .zip(missing.axis_iter(Axis(1)).into_par_iter())
        .enumerate()
        .for_each(|(variant, (mut column, miss))| {
            let mean = stats.mean(variant);
            let spread = stats.spread(variant).raw();
            Zip::from(&mut column).and(&miss).for_each(|value, &is_missing| {
                *value = if is_missing {
                    T::zero()
                } else {
                    (*value - mean) / spread
                };
            });
        });
}

/// Beta transform: subtract the per-variant mean, multiply by the Beta(a, b)
/// density at the variant's folded allele frequency, then zero-fill missing
/// positions. The spread is never the divisor here.
///
/// In apply-trained mode (`reuse_stats`), any variant whose stored spread is
/// the infinite sentinel is additionally forced to all-zero: a variant with no
/// training-data variation stays neutral on every future matrix. Train mode
/// deliberately does not re-scrub its own output; that asymmetry matches the
/// observed behavior of the statistics this engine reproduces.
pub fn beta_apply<T: Dosage>(
    matrix: &mut ArrayViewMut2<'_, T>,
    missing: &Array2<bool>,
    stats: &VariantStats<T>,
    a: f64,
    b: f64,
    reuse_stats: bool,
) {
    matrix
        .axis_iter_mut(Axis(1))
        .into_par_iter()
        .zip(missing.axis_iter(Axis(1)).into_par_iter())
        .enumerate()
        .for_each(|(variant, (mut column, miss))| {
            if reuse_stats && stats.spread(variant).is_no_variance() {
                column.fill(T::zero());
                return;
            }
            let mean = stats.mean(variant);
            let weight = T::from_f64(density::beta_weight(mean.into_f64(), a, b));
            Zip::from(&mut column).and(&miss).for_each(|value, &is_missing| {
                *value = if is_missing {
                    T::zero()
                } else {
                    (*value - mean) * weight
                };
            });
        });
}
