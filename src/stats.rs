//! Per-variant statistics buffers and their portable computation.
//!
//! A [`VariantStats`] is an M x 2 matrix: column 0 holds each variant's
//! location (mean), column 1 its spread (standard deviation, with positive
//! infinity standing in for "no observed variance", see
//! [`crate::Spread`]). The buffer's dtype and layout always conform to the
//! matrix it describes; the engine copies non-conforming buffers before use.

use crate::types::{Dosage, MatrixLayout, Spread, StandardizeError};
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, ShapeBuilder};
use serde::{Deserialize, Serialize};

/// Per-variant (mean, spread) statistics, one row per variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantStats<T: Dosage> {
    values: Array2<T>,
}

impl<T: Dosage> VariantStats<T> {
    /// A zeroed buffer for `variants` variants, stored in `layout` order.
    pub(crate) fn allocate(variants: usize, layout: MatrixLayout) -> Self {
        let values = match layout {
            MatrixLayout::RowMajor => Array2::zeros((variants, 2)),
            MatrixLayout::ColumnMajor => Array2::zeros((variants, 2).f()),
        };
        Self { values }
    }

    /// Wraps an existing (M, 2) array. Any other shape is rejected.
    pub fn from_array(values: Array2<T>) -> Result<Self, StandardizeError> {
        if values.ncols() != 2 {
            return Err(StandardizeError::StatsShape {
                rows: values.nrows(),
                cols: values.ncols(),
                expected: values.nrows(),
            });
        }
        Ok(Self { values })
    }

    pub fn variant_count(&self) -> usize {
        self.values.nrows()
    }

    pub fn layout(&self) -> MatrixLayout {
        if self.values.is_standard_layout() {
            MatrixLayout::RowMajor
        } else {
            MatrixLayout::ColumnMajor
        }
    }

    pub fn mean(&self, variant: usize) -> T {
        self.values[[variant, 0]]
    }

    pub fn spread(&self, variant: usize) -> Spread<T> {
        Spread::from_raw(self.values[[variant, 1]])
    }

    pub fn means(&self) -> ArrayView1<'_, T> {
        self.values.column(0)
    }

    pub fn spreads(&self) -> ArrayView1<'_, T> {
        self.values.column(1)
    }

    pub fn as_array(&self) -> &Array2<T> {
        &self.values
    }

    pub fn into_array(self) -> Array2<T> {
        self.values
    }

    pub(crate) fn set(&mut self, variant: usize, mean: T, spread: Spread<T>) {
        self.values[[variant, 0]] = mean;
        self.values[[variant, 1]] = spread.raw();
    }

    /// Shape precondition for a caller-supplied buffer.
    pub(crate) fn ensure_variant_count(&self, expected: usize) -> Result<(), StandardizeError> {
        if self.values.nrows() != expected || self.values.ncols() != 2 {
            return Err(StandardizeError::StatsShape {
                rows: self.values.nrows(),
                cols: self.values.ncols(),
                expected,
            });
        }
        Ok(())
    }

    /// A copy of this buffer stored in `layout` order. The original is never
    /// mutated; a caller-supplied buffer with the wrong layout is conformed
    /// through this copy rather than silently reinterpreted.
    pub(crate) fn conforming_copy(&self, layout: MatrixLayout) -> Self {
        if self.layout() == layout {
            return self.clone();
        }
        let variants = self.variant_count();
        let values = match layout {
            MatrixLayout::RowMajor => {
                Array2::from_shape_fn((variants, 2), |index| self.values[index])
            }
            MatrixLayout::ColumnMajor => {
                Array2::from_shape_fn((variants, 2).f(), |index| self.values[index])
            }
        };
        Self { values }
    }

    /// The contiguous backing storage, in this buffer's layout order.
    pub(crate) fn raw_values_mut(&mut self) -> Option<&mut [T]> {
        self.values.as_slice_memory_order_mut()
    }
}

/// Mean and population standard deviation of one variant over its non-missing
/// entries. An all-missing variant yields NaN for both.
fn column_moments<T: Dosage>(column: &ArrayView1<'_, T>, missing: &ArrayView1<'_, bool>) -> (T, T) {
    let mut sum = T::zero();
    let mut count = T::zero();
    for (&value, &miss) in column.iter().zip(missing.iter()) {
        if !miss {
            sum += value;
            count += T::one();
        }
    }
    let mean = sum / count;

    let mut sum_sq_dev = T::zero();
    for (&value, &miss) in column.iter().zip(missing.iter()) {
        if !miss {
            let deviation = value - mean;
            sum_sq_dev += deviation * deviation;
        }
    }
    let spread = (sum_sq_dev / count).sqrt();
    (mean, spread)
}

fn compute_column_statistics<T: Dosage>(
    matrix: &ArrayView2<'_, T>,
    missing: &Array2<bool>,
    stats: &mut VariantStats<T>,
) {
    let moments: Vec<(T, T)> = matrix
        .axis_iter(Axis(1))
        .into_par_iter()
        .zip(missing.axis_iter(Axis(1)).into_par_iter())
        .map(|(column, miss)| column_moments(&column, &miss))
        .collect();
    for (variant, (mean, spread)) in moments.into_iter().enumerate() {
        stats.set(variant, mean, Spread::from_computed(spread));
    }
}

/// Unit-policy statistics: per-variant mean and population standard deviation
/// over non-missing entries, with an exactly-zero standard deviation replaced
/// by the infinite-spread sentinel. All-missing variants propagate NaN means;
/// downstream code must guard if that matters.
pub fn unit_stats<T: Dosage>(
    matrix: &ArrayView2<'_, T>,
    missing: &Array2<bool>,
    stats: &mut VariantStats<T>,
) {
    compute_column_statistics(matrix, missing, stats);
}

/// Beta-policy statistics: the allele-dosage mean (sum over count of
/// non-missing entries, domain [0, 2]) and the same population spread and
/// sentinel rule as [`unit_stats`]. The spread decides trained-reuse
/// eligibility only; the beta transform never divides by it.
pub fn beta_stats<T: Dosage>(
    matrix: &ArrayView2<'_, T>,
    missing: &Array2<bool>,
    stats: &mut VariantStats<T>,
) {
    compute_column_statistics(matrix, missing, stats);
}
