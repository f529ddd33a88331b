use crate::types::Dosage;
use ndarray::{Array2, ArrayView2};

/// Derives the missing-entry mask of a dosage matrix: true exactly where the
/// element is NaN, i.e. where it fails equality with itself.
///
/// The mask is ephemeral; it is recomputed for every standardize call and
/// never persisted.
pub fn missing_mask<T: Dosage>(matrix: &ArrayView2<'_, T>) -> Array2<bool> {
    matrix.mapv(|value| value.is_nan())
}
