// ========================================================================================
//                             Shared Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are
// used in one file.

use crate::dispatch::{StandardizeRequest, Standardizer};
use crate::kernel::KernelCall;
use crate::stats::VariantStats;
use ndarray::{ArrayViewMut2, NdFloat};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use thiserror::Error;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// The floating-point widths a dosage matrix may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dtype {
    F32,
    F64,
}

impl Dtype {
    pub fn name(self) -> &'static str {
        match self {
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
        }
    }
}

/// Memory layout of a matrix whose elements occupy a single contiguous segment.
///
/// Strided views (for example a column slice of a wider matrix) have no uniform
/// layout and are handled by the portable path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixLayout {
    /// Row-major ("C") order: one sample's variants are adjacent.
    RowMajor,
    /// Column-major ("F") order: one variant's samples are adjacent.
    ColumnMajor,
}

impl MatrixLayout {
    pub fn name(self) -> &'static str {
        match self {
            MatrixLayout::RowMajor => "row-major",
            MatrixLayout::ColumnMajor => "column-major",
        }
    }
}

/// Element type of a dosage matrix.
///
/// Sealed: exactly `f32` and `f64` qualify, which makes the engine's
/// "unsupported element type" precondition a compile-time guarantee instead of
/// a runtime check.
pub trait Dosage: NdFloat + AddAssign + sealed::Sealed {
    const DTYPE: Dtype;

    fn from_f64(value: f64) -> Self;

    fn into_f64(self) -> f64;

    /// Entry point of the width-specific vectorized kernel. Callers go through
    /// [`crate::Standardizer`], which performs the eligibility checks first.
    fn vector_standardize(call: KernelCall<'_, Self>);
}

impl Dosage for f64 {
    const DTYPE: Dtype = Dtype::F64;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn into_f64(self) -> f64 {
        self
    }

    fn vector_standardize(call: KernelCall<'_, Self>) {
        crate::kernel::f64_lanes::standardize(call);
    }
}

impl Dosage for f32 {
    const DTYPE: Dtype = Dtype::F32;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn into_f64(self) -> f64 {
        f64::from(self)
    }

    fn vector_standardize(call: KernelCall<'_, Self>) {
        crate::kernel::f32_lanes::standardize(call);
    }
}

/// The standardization policy applied to every variant of a matrix.
///
/// This is a closed choice: downstream kernel code matches on it exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Policy {
    /// Zero mean, unit variance per variant.
    Unit,
    /// Center per variant, then scale by the Beta(a, b) density evaluated at
    /// the variant's folded allele frequency.
    Beta { a: f64, b: f64 },
}

impl Policy {
    pub fn name(self) -> &'static str {
        match self {
            Policy::Unit => "unit",
            Policy::Beta { .. } => "beta",
        }
    }

    pub(crate) fn validate(self) -> Result<(), StandardizeError> {
        match self {
            Policy::Unit => Ok(()),
            Policy::Beta { a, b } => {
                if a > 0.0 && b > 0.0 {
                    Ok(())
                } else {
                    Err(StandardizeError::BetaShape { a, b })
                }
            }
        }
    }

    /// Computes statistics from `matrix` and standardizes it in place with the
    /// default engine. Returns the per-variant statistics.
    pub fn standardize<T: Dosage>(
        self,
        matrix: ArrayViewMut2<'_, T>,
    ) -> Result<VariantStats<T>, StandardizeError> {
        let outcome =
            Standardizer::default().standardize(matrix, self, StandardizeRequest::default())?;
        Ok(outcome.stats)
    }
}

/// A variant's dispersion statistic.
///
/// A variant whose observed variance is exactly zero carries no information,
/// so its spread is recorded as `NoVariance` rather than `Observed(0)`. The
/// stored encoding is positive infinity, which makes the unit transform map
/// every future value of such a variant to exactly zero instead of dividing by
/// zero. That zero-divide-yields-zero behavior is a load-bearing invariant of
/// trained-statistics reuse, not an accident of float semantics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Spread<T> {
    Observed(T),
    NoVariance,
}

impl<T: Dosage> Spread<T> {
    /// Classifies a freshly computed standard deviation.
    pub(crate) fn from_computed(spread: T) -> Self {
        if spread == T::zero() {
            Spread::NoVariance
        } else {
            Spread::Observed(spread)
        }
    }

    /// Classifies a value read back from a statistics buffer.
    pub fn from_raw(raw: T) -> Self {
        if raw == T::infinity() {
            Spread::NoVariance
        } else {
            Spread::Observed(raw)
        }
    }

    /// The buffer encoding: the observed value, or infinity for `NoVariance`.
    pub fn raw(self) -> T {
        match self {
            Spread::Observed(spread) => spread,
            Spread::NoVariance => T::infinity(),
        }
    }

    pub fn is_no_variance(self) -> bool {
        matches!(self, Spread::NoVariance)
    }
}

/// Failures of the standardization engine. All of these are precondition
/// violations raised synchronously to the caller; none are retried.
#[derive(Error, Debug, PartialEq)]
pub enum StandardizeError {
    #[error("statistics buffer has {rows} row(s) and {cols} column(s); expected [{expected}, 2]")]
    StatsShape {
        rows: usize,
        cols: usize,
        expected: usize,
    },
    #[error("beta shape parameters must be positive; got a = {a}, b = {b}")]
    BetaShape { a: f64, b: f64 },
    #[error("standardizer '{name}' cannot be trained")]
    Untrainable { name: &'static str },
}
