//! Per-variant statistics and in-place standardization for dosage matrices.
//!
//! The engine computes per-variant (per-column) mean and spread over an
//! N-sample by M-variant matrix with NaN-encoded missing entries, and uses
//! those statistics to standardize the matrix in place. Two policies are
//! supported, zero-mean/unit-variance ([`Policy::Unit`]) and
//! allele-frequency-weighted with a Beta prior density ([`Policy::Beta`]),
//! each in compute-and-apply mode or apply-trained mode, where statistics from
//! a training matrix are reused on held-out data via a
//! [`TrainedStandardizer`].
//!
//! Per call, the [`Standardizer`] decides whether the lane-wise vectorized
//! kernel is eligible (in-process backend, uniform row- or column-major
//! layout, single contiguous segment) and falls back to the portable
//! reference path otherwise.
#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod density;
pub mod dispatch;
pub mod kernel;
pub mod mask;
pub mod pheno;
pub mod stats;
pub mod trained;
pub mod transform;
pub mod types;

pub use dispatch::{ArrayBackend, StandardizeOutcome, StandardizeRequest, Standardizer};
pub use mask::missing_mask;
pub use pheno::{DEFAULT_MISSING, PhenoError, PhenoTable, SampleId, load_one_pheno, load_pheno};
pub use stats::VariantStats;
pub use trained::TrainedStandardizer;
pub use types::{Dosage, Dtype, MatrixLayout, Policy, Spread, StandardizeError};
