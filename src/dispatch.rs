// ========================================================================================
//                          The dispatcher: eligibility & routing
// ========================================================================================
//
// One standardize call flows through here exactly once. The dispatcher normalizes
// the statistics buffer, evaluates the accelerated-path eligibility predicate, and
// routes to either the lane-wise kernel or the portable statistics/transform pair.
// Ineligibility is never an error: it downgrades to the portable path with an
// informational diagnostic.

use crate::kernel::{KernelCall, StatsView};
use crate::mask::missing_mask;
use crate::stats::{self, VariantStats};
use crate::trained::TrainedStandardizer;
use crate::transform;
use crate::types::{Dosage, MatrixLayout, Policy, StandardizeError};
use log::{debug, info};
use ndarray::ArrayViewMut2;

/// Which array backend holds the matrix being standardized.
///
/// This is an explicit configuration value threaded into the engine at
/// construction; nothing here reads the process environment. When the matrix
/// lives with an external backend, the in-process vectorized kernel must not
/// touch its memory and every call takes the portable path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ArrayBackend {
    /// The default in-process backend; the vectorized kernel may run.
    #[default]
    InProcess,
    /// Matrix memory managed by an alternate array backend.
    External,
}

/// Per-call inputs beyond the matrix and policy.
#[derive(Clone, Copy, Debug)]
pub struct StandardizeRequest<'s, T: Dosage> {
    /// Trained statistics to reuse. `None` means train mode: statistics are
    /// computed from the matrix itself.
    pub stats: Option<&'s VariantStats<T>>,
    /// When false, statistics are computed (or validated) but the matrix is
    /// left untouched.
    pub apply_in_place: bool,
    /// When true, the outcome also carries an immutable trained snapshot of
    /// the statistics used.
    pub return_trained: bool,
}

impl<T: Dosage> Default for StandardizeRequest<'_, T> {
    fn default() -> Self {
        Self {
            stats: None,
            apply_in_place: true,
            return_trained: false,
        }
    }
}

/// What a standardize call hands back: the statistics it used (freshly
/// computed, or a conforming copy of the supplied buffer), plus the optional
/// trained snapshot.
#[derive(Debug)]
pub struct StandardizeOutcome<T: Dosage> {
    pub stats: VariantStats<T>,
    pub trained: Option<TrainedStandardizer<T>>,
}

/// The standardization engine.
///
/// Construction fixes the backend; `force_portable` pins every call to the
/// portable reference path, which is how kernel/portable parity is exercised.
#[derive(Clone, Copy, Debug, Default)]
pub struct Standardizer {
    backend: ArrayBackend,
    force_portable: bool,
}

impl Standardizer {
    pub fn new(backend: ArrayBackend) -> Self {
        Self {
            backend,
            force_portable: false,
        }
    }

    pub fn force_portable(mut self, force: bool) -> Self {
        self.force_portable = force;
        self
    }

    pub fn backend(&self) -> ArrayBackend {
        self.backend
    }

    /// Standardizes `matrix` under `policy`, in place when requested.
    ///
    /// Train mode (no supplied statistics) derives per-variant statistics from
    /// the matrix; apply-trained mode reuses the supplied buffer unchanged. The
    /// returned buffer conforms to the matrix's layout; a supplied buffer with
    /// a different layout is copied, never reinterpreted and never mutated.
    pub fn standardize<T: Dosage>(
        &self,
        mut matrix: ArrayViewMut2<'_, T>,
        policy: Policy,
        request: StandardizeRequest<'_, T>,
    ) -> Result<StandardizeOutcome<T>, StandardizeError> {
        policy.validate()?;

        let variants = matrix.ncols();
        let layout = detect_layout(&matrix);
        let reuse_stats = request.stats.is_some();
        let mut stats_buffer = match request.stats {
            Some(supplied) => {
                supplied.ensure_variant_count(variants)?;
                supplied.conforming_copy(layout.unwrap_or(MatrixLayout::RowMajor))
            }
            None => VariantStats::allocate(variants, layout.unwrap_or(MatrixLayout::RowMajor)),
        };

        if !self.force_portable && self.backend == ArrayBackend::InProcess {
            match layout {
                Some(layout) => {
                    let samples = matrix.nrows();
                    let stats_layout = stats_buffer.layout();
                    // Checked again here, defensively: only a single contiguous
                    // segment that covers exactly this view may be handed to
                    // the kernel.
                    if let Some(values) = matrix.as_slice_memory_order_mut() {
                        if let Some(stats_values) = stats_buffer.raw_values_mut() {
                            debug!(
                                "dispatching the {} {} vectorized kernel ({} policy)",
                                T::DTYPE.name(),
                                layout.name(),
                                policy.name()
                            );
                            T::vector_standardize(KernelCall {
                                values,
                                samples,
                                variants,
                                layout,
                                policy,
                                reuse_stats,
                                apply_in_place: request.apply_in_place,
                                stats: StatsView::new(stats_values, stats_layout, variants),
                            });
                            return Ok(finish(stats_buffer, policy, request.return_trained));
                        }
                        info!(
                            "statistics buffer is not contiguous; standardizing with the portable path instead of the vectorized kernel"
                        );
                    } else {
                        info!(
                            "matrix is not a single contiguous segment; standardizing with the portable path instead of the vectorized kernel"
                        );
                    }
                }
                None => {
                    info!(
                        "matrix layout is strided; standardizing with the portable path instead of the vectorized kernel"
                    );
                }
            }
        }

        let missing = missing_mask(&matrix.view());
        match policy {
            Policy::Unit => {
                if !reuse_stats {
                    stats::unit_stats(&matrix.view(), &missing, &mut stats_buffer);
                }
                if request.apply_in_place {
                    transform::unit_apply(&mut matrix, &missing, &stats_buffer);
                }
            }
            Policy::Beta { a, b } => {
                if !reuse_stats {
                    stats::beta_stats(&matrix.view(), &missing, &mut stats_buffer);
                }
                if request.apply_in_place {
                    transform::beta_apply(&mut matrix, &missing, &stats_buffer, a, b, reuse_stats);
                }
            }
        }
        Ok(finish(stats_buffer, policy, request.return_trained))
    }
}

/// The uniform layout of a view, or `None` for strided/mixed storage.
fn detect_layout<T: Dosage>(matrix: &ArrayViewMut2<'_, T>) -> Option<MatrixLayout> {
    if matrix.is_standard_layout() {
        Some(MatrixLayout::RowMajor)
    } else if matrix.t().is_standard_layout() {
        Some(MatrixLayout::ColumnMajor)
    } else {
        None
    }
}

fn finish<T: Dosage>(
    stats: VariantStats<T>,
    policy: Policy,
    return_trained: bool,
) -> StandardizeOutcome<T> {
    let trained = return_trained.then(|| TrainedStandardizer::new(policy, stats.clone()));
    StandardizeOutcome { stats, trained }
}
