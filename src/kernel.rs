// ========================================================================================
//
//                    The kernel: a lane-wise standardization engine
//
// ========================================================================================
//
// This module contains the accelerated path of the standardizer. It operates on a
// single contiguous matrix segment whose layout has already been validated by the
// dispatcher, and it contains no eligibility logic of its own. The portable
// statistics/transform pair is the reference semantics; the four entry points here
// ({f32, f64} x {row-major, column-major}) must agree with it for every policy and
// mode, including the infinite-spread sentinel and the trained-mode scrub rule.

use crate::types::{MatrixLayout, Policy};

/// A validated view over the backing storage of an M x 2 statistics buffer.
///
/// The buffer's layout matches the matrix being standardized, so the slot of a
/// statistic depends on it: row-major interleaves (mean, spread) pairs, while
/// column-major stores all means followed by all spreads.
pub struct StatsView<'a, T> {
    values: &'a mut [T],
    layout: MatrixLayout,
    variants: usize,
}

impl<'a, T: Copy> StatsView<'a, T> {
    pub(crate) fn new(values: &'a mut [T], layout: MatrixLayout, variants: usize) -> Self {
        debug_assert!(values.len() == variants * 2);
        Self {
            values,
            layout,
            variants,
        }
    }

    #[inline]
    fn slot(&self, variant: usize, statistic: usize) -> usize {
        match self.layout {
            MatrixLayout::RowMajor => variant * 2 + statistic,
            MatrixLayout::ColumnMajor => statistic * self.variants + variant,
        }
    }

    #[inline]
    fn mean(&self, variant: usize) -> T {
        self.values[self.slot(variant, 0)]
    }

    #[inline]
    fn spread(&self, variant: usize) -> T {
        self.values[self.slot(variant, 1)]
    }

    #[inline]
    fn set(&mut self, variant: usize, mean: T, spread: T) {
        let mean_slot = self.slot(variant, 0);
        let spread_slot = self.slot(variant, 1);
        self.values[mean_slot] = mean;
        self.values[spread_slot] = spread;
    }
}

/// One fully validated kernel invocation: a contiguous matrix segment, its
/// dimensions and layout, the policy, the mode flags, and a conforming
/// statistics buffer.
pub struct KernelCall<'a, T> {
    pub(crate) values: &'a mut [T],
    pub(crate) samples: usize,
    pub(crate) variants: usize,
    pub(crate) layout: MatrixLayout,
    pub(crate) policy: Policy,
    pub(crate) reuse_stats: bool,
    pub(crate) apply_in_place: bool,
    pub(crate) stats: StatsView<'a, T>,
}

macro_rules! lane_kernel {
    ($mod_name:ident, $elem:ty, $vector:ty, $lanes:expr, $doc:literal) => {
        #[doc = $doc]
        pub mod $mod_name {
            use super::KernelCall;
            #[cfg(test)]
            use super::StatsView;
            use crate::density::beta_weight;
            use wide::CmpEq;
            use crate::types::{MatrixLayout, Policy};

            const LANES: usize = $lanes;
            type V = $vector;

            #[inline]
            fn splat(value: $elem) -> V {
                V::from([value; LANES])
            }

            #[inline]
            fn load(chunk: &[$elem]) -> V {
                let mut lanes: [$elem; LANES] = [0.0; LANES];
                lanes.copy_from_slice(chunk);
                V::from(lanes)
            }

            #[inline]
            fn horizontal_sum(vector: V) -> $elem {
                vector.to_array().iter().copied().sum()
            }

            #[inline]
            fn finalize_spread(spread: $elem) -> $elem {
                if spread == 0.0 { <$elem>::INFINITY } else { spread }
            }

            /// NaN-aware sum and observation count of one contiguous column.
            /// The NaN test is a lane-wise self-equality compare.
            fn sum_and_count(column: &[$elem]) -> ($elem, $elem) {
                let zero = splat(0.0);
                let one = splat(1.0);
                let mut sum_v = zero;
                let mut count_v = zero;
                let mut chunks = column.chunks_exact(LANES);
                for chunk in chunks.by_ref() {
                    let v = load(chunk);
                    let observed = v.cmp_eq(v);
                    sum_v += observed.blend(v, zero);
                    count_v += observed.blend(one, zero);
                }
                let mut sum = horizontal_sum(sum_v);
                let mut count = horizontal_sum(count_v);
                for &value in chunks.remainder() {
                    if !value.is_nan() {
                        sum += value;
                        count += 1.0;
                    }
                }
                (sum, count)
            }

            fn sum_sq_dev(column: &[$elem], mean: $elem) -> $elem {
                let zero = splat(0.0);
                let mean_v = splat(mean);
                let mut acc = zero;
                let mut chunks = column.chunks_exact(LANES);
                for chunk in chunks.by_ref() {
                    let v = load(chunk);
                    let observed = v.cmp_eq(v);
                    let deviation = v - mean_v;
                    acc += observed.blend(deviation * deviation, zero);
                }
                let mut sum = horizontal_sum(acc);
                for &value in chunks.remainder() {
                    if !value.is_nan() {
                        let deviation = value - mean;
                        sum += deviation * deviation;
                    }
                }
                sum
            }

            fn apply_unit(column: &mut [$elem], mean: $elem, spread: $elem) {
                let zero = splat(0.0);
                let mean_v = splat(mean);
                let spread_v = splat(spread);
                let mut chunks = column.chunks_exact_mut(LANES);
                for chunk in chunks.by_ref() {
                    let v = load(chunk);
                    let observed = v.cmp_eq(v);
                    let result = observed.blend((v - mean_v) / spread_v, zero);
                    chunk.copy_from_slice(&result.to_array());
                }
                for value in chunks.into_remainder() {
                    *value = if value.is_nan() {
                        0.0
                    } else {
                        (*value - mean) / spread
                    };
                }
            }

            fn apply_beta(column: &mut [$elem], mean: $elem, weight: $elem) {
                let zero = splat(0.0);
                let mean_v = splat(mean);
                let weight_v = splat(weight);
                let mut chunks = column.chunks_exact_mut(LANES);
                for chunk in chunks.by_ref() {
                    let v = load(chunk);
                    let observed = v.cmp_eq(v);
                    let result = observed.blend((v - mean_v) * weight_v, zero);
                    chunk.copy_from_slice(&result.to_array());
                }
                for value in chunks.into_remainder() {
                    *value = if value.is_nan() {
                        0.0
                    } else {
                        (*value - mean) * weight
                    };
                }
            }

            fn column_major(call: KernelCall<'_, $elem>) {
                let KernelCall {
                    values,
                    samples,
                    variants,
                    policy,
                    reuse_stats,
                    apply_in_place,
                    mut stats,
                    ..
                } = call;
                for variant in 0..variants {
                    let column = &mut values[variant * samples..(variant + 1) * samples];
                    let (mean, spread) = if reuse_stats {
                        (stats.mean(variant), stats.spread(variant))
                    } else {
                        let (sum, count) = sum_and_count(column);
                        let mean = sum / count;
                        let spread = finalize_spread((sum_sq_dev(column, mean) / count).sqrt());
                        stats.set(variant, mean, spread);
                        (mean, spread)
                    };
                    if !apply_in_place {
                        continue;
                    }
                    match policy {
                        Policy::Unit => apply_unit(column, mean, spread),
                        Policy::Beta { a, b } => {
                            if reuse_stats && spread == <$elem>::INFINITY {
                                column.fill(0.0);
                            } else {
                                let weight = beta_weight(f64::from(mean), a, b) as $elem;
                                apply_beta(column, mean, weight);
                            }
                        }
                    }
                }
            }

            /// Per-variant sums and observation counts of a row-major segment,
            /// accumulated a row at a time across lane-wide variant blocks.
            fn column_sums(values: &[$elem], variants: usize) -> (Vec<$elem>, Vec<$elem>) {
                let mut sums: Vec<$elem> = vec![0.0; variants];
                let mut counts: Vec<$elem> = vec![0.0; variants];
                let zero = splat(0.0);
                let one = splat(1.0);
                for row in values.chunks_exact(variants) {
                    let mut row_chunks = row.chunks_exact(LANES);
                    let mut sum_chunks = sums.chunks_exact_mut(LANES);
                    let mut count_chunks = counts.chunks_exact_mut(LANES);
                    for ((chunk, sum_chunk), count_chunk) in row_chunks
                        .by_ref()
                        .zip(sum_chunks.by_ref())
                        .zip(count_chunks.by_ref())
                    {
                        let v = load(chunk);
                        let observed = v.cmp_eq(v);
                        let sum = load(sum_chunk) + observed.blend(v, zero);
                        sum_chunk.copy_from_slice(&sum.to_array());
                        let count = load(count_chunk) + observed.blend(one, zero);
                        count_chunk.copy_from_slice(&count.to_array());
                    }
                    let tail = row_chunks.remainder();
                    let start = variants - tail.len();
                    for (index, &value) in tail.iter().enumerate() {
                        if !value.is_nan() {
                            sums[start + index] += value;
                            counts[start + index] += 1.0;
                        }
                    }
                }
                (sums, counts)
            }

            fn column_sq_devs(values: &[$elem], variants: usize, means: &[$elem]) -> Vec<$elem> {
                let mut devs: Vec<$elem> = vec![0.0; variants];
                let zero = splat(0.0);
                for row in values.chunks_exact(variants) {
                    let mut row_chunks = row.chunks_exact(LANES);
                    let mut mean_chunks = means.chunks_exact(LANES);
                    let mut dev_chunks = devs.chunks_exact_mut(LANES);
                    for ((chunk, mean_chunk), dev_chunk) in row_chunks
                        .by_ref()
                        .zip(mean_chunks.by_ref())
                        .zip(dev_chunks.by_ref())
                    {
                        let v = load(chunk);
                        let observed = v.cmp_eq(v);
                        let deviation = v - load(mean_chunk);
                        let acc = load(dev_chunk) + observed.blend(deviation * deviation, zero);
                        dev_chunk.copy_from_slice(&acc.to_array());
                    }
                    let tail = row_chunks.remainder();
                    let start = variants - tail.len();
                    for (index, &value) in tail.iter().enumerate() {
                        if !value.is_nan() {
                            let deviation = value - means[start + index];
                            devs[start + index] += deviation * deviation;
                        }
                    }
                }
                devs
            }

            /// Per-variant (offset, factor) pairs so the row transform is a
            /// single fused form: `(v - offset) * factor`, missing to zero.
            fn transform_coefficients(
                policy: Policy,
                reuse_stats: bool,
                means: Vec<$elem>,
                spreads: &[$elem],
            ) -> (Vec<$elem>, Vec<$elem>) {
                match policy {
                    Policy::Unit => {
                        let factors = spreads.iter().map(|&spread| 1.0 / spread).collect();
                        (means, factors)
                    }
                    Policy::Beta { a, b } => {
                        let mut offsets = means;
                        let mut factors: Vec<$elem> = Vec::with_capacity(offsets.len());
                        for (variant, offset) in offsets.iter_mut().enumerate() {
                            if reuse_stats && spreads[variant] == <$elem>::INFINITY {
                                // Degenerate training variant: a zero offset and
                                // weight force the whole column to zero.
                                *offset = 0.0;
                                factors.push(0.0);
                            } else {
                                factors.push(beta_weight(f64::from(*offset), a, b) as $elem);
                            }
                        }
                        (offsets, factors)
                    }
                }
            }

            fn transform_row(row: &mut [$elem], offsets: &[$elem], factors: &[$elem]) {
                let zero = splat(0.0);
                let mut row_chunks = row.chunks_exact_mut(LANES);
                let mut offset_chunks = offsets.chunks_exact(LANES);
                let mut factor_chunks = factors.chunks_exact(LANES);
                for ((chunk, offset_chunk), factor_chunk) in row_chunks
                    .by_ref()
                    .zip(offset_chunks.by_ref())
                    .zip(factor_chunks.by_ref())
                {
                    let v = load(chunk);
                    let observed = v.cmp_eq(v);
                    let result =
                        observed.blend((v - load(offset_chunk)) * load(factor_chunk), zero);
                    chunk.copy_from_slice(&result.to_array());
                }
                let tail = row_chunks.into_remainder();
                let start = offsets.len() - tail.len();
                for (index, value) in tail.iter_mut().enumerate() {
                    let variant = start + index;
                    *value = if value.is_nan() {
                        0.0
                    } else {
                        (*value - offsets[variant]) * factors[variant]
                    };
                }
            }

            fn row_major(call: KernelCall<'_, $elem>) {
                let KernelCall {
                    values,
                    variants,
                    policy,
                    reuse_stats,
                    apply_in_place,
                    mut stats,
                    ..
                } = call;
                if variants == 0 {
                    return;
                }
                let (means, spreads) = if reuse_stats {
                    let mut means: Vec<$elem> = Vec::with_capacity(variants);
                    let mut spreads: Vec<$elem> = Vec::with_capacity(variants);
                    for variant in 0..variants {
                        means.push(stats.mean(variant));
                        spreads.push(stats.spread(variant));
                    }
                    (means, spreads)
                } else {
                    let (sums, counts) = column_sums(values, variants);
                    let means: Vec<$elem> = sums
                        .iter()
                        .zip(counts.iter())
                        .map(|(&sum, &count)| sum / count)
                        .collect();
                    let devs = column_sq_devs(values, variants, &means);
                    let spreads: Vec<$elem> = devs
                        .iter()
                        .zip(counts.iter())
                        .map(|(&dev, &count)| finalize_spread((dev / count).sqrt()))
                        .collect();
                    for variant in 0..variants {
                        stats.set(variant, means[variant], spreads[variant]);
                    }
                    (means, spreads)
                };
                if !apply_in_place {
                    return;
                }
                let (offsets, factors) =
                    transform_coefficients(policy, reuse_stats, means, &spreads);
                for row in values.chunks_exact_mut(variants) {
                    transform_row(row, &offsets, &factors);
                }
            }

            /// Standardizes one contiguous matrix segment. Statistics and
            /// transform semantics match the portable path; only the traversal
            /// is lane-wise.
            pub fn standardize(call: KernelCall<'_, $elem>) {
                match call.layout {
                    MatrixLayout::ColumnMajor => column_major(call),
                    MatrixLayout::RowMajor => row_major(call),
                }
            }

        }
    };
}

lane_kernel!(
    f64_lanes,
    f64,
    wide::f64x4,
    4,
    "Vectorized standardizer over `f64` segments (4 lanes)."
);
lane_kernel!(
    f32_lanes,
    f32,
    wide::f32x8,
    8,
    "Vectorized standardizer over `f32` segments (8 lanes)."
);
