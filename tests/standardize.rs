//! End-to-end behavior of the standardization engine: reference scenarios,
//! train/apply reuse, missing handling, kernel/portable parity, and
//! persistence of trained snapshots.

use approx::assert_relative_eq;
use ndarray::{Array2, ShapeBuilder, array, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Binomial, Distribution, Uniform};
use varnorm::{
    ArrayBackend, Policy, StandardizeRequest, Standardizer, TrainedStandardizer, VariantStats,
};

/// A seeded dosage matrix: hard-call dosages in {0, 1, 2} with a sprinkling of
/// missing entries.
fn random_dosages(samples: usize, variants: usize, missing_rate: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dosage = Binomial::new(2, 0.3).expect("valid binomial");
    let gap = Uniform::new(0.0, 1.0);
    Array2::from_shape_fn((samples, variants), |_| {
        if gap.sample(&mut rng) < missing_rate {
            f64::NAN
        } else {
            dosage.sample(&mut rng) as f64
        }
    })
}

/// The same logical matrix in column-major storage.
fn to_column_major(matrix: &Array2<f64>) -> Array2<f64> {
    matrix.t().to_owned().reversed_axes()
}

fn assert_all_close(left: &Array2<f64>, right: &Array2<f64>, tolerance: f64) {
    assert_eq!(left.dim(), right.dim());
    for (l, r) in left.iter().zip(right.iter()) {
        assert!(
            (l - r).abs() < tolerance,
            "values differ beyond tolerance: {l} vs {r}"
        );
    }
}

#[test]
fn unit_standardization_yields_zero_mean_unit_variance() {
    let mut matrix = random_dosages(200, 12, 0.0, 7);
    let stats = Policy::Unit.standardize(matrix.view_mut()).unwrap();

    for variant in 0..12 {
        if stats.spread(variant).is_no_variance() {
            continue;
        }
        let column = matrix.column(variant);
        let mean = column.sum() / column.len() as f64;
        let variance =
            column.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / column.len() as f64;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-10);
        assert_relative_eq!(variance.sqrt(), 1.0, max_relative = 1e-10);
    }
}

#[test]
fn concrete_unit_scenario_with_one_missing_entry() {
    let mut matrix = array![[0.0_f64, 2.0], [1.0, f64::NAN], [2.0, 0.0]];
    let stats = Policy::Unit.standardize(matrix.view_mut()).unwrap();

    assert_relative_eq!(stats.mean(0), 1.0, max_relative = 1e-12);
    assert_relative_eq!(stats.spread(0).raw(), 0.8165, epsilon = 1e-4);
    assert_relative_eq!(stats.mean(1), 1.0, max_relative = 1e-12);
    assert_relative_eq!(stats.spread(1).raw(), 1.0, max_relative = 1e-12);

    assert_relative_eq!(matrix[[0, 0]], -1.2247, epsilon = 1e-4);
    assert_relative_eq!(matrix[[1, 0]], 0.0, epsilon = 1e-12);
    assert_relative_eq!(matrix[[2, 0]], 1.2247, epsilon = 1e-4);
    assert_relative_eq!(matrix[[0, 1]], 1.0, max_relative = 1e-12);
    assert_eq!(matrix[[1, 1]], 0.0, "missing entry must be forced to zero");
    assert_relative_eq!(matrix[[2, 1]], -1.0, max_relative = 1e-12);
}

#[test]
fn zero_variance_training_column_maps_any_new_data_to_zero() {
    // Variant 0 is constant in training; variant 1 varies.
    let mut train = array![[7.0_f64, 0.0], [7.0, 1.0], [7.0, 2.0]];
    let outcome = Standardizer::default()
        .standardize(
            train.view_mut(),
            Policy::Unit,
            StandardizeRequest {
                return_trained: true,
                ..StandardizeRequest::default()
            },
        )
        .unwrap();
    let trained = outcome.trained.expect("trained snapshot requested");
    assert!(trained.stats().spread(0).is_no_variance());

    // Training already maps the constant column to exact zeros.
    for row in 0..3 {
        assert_eq!(train[[row, 0]], 0.0);
    }

    // Arbitrary new data in that column is forced to exactly zero too.
    let mut test = array![[123.0_f64, 1.0], [-5.0, 0.0], [0.25, 2.0]];
    trained
        .apply(&Standardizer::default(), test.view_mut())
        .unwrap();
    for row in 0..3 {
        assert_eq!(test[[row, 0]], 0.0);
    }
}

#[test]
fn missing_entries_are_exactly_zero_for_every_policy_and_mode() {
    let policies = [Policy::Unit, Policy::Beta { a: 1.0, b: 25.0 }];
    for policy in policies {
        let mut train = random_dosages(60, 9, 0.2, 11);
        let missing: Vec<(usize, usize)> = train
            .indexed_iter()
            .filter(|(_, value)| value.is_nan())
            .map(|(index, _)| index)
            .collect();
        assert!(!missing.is_empty(), "fixture should contain missing entries");

        let outcome = Standardizer::default()
            .standardize(train.view_mut(), policy, StandardizeRequest::default())
            .unwrap();
        for &index in &missing {
            assert_eq!(train[index], 0.0);
        }

        // Apply-trained mode on a fresh matrix with its own missing pattern.
        let mut test = random_dosages(40, 9, 0.2, 13);
        let test_missing: Vec<(usize, usize)> = test
            .indexed_iter()
            .filter(|(_, value)| value.is_nan())
            .map(|(index, _)| index)
            .collect();
        Standardizer::default()
            .standardize(
                test.view_mut(),
                policy,
                StandardizeRequest {
                    stats: Some(&outcome.stats),
                    ..StandardizeRequest::default()
                },
            )
            .unwrap();
        for &index in &test_missing {
            assert_eq!(test[index], 0.0);
        }
    }
}

#[test]
fn training_then_reapplying_its_own_statistics_is_idempotent() {
    for policy in [Policy::Unit, Policy::Beta { a: 2.0, b: 5.0 }] {
        let source = random_dosages(50, 8, 0.1, 17);

        let mut trained_pass = source.clone();
        let outcome = Standardizer::default()
            .standardize(trained_pass.view_mut(), policy, StandardizeRequest::default())
            .unwrap();

        let mut reuse_pass = source.clone();
        Standardizer::default()
            .standardize(
                reuse_pass.view_mut(),
                policy,
                StandardizeRequest {
                    stats: Some(&outcome.stats),
                    ..StandardizeRequest::default()
                },
            )
            .unwrap();

        assert_eq!(trained_pass, reuse_pass);
    }
}

#[test]
fn beta_weights_are_invariant_under_frequency_folding() {
    // Variant 0 has mean 0.4 (frequency 0.2); variant 1 mirrors it with mean
    // 1.6 (frequency 0.8, folded back to 0.2). Centered values are negatives
    // of each other, so equal weights mean output column 1 == -column 0.
    let mut matrix = array![
        [0.0_f64, 2.0],
        [0.0, 2.0],
        [0.0, 2.0],
        [1.0, 1.0],
        [1.0, 1.0]
    ];
    Policy::Beta { a: 1.0, b: 25.0 }
        .standardize(matrix.view_mut())
        .unwrap();
    for row in 0..5 {
        assert_relative_eq!(matrix[[row, 0]], -matrix[[row, 1]], max_relative = 1e-10);
    }
    assert!(matrix[[0, 0]].abs() > 0.0, "weights should be non-trivial");
}

#[test]
fn portable_and_accelerated_paths_agree() {
    let accelerated_engine = Standardizer::new(ArrayBackend::InProcess);
    let portable_engine = Standardizer::default().force_portable(true);
    let policies = [Policy::Unit, Policy::Beta { a: 1.0, b: 25.0 }];

    for policy in policies {
        for column_major in [false, true] {
            let base = random_dosages(37, 11, 0.15, 23);
            let mut fast = if column_major {
                to_column_major(&base)
            } else {
                base.clone()
            };
            let mut slow = fast.clone();

            let fast_outcome = accelerated_engine
                .standardize(fast.view_mut(), policy, StandardizeRequest::default())
                .unwrap();
            let slow_outcome = portable_engine
                .standardize(slow.view_mut(), policy, StandardizeRequest::default())
                .unwrap();

            assert_all_close(&fast, &slow, 1e-9);
            assert_all_close(
                &fast_outcome.stats.as_array().to_owned(),
                &slow_outcome.stats.as_array().to_owned(),
                1e-9,
            );

            // Apply-trained parity on held-out data, reusing the same stats.
            let held_out = random_dosages(21, 11, 0.15, 29);
            let mut fast_test = if column_major {
                to_column_major(&held_out)
            } else {
                held_out.clone()
            };
            let mut slow_test = fast_test.clone();
            accelerated_engine
                .standardize(
                    fast_test.view_mut(),
                    policy,
                    StandardizeRequest {
                        stats: Some(&fast_outcome.stats),
                        ..StandardizeRequest::default()
                    },
                )
                .unwrap();
            portable_engine
                .standardize(
                    slow_test.view_mut(),
                    policy,
                    StandardizeRequest {
                        stats: Some(&fast_outcome.stats),
                        ..StandardizeRequest::default()
                    },
                )
                .unwrap();
            assert_all_close(&fast_test, &slow_test, 1e-9);
        }
    }
}

#[test]
fn portable_and_accelerated_paths_agree_for_f32() {
    for policy in [Policy::Unit, Policy::Beta { a: 1.0, b: 25.0 }] {
        for column_major in [false, true] {
            let base: Array2<f32> = random_dosages(20, 10, 0.15, 47).mapv(|value| value as f32);
            let source = if column_major {
                base.t().to_owned().reversed_axes()
            } else {
                base
            };
            let mut fast = source.clone();
            let mut slow = source.clone();

            let fast_stats = Standardizer::default()
                .standardize(fast.view_mut(), policy, StandardizeRequest::default())
                .unwrap()
                .stats;
            let slow_stats = Standardizer::default()
                .force_portable(true)
                .standardize(slow.view_mut(), policy, StandardizeRequest::default())
                .unwrap()
                .stats;

            for (l, r) in fast.iter().zip(slow.iter()) {
                assert!((l - r).abs() < 1e-4);
            }
            for variant in 0..10 {
                assert!((fast_stats.mean(variant) - slow_stats.mean(variant)).abs() < 1e-4);
                assert_eq!(
                    fast_stats.spread(variant).is_no_variance(),
                    slow_stats.spread(variant).is_no_variance()
                );
            }
        }
    }

    // A constant variant is degenerate through the kernel path too.
    let mut constant: Array2<f32> = Array2::from_elem((12, 2), 1.0);
    constant.column_mut(1).assign(&ndarray::Array1::linspace(0.0, 2.0, 12));
    let stats = Policy::Unit.standardize(constant.view_mut()).unwrap();
    assert!(stats.spread(0).is_no_variance());
    assert!(!stats.spread(1).is_no_variance());
    assert!(constant.column(0).iter().all(|&value| value == 0.0));
}

#[test]
fn strided_views_fall_back_without_touching_surrounding_memory() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Even variants of a wider backing matrix are standardized through a
    // strided view; odd variants must come through untouched.
    let backing = random_dosages(30, 10, 0.1, 31);
    let mut strided_backing = backing.clone();
    let mut strided = strided_backing.slice_mut(s![.., ..;2]);

    let mut contiguous = Array2::zeros((30, 5));
    contiguous.assign(&backing.slice(s![.., ..;2]));

    let strided_stats = Standardizer::default()
        .standardize(strided.view_mut(), Policy::Unit, StandardizeRequest::default())
        .unwrap()
        .stats;
    let contiguous_stats = Policy::Unit.standardize(contiguous.view_mut()).unwrap();

    for variant in 0..5 {
        assert_relative_eq!(
            strided_stats.mean(variant),
            contiguous_stats.mean(variant),
            epsilon = 1e-10
        );
    }
    for (&strided_value, &contiguous_value) in strided_backing
        .slice(s![.., ..;2])
        .iter()
        .zip(contiguous.iter())
    {
        assert_relative_eq!(strided_value, contiguous_value, epsilon = 1e-10);
    }
    for (index, (&after, &before)) in strided_backing
        .slice(s![.., 1..;2])
        .iter()
        .zip(backing.slice(s![.., 1..;2]).iter())
        .enumerate()
    {
        let same = after == before || (after.is_nan() && before.is_nan());
        assert!(same, "untouched variant entry {index} was modified");
    }
}

#[test]
fn supplied_stats_in_a_foreign_layout_are_conformed_not_reinterpreted() {
    let source = random_dosages(25, 6, 0.0, 37);
    let mut train = source.clone();
    let stats = Policy::Unit.standardize(train.view_mut()).unwrap();

    // Re-house the statistics in a column-major buffer and reuse them on a
    // row-major matrix; the engine must copy, and results must not change.
    let column_major_stats = VariantStats::from_array(
        Array2::from_shape_fn((6, 2).f(), |index| stats.as_array()[index]),
    )
    .unwrap();

    let mut from_original = source.clone();
    let mut from_conformed = source.clone();
    Standardizer::default()
        .standardize(
            from_original.view_mut(),
            Policy::Unit,
            StandardizeRequest {
                stats: Some(&stats),
                ..StandardizeRequest::default()
            },
        )
        .unwrap();
    Standardizer::default()
        .standardize(
            from_conformed.view_mut(),
            Policy::Unit,
            StandardizeRequest {
                stats: Some(&column_major_stats),
                ..StandardizeRequest::default()
            },
        )
        .unwrap();

    assert_eq!(from_original, from_conformed);
    // The caller's buffer is untouched.
    assert_eq!(
        column_major_stats.as_array(),
        &Array2::from_shape_fn((6, 2).f(), |index| stats.as_array()[index])
    );
}

#[test]
fn trained_snapshots_survive_serialization() {
    let mut train = random_dosages(40, 7, 0.1, 41);
    let outcome = Standardizer::default()
        .standardize(
            train.view_mut(),
            Policy::Beta { a: 1.0, b: 25.0 },
            StandardizeRequest {
                return_trained: true,
                ..StandardizeRequest::default()
            },
        )
        .unwrap();
    let trained = outcome.trained.unwrap();

    let encoded = serde_json::to_string(&trained).expect("serialize snapshot");
    let decoded: TrainedStandardizer<f64> =
        serde_json::from_str(&encoded).expect("deserialize snapshot");
    assert_eq!(decoded, trained);

    let held_out = random_dosages(15, 7, 0.1, 43);
    let mut via_original = held_out.clone();
    let mut via_decoded = held_out.clone();
    trained
        .apply(&Standardizer::default(), via_original.view_mut())
        .unwrap();
    decoded
        .apply(&Standardizer::default(), via_decoded.view_mut())
        .unwrap();
    assert_eq!(via_original, via_decoded);
}
