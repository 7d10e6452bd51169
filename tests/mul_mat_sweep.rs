//! End-to-end checks of the `mul_mat` sweep and its building blocks

use mulmat_check::harness::{
    GradCheckConfig, check_gradient, check_mat_mul, check_mat_mul_shape, random_tensor,
};
use mulmat_check::{
    Context, FailurePolicy, Graph, HarnessError, MatMulVariant, SweepConfig, run_sweep,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn seeded(iterations: usize, seed: u64) -> SweepConfig {
    SweepConfig {
        iterations,
        seed: Some(seed),
        ..SweepConfig::default()
    }
}

#[test]
fn test_seeded_sweep_passes() {
    for seed in [0, 1, 0xdead_beef] {
        let report = run_sweep(&seeded(5, seed)).unwrap();
        assert!(report.is_success(), "seed {seed}: {:?}", report.failures);
        assert_eq!(report.cases_run, 5 * 7);
        assert_eq!(report.cases_passed, report.cases_run);
    }
}

#[test]
fn test_aggregate_policy_on_healthy_engine() {
    let config = SweepConfig {
        policy: FailurePolicy::Aggregate,
        ..seeded(3, 77)
    };
    let report = run_sweep(&config).unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(report.gradient_checks, 3 * 3);
}

#[test]
fn test_aggregate_policy_records_verdicts() {
    // No finite-difference estimate can meet a negative absolute bound, so
    // every gradient-checked case fails and the forward-only ones pass.
    let config = SweepConfig {
        policy: FailurePolicy::Aggregate,
        gradcheck: GradCheckConfig {
            max_error_abs: -1.0,
            ..GradCheckConfig::default()
        },
        ..seeded(2, 5)
    };
    let report = run_sweep(&config).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.cases_run, 2 * 7);
    assert_eq!(report.failures.len(), 2 * 3);
    assert_eq!(report.cases_passed, 2 * 4);
    for failure in &report.failures {
        assert!(failure.error.is_verdict());
        assert!(matches!(failure.error, HarnessError::NumericalMismatch(_)));
        assert!(failure.ndims <= 2);
    }
    assert_eq!(report.failures[3].iteration, 1);
    assert_eq!(report.failures[3].seed, 6);
}

#[test]
fn test_ones_scenario() {
    let mut ctx = Context::default();
    let a = ctx.from_vec(&[2, 3], &[1.0; 6]).unwrap();
    let b = ctx.from_vec(&[2, 4], &[1.0; 8]).unwrap();
    let y = ctx.mul_mat(b, a).unwrap();
    check_mat_mul_shape(&ctx, y, b, a).unwrap();
    Graph::build_forward(&ctx, y).compute(&mut ctx).unwrap();

    assert_eq!(ctx.tensor(y).shape(), &[4, 3]);
    assert!(ctx.to_vec(y).iter().all(|&v| v == 2.0));
    assert_eq!(check_mat_mul(&ctx, y, b, a).unwrap(), 12);
}

#[test]
fn test_view_matches_materialised_transpose() {
    let mut ctx = Context::default();
    let mut rng = StdRng::seed_from_u64(2024);
    let x0 = random_tensor(&mut ctx, &mut rng, 3, &[3, 2, 2, 1], -1.0, 1.0).unwrap();
    let src = random_tensor(&mut ctx, &mut rng, 3, &[4, 3, 2, 1], -1.0, 1.0).unwrap();

    let view = ctx.transpose(src).unwrap();
    let copy = ctx.cont(view).unwrap();
    assert!(!ctx.tensor(view).is_contiguous());
    assert!(ctx.tensor(copy).is_contiguous());

    let y_view = ctx.mul_mat(view, x0).unwrap();
    let y_copy = ctx.mul_mat(copy, x0).unwrap();
    let mut g = Graph::build_forward(&ctx, y_view);
    g.build_forward_expand(&ctx, y_copy);
    g.compute(&mut ctx).unwrap();

    assert_eq!(ctx.tensor(y_view).ne, ctx.tensor(y_copy).ne);
    check_mat_mul(&ctx, y_view, view, x0).unwrap();
    check_mat_mul(&ctx, y_copy, copy, x0).unwrap();
    for (v, c) in ctx.to_vec(y_view).iter().zip(ctx.to_vec(y_copy)) {
        assert!((v - c).abs() < 1e-5, "{v} vs {c}");
    }
}

#[test]
fn test_dimension_boundaries() {
    // ndims = 1: a pure dot product
    let mut ctx = Context::default();
    let a = ctx.from_vec(&[3], &[1.0, 2.0, 3.0]).unwrap();
    let b = ctx.from_vec(&[3], &[4.0, -5.0, 6.0]).unwrap();
    let y = ctx.mul_mat(b, a).unwrap();
    Graph::build_forward(&ctx, y).compute(&mut ctx).unwrap();
    assert_eq!(ctx.tensor(y).ne, [1, 1, 1, 1]);
    assert_eq!(ctx.get_f32_1d(y, 0), 12.0);
    check_mat_mul(&ctx, y, b, a).unwrap();

    // ndims = 4: every batch axis in use
    let mut rng = StdRng::seed_from_u64(4);
    let x0 = random_tensor(&mut ctx, &mut rng, 4, &[2, 3, 4, 2], -1.0, 1.0).unwrap();
    let x1 = random_tensor(&mut ctx, &mut rng, 4, &[2, 4, 4, 2], -1.0, 1.0).unwrap();
    let m = ctx.mul_mat(x1, x0).unwrap();
    Graph::build_forward(&ctx, m).compute(&mut ctx).unwrap();
    assert_eq!(ctx.tensor(m).ne, [4, 3, 4, 2]);
    assert_eq!(check_mat_mul(&ctx, m, x1, x0).unwrap(), 4 * 3 * 4 * 2);
}

#[test]
fn test_gradient_check_on_transposed_operand() {
    let mut ctx = Context::default();
    let mut rng = StdRng::seed_from_u64(31);
    let x0 = random_tensor(&mut ctx, &mut rng, 2, &[4, 3, 1, 1], -1.0, 1.0).unwrap();
    let src = random_tensor(&mut ctx, &mut rng, 2, &[2, 4, 1, 1], -1.0, 1.0).unwrap();
    let x1 = ctx.transpose(src).unwrap();
    ctx.set_param(x0).unwrap();
    let m = ctx.mul_mat(x1, x0).unwrap();
    let f = ctx.sum(m).unwrap();

    let summary =
        check_gradient("mul_mat", &mut ctx, &[x0], f, 2, &GradCheckConfig::default()).unwrap();
    assert_eq!(summary.elements, 12);
    check_mat_mul(&ctx, m, x1, x0).unwrap();
}

#[test]
fn test_corrupted_gradient_is_reported() {
    let mut ctx = Context::default();
    let x0 = ctx.from_vec(&[2, 2], &[0.5, -0.25, 0.75, 1.0]).unwrap();
    let x1 = ctx.from_vec(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
    ctx.set_param(x0).unwrap();
    let m = ctx.mul_mat(x1, x0).unwrap();
    let f = ctx.sum(m).unwrap();

    // An absolute bound no finite-difference estimate can meet
    let config = GradCheckConfig {
        max_error_abs: -1.0,
        ..GradCheckConfig::default()
    };
    let err = check_gradient("mul_mat", &mut ctx, &[x0], f, 2, &config).unwrap_err();
    assert!(err.is_verdict());
    assert!(matches!(err, HarnessError::NumericalMismatch(_)));
    assert!(err.to_string().contains("mul_mat: ndims=2, i=0, k=0"));
}

#[test]
fn test_variant_names() {
    assert_eq!(MatMulVariant::Plain.to_string(), "mul_mat");
    assert_eq!(MatMulVariant::Transposed.to_string(), "mul_mat (transposed)");
}
