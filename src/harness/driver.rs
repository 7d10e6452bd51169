use super::gradcheck::{GradCheckConfig, GradCheckSummary, check_gradient};
use super::random::{MAX_EXTENT, random_dims, random_tensor, truncate_dims};
use super::verify::{check_mat_mul, check_mat_mul_shape};
use crate::context::{Context, ContextParams, DEFAULT_MEM_SIZE};
use crate::error::HarnessError;
use crate::graph::Graph;
use crate::tensor::{MAX_DIMS, TensorId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use tracing::{error, info};

/// Outer-loop count when nothing overrides it
pub const DEFAULT_ITERATIONS: usize = 500;

/// How the second operand of `mul_mat` is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatMulVariant {
    /// Freshly allocated, contiguous
    Plain,
    /// A transposed view over a contiguous source
    Transposed,
}

impl MatMulVariant {
    pub const ALL: [MatMulVariant; 2] = [MatMulVariant::Plain, MatMulVariant::Transposed];

    pub fn name(&self) -> &'static str {
        match self {
            MatMulVariant::Plain => "mul_mat",
            MatMulVariant::Transposed => "mul_mat (transposed)",
        }
    }

    /// Dimensionalities swept for this variant; a transpose needs two axes
    pub fn dims(&self) -> RangeInclusive<usize> {
        match self {
            MatMulVariant::Plain => 1..=MAX_DIMS,
            MatMulVariant::Transposed => 2..=MAX_DIMS,
        }
    }
}

impl std::fmt::Display for MatMulVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the sweep does with a failing case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failure and return it
    #[default]
    FailFast,
    /// Record the failure and keep sweeping
    Aggregate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub iterations: usize,
    /// Base seed; drawn from the OS when `None`
    pub seed: Option<u64>,
    pub policy: FailurePolicy,
    /// Operand values are drawn from `[min, max)`
    pub value_range: (f32, f32),
    /// Arena budget of the per-iteration context
    pub mem_size: usize,
    /// Cases with more dimensions only get the forward check
    pub max_grad_dims: usize,
    pub gradcheck: GradCheckConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            iterations: DEFAULT_ITERATIONS,
            seed: None,
            policy: FailurePolicy::default(),
            value_range: (-1.0, 1.0),
            mem_size: DEFAULT_MEM_SIZE,
            max_grad_dims: 2,
            gradcheck: GradCheckConfig::default(),
        }
    }
}

/// One passing case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub variant: MatMulVariant,
    pub ndims: usize,
    pub output: [usize; MAX_DIMS],
    pub lhs: [usize; MAX_DIMS],
    pub rhs: [usize; MAX_DIMS],
    /// `None` when the case was forward-checked only
    pub gradient: Option<GradCheckSummary>,
    pub elements_verified: usize,
}

/// One failing case, with the seed that replays its iteration
#[derive(Debug)]
pub struct CaseFailure {
    pub iteration: usize,
    pub seed: u64,
    pub variant: MatMulVariant,
    pub ndims: usize,
    pub error: HarnessError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub base_seed: u64,
    pub iterations: usize,
    pub cases_run: usize,
    pub cases_passed: usize,
    pub gradient_checks: usize,
    pub elements_verified: usize,
    pub failures: Vec<CaseFailure>,
}

impl SweepReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cases_passed == self.cases_run
    }

    fn record(&mut self, case: &CaseReport) {
        self.cases_passed += 1;
        self.elements_verified += case.elements_verified;
        if case.gradient.is_some() {
            self.gradient_checks += 1;
        }
    }
}

/// Seed of a single iteration, so any iteration can be replayed alone
pub fn iteration_seed(base_seed: u64, iteration: usize) -> u64 {
    base_seed.wrapping_add(iteration as u64)
}

/// Run every variant at every dimensionality for `config.iterations` rounds.
///
/// Each iteration gets its own generator and its own arena, released when
/// the iteration ends. Under [`FailurePolicy::FailFast`] the first failure
/// is returned as the error; otherwise failures are collected in the report.
pub fn run_sweep(config: &SweepConfig) -> Result<SweepReport, HarnessError> {
    let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
    info!(base_seed, iterations = config.iterations, "starting sweep");

    let mut report = SweepReport {
        base_seed,
        iterations: config.iterations,
        ..SweepReport::default()
    };
    let mut ctx = Context::new(ContextParams {
        mem_size: config.mem_size,
    });

    for iteration in 0..config.iterations {
        info!("iter:{iteration}/{}", config.iterations);
        let seed = iteration_seed(base_seed, iteration);
        let mut rng = StdRng::seed_from_u64(seed);
        let base = random_dims(&mut rng, MAX_DIMS);

        for variant in MatMulVariant::ALL {
            for ndims in variant.dims() {
                report.cases_run += 1;
                match run_case(&mut ctx, &mut rng, variant, ndims, &base, config) {
                    Ok(case) => report.record(&case),
                    Err(err) => {
                        error!(iteration, seed, %variant, ndims, "{err}");
                        if config.policy == FailurePolicy::FailFast {
                            return Err(err);
                        }
                        report.failures.push(CaseFailure {
                            iteration,
                            seed,
                            variant,
                            ndims,
                            error: err,
                        });
                    }
                }
            }
        }
        ctx.release();
    }
    Ok(report)
}

/// Build, check and verify one `mul_mat` case.
///
/// The first operand takes `base` truncated to `ndims` and is the
/// parameter. The objective is `sum(mul_mat(second, first))`.
pub fn run_case(
    ctx: &mut Context,
    rng: &mut impl Rng,
    variant: MatMulVariant,
    ndims: usize,
    base: &[usize; MAX_DIMS],
    config: &SweepConfig,
) -> Result<CaseReport, HarnessError> {
    if !variant.dims().contains(&ndims) {
        return Err(HarnessError::InvalidDims(ndims));
    }
    let (fmin, fmax) = config.value_range;
    let ne0 = truncate_dims(base, ndims);
    let x0 = random_tensor(ctx, rng, ndims, &ne0, fmin, fmax)?;
    let x1 = second_operand(ctx, rng, variant, ndims, &ne0, config)?;

    ctx.set_param(x0)?;
    let m = ctx.mul_mat(x1, x0)?;
    let f = ctx.sum(m)?;

    let (output, lhs, rhs) = (ctx.tensor(m).ne, ctx.tensor(x1).ne, ctx.tensor(x0).ne);
    info!("testing: mul_mat, {output:?} = {lhs:?} * {rhs:?}");
    check_mat_mul_shape(ctx, m, x1, x0)?;

    let gradient = if ndims <= config.max_grad_dims {
        Some(check_gradient(
            "mul_mat",
            ctx,
            &[x0],
            f,
            ndims,
            &config.gradcheck,
        )?)
    } else {
        Graph::build_forward(ctx, m).compute(ctx)?;
        None
    };

    let elements_verified = check_mat_mul(ctx, m, x1, x0)?;
    Ok(CaseReport {
        variant,
        ndims,
        output,
        lhs,
        rhs,
        gradient,
        elements_verified,
    })
}

fn second_operand(
    ctx: &mut Context,
    rng: &mut impl Rng,
    variant: MatMulVariant,
    ndims: usize,
    ne0: &[usize; MAX_DIMS],
    config: &SweepConfig,
) -> Result<TensorId, HarnessError> {
    let (fmin, fmax) = config.value_range;
    let mut ne1 = *ne0;
    match variant {
        MatMulVariant::Plain => {
            ne1[1] = rng.random_range(1..=MAX_EXTENT);
            let ne1 = truncate_dims(&ne1, ndims);
            random_tensor(ctx, rng, ndims, &ne1, fmin, fmax)
        }
        MatMulVariant::Transposed => {
            ne1[1] = ne0[0];
            ne1[0] = rng.random_range(1..=MAX_EXTENT);
            let src = random_tensor(ctx, rng, ndims, &ne1, fmin, fmax)?;
            Ok(ctx.transpose(src)?)
        }
    }
}
