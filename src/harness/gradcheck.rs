use crate::context::Context;
use crate::error::{EngineError, HarnessError, Mismatch};
use crate::graph::Graph;
use crate::tensor::TensorId;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Settings for the finite-difference gradient check
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckConfig {
    /// Half-width of the central-difference probe
    pub eps: f32,
    pub max_error_abs: f32,
    /// `None` leaves the absolute bound as the only gate
    pub max_error_rel: Option<f32>,
    /// Write `<op>-forward.dot` / `<op>-backward.dot` here when set
    pub dot_dir: Option<PathBuf>,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            eps: 1e-3,
            max_error_abs: 1e-3,
            max_error_rel: None,
            dot_dir: None,
        }
    }
}

/// Outcome of a passing gradient check
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GradCheckSummary {
    pub elements: usize,
    pub worst_error_abs: f32,
    pub worst_error_rel: f32,
}

/// Relative error of `analytical` against `numerical`, zero when the
/// numerical derivative is exactly zero
pub fn relative_error(numerical: f32, analytical: f32) -> f32 {
    if numerical != 0.0 {
        (numerical - analytical).abs() / numerical.abs()
    } else {
        0.0
    }
}

/// Whether a numerical/analytical pair fails the gate.
///
/// A pair fails only when it breaks the absolute bound and also the
/// relative bound. The relative bound is skipped when the numerical
/// derivative is exactly zero or when no relative bound is given.
pub fn gradient_mismatch(
    numerical: f32,
    analytical: f32,
    max_error_abs: f32,
    max_error_rel: Option<f32>,
) -> bool {
    let error_abs = (numerical - analytical).abs();
    if error_abs.is_nan() {
        return true;
    }
    if error_abs <= max_error_abs {
        return false;
    }
    match max_error_rel {
        Some(max_rel) if numerical != 0.0 => relative_error(numerical, analytical) > max_rel,
        _ => true,
    }
}

/// Compare backward-pass gradients of `params` against central differences
/// of the scalar objective `f`.
///
/// Every element of every parameter is perturbed by `±eps` in flat-index
/// order, and the whole forward graph is re-executed for each probe. After
/// each probe the backward graph is reset, seeded with `∂f/∂f = 1` and run
/// again before reading the analytical gradient.
pub fn check_gradient(
    op_name: &str,
    ctx: &mut Context,
    params: &[TensorId],
    f: TensorId,
    ndims: usize,
    config: &GradCheckConfig,
) -> Result<GradCheckSummary, HarnessError> {
    let gf = Graph::build_forward(ctx, f);
    let gb = Graph::build_backward(ctx, &gf, false)?;

    gf.compute(ctx)?;
    run_backward(ctx, &gb, f)?;

    if let Some(dir) = &config.dot_dir {
        gf.dump_dot(ctx, None, dir.join(format!("{op_name}-forward.dot")))?;
        gb.dump_dot(ctx, Some(&gf), dir.join(format!("{op_name}-backward.dot")))?;
        debug!(dir = %dir.display(), "wrote graph dumps");
    }

    let eps = config.eps;
    let mut summary = GradCheckSummary::default();
    for (arg, &x) in params.iter().enumerate() {
        let nelements = ctx.tensor(x).nelements();
        for k in 0..nelements {
            let x0 = ctx.get_element(x, k);

            ctx.set_element(x, k, x0 + eps);
            gf.compute(ctx)?;
            let f0 = ctx.get_f32_1d(f, 0);

            ctx.set_element(x, k, x0 - eps);
            gf.compute(ctx)?;
            let f1 = ctx.get_f32_1d(f, 0);

            let numerical = (f0 - f1) / (2.0 * eps);
            ctx.set_element(x, k, x0);

            run_backward(ctx, &gb, f)?;
            let grad = ctx.grad(x).ok_or(EngineError::MissingOperand("param"))?;
            let analytical = ctx.get_element(grad, k);

            let error_abs = (numerical - analytical).abs();
            let error_rel = relative_error(numerical, analytical);
            trace!(arg, k, numerical, analytical, error_abs, "probe");

            if gradient_mismatch(numerical, analytical, config.max_error_abs, config.max_error_rel)
            {
                return Err(Mismatch::Gradient {
                    op: op_name.to_string(),
                    ndims,
                    arg,
                    index: k,
                    numerical,
                    analytical,
                    error_abs,
                    error_rel,
                }
                .into());
            }
            summary.elements += 1;
            summary.worst_error_abs = summary.worst_error_abs.max(error_abs);
            summary.worst_error_rel = summary.worst_error_rel.max(error_rel);
        }
    }
    Ok(summary)
}

fn run_backward(ctx: &mut Context, gb: &Graph, f: TensorId) -> Result<(), HarnessError> {
    gb.reset(ctx);
    let seed = ctx.grad(f).ok_or(EngineError::MissingOperand("objective"))?;
    ctx.set_f32(seed, 1.0);
    gb.compute(ctx)?;
    Ok(())
}
