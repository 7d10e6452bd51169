use crate::context::Context;
use crate::error::{HarnessError, Mismatch};
use crate::ops::matmul::mul_mat_shape;
use crate::tensor::{TensorId, coords};
use std::fmt::Write as _;
use tracing::{Level, debug};

/// Largest accepted `|reference - y|` for a single output element
pub const MAT_MUL_TOLERANCE: f32 = 1e-5;

/// Check that `y`'s extents follow `y = mul_mat(a, b)`: `[a1, b1, a2, a3]`
pub fn check_mat_mul_shape(
    ctx: &Context,
    y: TensorId,
    a: TensorId,
    b: TensorId,
) -> Result<(), HarnessError> {
    let (ty, ta, tb) = (ctx.tensor(y), ctx.tensor(a), ctx.tensor(b));
    let expected = [ta.ne[1], tb.ne[1], ta.ne[2], ta.ne[3]];
    let batches_agree = mul_mat_shape(&ta.ne, &tb.ne).is_some();
    if !batches_agree || ty.ne != expected {
        return Err(HarnessError::ShapeContractViolation {
            output: ty.ne,
            lhs: ta.ne,
            rhs: tb.ne,
            expected,
        });
    }
    Ok(())
}

/// Recompute `y = mul_mat(a, b)` element by element and compare.
///
/// Every read goes through the operands' strides, so either operand may be a
/// transposed view. The shape contract is checked first, so a malformed
/// triple is reported instead of indexed. Returns the number of elements
/// checked.
pub fn check_mat_mul(
    ctx: &Context,
    y: TensorId,
    a: TensorId,
    b: TensorId,
) -> Result<usize, HarnessError> {
    check_mat_mul_shape(ctx, y, a, b)?;
    if tracing::enabled!(Level::DEBUG) {
        debug!("a: {}", format_matrix(ctx, a));
        debug!("b: {}", format_matrix(ctx, b));
        debug!("y: {}", format_matrix(ctx, y));
    }

    let k = ctx.tensor(a).ne[0];
    let ne = ctx.tensor(y).ne;
    let mut checked = 0;
    for c in coords(ne) {
        let [i0, i1, i2, i3] = c;
        let mut sum = 0.0f32;
        for t in 0..k {
            sum += ctx.get(a, [t, i0, i2, i3]) * ctx.get(b, [t, i1, i2, i3]);
        }
        let actual = ctx.get(y, c);
        if (sum - actual).abs() > MAT_MUL_TOLERANCE {
            return Err(Mismatch::MatMul {
                coords: c,
                reference: sum,
                actual,
                tolerance: MAT_MUL_TOLERANCE,
            }
            .into());
        }
        checked += 1;
    }
    Ok(checked)
}

/// First 2-D slice of a tensor as aligned rows, headed by its extents
fn format_matrix(ctx: &Context, id: TensorId) -> String {
    let ne = ctx.tensor(id).ne;
    let mut out = format!("{ne:?}\n");
    for i1 in 0..ne[1] {
        for i0 in 0..ne[0] {
            let _ = write!(out, "{:6.3} ", ctx.get(id, [i0, i1, 0, 0]));
        }
        out.push('\n');
    }
    out
}
