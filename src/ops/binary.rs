use super::{Op, grad_of, src01, write_contiguous};
use crate::autograd::accumulate;
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::tensor::{TensorId, coords};

// ===== ELEMENT-WISE ADD =====

impl Context {
    /// Element-wise sum of two tensors with identical extents.
    ///
    /// Either operand may be a strided view; the result is contiguous and
    /// keeps `a`'s rank.
    pub fn add(&mut self, a: TensorId, b: TensorId) -> Result<TensorId> {
        let (ne, n_dims) = {
            let (ta, tb) = (self.tensor(a), self.tensor(b));
            if !ta.same_shape(tb) {
                return Err(EngineError::ShapeMismatch {
                    op: "add",
                    lhs: ta.ne,
                    rhs: tb.ne,
                });
            }
            (ta.ne, ta.n_dims)
        };
        self.new_op_tensor(ne, n_dims, Op::Add, [Some(a), Some(b)])
    }
}

pub(crate) fn compute_add(ctx: &mut Context, dst: TensorId) -> Result<()> {
    let (a, b) = src01(ctx, dst)?;
    let ne = ctx.tensor(dst).ne;
    let out: Vec<f32> = coords(ne).map(|c| ctx.get(a, c) + ctx.get(b, c)).collect();
    write_contiguous(ctx, dst, &out);
    Ok(())
}

/// d(x+y) flows unchanged to both operands
pub(crate) fn backward_add(ctx: &mut Context, node: TensorId) -> Result<()> {
    let (a, b) = src01(ctx, node)?;
    let g = grad_of(ctx, node)?;
    accumulate(ctx, a, g)?;
    accumulate(ctx, b, g)
}
