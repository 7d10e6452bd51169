use super::{Op, grad_of, src0, write_contiguous};
use crate::autograd::accumulate;
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::tensor::{MAX_DIMS, TensorId, coords};

/// Movement operations: change how data is indexed, never the values.
impl Context {
    /// Swap dimensions 0 and 1 without copying.
    ///
    /// The view shares `a`'s storage and permutes its byte strides; 1-D
    /// inputs become `[1, n]` views.
    pub fn transpose(&mut self, a: TensorId) -> Result<TensorId> {
        let (ne, nb, n_dims) = {
            let t = self.tensor(a);
            let mut ne = t.ne;
            let mut nb = t.nb;
            ne.swap(0, 1);
            nb.swap(0, 1);
            (ne, nb, t.n_dims.max(2))
        };
        self.new_view(a, ne, nb, n_dims, Op::Transpose)
    }

    /// Materialise `a` into a fresh contiguous tensor
    pub fn cont(&mut self, a: TensorId) -> Result<TensorId> {
        let (ne, n_dims) = {
            let t = self.tensor(a);
            (t.ne, t.n_dims)
        };
        self.new_op_tensor(ne, n_dims, Op::Cont, [Some(a), None])
    }

    /// Tile `a` until it has the shape of `like`.
    ///
    /// Every extent of `like` must be a multiple of the matching extent of `a`.
    pub fn repeat(&mut self, a: TensorId, like: TensorId) -> Result<TensorId> {
        let (ne, n_dims) = {
            let (ta, tl) = (self.tensor(a), self.tensor(like));
            if ta.ne.iter().zip(&tl.ne).any(|(&n, &m)| m % n != 0) {
                return Err(EngineError::ShapeMismatch {
                    op: "repeat",
                    lhs: ta.ne,
                    rhs: tl.ne,
                });
            }
            (tl.ne, tl.n_dims)
        };
        self.new_op_tensor(ne, n_dims, Op::Repeat, [Some(a), None])
    }
}

pub(crate) fn compute_cont(ctx: &mut Context, dst: TensorId) -> Result<()> {
    let a = src0(ctx, dst)?;
    let ne = ctx.tensor(dst).ne;
    let out: Vec<f32> = coords(ne).map(|c| ctx.get(a, c)).collect();
    write_contiguous(ctx, dst, &out);
    Ok(())
}

pub(crate) fn compute_repeat(ctx: &mut Context, dst: TensorId) -> Result<()> {
    let a = src0(ctx, dst)?;
    let ne = ctx.tensor(dst).ne;
    let ne_a = ctx.tensor(a).ne;
    let out: Vec<f32> = coords(ne)
        .map(|c| {
            let mut wrapped = [0; MAX_DIMS];
            for d in 0..MAX_DIMS {
                wrapped[d] = c[d] % ne_a[d];
            }
            ctx.get(a, wrapped)
        })
        .collect();
    write_contiguous(ctx, dst, &out);
    Ok(())
}

/// Undo the swap: the source receives the transposed gradient
pub(crate) fn backward_transpose(ctx: &mut Context, node: TensorId) -> Result<()> {
    let a = src0(ctx, node)?;
    let g = grad_of(ctx, node)?;
    let gt = ctx.transpose(g)?;
    accumulate(ctx, a, gt)
}

pub(crate) fn backward_cont(ctx: &mut Context, node: TensorId) -> Result<()> {
    let a = src0(ctx, node)?;
    let g = grad_of(ctx, node)?;
    accumulate(ctx, a, g)
}
