use super::{Op, grad_of, src0, write_contiguous};
use crate::autograd::accumulate;
use crate::context::Context;
use crate::error::Result;
use crate::tensor::{TensorId, coords};

// ===== REDUCE OPERATIONS =====

impl Context {
    /// Sum every element of `a` into a 1-element tensor
    pub fn sum(&mut self, a: TensorId) -> Result<TensorId> {
        self.new_op_tensor([1, 1, 1, 1], 1, Op::Sum, [Some(a), None])
    }
}

pub(crate) fn compute_sum(ctx: &mut Context, dst: TensorId) -> Result<()> {
    let a = src0(ctx, dst)?;
    let ne = ctx.tensor(a).ne;
    let total: f32 = coords(ne).map(|c| ctx.get(a, c)).sum();
    write_contiguous(ctx, dst, &[total]);
    Ok(())
}

/// Sum collapses to a scalar, so its gradient broadcasts back to the input shape
pub(crate) fn backward_sum(ctx: &mut Context, node: TensorId) -> Result<()> {
    let a = src0(ctx, node)?;
    let g = grad_of(ctx, node)?;
    let broadcast = ctx.repeat(g, a)?;
    accumulate(ctx, a, broadcast)
}

#[cfg(test)]
mod tests {
    use crate::{Context, Graph};

    #[test]
    fn test_sum_reads_through_strides() {
        let mut ctx = Context::default();
        let a = ctx.from_vec(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let at = ctx.transpose(a).unwrap();
        let s = ctx.sum(at).unwrap();
        Graph::build_forward(&ctx, s).compute(&mut ctx).unwrap();
        assert_eq!(ctx.tensor(s).shape(), &[1]);
        assert_eq!(ctx.get_f32_1d(s, 0), 21.0);
    }

    #[test]
    fn test_sum_gradient_is_ones() {
        let mut ctx = Context::default();
        let a = ctx.from_vec(&[2, 2], &[1.0, -2.0, 3.0, -4.0]).unwrap();
        ctx.set_param(a).unwrap();
        let s = ctx.sum(a).unwrap();
        let gf = Graph::build_forward(&ctx, s);
        let gb = Graph::build_backward(&mut ctx, &gf, false).unwrap();
        gb.reset(&mut ctx);
        let seed = ctx.grad(s).unwrap();
        ctx.set_f32(seed, 1.0);
        gb.compute(&mut ctx).unwrap();
        let g = ctx.grad(a).unwrap();
        assert_eq!(ctx.to_vec(g), vec![1.0; 4]);
    }
}
