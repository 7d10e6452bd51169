use super::{Op, grad_of, src01, write_contiguous};
use crate::autograd::accumulate;
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::tensor::{MAX_DIMS, TensorId};

// ===== MATRIX MULTIPLICATION =====

/// Output extents of `mul_mat(a, b)`, or `None` when the operands are incompatible.
///
/// Dimension 0 is contracted, dimensions 2 and 3 are shared batch axes:
/// `a: [k, n, b2, b3]`, `b: [k, m, b2, b3]` -> `[n, m, b2, b3]`.
pub fn mul_mat_shape(
    a: &[usize; MAX_DIMS],
    b: &[usize; MAX_DIMS],
) -> Option<[usize; MAX_DIMS]> {
    (a[0] == b[0] && a[2] == b[2] && a[3] == b[3]).then_some([a[1], b[1], a[2], a[3]])
}

impl Context {
    /// Batched matrix product contracting dimension 0 of both operands.
    ///
    /// `Y[i, j, p, q] = Σ_t a[t, i, p, q] · b[t, j, p, q]`
    ///
    /// Either operand may be a strided view such as a transpose.
    pub fn mul_mat(&mut self, a: TensorId, b: TensorId) -> Result<TensorId> {
        let (ne, n_dims) = {
            let (ta, tb) = (self.tensor(a), self.tensor(b));
            let ne = mul_mat_shape(&ta.ne, &tb.ne).ok_or(EngineError::ShapeMismatch {
                op: "mul_mat",
                lhs: ta.ne,
                rhs: tb.ne,
            })?;
            (ne, ta.n_dims.max(tb.n_dims))
        };
        self.new_op_tensor(ne, n_dims, Op::MulMat, [Some(a), Some(b)])
    }
}

pub(crate) fn compute_mul_mat(ctx: &mut Context, dst: TensorId) -> Result<()> {
    let (a, b) = src01(ctx, dst)?;
    let ne = ctx.tensor(dst).ne;
    let unit_rows = {
        let (ta, tb) = (ctx.tensor(a), ctx.tensor(b));
        ta.nb[0] == ta.dtype.size_of() && tb.nb[0] == tb.dtype.size_of()
    };
    let out = if unit_rows {
        mul_mat_rows(ctx, a, b, ne)
    } else {
        mul_mat_strided(ctx, a, b, ne)
    };
    write_contiguous(ctx, dst, &out);
    Ok(())
}

fn vec_dot(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// Both operands store dimension 0 contiguously: dot whole rows.
fn mul_mat_rows(ctx: &Context, a: TensorId, b: TensorId, ne: [usize; MAX_DIMS]) -> Vec<f32> {
    let (ta, tb) = (ctx.tensor(a), ctx.tensor(b));
    let (data_a, data_b) = (ctx.storage_of(a), ctx.storage_of(b));
    let k = ta.ne[0];
    let mut out = Vec::with_capacity(ne.iter().product());
    for i3 in 0..ne[3] {
        for i2 in 0..ne[2] {
            for i1 in 0..ne[1] {
                let rb = tb.element_index([0, i1, i2, i3]);
                let row_b = &data_b[rb..rb + k];
                for i0 in 0..ne[0] {
                    let ra = ta.element_index([0, i0, i2, i3]);
                    out.push(vec_dot(&data_a[ra..ra + k], row_b));
                }
            }
        }
    }
    out
}

/// At least one operand is transposed: accumulate one contraction step at a
/// time, reading every element through its strides.
fn mul_mat_strided(ctx: &Context, a: TensorId, b: TensorId, ne: [usize; MAX_DIMS]) -> Vec<f32> {
    let k = ctx.tensor(a).ne[0];
    let mut out = vec![0.0; ne.iter().product()];
    let (n0, n1, n2) = (ne[0], ne[0] * ne[1], ne[0] * ne[1] * ne[2]);
    for i3 in 0..ne[3] {
        for i2 in 0..ne[2] {
            for t in 0..k {
                for i1 in 0..ne[1] {
                    let vb = ctx.get(b, [t, i1, i2, i3]);
                    let row = i3 * n2 + i2 * n1 + i1 * n0;
                    for i0 in 0..ne[0] {
                        out[row + i0] += ctx.get(a, [t, i0, i2, i3]) * vb;
                    }
                }
            }
        }
    }
    out
}

/// Gradient rules for `Y = mul_mat(a, b)` with upstream gradient `G`:
/// - `∂L/∂b = mul_mat(transpose(a), G)`
/// - `∂L/∂a = mul_mat(transpose(b), transpose(G))`
pub(crate) fn backward_mul_mat(ctx: &mut Context, node: TensorId) -> Result<()> {
    let (a, b) = src01(ctx, node)?;
    let g = grad_of(ctx, node)?;

    if ctx.grad(b).is_some() {
        let at = ctx.transpose(a)?;
        let contrib = ctx.mul_mat(at, g)?;
        accumulate(ctx, b, contrib)?;
    }
    if ctx.grad(a).is_some() {
        let bt = ctx.transpose(b)?;
        let gt = ctx.transpose(g)?;
        let contrib = ctx.mul_mat(bt, gt)?;
        accumulate(ctx, a, contrib)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Graph;

    #[test]
    fn test_mul_mat_of_ones_counts_contraction() {
        let mut ctx = Context::default();
        let a = ctx.from_vec(&[2, 3], &[1.0; 6]).unwrap();
        let b = ctx.from_vec(&[2, 4], &[1.0; 8]).unwrap();
        let y = ctx.mul_mat(b, a).unwrap();
        Graph::build_forward(&ctx, y).compute(&mut ctx).unwrap();
        assert_eq!(ctx.tensor(y).shape(), &[4, 3]);
        assert!(ctx.to_vec(y).iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_mul_mat_values() {
        let mut ctx = Context::default();
        // a rows (dim 0 contiguous): [1, 2], [3, 4]
        let a = ctx.from_vec(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        // b rows: [5, 6], [7, 8], [9, 10]
        let b = ctx
            .from_vec(&[2, 3], &[5.0, 6.0, 7.0, 8.0, 9.0, 10.0])
            .unwrap();
        let y = ctx.mul_mat(a, b).unwrap();
        Graph::build_forward(&ctx, y).compute(&mut ctx).unwrap();
        assert_eq!(ctx.tensor(y).shape(), &[2, 3]);
        // Y[i, j] = row_a(i) . row_b(j)
        assert_eq!(
            ctx.to_vec(y),
            vec![17.0, 39.0, 23.0, 53.0, 29.0, 67.0]
        );
    }

    #[test]
    fn test_strided_path_matches_row_path() {
        let mut ctx = Context::default();
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.5 - 2.0).collect();
        let src = ctx.from_vec(&[3, 4], &data).unwrap();
        let view = ctx.transpose(src).unwrap(); // [4, 3]
        let copy = ctx.cont(view).unwrap();
        let rhs = ctx
            .from_vec(&[4, 2], &[1.0, -1.0, 0.5, 2.0, 3.0, 0.0, -2.0, 1.5])
            .unwrap();
        let y_view = ctx.mul_mat(view, rhs).unwrap();
        let y_copy = ctx.mul_mat(copy, rhs).unwrap();
        let mut g = Graph::build_forward(&ctx, y_view);
        g.build_forward_expand(&ctx, y_copy);
        g.compute(&mut ctx).unwrap();
        for (p, q) in ctx.to_vec(y_view).iter().zip(ctx.to_vec(y_copy)) {
            assert!((p - q).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mul_mat_shape_rules() {
        assert_eq!(mul_mat_shape(&[3, 2, 1, 1], &[3, 4, 1, 1]), Some([2, 4, 1, 1]));
        assert_eq!(mul_mat_shape(&[3, 2, 2, 3], &[3, 1, 2, 3]), Some([2, 1, 2, 3]));
        assert_eq!(mul_mat_shape(&[3, 2, 1, 1], &[2, 2, 1, 1]), None);
        assert_eq!(mul_mat_shape(&[3, 2, 2, 1], &[3, 2, 1, 1]), None);

        let mut ctx = Context::default();
        let a = ctx.new_f32(&[3, 2]).unwrap();
        let b = ctx.new_f32(&[2, 2]).unwrap();
        assert!(matches!(
            ctx.mul_mat(a, b),
            Err(EngineError::ShapeMismatch { op: "mul_mat", .. })
        ));
    }

    #[test]
    fn test_mul_mat_gradients_both_operands() {
        let mut ctx = Context::default();
        let a = ctx.from_vec(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = ctx
            .from_vec(&[2, 3], &[5.0, 6.0, 7.0, 8.0, 9.0, 10.0])
            .unwrap();
        ctx.set_param(a).unwrap();
        ctx.set_param(b).unwrap();
        let y = ctx.mul_mat(a, b).unwrap();
        let f = ctx.sum(y).unwrap();
        let gf = Graph::build_forward(&ctx, f);
        let gb = Graph::build_backward(&mut ctx, &gf, false).unwrap();
        gb.reset(&mut ctx);
        let seed = ctx.grad(f).unwrap();
        ctx.set_f32(seed, 1.0);
        gb.compute(&mut ctx).unwrap();

        // d/da[t, i] sum(Y) = Σ_j b[t, j]
        let ga = ctx.grad(a).unwrap();
        assert_eq!(ctx.to_vec(ga), vec![21.0, 24.0, 21.0, 24.0]);
        // d/db[t, j] sum(Y) = Σ_i a[t, i]
        let grad_b = ctx.grad(b).unwrap();
        assert_eq!(ctx.to_vec(grad_b), vec![4.0, 6.0, 4.0, 6.0, 4.0, 6.0]);
    }
}
