use crate::context::Context;
use crate::error::HarnessError;
use crate::tensor::{MAX_DIMS, TensorId};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Largest extent drawn for any dimension
pub const MAX_EXTENT: usize = 4;

/// Draw a 4-slot shape: the first `ndims` extents uniformly from `1..=4`,
/// the rest fixed at 1.
pub fn random_dims(rng: &mut impl Rng, ndims: usize) -> [usize; MAX_DIMS] {
    let mut ne = [1; MAX_DIMS];
    for extent in ne.iter_mut().take(ndims) {
        *extent = rng.random_range(1..=MAX_EXTENT);
    }
    ne
}

/// Keep the first `ndims` extents of `ne` and force the rest to 1
pub fn truncate_dims(ne: &[usize; MAX_DIMS], ndims: usize) -> [usize; MAX_DIMS] {
    let mut out = [1; MAX_DIMS];
    out[..ndims.min(MAX_DIMS)].copy_from_slice(&ne[..ndims.min(MAX_DIMS)]);
    out
}

/// Allocate an `ndims`-dimensional tensor shaped like the first `ndims`
/// entries of `ne` and fill it with values drawn from `[fmin, fmax)`.
///
/// Values are drawn with dimension 0 varying fastest, so the k-th draw lands
/// at flat index k.
pub fn random_tensor(
    ctx: &mut Context,
    rng: &mut impl Rng,
    ndims: usize,
    ne: &[usize; MAX_DIMS],
    fmin: f32,
    fmax: f32,
) -> Result<TensorId, HarnessError> {
    if !(1..=MAX_DIMS).contains(&ndims) {
        return Err(HarnessError::InvalidDims(ndims));
    }
    let dist = Uniform::new(fmin, fmax).map_err(|source| HarnessError::SamplingRange {
        min: fmin,
        max: fmax,
        source,
    })?;
    let t = ctx.new_f32(&ne[..ndims])?;

    match ndims {
        1 => {
            for i0 in 0..ne[0] {
                ctx.set(t, [i0, 0, 0, 0], dist.sample(rng));
            }
        }
        2 => {
            for i1 in 0..ne[1] {
                for i0 in 0..ne[0] {
                    ctx.set(t, [i0, i1, 0, 0], dist.sample(rng));
                }
            }
        }
        3 => {
            for i2 in 0..ne[2] {
                for i1 in 0..ne[1] {
                    for i0 in 0..ne[0] {
                        ctx.set(t, [i0, i1, i2, 0], dist.sample(rng));
                    }
                }
            }
        }
        _ => {
            for i3 in 0..ne[3] {
                for i2 in 0..ne[2] {
                    for i1 in 0..ne[1] {
                        for i0 in 0..ne[0] {
                            ctx.set(t, [i0, i1, i2, i3], dist.sample(rng));
                        }
                    }
                }
            }
        }
    }
    Ok(t)
}
