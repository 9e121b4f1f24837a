//! Portable strided kernels.

use loopten_algebra::Scalar;

use crate::{Beta, TileShape, IN0, IN1, OUT};

/// Batch-reduce GEMM over arbitrary strides. Plain GEMM is the `br = 1` case.
///
/// # Safety
///
/// See [`Kernel`](super::Kernel).
pub(crate) unsafe fn gemm<T: Scalar>(
    tile: &TileShape,
    in0: *const T,
    in1: *const T,
    out: *mut T,
    beta: Beta,
) {
    let TileShape { c, br, m, n, k } = *tile;
    for ic in 0..c.size {
        for im in 0..m.size {
            for jn in 0..n.size {
                let mut acc = T::zero();
                for ib in 0..br.size {
                    for ik in 0..k.size {
                        let a = ic * c.strides[IN0]
                            + ib * br.strides[IN0]
                            + im * m.strides[IN0]
                            + ik * k.strides[IN0];
                        let b = ic * c.strides[IN1]
                            + ib * br.strides[IN1]
                            + ik * k.strides[IN1]
                            + jn * n.strides[IN1];
                        acc = acc.add_mul(*in0.add(a), *in1.add(b));
                    }
                }
                let dst = out.add(ic * c.strides[OUT] + im * m.strides[OUT] + jn * n.strides[OUT]);
                *dst = match beta {
                    Beta::Zero => acc,
                    Beta::One => *dst + acc,
                };
            }
        }
    }
}

/// Clamp every element of the output tile at zero.
///
/// # Safety
///
/// `out` must be valid for reads and writes of `tile.extent(OUT)` elements.
pub(crate) unsafe fn relu<T: Scalar>(tile: &TileShape, out: *mut T) {
    let TileShape { c, m, n, .. } = *tile;
    for ic in 0..c.size {
        for jn in 0..n.size {
            for im in 0..m.size {
                let dst = out.add(ic * c.strides[OUT] + im * m.strides[OUT] + jn * n.strides[OUT]);
                *dst = (*dst).relu();
            }
        }
    }
}
