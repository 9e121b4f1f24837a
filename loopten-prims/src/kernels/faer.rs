//! faer-backed kernels.
//!
//! Each batch (`c`) entry gets one output view; the batch-reduce axis is
//! folded into a sequence of `matmul` calls where only the first one honours
//! the requested [`Beta`].

use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};

use crate::{Beta, TileShape, IN0, IN1, OUT};

macro_rules! faer_brgemm {
    ($name:ident, $ty:ty) => {
        /// # Safety
        ///
        /// See [`Kernel`](super::Kernel).
        pub(crate) unsafe fn $name(
            tile: &TileShape,
            in0: *const $ty,
            in1: *const $ty,
            out: *mut $ty,
            beta: Beta,
        ) {
            let TileShape { c, br, m, n, k } = *tile;
            for ic in 0..c.size {
                let mut dst: MatMut<'_, $ty> = MatMut::from_raw_parts_mut(
                    out.add(ic * c.strides[OUT]),
                    m.size,
                    n.size,
                    m.strides[OUT] as isize,
                    n.strides[OUT] as isize,
                );
                for ib in 0..br.size {
                    let lhs: MatRef<'_, $ty> = MatRef::from_raw_parts(
                        in0.add(ic * c.strides[IN0] + ib * br.strides[IN0]),
                        m.size,
                        k.size,
                        m.strides[IN0] as isize,
                        k.strides[IN0] as isize,
                    );
                    let rhs: MatRef<'_, $ty> = MatRef::from_raw_parts(
                        in1.add(ic * c.strides[IN1] + ib * br.strides[IN1]),
                        k.size,
                        n.size,
                        k.strides[IN1] as isize,
                        n.strides[IN1] as isize,
                    );
                    let accum = if ib == 0 && beta == Beta::Zero {
                        Accum::Replace
                    } else {
                        Accum::Add
                    };
                    matmul(&mut dst, accum, lhs, rhs, 1.0, Par::Seq);
                }
            }
        }
    };
}

faer_brgemm!(brgemm_f32, f32);
faer_brgemm!(brgemm_f64, f64);
