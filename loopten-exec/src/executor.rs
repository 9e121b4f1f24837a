use std::sync::OnceLock;

use loopten_algebra::ensure_data_type;
use loopten_device::{Error, Result};
use loopten_prims::{Pass, PrimScalar, PrimType, Primitive, TileDim, TileShape, IN0, IN1, OUT};
use loopten_tensor::{TensorView, TensorViewMut};
use loopten_tensorops::{DimType, ExecType, Operand, TensorOperationConfig};
use rayon::prelude::*;

/// One explicit loop of the nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoopDim {
    size: usize,
    strides: [usize; 3],
    /// The output pointer does not move along this loop, so its iterations
    /// accumulate into the same tile.
    reducing: bool,
}

impl LoopDim {
    fn pass_at(&self, index: usize, outer: Pass) -> Pass {
        if self.reducing {
            Pass {
                first: outer.first && index == 0,
                last: outer.last && index + 1 == self.size,
            }
        } else {
            outer
        }
    }
}

fn add_offsets(base: [usize; 3], index: usize, strides: &[usize; 3]) -> [usize; 3] {
    [
        base[IN0] + index * strides[IN0],
        base[IN1] + index * strides[IN1],
        base[OUT] + index * strides[OUT],
    ]
}

fn thread_pool() -> Option<&'static rayon::ThreadPool> {
    static POOL: OnceLock<Option<rayon::ThreadPool>> = OnceLock::new();
    POOL.get_or_init(|| {
        let threads = loopten_device::env::num_threads()?;
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("loopten-{i}"))
            .build()
        {
            Ok(pool) => {
                log::debug!("built shared-execution pool with {threads} threads");
                Some(pool)
            }
            Err(err) => {
                log::warn!("failed to build a {threads}-thread pool ({err}); using the global pool");
                None
            }
        }
    })
    .as_ref()
}

/// A validated contraction ready to run on caller buffers.
///
/// Construction validates the configuration, checks that a kernel is
/// registered and lowers the dimensions into a loop plan: shared loops,
/// then seq loops in configuration order, then one primitive tile.
///
/// # Examples
///
/// ```
/// use loopten_exec::TensorOperation;
/// use loopten_prims::Backend;
/// use loopten_tensorops::TensorOperationConfig;
///
/// // [[1, 3], [2, 4]] * [[1, 0], [0, 1]] in column-major storage
/// let mut config = TensorOperationConfig::simple_gemm(2, 2, 2);
/// config.backend = Backend::Reference;
/// let op = TensorOperation::new(config).unwrap();
///
/// let a = [1.0f32, 2.0, 3.0, 4.0];
/// let identity = [1.0f32, 0.0, 0.0, 1.0];
/// let mut c = [0.0f32; 4];
/// op.execute(&a, &identity, &mut c).unwrap();
/// assert_eq!(c, a);
/// ```
#[derive(Debug, Clone)]
pub struct TensorOperation {
    config: TensorOperationConfig,
    shared: Vec<LoopDim>,
    seq: Vec<LoopDim>,
    tile: TileShape,
    required: [usize; 3],
}

impl TensorOperation {
    /// Validate `config` and build its loop plan.
    ///
    /// # Errors
    ///
    /// Any error of [`loopten_tensorops::validate`].
    pub fn new(config: TensorOperationConfig) -> Result<Self> {
        config.validate()?;

        let mut shared = Vec::new();
        let mut seq = Vec::new();
        let start = config.prim_start();
        for dim in 0..start {
            let strides = dim_strides(&config, dim);
            let loop_dim = LoopDim {
                size: config.dim_sizes[dim] as usize,
                strides,
                reducing: strides[OUT] == 0,
            };
            match config.exec_types[dim] {
                ExecType::Shared => shared.push(loop_dim),
                _ => seq.push(loop_dim),
            }
        }

        let tile = prim_tile(&config, start);
        let required = [
            config.required_len(Operand::In0)?,
            config.required_len(Operand::In1)?,
            config.required_len(Operand::Out)?,
        ];
        log::debug!(
            "planned {}: {} shared loops, {} seq loops, tile c={} br={} m={} n={} k={}",
            config.primitive_key().primitives_label(),
            shared.len(),
            seq.len(),
            tile.c.size,
            tile.br.size,
            tile.m.size,
            tile.n.size,
            tile.k.size,
        );
        Ok(Self {
            config,
            shared,
            seq,
            tile,
            required,
        })
    }

    /// The configuration this operation was built from.
    pub fn config(&self) -> &TensorOperationConfig {
        &self.config
    }

    /// Residual shape handed to every primitive call.
    pub fn tile(&self) -> &TileShape {
        &self.tile
    }

    /// Minimal buffer length of `operand`.
    pub fn required_len(&self, operand: Operand) -> usize {
        self.required[operand.index()]
    }

    /// Number of primitive calls per execution, or `None` when it does not
    /// fit a `usize`.
    pub fn num_calls(&self) -> Option<usize> {
        self.shared
            .iter()
            .chain(&self.seq)
            .try_fold(1usize, |calls, dim| calls.checked_mul(dim.size))
    }

    /// Run the contraction.
    ///
    /// All checks happen before the first primitive call, so on error `out`
    /// is untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `T` is not the configured data type
    /// - [`Error::OutOfBounds`] if a buffer is shorter than its operand's extent
    pub fn execute<T: PrimScalar>(&self, in0: &[T], in1: &[T], out: &mut [T]) -> Result<()> {
        ensure_data_type::<T>(self.config.data_type)?;
        for (operand, len) in [
            (Operand::In0, in0.len()),
            (Operand::In1, in1.len()),
            (Operand::Out, out.len()),
        ] {
            let required = self.required_len(operand);
            if len < required {
                return Err(Error::OutOfBounds {
                    operand: operand.as_str(),
                    required,
                    len,
                });
            }
        }
        let prim = Primitive::<T>::lookup(self.config.primitive_key())?;
        log::trace!(
            "execute {} over {} calls",
            prim.key().primitives_label(),
            self.config.loop_iterations()
        );

        let operands = Operands {
            in0: TensorView::new(in0),
            in1: TensorView::new(in1),
            out: TensorViewMut::new(out),
        };
        if self.shared.is_empty() {
            self.walk(&prim, &operands, 0, [0; 3], Pass::ONLY);
        } else {
            self.execute_shared(&prim, &operands);
        }
        Ok(())
    }

    fn execute_shared<T: PrimScalar>(&self, prim: &Primitive<T>, operands: &Operands<'_, T>) {
        let total: usize = self.shared.iter().map(|dim| dim.size).product();
        let task = |flat: usize| {
            let mut rest = flat;
            let mut offsets = [0; 3];
            for dim in self.shared.iter().rev() {
                offsets = add_offsets(offsets, rest % dim.size, &dim.strides);
                rest /= dim.size;
            }
            self.walk(prim, operands, 0, offsets, Pass::ONLY);
        };
        match thread_pool() {
            Some(pool) => pool.install(|| (0..total).into_par_iter().for_each(task)),
            None => (0..total).into_par_iter().for_each(task),
        }
    }

    fn walk<T: PrimScalar>(
        &self,
        prim: &Primitive<T>,
        operands: &Operands<'_, T>,
        depth: usize,
        offsets: [usize; 3],
        pass: Pass,
    ) {
        let Some(dim) = self.seq.get(depth) else {
            let in0 = operands.in0.ptr_at(offsets[IN0], self.tile.extent(IN0));
            let in1 = operands.in1.ptr_at(offsets[IN1], self.tile.extent(IN1));
            let out = operands.out.ptr_at_mut(offsets[OUT], self.tile.extent(OUT));
            // SAFETY: buffer lengths were checked against the full extents,
            // the validated layouts keep the output tile of every leaf
            // disjoint from other tasks' tiles, and the caller's `&mut`
            // output cannot alias the shared inputs.
            unsafe { prim.invoke(&self.tile, in0, in1, out, pass) };
            return;
        };
        for index in 0..dim.size {
            self.walk(
                prim,
                operands,
                depth + 1,
                add_offsets(offsets, index, &dim.strides),
                dim.pass_at(index, pass),
            );
        }
    }
}

struct Operands<'a, T> {
    in0: TensorView<'a, T>,
    in1: TensorView<'a, T>,
    out: TensorViewMut<'a, T>,
}

fn dim_strides(config: &TensorOperationConfig, dim: usize) -> [usize; 3] {
    Operand::ALL.map(|operand| config.strides.get(operand, dim) as usize)
}

fn prim_tile(config: &TensorOperationConfig, start: usize) -> TileShape {
    let mut tile = TileShape::gemm(TileDim::UNIT, TileDim::UNIT, TileDim::UNIT);
    let last = config.num_dims() - 1;
    for dim in start..config.num_dims() {
        let axis = TileDim::new(config.dim_sizes[dim] as usize, dim_strides(config, dim));
        match config.dim_types[dim] {
            DimType::C => tile.c = axis,
            DimType::M => tile.m = axis,
            DimType::N => tile.n = axis,
            DimType::K if dim == last => tile.k = axis,
            DimType::K => {
                debug_assert_eq!(config.prim_main, PrimType::Brgemm);
                tile.br = axis;
            }
        }
    }
    tile
}

/// Validate `config`, then run it on the given buffers.
///
/// Shorthand for [`TensorOperation::new`] followed by
/// [`TensorOperation::execute`].
pub fn execute<T: PrimScalar>(
    config: &TensorOperationConfig,
    in0: &[T],
    in1: &[T],
    out: &mut [T],
) -> Result<()> {
    TensorOperation::new(config.clone())?.execute(in0, in1, out)
}
