//! Tensor operation configuration for the loopten workspace.
//!
//! A [`TensorOperationConfig`] declares one binary contraction
//! `out = in0 · in1` as a list of dimensions. Every dimension carries:
//!
//! - a role ([`DimType`]): `m` (in0 and out), `n` (in1 and out),
//!   `k` (contracted, in0 and in1) or `c` (batch, all three)
//! - an execution type ([`ExecType`]): an explicit loop (`seq`), a parallel
//!   loop (`shared`) or part of the primitive (`prim`)
//! - a size and one element stride per operand ([`Strides`])
//!
//! The prim dimensions form a trailing block whose roles match the main
//! primitive; everything before it becomes the loop nest. [`validate`]
//! checks all structural invariants once, after which the executor and the
//! performance model treat the configuration as trusted.
//!
//! # Examples
//!
//! ```
//! use loopten_tensorops::{DimType, ExecType, TensorOperationConfig};
//!
//! // 64x48x32 column-major GEMM with k split into a seq loop of 2 over a prim of 16
//! let mut config = TensorOperationConfig::simple_gemm(64, 48, 32);
//! config.dim_types.insert(0, DimType::K);
//! config.exec_types.insert(0, ExecType::Seq);
//! config.dim_sizes = vec![2, 64, 48, 16];
//! config.strides.0 = [
//!     vec![16 * 64, 1, 0, 64],
//!     vec![16, 0, 32, 1],
//!     vec![0, 1, 64, 0],
//! ];
//! config.validate().unwrap();
//! assert_eq!(config.loop_iterations(), 2.0);
//! assert_eq!(config.prim_sizes().k, 16);
//! ```

use std::fmt;
use std::ops::{Index, IndexMut};

use loopten_algebra::DataType;
use loopten_device::Result;
use loopten_prims::{Backend, PrimType, PrimitiveKey};
use serde::{Deserialize, Serialize};

mod validate;

pub use validate::validate;

/// Role of a dimension in the contraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimType {
    /// Free dimension of `in0` and `out`.
    M,
    /// Free dimension of `in1` and `out`.
    N,
    /// Contracted dimension of `in0` and `in1`.
    K,
    /// Batch dimension present in all operands.
    C,
}

impl DimType {
    /// Lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            DimType::M => "m",
            DimType::N => "n",
            DimType::K => "k",
            DimType::C => "c",
        }
    }
}

impl fmt::Display for DimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dimension is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecType {
    /// Sequential loop in the nest.
    Seq,
    /// Loop whose iterations are spread over worker threads.
    Shared,
    /// Absorbed into the primitive call.
    Prim,
}

impl ExecType {
    /// Lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecType::Seq => "seq",
            ExecType::Shared => "shared",
            ExecType::Prim => "prim",
        }
    }
}

impl fmt::Display for ExecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operand of a binary contraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    /// Left input.
    In0,
    /// Right input.
    In1,
    /// Output.
    Out,
}

impl Operand {
    /// All operands in table order.
    pub const ALL: [Operand; 3] = [Operand::In0, Operand::In1, Operand::Out];

    /// Position in per-operand tables.
    pub const fn index(self) -> usize {
        match self {
            Operand::In0 => loopten_prims::IN0,
            Operand::In1 => loopten_prims::IN1,
            Operand::Out => loopten_prims::OUT,
        }
    }

    /// Lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Operand::In0 => "in0",
            Operand::In1 => "in1",
            Operand::Out => "out",
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-operand, per-dimension element strides.
///
/// # Examples
///
/// ```
/// use loopten_tensorops::{Operand, Strides};
///
/// let strides = Strides::new(vec![1, 0, 4], vec![0, 3, 1], vec![1, 4, 0]);
/// assert_eq!(strides[Operand::In1], vec![0, 3, 1]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Strides(pub [Vec<i64>; 3]);

impl Strides {
    /// Build from the three operand stride lists.
    pub fn new(in0: Vec<i64>, in1: Vec<i64>, out: Vec<i64>) -> Self {
        Self([in0, in1, out])
    }

    /// Stride of dimension `dim` on `operand`.
    pub fn get(&self, operand: Operand, dim: usize) -> i64 {
        self.0[operand.index()][dim]
    }
}

impl Index<Operand> for Strides {
    type Output = Vec<i64>;

    fn index(&self, operand: Operand) -> &Vec<i64> {
        &self.0[operand.index()]
    }
}

impl IndexMut<Operand> for Strides {
    fn index_mut(&mut self, operand: Operand) -> &mut Vec<i64> {
        &mut self.0[operand.index()]
    }
}

/// Sizes of the prim block, by role.
///
/// Absent axes report 1. For a batch-reduce GEMM `br` is the size of the
/// leading prim `k`; `k` always refers to the trailing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimSizes {
    /// Batch size.
    pub c: i64,
    /// Batch-reduce size.
    pub br: i64,
    /// Rows.
    pub m: i64,
    /// Columns.
    pub n: i64,
    /// Contraction length.
    pub k: i64,
}

/// Declarative description of one contraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorOperationConfig {
    /// Kernel family.
    pub backend: Backend,
    /// Element type of all operands.
    pub data_type: DataType,
    /// Setup primitive (`none` or `zero`).
    pub prim_first: PrimType,
    /// Main primitive (`gemm` or `brgemm`).
    pub prim_main: PrimType,
    /// Post primitive (`none` or `relu`).
    pub prim_last: PrimType,
    /// Role of each dimension.
    pub dim_types: Vec<DimType>,
    /// Execution type of each dimension.
    pub exec_types: Vec<ExecType>,
    /// Size of each dimension.
    pub dim_sizes: Vec<i64>,
    /// Element strides of each dimension on each operand.
    pub strides: Strides,
}

impl TensorOperationConfig {
    /// Build and validate a configuration.
    ///
    /// # Errors
    ///
    /// Any error of [`validate`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: Backend,
        data_type: DataType,
        prim_first: PrimType,
        prim_main: PrimType,
        prim_last: PrimType,
        dim_types: Vec<DimType>,
        exec_types: Vec<ExecType>,
        dim_sizes: Vec<i64>,
        strides: Strides,
    ) -> Result<Self> {
        let config = Self {
            backend,
            data_type,
            prim_first,
            prim_main,
            prim_last,
            dim_types,
            exec_types,
            dim_sizes,
            strides,
        };
        config.validate()?;
        Ok(config)
    }

    /// Column-major `f32` GEMM `C(m×n) = A(m×k) · B(k×n)` entirely in the
    /// primitive, zeroing the output first.
    ///
    /// The backend comes from `LOOPTEN_BACKEND` and defaults to faer.
    pub fn simple_gemm(m: i64, n: i64, k: i64) -> Self {
        Self {
            backend: default_backend(),
            data_type: DataType::F32,
            prim_first: PrimType::Zero,
            prim_main: PrimType::Gemm,
            prim_last: PrimType::None,
            dim_types: vec![DimType::M, DimType::N, DimType::K],
            exec_types: vec![ExecType::Prim; 3],
            dim_sizes: vec![m, n, k],
            strides: Strides::new(vec![1, 0, m], vec![0, k, 1], vec![1, m, 0]),
        }
    }

    /// Check every structural invariant. See [`validate`].
    pub fn validate(&self) -> Result<()> {
        validate(self)
    }

    /// Dispatch key for the primitive layer.
    pub fn primitive_key(&self) -> PrimitiveKey {
        PrimitiveKey {
            backend: self.backend,
            data_type: self.data_type,
            first: self.prim_first,
            main: self.prim_main,
            last: self.prim_last,
        }
    }

    /// Number of dimensions.
    pub fn num_dims(&self) -> usize {
        self.dim_types.len()
    }

    /// Index of the first prim dimension (`num_dims()` if there is none).
    pub fn prim_start(&self) -> usize {
        self.exec_types
            .iter()
            .position(|&exec| exec == ExecType::Prim)
            .unwrap_or(self.exec_types.len())
    }

    /// Sizes of the prim block by role.
    pub fn prim_sizes(&self) -> PrimSizes {
        let mut sizes = PrimSizes {
            c: 1,
            br: 1,
            m: 1,
            n: 1,
            k: 1,
        };
        let start = self.prim_start();
        let last = self.num_dims().saturating_sub(1);
        for dim in start..self.num_dims() {
            let size = self.dim_sizes[dim];
            match self.dim_types[dim] {
                DimType::C => sizes.c *= size,
                DimType::M => sizes.m *= size,
                DimType::N => sizes.n *= size,
                DimType::K if dim == last => sizes.k *= size,
                DimType::K => sizes.br *= size,
            }
        }
        sizes
    }

    /// Product of the sizes of every non-prim dimension.
    ///
    /// Counted in `f64` like [`flops`](Self::flops): a valid configuration
    /// may iterate more often than `i64` can count.
    pub fn loop_iterations(&self) -> f64 {
        self.product_where(|_, exec| exec != ExecType::Prim)
    }

    /// Product of the sizes of the shared dimensions.
    pub fn shared_iterations(&self) -> f64 {
        self.product_where(|_, exec| exec == ExecType::Shared)
    }

    /// Product of the sizes of every dimension with role `dim_type`.
    pub fn size_product(&self, dim_type: DimType) -> f64 {
        self.product_where(|role, _| role == dim_type)
    }

    fn product_where(&self, keep: impl Fn(DimType, ExecType) -> bool) -> f64 {
        self.dim_types
            .iter()
            .zip(&self.exec_types)
            .zip(&self.dim_sizes)
            .filter(|&((&role, &exec), _)| keep(role, exec))
            .map(|(_, &size)| size as f64)
            .product()
    }

    /// GEMM transpose flags `(trans_a, trans_b)`.
    ///
    /// `in0` counts as transposed when its prim `k` is unit-stride, `in1`
    /// when its prim `n` is unit-stride.
    pub fn transpose_flags(&self) -> (bool, bool) {
        let mut flags = (false, false);
        for dim in self.prim_start()..self.num_dims() {
            match self.dim_types[dim] {
                DimType::K if self.strides.get(Operand::In0, dim) == 1 => flags.0 = true,
                DimType::N if self.strides.get(Operand::In1, dim) == 1 => flags.1 = true,
                _ => {}
            }
        }
        flags
    }

    /// Distinct elements addressed on `operand`.
    pub fn operand_footprint(&self, operand: Operand) -> u64 {
        loopten_tensor::footprint(&self.dim_sizes, &self.strides[operand])
    }

    /// Minimal buffer length for `operand`.
    pub fn required_len(&self, operand: Operand) -> Result<usize> {
        loopten_tensor::required_len(&self.dim_sizes, &self.strides[operand])
    }

    /// Floating-point operations of one execution: `2 * Π dim_sizes`.
    pub fn flops(&self) -> f64 {
        2.0 * self.dim_sizes.iter().map(|&size| size as f64).product::<f64>()
    }
}

/// Backend named by `LOOPTEN_BACKEND`, falling back to faer.
pub fn default_backend() -> Backend {
    match loopten_device::env::backend_name().map(str::parse::<Backend>) {
        Some(Ok(backend)) => backend,
        Some(Err(err)) => {
            log::warn!("{err}; using faer");
            Backend::Faer
        }
        None => Backend::Faer,
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, label: &str, items: &[T]) -> fmt::Result {
    write!(f, "  {label:<12}[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]\n")
}

impl fmt::Display for TensorOperationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TensorOperationConfig {{")?;
        writeln!(f, "  backend:    {}", self.backend)?;
        writeln!(f, "  data_type:  {}", self.data_type)?;
        writeln!(
            f,
            "  primitives: {}/{}/{}",
            self.prim_first, self.prim_main, self.prim_last
        )?;
        write_list(f, "dim_types:", &self.dim_types)?;
        write_list(f, "exec_types:", &self.exec_types)?;
        write_list(f, "dim_sizes:", &self.dim_sizes)?;
        for operand in Operand::ALL {
            write_list(f, &format!("{operand}:"), &self.strides[operand])?;
        }
        let prim = self.prim_sizes();
        writeln!(
            f,
            "  prim:       c={} br={} m={} n={} k={}",
            prim.c, prim.br, prim.m, prim.n, prim.k
        )?;
        writeln!(f, "  loops:      {}", self.loop_iterations())?;
        f.write_str("}")
    }
}
