//! Primitive dispatch layer for the loopten workspace.
//!
//! The executor reduces every contraction to a sequence of calls to one
//! compute primitive. This crate names those primitives and maps a
//! configuration's `(backend, data type, first, main, last)` tuple to a
//! kernel through a fixed table:
//!
//! 1. Build a [`PrimitiveKey`] from the configuration
//! 2. Resolve it once with [`Primitive::lookup`]
//! 3. Call [`Primitive::invoke`] at every leaf of the loop nest
//!
//! # Kernel contract
//!
//! Each call performs one fused multiply-accumulate-and-store over the
//! residual prim tile described by a [`TileShape`]:
//!
//! ```text
//! out[c, m, n] (= | +=) Σ_br Σ_k in0[c, br, m, k] * in1[c, br, k, n]
//! ```
//!
//! Overwrite (`=`) happens only on the first pass when `first` is
//! [`PrimType::Zero`]; `last` = [`PrimType::Relu`] clamps the output tile on
//! the last pass.
//!
//! # Backends
//!
//! - [`Backend::Faer`]: faer's `matmul` over `MatRef`/`MatMut` built from raw
//!   parts with arbitrary row and column strides
//! - [`Backend::Reference`]: portable strided loops
//!
//! # Examples
//!
//! ```
//! use loopten_algebra::DataType;
//! use loopten_prims::{is_registered, Backend, PrimType, PrimitiveKey};
//!
//! let key = PrimitiveKey {
//!     backend: Backend::Faer,
//!     data_type: DataType::F32,
//!     first: PrimType::Zero,
//!     main: PrimType::Gemm,
//!     last: PrimType::None,
//! };
//! assert!(is_registered(&key));
//!
//! let bogus = PrimitiveKey { main: PrimType::Relu, ..key };
//! assert!(!is_registered(&bogus));
//! ```

use std::fmt;
use std::str::FromStr;

use loopten_algebra::DataType;
use loopten_device::{Error, Result};
use serde::{Deserialize, Serialize};

mod kernels;
mod registry;

pub use kernels::Kernel;
pub use registry::{is_registered, KernelEntry, PrimScalar, Primitive};

/// Operand slots, in the order used by every per-operand table.
pub const IN0: usize = 0;
/// Second input operand slot.
pub const IN1: usize = 1;
/// Output operand slot.
pub const OUT: usize = 2;

/// Primitive tags for the three stages of a call.
///
/// - first (setup): [`None`](PrimType::None) or [`Zero`](PrimType::Zero)
/// - main: [`Gemm`](PrimType::Gemm) or [`Brgemm`](PrimType::Brgemm)
/// - last (post-op): [`None`](PrimType::None) or [`Relu`](PrimType::Relu)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimType {
    /// No operation.
    None,
    /// Zero the output before the first accumulation.
    Zero,
    /// Clamp the output at zero after the last accumulation.
    Relu,
    /// (Batched) matrix multiplication over trailing `(c,) m, n, k`.
    Gemm,
    /// Batch-reduce matrix multiplication over trailing `k, m, n, k`.
    Brgemm,
}

impl PrimType {
    /// Lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            PrimType::None => "none",
            PrimType::Zero => "zero",
            PrimType::Relu => "relu",
            PrimType::Gemm => "gemm",
            PrimType::Brgemm => "brgemm",
        }
    }

    /// Whether the tag may stand in the `first` position.
    pub const fn is_first(self) -> bool {
        matches!(self, PrimType::None | PrimType::Zero)
    }

    /// Whether the tag may stand in the `main` position.
    pub const fn is_main(self) -> bool {
        matches!(self, PrimType::Gemm | PrimType::Brgemm)
    }

    /// Whether the tag may stand in the `last` position.
    pub const fn is_last(self) -> bool {
        matches!(self, PrimType::None | PrimType::Relu)
    }
}

impl fmt::Display for PrimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kernel family servicing the main primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// faer dense matrix multiplication.
    Faer,
    /// Portable strided loops.
    Reference,
}

impl Backend {
    /// All backends.
    pub const ALL: [Backend; 2] = [Backend::Faer, Backend::Reference];

    /// Lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Backend::Faer => "faer",
            Backend::Reference => "reference",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faer" => Ok(Backend::Faer),
            "reference" | "ref" => Ok(Backend::Reference),
            _ => Err(Error::InvalidArgument(format!("unknown backend '{s}'"))),
        }
    }
}

/// Dispatch key: everything that selects a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveKey {
    /// Kernel family.
    pub backend: Backend,
    /// Element type of all operands.
    pub data_type: DataType,
    /// Setup primitive.
    pub first: PrimType,
    /// Main primitive.
    pub main: PrimType,
    /// Post primitive.
    pub last: PrimType,
}

impl PrimitiveKey {
    /// `first/main/last` label used in error messages.
    pub fn primitives_label(&self) -> String {
        format!("{}/{}/{}", self.first, self.main, self.last)
    }

    /// Error reported when the key has no table entry.
    pub fn unsupported(&self) -> Error {
        Error::UnsupportedCombination {
            backend: self.backend.to_string(),
            data_type: self.data_type.to_string(),
            primitives: self.primitives_label(),
        }
    }
}

/// Output scaling applied before accumulation: `out = Σ + beta * out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Beta {
    /// Overwrite the output tile.
    Zero,
    /// Accumulate into the output tile.
    One,
}

/// Position of a leaf call within the reduction over outer `k` loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pass {
    /// All outer `k` indices are zero.
    pub first: bool,
    /// All outer `k` indices are at their last value.
    pub last: bool,
}

impl Pass {
    /// The only pass of a contraction without outer `k` loops.
    pub const ONLY: Pass = Pass {
        first: true,
        last: true,
    };
}

/// One axis of the residual prim tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileDim {
    /// Extent of the axis.
    pub size: usize,
    /// Element strides on `in0`, `in1` and `out`.
    pub strides: [usize; 3],
}

impl TileDim {
    /// An absent axis: size 1, no strides.
    pub const UNIT: TileDim = TileDim {
        size: 1,
        strides: [0; 3],
    };

    /// Create an axis.
    pub const fn new(size: usize, strides: [usize; 3]) -> Self {
        Self { size, strides }
    }
}

/// Residual shape handed to a kernel.
///
/// # Examples
///
/// ```
/// use loopten_prims::{TileDim, TileShape, IN0, OUT};
///
/// // column-major 4x3 output from a 4x2 times 2x3 product
/// let tile = TileShape::gemm(
///     TileDim::new(4, [1, 0, 1]),
///     TileDim::new(3, [0, 2, 4]),
///     TileDim::new(2, [4, 1, 0]),
/// );
/// assert_eq!(tile.extent(IN0), 8);
/// assert_eq!(tile.extent(OUT), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
    /// Batch axis (present on all operands).
    pub c: TileDim,
    /// Batch-reduce axis (absent on the output).
    pub br: TileDim,
    /// Row axis of `in0` and `out`.
    pub m: TileDim,
    /// Column axis of `in1` and `out`.
    pub n: TileDim,
    /// Contraction axis of `in0` and `in1`.
    pub k: TileDim,
}

impl TileShape {
    /// A plain GEMM tile without batch axes.
    pub const fn gemm(m: TileDim, n: TileDim, k: TileDim) -> Self {
        Self {
            c: TileDim::UNIT,
            br: TileDim::UNIT,
            m,
            n,
            k,
        }
    }

    fn axes(&self) -> [&TileDim; 5] {
        [&self.c, &self.br, &self.m, &self.n, &self.k]
    }

    /// Elements spanned on `operand`: `1 + Σ (size-1) * stride`.
    pub fn extent(&self, operand: usize) -> usize {
        1 + self
            .axes()
            .iter()
            .map(|axis| (axis.size - 1) * axis.strides[operand])
            .sum::<usize>()
    }

    /// Number of multiply-add operations in one call.
    pub fn fma_count(&self) -> usize {
        self.axes().iter().map(|axis| axis.size).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_predicates() {
        assert!(PrimType::Zero.is_first() && !PrimType::Zero.is_main());
        assert!(PrimType::Brgemm.is_main() && !PrimType::Brgemm.is_last());
        assert!(PrimType::None.is_first() && PrimType::None.is_last());
        assert!(PrimType::Relu.is_last() && !PrimType::Relu.is_first());
    }

    #[test]
    fn backend_names() {
        for backend in Backend::ALL {
            assert_eq!(backend.as_str().parse::<Backend>().unwrap(), backend);
        }
        assert!(matches!(
            "cublas".parse::<Backend>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unsupported_key_reports_triple() {
        let key = PrimitiveKey {
            backend: Backend::Reference,
            data_type: DataType::F64,
            first: PrimType::Zero,
            main: PrimType::Relu,
            last: PrimType::None,
        };
        let message = key.unsupported().to_string();
        assert!(message.contains("zero/relu/none"), "{message}");
        assert!(message.contains("reference"), "{message}");
    }

    #[test]
    fn tile_extent_counts_every_axis() {
        let tile = TileShape {
            c: TileDim::new(2, [12, 6, 20]),
            br: TileDim::new(3, [4, 2, 0]),
            m: TileDim::new(4, [1, 0, 1]),
            n: TileDim::new(5, [0, 1, 4]),
            k: TileDim::UNIT,
        };
        assert_eq!(tile.extent(IN0), 1 + 12 + 8 + 3);
        assert_eq!(tile.extent(OUT), 1 + 20 + 3 + 16);
        assert_eq!(tile.fma_count(), 120);
    }
}
