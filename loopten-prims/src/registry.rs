use loopten_algebra::{DataType, Scalar};
use loopten_device::{Error, Result};

use crate::kernels::{self, Kernel};
use crate::{Backend, Beta, Pass, PrimType, PrimitiveKey, TileShape};

/// One row of a per-type dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct KernelEntry<T: 'static> {
    /// Kernel family.
    pub backend: Backend,
    /// Main primitive serviced by `kernel`.
    pub main: PrimType,
    /// Entry point.
    pub kernel: Kernel<T>,
}

/// Scalar types with a dispatch table.
pub trait PrimScalar: Scalar {
    /// Kernels registered for this element type.
    const KERNELS: &'static [KernelEntry<Self>];
}

macro_rules! impl_prim_scalar {
    ($ty:ty, $faer:path) => {
        impl PrimScalar for $ty {
            const KERNELS: &'static [KernelEntry<Self>] = &[
                KernelEntry {
                    backend: Backend::Faer,
                    main: PrimType::Gemm,
                    kernel: $faer,
                },
                KernelEntry {
                    backend: Backend::Faer,
                    main: PrimType::Brgemm,
                    kernel: $faer,
                },
                KernelEntry {
                    backend: Backend::Reference,
                    main: PrimType::Gemm,
                    kernel: kernels::reference::gemm::<$ty>,
                },
                KernelEntry {
                    backend: Backend::Reference,
                    main: PrimType::Brgemm,
                    kernel: kernels::reference::gemm::<$ty>,
                },
            ];
        }
    };
}

impl_prim_scalar!(f32, kernels::faer::brgemm_f32);
impl_prim_scalar!(f64, kernels::faer::brgemm_f64);

fn find<T: PrimScalar>(backend: Backend, main: PrimType) -> Option<Kernel<T>> {
    T::KERNELS
        .iter()
        .find(|entry| entry.backend == backend && entry.main == main)
        .map(|entry| entry.kernel)
}

fn stages_valid(key: &PrimitiveKey) -> bool {
    key.first.is_first() && key.main.is_main() && key.last.is_last()
}

/// Whether a kernel is registered for `key`.
pub fn is_registered(key: &PrimitiveKey) -> bool {
    stages_valid(key)
        && match key.data_type {
            DataType::F32 => find::<f32>(key.backend, key.main).is_some(),
            DataType::F64 => find::<f64>(key.backend, key.main).is_some(),
        }
}

/// A resolved primitive: kernel plus setup and post-op behaviour.
///
/// # Examples
///
/// ```
/// use loopten_algebra::DataType;
/// use loopten_prims::{Backend, Pass, PrimType, Primitive, PrimitiveKey, TileDim, TileShape};
///
/// let key = PrimitiveKey {
///     backend: Backend::Reference,
///     data_type: DataType::F64,
///     first: PrimType::Zero,
///     main: PrimType::Gemm,
///     last: PrimType::Relu,
/// };
/// let prim = Primitive::<f64>::lookup(key).unwrap();
///
/// // 1x2 output = [1] x [[-1, 2]]
/// let tile = TileShape::gemm(
///     TileDim::new(1, [0, 0, 0]),
///     TileDim::new(2, [0, 1, 1]),
///     TileDim::UNIT,
/// );
/// let (a, b, mut c) = ([1.0], [-1.0, 2.0], [9.0, 9.0]);
/// unsafe { prim.invoke(&tile, a.as_ptr(), b.as_ptr(), c.as_mut_ptr(), Pass::ONLY) };
/// assert_eq!(c, [0.0, 2.0]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Primitive<T: 'static> {
    key: PrimitiveKey,
    kernel: Kernel<T>,
}

impl<T: PrimScalar> Primitive<T> {
    /// Resolve `key` against the dispatch table for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPrimitive`] if `key.data_type` is not `T`,
    /// a tag stands in the wrong stage, or no kernel is registered.
    pub fn lookup(key: PrimitiveKey) -> Result<Self> {
        if key.data_type != T::DATA_TYPE {
            return Err(Error::UnsupportedPrimitive(format!(
                "key names {} but the kernel table is for {}",
                key.data_type,
                T::DATA_TYPE
            )));
        }
        if !stages_valid(&key) {
            return Err(Error::UnsupportedPrimitive(format!(
                "'{}' is not a valid first/main/last triple",
                key.primitives_label()
            )));
        }
        let kernel = find::<T>(key.backend, key.main).ok_or_else(|| {
            Error::UnsupportedPrimitive(format!(
                "backend {} has no {} kernel for {}",
                key.backend, key.main, key.data_type
            ))
        })?;
        Ok(Self { key, kernel })
    }

    /// The key this primitive was resolved from.
    pub fn key(&self) -> &PrimitiveKey {
        &self.key
    }

    /// Output scaling for a call at `pass`.
    pub fn beta(&self, pass: Pass) -> Beta {
        if pass.first && self.key.first == PrimType::Zero {
            Beta::Zero
        } else {
            Beta::One
        }
    }

    /// Run one fused call over `tile`.
    ///
    /// # Safety
    ///
    /// Each pointer must be valid for [`TileShape::extent`] elements of its
    /// operand, `out` for writes as well, and the output tile must not overlap
    /// the inputs or be written concurrently.
    pub unsafe fn invoke(
        &self,
        tile: &TileShape,
        in0: *const T,
        in1: *const T,
        out: *mut T,
        pass: Pass,
    ) {
        (self.kernel)(tile, in0, in1, out, self.beta(pass));
        if pass.last && self.key.last == PrimType::Relu {
            kernels::reference::relu(tile, out);
        }
    }
}
