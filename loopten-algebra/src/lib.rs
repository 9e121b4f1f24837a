//! Scalar types and data-type tags for the loopten workspace.
//!
//! This crate provides the element-type foundation shared by the executor,
//! the dispatch layer and the performance model:
//!
//! - [`DataType`]: Runtime tag naming the element type of a configuration.
//! - [`Scalar`]: Arithmetic the kernels need, implemented for `f32` and `f64`.
//!   Links a Rust type to its [`DataType`] so typed entry points can reject
//!   buffers that disagree with the configuration.
//!
//! # Examples
//!
//! ```
//! use loopten_algebra::{DataType, Scalar};
//!
//! assert_eq!(<f32 as Scalar>::DATA_TYPE, DataType::F32);
//! assert_eq!(DataType::F64.size_bytes(), 8);
//! assert_eq!("f64".parse::<DataType>().unwrap(), DataType::F64);
//! assert_eq!((-2.0f32).relu(), 0.0);
//! ```

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul};
use std::str::FromStr;

use loopten_device::{Error, Result};
use serde::{Deserialize, Serialize};

/// Element type of all three operands of a contraction.
///
/// Mixed precision is not supported: `in0`, `in1` and `out` always share one
/// data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// IEEE-754 single precision.
    F32,
    /// IEEE-754 double precision.
    F64,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    /// Lower-case name (`"f32"` / `"f64"`).
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "float" | "float32" => Ok(DataType::F32),
            "f64" | "double" | "float64" => Ok(DataType::F64),
            _ => Err(Error::InvalidArgument(format!("unknown data type '{s}'"))),
        }
    }
}

/// Element type usable in a contraction.
///
/// Defines the operations a kernel needs under standard arithmetic:
///
/// - `zero()` / `one()`: Additive and multiplicative identities
/// - `add_mul(a, b)`: The `self + a * b` accumulation step
/// - `relu()`: The elementwise post-op applied on the last pass
pub trait Scalar:
    Copy
    + Send
    + Sync
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Add<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + Sum
    + 'static
{
    /// Runtime tag for this type.
    const DATA_TYPE: DataType;

    /// Additive identity.
    fn zero() -> Self;

    /// Multiplicative identity.
    fn one() -> Self;

    /// Returns `self + a * b`.
    fn add_mul(self, a: Self, b: Self) -> Self;

    /// Returns `max(self, 0)`.
    fn relu(self) -> Self;

    /// Converts from `f64`, rounding if needed.
    fn from_f64(value: f64) -> Self;

    /// Widens to `f64`.
    fn to_f64(self) -> f64;
}

macro_rules! impl_scalar {
    ($ty:ty, $tag:expr) => {
        impl Scalar for $ty {
            const DATA_TYPE: DataType = $tag;

            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn one() -> Self {
                1.0
            }

            #[inline]
            fn add_mul(self, a: Self, b: Self) -> Self {
                self + a * b
            }

            #[inline]
            fn relu(self) -> Self {
                if self > 0.0 {
                    self
                } else {
                    0.0
                }
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_scalar!(f32, DataType::F32);
impl_scalar!(f64, DataType::F64);

/// Returns an error unless `T` is the element type named by `expected`.
///
/// # Examples
///
/// ```
/// use loopten_algebra::{ensure_data_type, DataType};
///
/// assert!(ensure_data_type::<f32>(DataType::F32).is_ok());
/// assert!(ensure_data_type::<f64>(DataType::F32).is_err());
/// ```
pub fn ensure_data_type<T: Scalar>(expected: DataType) -> Result<()> {
    if T::DATA_TYPE == expected {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "buffers hold {} elements but the configuration expects {expected}",
            T::DATA_TYPE
        )))
    }
}
