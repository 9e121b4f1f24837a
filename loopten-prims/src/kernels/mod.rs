//! Kernel implementations behind the dispatch table.

pub(crate) mod faer;
pub(crate) mod reference;

use crate::{Beta, TileShape};

/// Monomorphic kernel entry point.
///
/// # Safety
///
/// For every operand, the pointer must be valid for reads (and for `out`,
/// writes) of [`TileShape::extent`] elements, and the output tile must not
/// overlap either input.
pub type Kernel<T> = unsafe fn(&TileShape, *const T, *const T, *mut T, Beta);
