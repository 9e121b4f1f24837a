//! Strided views over caller-owned buffers.
//!
//! This crate provides the layout vocabulary shared by the configuration,
//! the executor and the performance model:
//!
//! - **Layout helpers**: [`contiguous_strides`], [`shape_from_strides`] and
//!   [`required_len`] derive strides, stride-ordered shapes and minimal buffer
//!   lengths from per-dimension sizes and strides
//! - **Views**: [`TensorView`] / [`TensorViewMut`] pair a borrowed buffer with
//!   a base offset. They own no memory; the executor advances the offset while
//!   walking a loop nest and hands raw pointers to the kernels
//!
//! # Memory layout
//!
//! Strides are element counts, not bytes. A zero stride broadcasts the
//! dimension: every index along it addresses the same elements. Negative
//! strides are not representable in a loopten configuration.
//!
//! # Examples
//!
//! ```
//! use loopten_tensor::{contiguous_strides, required_len, shape_from_strides, MemoryOrder};
//!
//! // A[k, m] stored column-major with dims listed as (m, k)
//! let sizes = [3, 4];
//! let strides = contiguous_strides(&[4, 3], MemoryOrder::ColumnMajor);
//! assert_eq!(strides, vec![1, 4]);
//!
//! let strides = [4, 1]; // m has stride 4, k has stride 1
//! assert_eq!(shape_from_strides(&sizes, &strides), vec![3, 4]);
//! assert_eq!(required_len(&sizes, &strides).unwrap(), 12);
//! ```

use std::marker::PhantomData;

use loopten_device::{Error, Result};

/// Memory ordering for packed layouts.
///
/// - [`ColumnMajor`](MemoryOrder::ColumnMajor): First dimension is contiguous
///   (Fortran/Julia convention)
/// - [`RowMajor`](MemoryOrder::RowMajor): Last dimension is contiguous
///   (C/NumPy convention)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOrder {
    /// Column-major (Fortran/Julia order). First dimension has stride 1.
    ColumnMajor,
    /// Row-major (C/NumPy order). Last dimension has stride 1.
    RowMajor,
}

/// Packed strides for `dims` in the given memory order.
pub fn contiguous_strides(dims: &[i64], order: MemoryOrder) -> Vec<i64> {
    let mut strides = vec![0; dims.len()];
    let mut acc = 1i64;
    match order {
        MemoryOrder::ColumnMajor => {
            for (stride, &dim) in strides.iter_mut().zip(dims) {
                *stride = acc;
                acc *= dim;
            }
        }
        MemoryOrder::RowMajor => {
            for (stride, &dim) in strides.iter_mut().zip(dims).rev() {
                *stride = acc;
                acc *= dim;
            }
        }
    }
    strides
}

/// Sizes of the nonzero-stride dimensions, ordered by decreasing stride.
///
/// Pairs each dimension's `(|stride|, size)`, drops zero strides, sorts by
/// stride descending (stable, so ties keep configuration order) and keeps the
/// sizes. For a packed layout this is the row-major shape of the underlying
/// buffer.
///
/// # Examples
///
/// ```
/// use loopten_tensor::shape_from_strides;
///
/// // (m, n, k) with strides on `in0`: m=1, n=0 (broadcast), k=32
/// assert_eq!(shape_from_strides(&[32, 48, 24], &[1, 0, 32]), vec![24, 32]);
/// ```
pub fn shape_from_strides(dim_sizes: &[i64], strides: &[i64]) -> Vec<i64> {
    let mut pairs: Vec<(u64, i64)> = dim_sizes
        .iter()
        .zip(strides)
        .filter(|&(_, &stride)| stride != 0)
        .map(|(&size, &stride)| (stride.unsigned_abs(), size))
        .collect();
    pairs.sort_by(|a, b| b.0.cmp(&a.0));
    pairs.into_iter().map(|(_, size)| size).collect()
}

/// Minimal buffer length addressed by the layout: `1 + Σ (size-1) * stride`.
///
/// # Errors
///
/// Returns [`Error::MalformedConfig`] if a size is non-positive, a stride is
/// negative, the slices differ in length or the extent overflows `isize`.
pub fn required_len(dim_sizes: &[i64], strides: &[i64]) -> Result<usize> {
    if dim_sizes.len() != strides.len() {
        return Err(Error::MalformedConfig(format!(
            "{} dimension sizes but {} strides",
            dim_sizes.len(),
            strides.len()
        )));
    }
    let mut last: i64 = 0;
    for (dim, (&size, &stride)) in dim_sizes.iter().zip(strides).enumerate() {
        if size <= 0 {
            return Err(Error::MalformedConfig(format!(
                "dimension {dim} has non-positive size {size}"
            )));
        }
        if stride < 0 {
            return Err(Error::MalformedConfig(format!(
                "dimension {dim} has negative stride {stride}"
            )));
        }
        last = (size - 1)
            .checked_mul(stride)
            .and_then(|span| last.checked_add(span))
            .ok_or_else(|| {
                Error::MalformedConfig(format!("extent overflows at dimension {dim}"))
            })?;
    }
    let len = last
        .checked_add(1)
        .filter(|&len| len <= isize::MAX as i64)
        .ok_or_else(|| Error::MalformedConfig("extent overflows the address range".into()))?;
    Ok(len as usize)
}

/// Number of distinct elements addressed by a non-overlapping layout.
///
/// Equals the product of the nonzero-stride sizes; broadcast dimensions do
/// not contribute.
pub fn footprint(dim_sizes: &[i64], strides: &[i64]) -> u64 {
    dim_sizes
        .iter()
        .zip(strides)
        .filter(|&(_, &stride)| stride != 0)
        .map(|(&size, _)| size.max(0) as u64)
        .product()
}

/// Immutable (buffer, base offset) projection.
///
/// # Examples
///
/// ```
/// use loopten_tensor::TensorView;
///
/// let data = [1.0f32, 2.0, 3.0, 4.0];
/// let view = TensorView::new(&data).advance(2);
/// assert_eq!(view.offset(), 2);
/// assert_eq!(view.get(1), Some(&4.0));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
    data: &'a [T],
    offset: usize,
}

impl<'a, T> TensorView<'a, T> {
    /// View the whole buffer from offset zero.
    pub fn new(data: &'a [T]) -> Self {
        Self { data, offset: 0 }
    }

    /// Base offset into the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the underlying buffer.
    pub fn buffer_len(&self) -> usize {
        self.data.len()
    }

    /// Returns a view whose base is `delta` elements further along.
    pub fn advance(self, delta: usize) -> Self {
        Self {
            data: self.data,
            offset: self.offset + delta,
        }
    }

    /// Element at `base + index`, if it lies inside the buffer.
    pub fn get(&self, index: usize) -> Option<&'a T> {
        self.data.get(self.offset + index)
    }

    /// Raw pointer to `base + delta` for a block spanning `extent` elements.
    pub fn ptr_at(&self, delta: usize, extent: usize) -> *const T {
        let start = self.offset + delta;
        debug_assert!(
            start + extent <= self.data.len(),
            "block [{start}, {}) exceeds buffer of {}",
            start + extent,
            self.data.len()
        );
        self.data.as_ptr().wrapping_add(start)
    }
}

/// Mutable (buffer, base offset) projection.
///
/// Unlike a `&mut [T]`, the view is `Copy` and `Sync`, so one output buffer
/// can be handed to several workers that each write a disjoint tile. The
/// view only produces raw pointers; writing through them is `unsafe`, and
/// two workers writing overlapping elements is undefined behaviour.
#[derive(Debug)]
pub struct TensorViewMut<'a, T> {
    ptr: *mut T,
    len: usize,
    offset: usize,
    _marker: PhantomData<&'a mut [T]>,
}

impl<T> Clone for TensorViewMut<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TensorViewMut<'_, T> {}

// SAFETY: the view hands out raw pointers only; exclusive access to any
// element is the caller's obligation at the dereference site.
unsafe impl<T: Send> Send for TensorViewMut<'_, T> {}
unsafe impl<T: Send> Sync for TensorViewMut<'_, T> {}

impl<'a, T> TensorViewMut<'a, T> {
    /// View the whole buffer from offset zero.
    pub fn new(data: &'a mut [T]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
            offset: 0,
            _marker: PhantomData,
        }
    }

    /// Base offset into the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the underlying buffer.
    pub fn buffer_len(&self) -> usize {
        self.len
    }

    /// Returns a view whose base is `delta` elements further along.
    pub fn advance(self, delta: usize) -> Self {
        Self {
            offset: self.offset + delta,
            ..self
        }
    }

    /// Raw pointer to `base + delta` for a block spanning `extent` elements.
    pub fn ptr_at_mut(&self, delta: usize, extent: usize) -> *mut T {
        let start = self.offset + delta;
        debug_assert!(
            start + extent <= self.len,
            "block [{start}, {}) exceeds buffer of {}",
            start + extent,
            self.len
        );
        self.ptr.wrapping_add(start)
    }
}
