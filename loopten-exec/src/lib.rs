//! Loop-nest execution of tensor contractions.
//!
//! This crate turns a validated
//! [`TensorOperationConfig`](loopten_tensorops::TensorOperationConfig) into
//! explicit loops around one primitive call:
//!
//! - **Execution**: [`TensorOperation`] lowers the non-prim dimensions into a
//!   loop nest and issues one fused primitive call per leaf. Shared
//!   dimensions are flattened into one index space and spread over a rayon
//!   pool; `LOOPTEN_NUM_THREADS` sizes that pool.
//! - **Loop orders**: [`enumerate_loop_orders`] yields every permutation of
//!   the seq dimensions, each computing the same result.
//!
//! # Accumulation
//!
//! Loops along which the output pointer does not move (every `k` loop)
//! accumulate into the same output tile. The leaf with all such indices at
//! zero is the first pass and applies `prim_first`; the leaf with all of
//! them at their last value is the last pass and applies `prim_last`. For a
//! fixed output tile these leaves are visited first and last in any loop
//! order.
//!
//! # Examples
//!
//! ```
//! use loopten_exec::execute;
//! use loopten_tensorops::TensorOperationConfig;
//!
//! // C(3x2) = A(3x4) · B(4x2), column-major, all ones
//! let config = TensorOperationConfig::simple_gemm(3, 2, 4);
//! let a = vec![1.0f32; 12];
//! let b = vec![1.0f32; 8];
//! let mut c = vec![0.0f32; 6];
//! execute(&config, &a, &b, &mut c).unwrap();
//! assert!(c.iter().all(|&x| x == 4.0));
//! ```

mod executor;
mod loop_order;

pub use executor::{execute, TensorOperation};
pub use loop_order::{count_loop_orders, enumerate_loop_orders, LoopOrders};
