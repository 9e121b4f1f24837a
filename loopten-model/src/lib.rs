//! Analytical performance model for loopten contractions.
//!
//! The model predicts the run time of a [`TensorOperationConfig`] on a
//! [`MicroArchProfile`] without executing it. It is a roofline over two
//! independent estimates:
//!
//! - **Compute**: each primitive call costs the FMA issue cycles of its
//!   register-blocked tile (sizes padded up to the profile's preferred tile),
//!   the accumulator load/store cycles and a fixed call overhead. Calls are
//!   spread over `min(cores, shared iterations)` workers.
//! - **Memory**: every operand is streamed from main memory once. Loops along
//!   which an operand's stride is zero re-read it; those re-reads are served
//!   by the innermost cache level that holds everything the loop body
//!   touches.
//!
//! The prediction is `max(compute, memory)`. Results are deterministic and
//! never decrease when every dimension grows.
//!
//! # Examples
//!
//! ```
//! use loopten_device::MicroArch;
//! use loopten_model::{estimate, predict, Bound};
//! use loopten_tensorops::TensorOperationConfig;
//!
//! let config = TensorOperationConfig::simple_gemm(512, 512, 512);
//! let profile = MicroArch::Zen5.profile();
//!
//! let breakdown = estimate(&config, &profile).unwrap();
//! assert_eq!(breakdown.flops, 2.0 * 512.0 * 512.0 * 512.0);
//! assert_eq!(breakdown.bound, Bound::Compute);
//! assert!(breakdown.efficiency > 0.0 && breakdown.efficiency <= 1.0);
//! let predicted = predict(&config, &profile).unwrap();
//! assert!((predicted.as_secs_f64() - breakdown.seconds).abs() < 1e-9);
//! ```

use std::fmt;
use std::time::Duration;

use loopten_device::{MicroArchProfile, Result};
use loopten_tensorops::TensorOperationConfig;

mod compute;
mod memory;

/// Which side of the roofline limits a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    /// Primitive calls dominate.
    Compute,
    /// Data movement dominates.
    Memory,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bound::Compute => "compute",
            Bound::Memory => "memory",
        })
    }
}

/// Floating-point throughput.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct FlopsPerSecond(pub f64);

impl FlopsPerSecond {
    /// Throughput in GFLOP/s.
    pub fn gflops(self) -> f64 {
        self.0 * 1.0e-9
    }
}

impl fmt::Display for FlopsPerSecond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} GFLOP/s", self.gflops())
    }
}

/// Full breakdown of one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// `2 * Π dim_sizes`.
    pub flops: f64,
    /// Time spent in primitive calls on the busiest worker.
    pub compute_seconds: f64,
    /// Time spent moving data.
    pub memory_seconds: f64,
    /// `max(compute_seconds, memory_seconds)`.
    pub seconds: f64,
    /// Achieved fraction of the profile's peak, in `(0, 1]`.
    pub efficiency: f64,
    /// Bytes of distinct elements over all operands.
    pub memory_bytes: u64,
    /// Bytes moved, counting re-reads and output write-backs.
    pub traffic_bytes: f64,
    /// Cycles of one primitive call.
    pub cycles_per_call: f64,
    /// Workers sharing the shared dimensions.
    pub workers: usize,
    /// The limiting side.
    pub bound: Bound,
}

impl Estimate {
    /// Achieved throughput.
    pub fn throughput(&self) -> FlopsPerSecond {
        FlopsPerSecond(self.flops / self.seconds)
    }
}

/// Predict the run time of `config` on `profile` with its full breakdown.
///
/// # Errors
///
/// Any error of [`loopten_tensorops::validate`] for the configuration, and
/// [`loopten_device::Error::InvalidArgument`] for an inconsistent profile.
/// A valid configuration never fails, however many iterations it runs.
pub fn estimate(config: &TensorOperationConfig, profile: &MicroArchProfile) -> Result<Estimate> {
    config.validate()?;
    profile.validate()?;

    let compute = compute::compute_cost(config, profile);
    let memory = memory::memory_cost(config, profile);
    let flops = config.flops();
    let (seconds, bound) = if compute.seconds >= memory.seconds {
        (compute.seconds, Bound::Compute)
    } else {
        (memory.seconds, Bound::Memory)
    };
    let peak = profile.peak_flops(config.data_type.size_bytes());
    let estimate = Estimate {
        flops,
        compute_seconds: compute.seconds,
        memory_seconds: memory.seconds,
        seconds,
        efficiency: flops / (seconds * peak),
        memory_bytes: memory.footprint_bytes,
        traffic_bytes: memory.traffic_bytes,
        cycles_per_call: compute.cycles_per_call,
        workers: compute.workers,
        bound,
    };
    log::debug!(
        "{}: {:.3e} s ({bound} bound), compute {:.3e} s over {} workers x {} calls of {:.0} cycles, \
         memory {:.3e} s for {:.3e} bytes, efficiency {:.3}",
        profile.name,
        estimate.seconds,
        estimate.compute_seconds,
        estimate.workers,
        compute.calls_per_worker,
        estimate.cycles_per_call,
        estimate.memory_seconds,
        estimate.traffic_bytes,
        estimate.efficiency,
    );
    Ok(estimate)
}

/// Predicted run time of `config` on `profile`, saturating at
/// [`Duration::MAX`].
///
/// # Errors
///
/// As [`estimate`].
pub fn predict(config: &TensorOperationConfig, profile: &MicroArchProfile) -> Result<Duration> {
    let seconds = estimate(config, profile)?.seconds;
    Ok(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
}

/// Predicted throughput of `config` on `profile`.
///
/// # Errors
///
/// As [`estimate`].
pub fn predict_throughput(
    config: &TensorOperationConfig,
    profile: &MicroArchProfile,
) -> Result<FlopsPerSecond> {
    Ok(estimate(config, profile)?.throughput())
}
