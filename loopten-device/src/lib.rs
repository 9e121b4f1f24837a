//! Hardware description and shared error types for the loopten workspace.
//!
//! This crate provides:
//! - [`MicroArch`] enum naming the microarchitectures the performance model knows
//! - [`MicroArchProfile`] holding the peak-rate, cache and tile parameters of a core
//! - [`env`] accessors for the runtime configuration read from the environment
//! - [`Error`] and [`Result`] types used across all loopten crates
//!
//! # Examples
//!
//! ```
//! use loopten_device::MicroArch;
//!
//! let arch: MicroArch = "zen5".parse().unwrap();
//! assert_eq!(format!("{arch}"), "zen5");
//!
//! let profile = arch.profile();
//! assert_eq!(profile.lanes(4), 16);
//! ```

pub mod env;
mod profile;

pub use profile::{CacheLevel, MicroArch, MicroArchProfile, PreferredTile};

/// Error type used across the loopten workspace.
///
/// Configuration errors are programming errors, never transient conditions:
/// nothing in the workspace retries after receiving one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structural problem: mismatched sequence lengths, non-positive sizes,
    /// negative strides or an extent that overflows the address range.
    #[error("malformed config: {0}")]
    MalformedConfig(String),

    /// The prim-tagged dimension roles do not match what the main primitive
    /// requires.
    #[error("invalid primitive shape: {0}")]
    InvalidPrimitiveShape(String),

    /// Stride-implied shapes disagree with the dimension roles or sizes.
    #[error("shape mismatch on {operand} dimension {dim}: {reason}")]
    ShapeMismatch {
        /// Operand whose strides are inconsistent (`in0`, `in1` or `out`).
        operand: &'static str,
        /// Dimension index in the configuration.
        dim: usize,
        /// Human-readable description of the inconsistency.
        reason: String,
    },

    /// No dispatch is registered for the backend / data type / primitive triple.
    #[error("no dispatch registered for backend {backend}, data type {data_type}, primitives {primitives}")]
    UnsupportedCombination {
        /// Backend tag.
        backend: String,
        /// Element type tag.
        data_type: String,
        /// `first/main/last` primitive triple.
        primitives: String,
    },

    /// The dispatch layer cannot service the requested operation.
    #[error("unsupported primitive: {0}")]
    UnsupportedPrimitive(String),

    /// A caller buffer is smaller than the extent implied by the strides.
    #[error("{operand} buffer holds {len} elements but the strides address {required}")]
    OutOfBounds {
        /// Operand whose buffer is too small.
        operand: &'static str,
        /// Minimum number of elements required.
        required: usize,
        /// Number of elements supplied.
        len: usize,
    },

    /// An invalid argument was provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A microarchitecture profile could not be parsed.
    #[error("failed to parse microarchitecture profile: {0}")]
    ProfileParse(#[from] serde_json::Error),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
