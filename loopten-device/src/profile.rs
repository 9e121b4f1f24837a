use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Microarchitecture with a built-in performance profile.
///
/// Cache sizes and bandwidths follow vendor documentation and measured
/// stream bandwidths; use [`MicroArchProfile::from_json`] to describe any
/// other core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicroArch {
    /// AMD Zen 5 (AVX-512, two 512-bit FMA pipes).
    Zen5,
    /// Apple M4 performance core (NEON, four 128-bit FMA pipes).
    M4,
    /// Arm Cortex-A76 (NEON, two 128-bit FMA pipes).
    A76,
    /// Conservative AVX2-class core for unknown hardware.
    Generic,
}

impl MicroArch {
    /// All built-in microarchitectures.
    pub const ALL: [MicroArch; 4] = [
        MicroArch::Zen5,
        MicroArch::M4,
        MicroArch::A76,
        MicroArch::Generic,
    ];

    /// Returns the built-in profile for this microarchitecture.
    pub fn profile(self) -> MicroArchProfile {
        match self {
            MicroArch::Zen5 => MicroArchProfile {
                name: "zen5".into(),
                frequency_ghz: 5.0,
                cores: 16,
                fma_units: 2,
                vector_bytes: 64,
                preferred_tile: PreferredTile { m_vectors: 4, n: 6 },
                c_tile_cycles: 2.0,
                call_overhead_cycles: 40.0,
                strided_penalty: 2.0,
                caches: vec![
                    CacheLevel::new(32 * 1024, 500.0),
                    CacheLevel::new(1024 * 1024, 200.0),
                    CacheLevel::new(32 * 1024 * 1024, 100.0),
                ],
                dram_bandwidth_gb_s: 50.0,
            },
            MicroArch::M4 => MicroArchProfile {
                name: "m4".into(),
                frequency_ghz: 4.4,
                cores: 4,
                fma_units: 4,
                vector_bytes: 16,
                preferred_tile: PreferredTile { m_vectors: 4, n: 4 },
                c_tile_cycles: 1.0,
                call_overhead_cycles: 30.0,
                strided_penalty: 2.0,
                caches: vec![
                    CacheLevel::new(128 * 1024, 912.0),
                    CacheLevel::new(16 * 1024 * 1024, 912.0),
                ],
                dram_bandwidth_gb_s: 66.0,
            },
            MicroArch::A76 => MicroArchProfile {
                name: "a76".into(),
                frequency_ghz: 2.4,
                cores: 4,
                fma_units: 2,
                vector_bytes: 16,
                preferred_tile: PreferredTile { m_vectors: 4, n: 4 },
                c_tile_cycles: 2.0,
                call_overhead_cycles: 60.0,
                strided_penalty: 2.5,
                caches: vec![
                    CacheLevel::new(64 * 1024, 100.0),
                    CacheLevel::new(256 * 1024, 50.0),
                    CacheLevel::new(2 * 1024 * 1024, 30.0),
                ],
                dram_bandwidth_gb_s: 20.0,
            },
            MicroArch::Generic => MicroArchProfile {
                name: "generic".into(),
                frequency_ghz: 3.0,
                cores: 8,
                fma_units: 2,
                vector_bytes: 32,
                preferred_tile: PreferredTile { m_vectors: 2, n: 6 },
                c_tile_cycles: 2.0,
                call_overhead_cycles: 50.0,
                strided_penalty: 2.0,
                caches: vec![
                    CacheLevel::new(32 * 1024, 100.0),
                    CacheLevel::new(256 * 1024, 50.0),
                    CacheLevel::new(8 * 1024 * 1024, 30.0),
                ],
                dram_bandwidth_gb_s: 20.0,
            },
        }
    }

    /// Lower-case name used by [`FromStr`] and [`fmt::Display`].
    pub fn as_str(self) -> &'static str {
        match self {
            MicroArch::Zen5 => "zen5",
            MicroArch::M4 => "m4",
            MicroArch::A76 => "a76",
            MicroArch::Generic => "generic",
        }
    }
}

impl fmt::Display for MicroArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MicroArch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        MicroArch::ALL
            .into_iter()
            .find(|arch| arch.as_str() == normalized)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown microarchitecture '{s}'")))
    }
}

/// One level of the data cache hierarchy, innermost first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheLevel {
    /// Capacity in bytes available to one core.
    pub size_bytes: u64,
    /// Sustained read bandwidth in GB/s.
    pub bandwidth_gb_s: f64,
}

impl CacheLevel {
    /// Create a cache level.
    pub const fn new(size_bytes: u64, bandwidth_gb_s: f64) -> Self {
        Self {
            size_bytes,
            bandwidth_gb_s,
        }
    }
}

/// Register-blocking shape of the microkernel.
///
/// `m_vectors` is counted in vector registers so the same profile serves
/// every element width; the element tile is `m_vectors * lanes` by `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredTile {
    /// Vector registers along the M dimension.
    pub m_vectors: usize,
    /// Columns along the N dimension.
    pub n: usize,
}

/// Performance parameters of one core type.
///
/// The performance model treats this as an opaque capability and only reads
/// the fields below. Profiles can be constructed in code, taken from
/// [`MicroArch::profile`] or parsed with [`MicroArchProfile::from_json`].
///
/// # Examples
///
/// ```
/// use loopten_device::MicroArchProfile;
///
/// let json = r#"{
///     "name": "tiny",
///     "frequency_ghz": 1.0,
///     "cores": 1,
///     "fma_units": 1,
///     "vector_bytes": 16,
///     "preferred_tile": { "m_vectors": 2, "n": 4 },
///     "c_tile_cycles": 1.0,
///     "call_overhead_cycles": 10.0,
///     "strided_penalty": 2.0,
///     "caches": [{ "size_bytes": 32768, "bandwidth_gb_s": 64.0 }],
///     "dram_bandwidth_gb_s": 8.0
/// }"#;
/// let profile = MicroArchProfile::from_json(json).unwrap();
/// assert_eq!(profile.peak_flops(4), 8.0e9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroArchProfile {
    /// Display name.
    pub name: String,
    /// Sustained core clock in GHz.
    pub frequency_ghz: f64,
    /// Cores available for shared (parallel) dimensions.
    pub cores: usize,
    /// FMA instructions issued per cycle.
    pub fma_units: usize,
    /// SIMD register width in bytes.
    pub vector_bytes: usize,
    /// Microkernel register blocking.
    pub preferred_tile: PreferredTile,
    /// Cycles to load and store one accumulator vector of the output tile.
    pub c_tile_cycles: f64,
    /// Fixed cycles per primitive call.
    pub call_overhead_cycles: f64,
    /// Slowdown factor when a GEMM operand lacks a unit-stride axis.
    pub strided_penalty: f64,
    /// Cache hierarchy, innermost first, with non-decreasing sizes.
    pub caches: Vec<CacheLevel>,
    /// Main-memory bandwidth in GB/s.
    pub dram_bandwidth_gb_s: f64,
}

impl MicroArchProfile {
    /// Parse and validate a profile from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProfileParse`] for malformed JSON and
    /// [`Error::InvalidArgument`] if a parameter is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let profile: MicroArchProfile = serde_json::from_str(json)?;
        profile.validate()?;
        log::debug!("loaded microarchitecture profile '{}'", profile.name);
        Ok(profile)
    }

    /// Serialize the profile to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every rate and size is positive, the caches are ordered and
    /// bandwidth does not increase towards main memory.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("frequency_ghz", self.frequency_ghz),
            ("c_tile_cycles", self.c_tile_cycles),
            ("dram_bandwidth_gb_s", self.dram_bandwidth_gb_s),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidArgument(format!(
                    "profile '{}': {field} must be positive, got {value}",
                    self.name
                )));
            }
        }
        if !(self.call_overhead_cycles.is_finite() && self.call_overhead_cycles >= 0.0) {
            return Err(Error::InvalidArgument(format!(
                "profile '{}': call_overhead_cycles must be non-negative",
                self.name
            )));
        }
        if !(self.strided_penalty.is_finite() && self.strided_penalty >= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "profile '{}': strided_penalty must be at least 1.0",
                self.name
            )));
        }
        if self.cores == 0
            || self.fma_units == 0
            || self.vector_bytes == 0
            || self.preferred_tile.m_vectors == 0
            || self.preferred_tile.n == 0
        {
            return Err(Error::InvalidArgument(format!(
                "profile '{}': core counts, vector width and tile sizes must be non-zero",
                self.name
            )));
        }
        for pair in self.caches.windows(2) {
            if pair[1].size_bytes < pair[0].size_bytes {
                return Err(Error::InvalidArgument(format!(
                    "profile '{}': cache levels must be ordered innermost first",
                    self.name
                )));
            }
        }
        if let Some(level) = self
            .caches
            .iter()
            .find(|level| !(level.bandwidth_gb_s.is_finite() && level.bandwidth_gb_s > 0.0))
        {
            return Err(Error::InvalidArgument(format!(
                "profile '{}': cache of {} bytes has non-positive bandwidth",
                self.name, level.size_bytes
            )));
        }
        let bandwidths: Vec<f64> = self
            .caches
            .iter()
            .map(|level| level.bandwidth_gb_s)
            .chain([self.dram_bandwidth_gb_s])
            .collect();
        if bandwidths.windows(2).any(|pair| pair[1] > pair[0]) {
            return Err(Error::InvalidArgument(format!(
                "profile '{}': bandwidth must not grow from one memory level to the next",
                self.name
            )));
        }
        Ok(())
    }

    /// SIMD lanes for elements of `elem_bytes` bytes (at least one).
    pub fn lanes(&self, elem_bytes: usize) -> usize {
        (self.vector_bytes / elem_bytes.max(1)).max(1)
    }

    /// Microkernel tile in elements: `(m_r, n_r)`.
    pub fn tile(&self, elem_bytes: usize) -> (usize, usize) {
        (
            self.preferred_tile.m_vectors * self.lanes(elem_bytes),
            self.preferred_tile.n,
        )
    }

    /// Peak floating-point rate of one core in FLOP/s.
    pub fn peak_flops_per_core(&self, elem_bytes: usize) -> f64 {
        self.frequency_ghz * 1.0e9 * self.fma_units as f64 * self.lanes(elem_bytes) as f64 * 2.0
    }

    /// Peak floating-point rate of all cores in FLOP/s.
    pub fn peak_flops(&self, elem_bytes: usize) -> f64 {
        self.peak_flops_per_core(elem_bytes) * self.cores as f64
    }

    /// Bandwidth in bytes/s of the innermost level holding `working_set` bytes,
    /// falling back to main memory.
    pub fn bandwidth_for(&self, working_set: u64) -> f64 {
        self.caches
            .iter()
            .find(|level| working_set <= level.size_bytes)
            .map_or(self.dram_bandwidth_gb_s, |level| level.bandwidth_gb_s)
            * 1.0e9
    }

    /// Main-memory bandwidth in bytes/s.
    pub fn dram_bandwidth(&self) -> f64 {
        self.dram_bandwidth_gb_s * 1.0e9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_validate() {
        for arch in MicroArch::ALL {
            arch.profile().validate().unwrap();
        }
    }

    #[test]
    fn names_round_trip() {
        for arch in MicroArch::ALL {
            assert_eq!(arch.as_str().parse::<MicroArch>().unwrap(), arch);
        }
        assert_eq!(" ZEN5 ".parse::<MicroArch>().unwrap(), MicroArch::Zen5);
        assert!(matches!(
            "pentium".parse::<MicroArch>(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn json_round_trip_keeps_parameters() {
        let profile = MicroArch::A76.profile();
        let parsed = MicroArchProfile::from_json(&profile.to_json().unwrap()).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn rejects_unordered_caches() {
        let mut profile = MicroArch::Generic.profile();
        profile.caches.reverse();
        assert!(matches!(profile.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rejects_dram_faster_than_cache() {
        let mut profile = MicroArch::Zen5.profile();
        profile.dram_bandwidth_gb_s = 1000.0;
        assert!(matches!(profile.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            MicroArchProfile::from_json("{ \"name\": 3 }"),
            Err(Error::ProfileParse(_))
        ));
    }

    #[test]
    fn bandwidth_picks_innermost_fitting_level() {
        let profile = MicroArch::Zen5.profile();
        assert_eq!(profile.bandwidth_for(1024), 500.0e9);
        assert_eq!(profile.bandwidth_for(64 * 1024), 200.0e9);
        assert_eq!(profile.bandwidth_for(1 << 40), 50.0e9);
    }

    #[test]
    fn tile_scales_with_element_width() {
        let profile = MicroArch::Generic.profile();
        assert_eq!(profile.tile(4), (16, 6));
        assert_eq!(profile.tile(8), (8, 6));
    }
}
