use loopten_device::MicroArchProfile;
use loopten_tensorops::{DimType, Operand, TensorOperationConfig};

/// Compute side of an estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ComputeCost {
    pub cycles_per_call: f64,
    pub calls_per_worker: f64,
    pub workers: usize,
    pub seconds: f64,
}

/// Whether some operand has no unit-stride axis among the prim dimensions it
/// is indexed by.
///
/// The microkernel streams `in0` along `m` or `k`, `in1` along `n` or `k`
/// and `out` along `m` or `n`.
pub(crate) fn is_strided(config: &TensorOperationConfig) -> bool {
    let start = config.prim_start();
    let has_unit_axis = |operand: Operand, roles: [DimType; 2]| {
        (start..config.num_dims()).any(|dim| {
            roles.contains(&config.dim_types[dim]) && config.strides.get(operand, dim) == 1
        })
    };
    !(has_unit_axis(Operand::In0, [DimType::M, DimType::K])
        && has_unit_axis(Operand::In1, [DimType::N, DimType::K])
        && has_unit_axis(Operand::Out, [DimType::M, DimType::N]))
}

/// Cycles of one primitive call on `profile`.
pub(crate) fn cycles_per_call(config: &TensorOperationConfig, profile: &MicroArchProfile) -> f64 {
    let elem_bytes = config.data_type.size_bytes();
    let (m_r, n_r) = profile.tile(elem_bytes);
    let prim = config.prim_sizes();

    // accumulator vectors along m and padded columns along n
    let m_vectors = (prim.m as f64 / m_r as f64).ceil() * profile.preferred_tile.m_vectors as f64;
    let n_cols = (prim.n as f64 / n_r as f64).ceil() * n_r as f64;
    let c_tile = prim.c as f64 * m_vectors * n_cols;

    let fma = c_tile * prim.br as f64 * prim.k as f64 / profile.fma_units as f64;
    let load_store = c_tile * profile.c_tile_cycles;
    let cycles = fma + load_store + profile.call_overhead_cycles;
    if is_strided(config) {
        cycles * profile.strided_penalty
    } else {
        cycles
    }
}

pub(crate) fn compute_cost(config: &TensorOperationConfig, profile: &MicroArchProfile) -> ComputeCost {
    let shared = config.shared_iterations();
    let seq = config.loop_iterations() / shared;
    let workers = (profile.cores as f64).min(shared).max(1.0);
    let calls_per_worker = (shared / workers).ceil() * seq;
    let cycles_per_call = cycles_per_call(config, profile);
    ComputeCost {
        cycles_per_call,
        calls_per_worker,
        workers: workers as usize,
        seconds: calls_per_worker * cycles_per_call / (profile.frequency_ghz * 1.0e9),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopten_device::MicroArch;

    #[test]
    fn padded_tile_cycles() {
        // generic f32: lanes 8, tile 16x6; 20x7x10 pads to 4 vectors x 12 columns
        let profile = MicroArch::Generic.profile();
        let config = TensorOperationConfig::simple_gemm(20, 7, 10);
        let tile = 4.0 * 12.0;
        let expected = tile * 10.0 / 2.0 + tile * 2.0 + 50.0;
        assert_eq!(cycles_per_call(&config, &profile), expected);
    }

    #[test]
    fn strided_operands_pay_the_penalty() {
        let profile = MicroArch::Generic.profile();
        let config = TensorOperationConfig::simple_gemm(16, 6, 8);
        assert!(!is_strided(&config));

        // same gemm with every operand spread out by a factor of 2
        let mut strided = config.clone();
        for strides in strided.strides.0.iter_mut() {
            strides.iter_mut().for_each(|stride| *stride *= 2);
        }
        strided.validate().unwrap();
        assert!(is_strided(&strided));
        assert_eq!(
            cycles_per_call(&strided, &profile),
            cycles_per_call(&config, &profile) * profile.strided_penalty
        );
    }

    #[test]
    fn workers_are_capped_by_cores_and_shared_iterations() {
        let profile = MicroArch::M4.profile();
        let cost = compute_cost(&TensorOperationConfig::simple_gemm(8, 8, 8), &profile);
        assert_eq!(cost.workers, 1);
        assert_eq!(cost.calls_per_worker, 1.0);
    }
}
