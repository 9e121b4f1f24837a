use loopten_device::MicroArchProfile;
use loopten_prims::PrimType;
use loopten_tensor::footprint;
use loopten_tensorops::{Operand, TensorOperationConfig};

/// Memory side of an estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MemoryCost {
    /// Bytes of distinct elements over all operands.
    pub footprint_bytes: u64,
    /// Bytes moved between cores and the memory hierarchy.
    pub traffic_bytes: f64,
    pub seconds: f64,
}

/// Bytes touched on every operand by the dimensions after `dim`.
fn inner_working_set(config: &TensorOperationConfig, dim: usize, elem_bytes: u64) -> u64 {
    let sizes = &config.dim_sizes[dim + 1..];
    Operand::ALL
        .iter()
        .map(|&operand| footprint(sizes, &config.strides[operand][dim + 1..]).saturating_mul(elem_bytes))
        .fold(0, u64::saturating_add)
}

struct OperandTraffic {
    first_touch: f64,
    reuse: f64,
    reuse_bandwidth: f64,
}

fn operand_traffic(
    config: &TensorOperationConfig,
    profile: &MicroArchProfile,
    operand: Operand,
    elem_bytes: u64,
) -> OperandTraffic {
    let bytes = config.operand_footprint(operand) as f64 * elem_bytes as f64;
    let strides = &config.strides[operand];
    let reuse_dims: Vec<usize> = (0..config.prim_start())
        .filter(|&dim| strides[dim] == 0)
        .collect();
    let reuse_count: f64 = reuse_dims
        .iter()
        .map(|&dim| config.dim_sizes[dim] as f64)
        .product();
    let reuse_bandwidth = reuse_dims.last().map_or(profile.dram_bandwidth(), |&dim| {
        profile.bandwidth_for(inner_working_set(config, dim, elem_bytes))
    });

    // output tiles are read and written back, unless a zeroing first pass
    // replaces the first read
    let (first, again) = match operand {
        Operand::Out if config.prim_first == PrimType::Zero => (1.0, 2.0),
        Operand::Out => (2.0, 2.0),
        _ => (1.0, 1.0),
    };
    OperandTraffic {
        first_touch: first * bytes,
        reuse: again * (reuse_count - 1.0) * bytes,
        reuse_bandwidth,
    }
}

pub(crate) fn memory_cost(config: &TensorOperationConfig, profile: &MicroArchProfile) -> MemoryCost {
    let elem_bytes = config.data_type.size_bytes() as u64;
    let mut footprint_bytes = 0u64;
    let mut traffic_bytes = 0.0;
    let mut seconds = 0.0;
    for operand in Operand::ALL {
        footprint_bytes = config
            .operand_footprint(operand)
            .saturating_mul(elem_bytes)
            .saturating_add(footprint_bytes);
        let traffic = operand_traffic(config, profile, operand, elem_bytes);
        traffic_bytes += traffic.first_touch + traffic.reuse;
        seconds += traffic.first_touch / profile.dram_bandwidth()
            + traffic.reuse / traffic.reuse_bandwidth;
    }
    MemoryCost {
        footprint_bytes,
        traffic_bytes,
        seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopten_device::MicroArch;
    use loopten_tensorops::{DimType, ExecType};

    #[test]
    fn single_call_streams_each_operand_once() {
        let profile = MicroArch::Zen5.profile();
        let config = TensorOperationConfig::simple_gemm(64, 32, 16);
        let cost = memory_cost(&config, &profile);
        let bytes = 4.0 * (64.0 * 16.0 + 16.0 * 32.0 + 64.0 * 32.0);
        assert_eq!(cost.footprint_bytes, bytes as u64);
        assert_eq!(cost.traffic_bytes, bytes);
        assert!((cost.seconds - bytes / 50.0e9).abs() < 1e-18);
    }

    #[test]
    fn outer_k_loop_rereads_the_output_from_cache() {
        let profile = MicroArch::Zen5.profile();
        // 64x48x32 gemm with k split into seq 2 x prim 16
        let mut config = TensorOperationConfig::simple_gemm(64, 48, 32);
        config.dim_types.insert(0, DimType::K);
        config.exec_types.insert(0, ExecType::Seq);
        config.dim_sizes = vec![2, 64, 48, 16];
        config.strides.0 = [
            vec![16 * 64, 1, 0, 64],
            vec![16, 0, 32, 1],
            vec![0, 1, 64, 0],
        ];
        config.validate().unwrap();

        let out_bytes = 4.0 * 64.0 * 48.0;
        let traffic = operand_traffic(&config, &profile, Operand::Out, 4);
        assert_eq!(traffic.first_touch, out_bytes);
        assert_eq!(traffic.reuse, 2.0 * out_bytes);
        // one k block of each operand: 4 KiB + 3 KiB + 12 KiB fits in L1
        assert_eq!(traffic.reuse_bandwidth, 500.0e9);

        let in0 = operand_traffic(&config, &profile, Operand::In0, 4);
        assert_eq!(in0.reuse, 0.0);
    }
}
