#![allow(dead_code)]

use loopten_algebra::{DataType, Scalar};
use loopten_prims::{Backend, PrimType};
use loopten_tensorops::{DimType, ExecType, Operand, Strides, TensorOperationConfig};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Deserialize;

/// A named benchmark contraction.
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub name: String,
    pub config: TensorOperationConfig,
}

/// The TCCG binary-contraction suite (tccg_01 to tccg_24).
pub fn tccg() -> Vec<Fixture> {
    serde_json::from_str(include_str!("../../../testdata/tccg.json"))
        .expect("testdata/tccg.json is valid")
}

pub fn random_buffer<T: Scalar>(len: usize, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| T::from_f64(rng.sample::<f64, _>(StandardNormal)))
        .collect()
}

pub fn buffers<T: Scalar>(config: &TensorOperationConfig, seed: u64) -> (Vec<T>, Vec<T>, Vec<T>) {
    let len = |operand| config.required_len(operand).expect("valid config");
    (
        random_buffer(len(Operand::In0), seed),
        random_buffer(len(Operand::In1), seed + 1),
        random_buffer(len(Operand::Out), seed + 2),
    )
}

/// Brute-force evaluation of `config` over every index tuple, accumulating in `f64`.
pub fn reference_contraction<T: Scalar>(
    config: &TensorOperationConfig,
    in0: &[T],
    in1: &[T],
    out: &mut [T],
) {
    let sizes: Vec<usize> = config.dim_sizes.iter().map(|&size| size as usize).collect();
    let offset = |operand: Operand, index: &[usize]| -> usize {
        index
            .iter()
            .zip(&config.strides[operand])
            .map(|(&i, &stride)| i * stride as usize)
            .sum()
    };
    let mut acc: Vec<f64> = out.iter().map(|&x| x.to_f64()).collect();
    let mut touched = vec![false; out.len()];

    let mut index = vec![0usize; sizes.len()];
    loop {
        let o = offset(Operand::Out, &index);
        if !touched[o] {
            touched[o] = true;
            if config.prim_first == PrimType::Zero {
                acc[o] = 0.0;
            }
        }
        acc[o] += in0[offset(Operand::In0, &index)].to_f64() * in1[offset(Operand::In1, &index)].to_f64();

        let Some(dim) = (0..sizes.len()).rev().find(|&dim| index[dim] + 1 < sizes[dim]) else {
            break;
        };
        index[dim] += 1;
        index[dim + 1..].iter_mut().for_each(|i| *i = 0);
    }

    for (o, value) in out.iter_mut().enumerate() {
        if touched[o] {
            let sum = acc[o];
            let sum = if config.prim_last == PrimType::Relu { sum.max(0.0) } else { sum };
            *value = T::from_f64(sum);
        }
    }
}

pub fn assert_close<T: Scalar>(actual: &[T], expected: &[T], tol: f64) {
    assert_eq!(actual.len(), expected.len());
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let (a, e) = (a.to_f64(), e.to_f64());
        assert!(
            (a - e).abs() <= tol * (1.0 + e.abs()),
            "element {i}: got {a}, expected {e}"
        );
    }
}

/// One loop dimension ahead of the prim block.
#[derive(Debug, Clone, Copy)]
pub struct LoopSpec {
    pub role: DimType,
    pub exec: ExecType,
    pub size: i64,
}

/// Packs every operand densely: prim `m, n, k` innermost, then the loop
/// dimensions from last to first. Dimensions absent from an operand get
/// stride 0.
pub fn packed_config(
    backend: Backend,
    first: PrimType,
    last: PrimType,
    loops: &[LoopSpec],
    (m, n, k): (i64, i64, i64),
) -> TensorOperationConfig {
    let mut dim_types: Vec<DimType> = loops.iter().map(|dim| dim.role).collect();
    let mut exec_types: Vec<ExecType> = loops.iter().map(|dim| dim.exec).collect();
    let mut dim_sizes: Vec<i64> = loops.iter().map(|dim| dim.size).collect();
    dim_types.extend([DimType::M, DimType::N, DimType::K]);
    exec_types.extend([ExecType::Prim; 3]);
    dim_sizes.extend([m, n, k]);

    let present = |operand: Operand, role: DimType| match (operand, role) {
        (_, DimType::C) => true,
        (Operand::In0, role) => matches!(role, DimType::M | DimType::K),
        (Operand::In1, role) => matches!(role, DimType::N | DimType::K),
        (Operand::Out, role) => matches!(role, DimType::M | DimType::N),
    };
    let num_dims = dim_types.len();
    let mut strides = Strides::new(vec![0; num_dims], vec![0; num_dims], vec![0; num_dims]);
    for operand in Operand::ALL {
        let mut running = 1;
        for dim in (0..num_dims).rev() {
            if present(operand, dim_types[dim]) {
                strides[operand][dim] = running;
                running *= dim_sizes[dim];
            }
        }
    }

    TensorOperationConfig {
        backend,
        data_type: DataType::F64,
        prim_first: first,
        prim_main: PrimType::Gemm,
        prim_last: last,
        dim_types,
        exec_types,
        dim_sizes,
        strides,
    }
}

fn loop_spec() -> impl Strategy<Value = LoopSpec> {
    (
        prop_oneof![
            Just(DimType::M),
            Just(DimType::N),
            Just(DimType::K),
            Just(DimType::C)
        ],
        any::<bool>(),
        1i64..=3,
    )
        .prop_map(|(role, shared, size)| LoopSpec {
            role,
            exec: if shared && role != DimType::K {
                ExecType::Shared
            } else {
                ExecType::Seq
            },
            size,
        })
}

/// Small valid configurations with up to `max_loops` loop dimensions.
pub fn small_config(max_loops: usize) -> impl Strategy<Value = TensorOperationConfig> {
    (
        prop_oneof![Just(Backend::Faer), Just(Backend::Reference)],
        prop_oneof![Just(PrimType::Zero), Just(PrimType::None)],
        prop_oneof![Just(PrimType::None), Just(PrimType::Relu)],
        prop::collection::vec(loop_spec(), 0..=max_loops),
        (1i64..=4, 1i64..=4, 1i64..=4),
    )
        .prop_map(|(backend, first, last, loops, prim)| {
            packed_config(backend, first, last, &loops, prim)
        })
}
