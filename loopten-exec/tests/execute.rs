mod common;

use anyhow::Result;
use common::{assert_close, buffers, random_buffer, reference_contraction, small_config};
use loopten_algebra::{DataType, Scalar};
use loopten_device::Error;
use loopten_exec::{execute, TensorOperation};
use loopten_prims::{Backend, PrimType};
use loopten_tensorops::{DimType, ExecType, Operand, Strides, TensorOperationConfig};
use proptest::prelude::*;

fn column_major_gemm(backend: Backend, size: i64) -> TensorOperationConfig {
    TensorOperationConfig {
        backend,
        ..TensorOperationConfig::simple_gemm(size, size, size)
    }
}

/// The 512x512x512 GEMM with k split into a seq loop of 2 over a prim of 256.
fn split_k_gemm(backend: Backend) -> TensorOperationConfig {
    TensorOperationConfig {
        backend,
        dim_types: vec![DimType::K, DimType::M, DimType::N, DimType::K],
        exec_types: vec![ExecType::Seq, ExecType::Prim, ExecType::Prim, ExecType::Prim],
        dim_sizes: vec![2, 512, 512, 256],
        strides: Strides::new(
            vec![256 * 512, 1, 0, 512],
            vec![256, 0, 512, 1],
            vec![0, 1, 512, 0],
        ),
        ..TensorOperationConfig::simple_gemm(512, 512, 512)
    }
}

/// Scaled-down form of the batched benchmark: two seq batch loops around a
/// column-major gemm.
fn batched(backend: Backend) -> TensorOperationConfig {
    let (c0, c1, m, n, k) = (3, 4, 8, 6, 5);
    TensorOperationConfig {
        backend,
        data_type: DataType::F32,
        prim_first: PrimType::Zero,
        prim_main: PrimType::Gemm,
        prim_last: PrimType::None,
        dim_types: vec![DimType::C, DimType::C, DimType::M, DimType::N, DimType::K],
        exec_types: vec![
            ExecType::Seq,
            ExecType::Seq,
            ExecType::Prim,
            ExecType::Prim,
            ExecType::Prim,
        ],
        dim_sizes: vec![c0, c1, m, n, k],
        strides: Strides::new(
            vec![k * m * c1, k * m, 1, 0, m],
            vec![n * k * c1, n * k, 0, k, 1],
            vec![n * m * c1, n * m, 1, m, 0],
        ),
    }
}

/// `in0[k, m] * in1[n, br, k]` summed over `br` and `k`, with an outer seq
/// loop over blocks of `n`.
fn brgemm(backend: Backend) -> TensorOperationConfig {
    TensorOperationConfig {
        backend,
        data_type: DataType::F64,
        prim_first: PrimType::Zero,
        prim_main: PrimType::Brgemm,
        prim_last: PrimType::Relu,
        dim_types: vec![DimType::N, DimType::K, DimType::M, DimType::N, DimType::K],
        exec_types: vec![
            ExecType::Seq,
            ExecType::Prim,
            ExecType::Prim,
            ExecType::Prim,
            ExecType::Prim,
        ],
        dim_sizes: vec![2, 3, 4, 3, 5],
        strides: Strides::new(
            vec![0, 20, 1, 0, 4],
            vec![45, 5, 0, 15, 1],
            vec![12, 0, 1, 4, 0],
        ),
    }
}

fn check_against_reference(config: &TensorOperationConfig, tol: f64) -> Result<()> {
    let (in0, in1, mut out) = buffers::<f64>(config, 7);
    let mut expected = out.clone();
    reference_contraction(config, &in0, &in1, &mut expected);
    execute(config, &in0, &in1, &mut out)?;
    assert_close(&out, &expected, tol);
    Ok(())
}

/// Column-major `a * b` for square `n x n` matrices, accumulated in `f64`,
/// along with the per-element sums of `|a_ik * b_kj|`.
fn f64_gemm<T: Scalar>(n: usize, a: &[T], b: &[T]) -> (Vec<f64>, Vec<f64>) {
    let mut c = vec![0.0f64; n * n];
    let mut magnitude = vec![0.0f64; n * n];
    for col in 0..n {
        for k in 0..n {
            let b_kj = b[k + n * col].to_f64();
            let a_col = &a[n * k..n * (k + 1)];
            for (row, &a_ik) in a_col.iter().enumerate() {
                let term = a_ik.to_f64() * b_kj;
                c[row + n * col] += term;
                magnitude[row + n * col] += term.abs();
            }
        }
    }
    (c, magnitude)
}

#[test]
fn large_gemm_matches_f64_reference() -> Result<()> {
    let n = 512usize;

    let config = TensorOperationConfig {
        data_type: DataType::F64,
        ..column_major_gemm(Backend::Faer, n as i64)
    };
    let a = random_buffer::<f64>(n * n, 1);
    let b = random_buffer::<f64>(n * n, 2);
    let mut c = vec![f64::NAN; n * n];
    execute(&config, &a, &b, &mut c)?;
    assert_close(&c, &f64_gemm(n, &a, &b).0, 1e-12);

    // single precision: every element within 1e-5 of the scale of its terms
    let config = column_major_gemm(Backend::Faer, n as i64);
    let a = random_buffer::<f32>(n * n, 1);
    let b = random_buffer::<f32>(n * n, 2);
    let mut c = vec![f32::NAN; n * n];
    execute(&config, &a, &b, &mut c)?;
    let (expected, magnitude) = f64_gemm(n, &a, &b);
    for (i, (&actual, (&e, &scale))) in c.iter().zip(expected.iter().zip(&magnitude)).enumerate() {
        let actual = f64::from(actual);
        assert!(
            (actual - e).abs() <= 1e-5 * (1.0 + scale),
            "C[{}, {}] = {actual}, expected {e}",
            i % n,
            i / n
        );
    }
    Ok(())
}

#[test]
fn split_k_matches_unsplit_gemm() -> Result<()> {
    for backend in Backend::ALL {
        let full = column_major_gemm(backend, 512);
        let split = split_k_gemm(backend);
        let a = random_buffer::<f32>(512 * 512, 3);
        let b = random_buffer::<f32>(512 * 512, 4);

        let mut expected = vec![0.0f32; 512 * 512];
        execute(&full, &a, &b, &mut expected)?;
        let mut actual = vec![f32::NAN; 512 * 512];
        let op = TensorOperation::new(split)?;
        assert_eq!(op.num_calls(), Some(2));
        op.execute(&a, &b, &mut actual)?;
        assert_close(&actual, &expected, 1e-4);
    }
    Ok(())
}

#[test]
fn batched_matches_reference() -> Result<()> {
    for backend in Backend::ALL {
        let config = batched(backend);
        let (in0, in1, mut out) = buffers::<f32>(&config, 11);
        let mut expected = out.clone();
        reference_contraction(&config, &in0, &in1, &mut expected);
        execute(&config, &in0, &in1, &mut out)?;
        assert_close(&out, &expected, 1e-5);
    }
    Ok(())
}

#[test]
fn brgemm_with_relu_matches_reference() -> Result<()> {
    for backend in Backend::ALL {
        check_against_reference(&brgemm(backend), 1e-12)?;
    }
    Ok(())
}

#[test]
fn accumulates_without_zero_first() -> Result<()> {
    let config = TensorOperationConfig {
        backend: Backend::Reference,
        prim_first: PrimType::None,
        ..TensorOperationConfig::simple_gemm(3, 2, 4)
    };
    let a = vec![1.0f32; 12];
    let b = vec![0.5f32; 8];
    let mut c = vec![1.0f32; 6];
    execute(&config, &a, &b, &mut c)?;
    assert_eq!(c, vec![3.0; 6]);
    Ok(())
}

#[test]
fn shared_loops_match_sequential_execution() -> Result<()> {
    for backend in Backend::ALL {
        let sequential = batched(backend);
        let mut shared = sequential.clone();
        shared.exec_types[0] = ExecType::Shared;
        shared.exec_types[1] = ExecType::Shared;

        let (in0, in1, out) = buffers::<f32>(&sequential, 19);
        let mut expected = out.clone();
        execute(&sequential, &in0, &in1, &mut expected)?;
        let mut actual = out;
        let op = TensorOperation::new(shared)?;
        assert_eq!(op.num_calls(), Some(12));
        op.execute(&in0, &in1, &mut actual)?;
        assert_close(&actual, &expected, 1e-6);
    }
    Ok(())
}

#[test]
fn short_buffers_are_rejected_before_writing() -> Result<()> {
    let config = batched(Backend::Reference);
    let op = TensorOperation::new(config.clone())?;
    let (in0, in1, out) = buffers::<f32>(&config, 23);

    let mut short_out = out[..out.len() - 1].to_vec();
    let before = short_out.clone();
    match op.execute(&in0, &in1, &mut short_out) {
        Err(Error::OutOfBounds {
            operand,
            required,
            len,
        }) => {
            assert_eq!(operand, "out");
            assert_eq!(required, op.required_len(Operand::Out));
            assert_eq!(len, required - 1);
        }
        other => panic!("expected out-of-bounds, got {other:?}"),
    }
    assert_eq!(short_out, before);

    let mut out = out;
    let before = out.clone();
    let err = op.execute(&in0[..10], &in1, &mut out).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { operand: "in0", .. }), "{err}");
    assert_eq!(out, before);
    Ok(())
}

#[test]
fn wrong_element_type_is_rejected() -> Result<()> {
    let op = TensorOperation::new(TensorOperationConfig::simple_gemm(2, 2, 2))?;
    let mut out = [0.0f64; 4];
    let err = op.execute(&[1.0f64; 4], &[1.0f64; 4], &mut out).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
    assert_eq!(out, [0.0; 4]);
    Ok(())
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let mut config = TensorOperationConfig::simple_gemm(4, 4, 4);
    config.strides[Operand::Out][2] = 1;
    assert!(matches!(
        TensorOperation::new(config),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn oversized_buffers_leave_the_tail_untouched() -> Result<()> {
    let config = column_major_gemm(Backend::Reference, 2);
    let mut out = vec![-7.0f32; 6];
    execute(&config, &[1.0; 4], &[1.0; 4], &mut out)?;
    assert_eq!(out, [2.0, 2.0, 2.0, 2.0, -7.0, -7.0]);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn small_configs_match_reference(config in small_config(4)) {
        config.validate().unwrap();
        check_against_reference(&config, 1e-10).unwrap();
    }
}
