use loopten_device::{Error, Result};
use loopten_prims::{is_registered, PrimType};

use crate::{DimType, ExecType, Operand, TensorOperationConfig};

/// Check every structural invariant of `config`.
///
/// Checks run in this order and the first failure is returned:
///
/// 1. [`Error::MalformedConfig`]: empty configuration, per-dimension lists of
///    different lengths, non-positive sizes, negative strides, extents that
///    overflow the address range, or a shared dimension that is `k` or is
///    broadcast on the output
/// 2. [`Error::UnsupportedCombination`]: no kernel registered for the
///    backend, data type and primitive triple
/// 3. [`Error::InvalidPrimitiveShape`]: the prim dimensions are not a trailing
///    block with the roles the main primitive needs
/// 4. [`Error::ShapeMismatch`]: a role has a nonzero stride on an operand it
///    does not index, a prim `c`/`m`/`n` is broadcast on the output, or an
///    operand's layout overlaps itself
///
/// # Examples
///
/// ```
/// use loopten_device::Error;
/// use loopten_tensorops::{validate, Operand, TensorOperationConfig};
///
/// let mut config = TensorOperationConfig::simple_gemm(4, 4, 4);
/// assert!(validate(&config).is_ok());
///
/// // k must not move the output pointer
/// config.strides[Operand::Out][2] = 16;
/// assert!(matches!(validate(&config), Err(Error::ShapeMismatch { .. })));
/// ```
pub fn validate(config: &TensorOperationConfig) -> Result<()> {
    check_structure(config)?;
    let key = config.primitive_key();
    if !is_registered(&key) {
        return Err(key.unsupported());
    }
    check_prim_block(config)?;
    check_roles(config)?;
    for operand in Operand::ALL {
        check_non_overlapping(config, operand)?;
    }
    Ok(())
}

fn check_structure(config: &TensorOperationConfig) -> Result<()> {
    let num_dims = config.dim_types.len();
    if num_dims == 0 {
        return Err(Error::MalformedConfig(
            "configuration must have at least one dimension".into(),
        ));
    }
    let lengths = [
        ("exec_types", config.exec_types.len()),
        ("dim_sizes", config.dim_sizes.len()),
        ("strides.in0", config.strides[Operand::In0].len()),
        ("strides.in1", config.strides[Operand::In1].len()),
        ("strides.out", config.strides[Operand::Out].len()),
    ];
    for (name, len) in lengths {
        if len != num_dims {
            return Err(Error::MalformedConfig(format!(
                "{name} has {len} entries but dim_types has {num_dims}"
            )));
        }
    }
    for operand in Operand::ALL {
        // Rejects non-positive sizes, negative strides and overflowing extents.
        config.required_len(operand).map_err(|err| match err {
            Error::MalformedConfig(reason) => {
                Error::MalformedConfig(format!("strides.{operand}: {reason}"))
            }
            other => other,
        })?;
    }
    if let Some(dim) = config
        .dim_types
        .iter()
        .zip(&config.exec_types)
        .position(|(&role, &exec)| role == DimType::K && exec == ExecType::Shared)
    {
        return Err(Error::MalformedConfig(format!(
            "dimension {dim} is a shared k dimension; reductions cannot run in parallel"
        )));
    }
    if let Some(dim) = (0..num_dims).find(|&dim| {
        config.exec_types[dim] == ExecType::Shared
            && config.dim_sizes[dim] > 1
            && config.strides.get(Operand::Out, dim) == 0
    }) {
        return Err(Error::MalformedConfig(format!(
            "shared dimension {dim} is broadcast on the output; parallel workers would write the same tile"
        )));
    }
    Ok(())
}

fn expected_roles(main: PrimType, block_len: usize) -> &'static [&'static [DimType]] {
    use DimType::{C, K, M, N};
    match (main, block_len) {
        (PrimType::Gemm, 3) => &[&[M, N, K]],
        (PrimType::Gemm, 4) => &[&[C, M, N, K]],
        (PrimType::Gemm, _) => &[&[M, N, K], &[C, M, N, K]],
        (PrimType::Brgemm, _) => &[&[K, M, N, K]],
        _ => &[],
    }
}

fn format_roles(roles: &[DimType]) -> String {
    let names: Vec<&str> = roles.iter().map(|role| role.as_str()).collect();
    format!("({})", names.join(", "))
}

fn check_prim_block(config: &TensorOperationConfig) -> Result<()> {
    let start = config.prim_start();
    if let Some(offset) = config.exec_types[start..]
        .iter()
        .position(|&exec| exec != ExecType::Prim)
    {
        return Err(Error::InvalidPrimitiveShape(format!(
            "dimension {} is {} but follows prim dimension {start}; prim dimensions must be trailing",
            start + offset,
            config.exec_types[start + offset]
        )));
    }
    let block = &config.dim_types[start..];
    let allowed = expected_roles(config.prim_main, block.len());
    if allowed.iter().any(|roles| *roles == block) {
        return Ok(());
    }
    let expected: Vec<String> = allowed.iter().map(|roles| format_roles(roles)).collect();
    Err(Error::InvalidPrimitiveShape(format!(
        "{} needs prim roles {} but the trailing prim block is {}",
        config.prim_main,
        expected.join(" or "),
        format_roles(block)
    )))
}

fn check_roles(config: &TensorOperationConfig) -> Result<()> {
    let start = config.prim_start();
    for (dim, &role) in config.dim_types.iter().enumerate() {
        let absent_from = match role {
            DimType::K => Some(Operand::Out),
            DimType::M => Some(Operand::In1),
            DimType::N => Some(Operand::In0),
            DimType::C => None,
        };
        if let Some(operand) = absent_from {
            let stride = config.strides.get(operand, dim);
            if stride != 0 {
                return Err(Error::ShapeMismatch {
                    operand: operand.as_str(),
                    dim,
                    reason: format!("{role} dimension must have stride 0, got {stride}"),
                });
            }
        }
        // every prim tile writes its own output block; the kernels do not
        // sum a prim dimension the output does not move along
        if dim >= start
            && matches!(role, DimType::C | DimType::M | DimType::N)
            && config.strides.get(Operand::Out, dim) == 0
        {
            return Err(Error::ShapeMismatch {
                operand: Operand::Out.as_str(),
                dim,
                reason: format!("prim {role} dimension cannot be broadcast on the output"),
            });
        }
    }
    Ok(())
}

fn check_non_overlapping(config: &TensorOperationConfig, operand: Operand) -> Result<()> {
    let strides = &config.strides[operand];
    // size-1 dimensions never move the pointer, so they cannot overlap
    let mut dims: Vec<usize> = (0..strides.len())
        .filter(|&dim| strides[dim] != 0 && config.dim_sizes[dim] > 1)
        .collect();
    dims.sort_by(|&a, &b| strides[b].cmp(&strides[a]));
    for pair in dims.windows(2) {
        let (outer, inner) = (pair[0], pair[1]);
        let span = i128::from(strides[inner]) * i128::from(config.dim_sizes[inner]);
        if i128::from(strides[outer]) < span {
            return Err(Error::ShapeMismatch {
                operand: operand.as_str(),
                dim: outer,
                reason: format!(
                    "stride {} overlaps dimension {inner} (size {} x stride {})",
                    strides[outer], config.dim_sizes[inner], strides[inner]
                ),
            });
        }
    }
    Ok(())
}
