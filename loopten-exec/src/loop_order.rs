use std::iter::FusedIterator;

use loopten_tensorops::{ExecType, TensorOperationConfig};

/// Lazy iterator over every loop-order variant of a configuration.
///
/// Each item permutes the `(role, size, strides)` of the seq dimensions
/// among the seq positions; shared and prim dimensions stay in place.
/// Permutations come in lexicographic order starting from the identity, so
/// the first item is the input configuration itself. Cloning forks the
/// iterator at its current position.
#[derive(Debug, Clone)]
pub struct LoopOrders {
    base: TensorOperationConfig,
    seq_positions: Vec<usize>,
    perm: Vec<usize>,
    remaining: usize,
}

/// Enumerate all loop orders of `config`.
///
/// Yields exactly `factorial(#seq)` configurations (a single one when there
/// are no seq dimensions). Every item of a valid configuration is valid and
/// computes the same contraction.
///
/// The count is a `usize`: past 20 seq dimensions on 64-bit targets it
/// saturates at `usize::MAX`, and the iterator ends after that many items
/// without reaching the last permutation.
///
/// # Examples
///
/// ```
/// use loopten_exec::{count_loop_orders, enumerate_loop_orders};
/// use loopten_tensorops::{DimType, ExecType, Strides, TensorOperationConfig};
///
/// // 8x8x8 column-major GEMM with m and n blocked by 4 in seq loops
/// let config = TensorOperationConfig {
///     dim_types: vec![DimType::M, DimType::N, DimType::M, DimType::N, DimType::K],
///     exec_types: vec![
///         ExecType::Seq,
///         ExecType::Seq,
///         ExecType::Prim,
///         ExecType::Prim,
///         ExecType::Prim,
///     ],
///     dim_sizes: vec![2, 2, 4, 4, 8],
///     strides: Strides::new(
///         vec![4, 0, 1, 0, 8],
///         vec![0, 32, 0, 8, 1],
///         vec![4, 32, 1, 8, 0],
///     ),
///     ..TensorOperationConfig::simple_gemm(8, 8, 8)
/// };
///
/// let orders: Vec<_> = enumerate_loop_orders(&config).collect();
/// assert_eq!(count_loop_orders(&config), 2);
/// assert_eq!(orders[0], config);
/// assert_eq!(orders[1].dim_types[..2], [DimType::N, DimType::M]);
/// assert_eq!(orders[1].strides.0[2][..2], [32, 4]);
/// assert!(orders.iter().all(|order| order.validate().is_ok()));
/// ```
pub fn enumerate_loop_orders(config: &TensorOperationConfig) -> LoopOrders {
    let seq_positions: Vec<usize> = config
        .exec_types
        .iter()
        .enumerate()
        .filter(|&(_, &exec)| exec == ExecType::Seq)
        .map(|(dim, _)| dim)
        .collect();
    let remaining = factorial(seq_positions.len());
    log::debug!(
        "enumerating {remaining} loop orders over {} seq dimensions",
        seq_positions.len()
    );
    LoopOrders {
        base: config.clone(),
        perm: (0..seq_positions.len()).collect(),
        seq_positions,
        remaining,
    }
}

/// Number of configurations [`enumerate_loop_orders`] yields.
///
/// Saturates at `usize::MAX` for more than 20 seq dimensions on 64-bit
/// targets.
pub fn count_loop_orders(config: &TensorOperationConfig) -> usize {
    let seq = config
        .exec_types
        .iter()
        .filter(|&&exec| exec == ExecType::Seq)
        .count();
    factorial(seq)
}

fn factorial(n: usize) -> usize {
    (1..=n).fold(1usize, |acc, i| acc.saturating_mul(i))
}

/// Advance `perm` to the next lexicographic permutation.
///
/// Returns `false` (leaving `perm` as the last permutation) when there is none.
fn next_permutation(perm: &mut [usize]) -> bool {
    let Some(pivot) = perm.windows(2).rposition(|pair| pair[0] < pair[1]) else {
        return false;
    };
    let successor = perm
        .iter()
        .rposition(|&value| value > perm[pivot])
        .unwrap_or(pivot + 1);
    perm.swap(pivot, successor);
    perm[pivot + 1..].reverse();
    true
}

impl LoopOrders {
    fn current(&self) -> TensorOperationConfig {
        let mut config = self.base.clone();
        for (&target, &source) in self.seq_positions.iter().zip(&self.perm) {
            let source = self.seq_positions[source];
            config.dim_types[target] = self.base.dim_types[source];
            config.dim_sizes[target] = self.base.dim_sizes[source];
            for (strides, base) in config.strides.0.iter_mut().zip(&self.base.strides.0) {
                strides[target] = base[source];
            }
        }
        config
    }
}

impl Iterator for LoopOrders {
    type Item = TensorOperationConfig;

    fn next(&mut self) -> Option<TensorOperationConfig> {
        if self.remaining == 0 {
            return None;
        }
        let config = self.current();
        self.remaining -= 1;
        if self.remaining > 0 {
            next_permutation(&mut self.perm);
        }
        Some(config)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for LoopOrders {}

impl FusedIterator for LoopOrders {}
