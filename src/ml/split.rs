use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{PipelineError, Result};

/// Positions `0..n` partitioned into fit and held-out sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with a seeded generator and hold out
/// `ceil(n * test_fraction)` positions, keeping both sides non-empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidParameter(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    if n < 2 {
        return Err(PipelineError::InvalidParameter(format!(
            "need at least 2 rows to split, got {n}"
        )));
    }

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    let train = order.split_off(n_test);
    Ok(Split { train, test: order })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_split_sizes_and_disjointness() {
        let split = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);

        let test: BTreeSet<_> = split.test.iter().collect();
        assert!(split.train.iter().all(|i| !test.contains(i)));
        let all: BTreeSet<_> = split.train.iter().chain(&split.test).copied().collect();
        assert_eq!(all, (0..10).collect());
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(
            train_test_split(50, 0.2, 7).unwrap(),
            train_test_split(50, 0.2, 7).unwrap()
        );
    }

    #[test]
    fn test_small_inputs_keep_both_sides() {
        let split = train_test_split(2, 0.2, 1).unwrap();
        assert_eq!((split.train.len(), split.test.len()), (1, 1));
        assert!(train_test_split(1, 0.2, 1).is_err());
        assert!(train_test_split(10, 1.0, 1).is_err());
    }
}
