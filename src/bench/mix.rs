//! Weighted transaction mix
//!
//! Weights are kept as running sums. A draw `r` uniform in `[1, total]`
//! selects the first entry whose running sum is at least `r`, so each entry is
//! chosen with probability `weight / total` and zero-weight entries never are.

use super::params::ParameterGenerator;
use crate::config::TransactionWeight;
use crate::{DlBenchError, Result};

#[derive(Debug, Clone)]
pub struct TransactionMix {
    names: Vec<String>,
    cumulative: Vec<u64>,
}

impl TransactionMix {
    /// Build the mix in configuration order
    pub fn new(transactions: &[TransactionWeight]) -> Result<Self> {
        let mut names = Vec::with_capacity(transactions.len());
        let mut cumulative = Vec::with_capacity(transactions.len());
        let mut total = 0u64;
        for tx in transactions {
            total += tx.weight as u64;
            names.push(tx.name.clone());
            cumulative.push(total);
        }

        if total == 0 {
            return Err(DlBenchError::Config(
                "Total transaction weight must be greater than 0".to_string(),
            ));
        }

        Ok(Self { names, cumulative })
    }

    /// Sum of all weights
    pub fn total(&self) -> u64 {
        self.cumulative.last().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index selected by the draw `r`, expected in `[1, total]`
    pub fn index_for(&self, r: u64) -> usize {
        let index = self.cumulative.partition_point(|&sum| sum < r);
        index.min(self.cumulative.len() - 1)
    }

    /// Draw the next transaction index
    pub fn select(&self, params: &mut ParameterGenerator) -> Result<usize> {
        let r = params.random_int(1, self.total() as i64)?;
        Ok(self.index_for(r as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mix(weights: &[(&str, u32)]) -> TransactionMix {
        let txs: Vec<TransactionWeight> = weights
            .iter()
            .map(|(name, w)| TransactionWeight::new(*name, *w))
            .collect();
        TransactionMix::new(&txs).unwrap()
    }

    #[test]
    fn test_equal_weights_follow_draw_sequence() {
        let m = mix(&[("a", 1), ("b", 1), ("c", 1)]);
        let selected: Vec<usize> = [1, 2, 3].iter().map(|&r| m.index_for(r)).collect();
        assert_eq!(selected, vec![0, 1, 2]);
    }

    #[test]
    fn test_boundaries() {
        let m = mix(&[("kontostand", 35), ("einzahlung", 50), ("analyse", 15)]);
        assert_eq!(m.total(), 100);
        assert_eq!(m.index_for(1), 0);
        assert_eq!(m.index_for(35), 0);
        assert_eq!(m.index_for(36), 1);
        assert_eq!(m.index_for(85), 1);
        assert_eq!(m.index_for(86), 2);
        assert_eq!(m.index_for(100), 2);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let m = mix(&[("a", 0), ("b", 2), ("c", 0), ("d", 1)]);
        let mut params = ParameterGenerator::seeded(99);
        let mut counts = [0usize; 4];
        for _ in 0..10_000 {
            counts[m.select(&mut params).unwrap()] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        assert!(counts[1] > counts[3]);
        assert_eq!(counts[1] + counts[3], 10_000);
    }

    #[test]
    fn test_zero_total_rejected() {
        let txs = vec![TransactionWeight::new("a", 0)];
        assert!(TransactionMix::new(&txs).is_err());
        assert!(TransactionMix::new(&[]).is_err());
    }

    #[test]
    fn test_single_entry_always_selected() {
        let m = mix(&[("only", 7)]);
        let mut params = ParameterGenerator::seeded(1);
        for _ in 0..100 {
            assert_eq!(m.select(&mut params).unwrap(), 0);
        }
        assert_eq!(m.names(), &["only".to_string()]);
    }
}
