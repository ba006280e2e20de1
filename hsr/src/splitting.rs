//! Cross-validation splits over frame indices.

use crate::config::{SignalMaskingConfig, SplitKind};

/// Rows used for training and the rows the trained model is applied to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub apply: Vec<usize>,
}

/// Deterministic splitter producing disjoint apply folds that cover every row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainTestSplitter {
    n_splits: usize,
    kind: SplitKind,
}

impl TrainTestSplitter {
    pub fn new(n_splits: usize, kind: SplitKind) -> Self {
        Self {
            n_splits: n_splits.max(1),
            kind,
        }
    }

    pub fn from_config(config: &SignalMaskingConfig) -> Self {
        Self::new(config.n_splits, config.split_kind)
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Splits of `0..n_rows`
    ///
    /// With a single split the model is trained and applied on all rows.
    /// Folds without rows are dropped.
    pub fn split(&self, n_rows: usize) -> Vec<Split> {
        if self.n_splits == 1 {
            let all: Vec<usize> = (0..n_rows).collect();
            return vec![Split {
                train: all.clone(),
                apply: all,
            }];
        }

        let fold_of: Box<dyn Fn(usize) -> usize> = match self.kind {
            SplitKind::EvenOdd => {
                let k = self.n_splits;
                Box::new(move |row| row % k)
            }
            SplitKind::KFold => {
                // First `n_rows % k` folds take one extra row
                let k = self.n_splits;
                let base = n_rows / k;
                let extra = n_rows % k;
                Box::new(move |row| {
                    let boundary = extra * (base + 1);
                    if row < boundary {
                        row / (base + 1)
                    } else {
                        extra + (row - boundary) / base.max(1)
                    }
                })
            }
        };

        (0..self.n_splits)
            .filter_map(|fold| {
                let (apply, train): (Vec<usize>, Vec<usize>) =
                    (0..n_rows).partition(|&row| fold_of(row) == fold);
                (!apply.is_empty()).then_some(Split { train, apply })
            })
            .collect()
    }
}
