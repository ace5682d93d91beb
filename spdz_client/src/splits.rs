use itertools::Itertools;

/// Maximum number of candidate splits per feature.
pub const MAX_SPLIT_NUM: usize = 8;

/// Length of the split parameter vector sent to the engines.
pub const SPLIT_PARAMS_LEN: usize = MAX_SPLIT_NUM + 1;

/// Wire value marking an unused threshold slot.
pub const SPLIT_SENTINEL: f64 = -1.0;

/// Split parameter vector in wire layout: count followed by thresholds.
pub type SplitParams = [f64; SPLIT_PARAMS_LEN];

/// Data quality problem found while computing splits. Not fatal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataQuality {
    /// Every sample has the same value.
    SingleDistinctValue,
    /// The feature has no samples.
    EmptyFeature,
}

/// Candidate splits of a feature.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureSplits {
    /// Exactly `MAX_SPLIT_NUM` quantile thresholds.
    Continuous(Vec<f64>),
    /// Between 2 and `MAX_SPLIT_NUM` distinct values, ascending.
    Categorical(Vec<f64>),
    /// No usable split.
    Degenerate(DataQuality),
}

impl FeatureSplits {
    /// Compute splits of a feature column.
    ///
    /// At least `MAX_SPLIT_NUM + 1` distinct values make a continuous feature
    /// cut into equally populated bins. Fewer make a categorical feature
    /// where every distinct value is a threshold.
    pub fn compute(values: &[f64]) -> Self {
        let sorted = sort_indexes(values);
        let distinct = distinct_values(values, &sorted);

        match distinct.len() {
            0 => FeatureSplits::Degenerate(DataQuality::EmptyFeature),
            1 => FeatureSplits::Degenerate(DataQuality::SingleDistinctValue),
            n if n <= MAX_SPLIT_NUM => FeatureSplits::Categorical(distinct),
            _ => FeatureSplits::Continuous(quantile_thresholds(values, &sorted)),
        }
    }

    /// Number of valid splits as reported to the engines.
    pub fn split_count(&self) -> usize {
        match self {
            FeatureSplits::Continuous(_) => MAX_SPLIT_NUM,
            FeatureSplits::Categorical(values) => values.len() - 1,
            FeatureSplits::Degenerate(_) => 0,
        }
    }

    /// Threshold slots, None where unused.
    pub fn thresholds(&self) -> [Option<f64>; MAX_SPLIT_NUM] {
        let mut slots = [None; MAX_SPLIT_NUM];
        let values: &[f64] = match self {
            FeatureSplits::Continuous(values) | FeatureSplits::Categorical(values) => values,
            FeatureSplits::Degenerate(_) => &[],
        };
        for (slot, &value) in slots.iter_mut().zip(values) {
            *slot = Some(value);
        }
        slots
    }

    /// Problem with the feature, if any.
    pub fn data_quality(&self) -> Option<DataQuality> {
        match self {
            FeatureSplits::Degenerate(issue) => Some(*issue),
            _ => None,
        }
    }

    /// Encode in wire layout `[count, t_0, ..., t_7]` with `-1` for unused slots.
    pub fn to_params(&self) -> SplitParams {
        let mut params = [SPLIT_SENTINEL; SPLIT_PARAMS_LEN];
        params[0] = self.split_count() as f64;
        for (param, slot) in params[1..].iter_mut().zip(self.thresholds()) {
            *param = slot.unwrap_or(SPLIT_SENTINEL);
        }
        params
    }
}

/// Split parameter vector of a feature column.
pub fn compute_splits(values: &[f64]) -> SplitParams {
    FeatureSplits::compute(values).to_params()
}

/// Indexes of samples in ascending order of value. Ties keep sample order.
fn sort_indexes(values: &[f64]) -> Vec<usize> {
    (0..values.len())
        .sorted_by(|&i, &j| values[i].total_cmp(&values[j]))
        .collect()
}

/// Distinct values in ascending order.
fn distinct_values(values: &[f64], sorted: &[usize]) -> Vec<f64> {
    sorted
        .iter()
        .map(|&i| values[i])
        .dedup_by(|a, b| a == b)
        .collect()
}

/// Averages of neighbouring samples at the boundaries of equally sized bins.
fn quantile_thresholds(values: &[f64], sorted: &[usize]) -> Vec<f64> {
    let n = sorted.len();
    let bin_size = n / (MAX_SPLIT_NUM + 1);
    (1..=MAX_SPLIT_NUM)
        .map(|i| {
            let lo = i * bin_size;
            let hi = (lo + 1).min(n - 1);
            (values[sorted[lo]] + values[sorted[hi]]) / 2.0
        })
        .collect()
}
