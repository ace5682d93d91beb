use ndarray::Array2;

use crate::splits::SplitParams;

/// Left and right indicator matrices of a feature, one row per split slot.
///
/// `left[[s, i]] = 1` iff sample `i` is at most threshold `s`; `right` is its complement.
pub fn compute_feature_split_ivs(values: &[f64], params: &SplitParams) -> (Array2<u8>, Array2<u8>) {
    let thresholds = &params[1..];
    let left = Array2::from_shape_fn((thresholds.len(), values.len()), |(s, i)| {
        (values[i] <= thresholds[s]) as u8
    });
    let right = left.mapv(|x| 1 - x);
    (left, right)
}

/// Distinct labels in order of first occurrence.
pub fn label_classes(labels: &[f64]) -> Vec<f64> {
    let mut classes = Vec::new();
    for &label in labels {
        if !classes.contains(&label) {
            classes.push(label);
        }
    }
    classes
}

/// One row per label class with 1 at the samples of that class.
pub fn compute_label_class_ivs(labels: &[f64]) -> Array2<u8> {
    let classes = label_classes(labels);
    Array2::from_shape_fn((classes.len(), labels.len()), |(c, i)| {
        (labels[i] == classes[c]) as u8
    })
}
