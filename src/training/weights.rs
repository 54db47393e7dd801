/// Per-class weights `n / count(class)`, or 1 for classes without samples.
pub fn class_weights(labels: &[usize], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for &label in labels {
        if label < n_classes {
            counts[label] += 1;
        }
    }
    let n = labels.len() as f32;
    counts
        .into_iter()
        .map(|count| if count == 0 { 1.0 } else { n / count as f32 })
        .collect()
}

/// One weight per row so that every class carries the same total weight.
pub fn sample_weights(labels: &[usize], n_classes: usize) -> Vec<f32> {
    let per_class = class_weights(labels, n_classes);
    labels
        .iter()
        .map(|&label| per_class.get(label).copied().unwrap_or(1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_times_count_equals_total() {
        let labels = vec![0, 0, 0, 1, 2, 2];
        let weights = class_weights(&labels, 4);
        let counts = [3.0f32, 1.0, 2.0];
        for (class, count) in counts.iter().enumerate() {
            assert!((weights[class] * count - labels.len() as f32).abs() < 1e-5);
        }
        assert_eq!(weights[3], 1.0);
    }

    #[test]
    fn per_row_weights_follow_labels() {
        let weights = sample_weights(&[0, 1, 1, 1], 2);
        assert_eq!(weights, vec![4.0, 4.0 / 3.0, 4.0 / 3.0, 4.0 / 3.0]);
    }
}
