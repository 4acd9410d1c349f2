/// Derive binary outperformance labels from realized percentage changes.
///
/// A row is labeled positive when the stock's change exceeds the index change
/// by more than `threshold` percentage points. Non-finite inputs always yield
/// a negative label.
pub fn outperformance_labels(
    stock_changes: &[f64],
    index_changes: &[f64],
    threshold: f64,
) -> Vec<bool> {
    stock_changes
        .iter()
        .zip(index_changes.iter())
        .map(|(stock, index)| {
            let spread = stock - index;
            spread.is_finite() && spread > threshold
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_positive_only_above_threshold() {
        let stock = [25.0, 12.0, 5.0, -3.0];
        let index = [10.0, 3.0, 8.0, -20.0];
        let labels = outperformance_labels(&stock, &index, 10.0);
        assert_eq!(labels, vec![true, false, false, true]);
    }

    #[test]
    fn exact_threshold_is_negative() {
        let labels = outperformance_labels(&[20.0], &[10.0], 10.0);
        assert_eq!(labels, vec![false]);
    }

    #[test]
    fn non_finite_changes_are_negative() {
        let stock = [f64::NAN, f64::INFINITY, 50.0];
        let index = [0.0, 0.0, f64::NAN];
        let labels = outperformance_labels(&stock, &index, 10.0);
        assert_eq!(labels, vec![false, false, false]);
    }

    #[test]
    fn raising_threshold_never_adds_positives() {
        let stock: Vec<f64> = (0..40).map(|i| (i as f64) * 1.7 - 20.0).collect();
        let index: Vec<f64> = (0..40).map(|i| (i as f64) * 0.3 - 5.0).collect();

        let mut previous = usize::MAX;
        for threshold in [-30.0, -10.0, 0.0, 5.0, 10.0, 25.0, 100.0] {
            let count = outperformance_labels(&stock, &index, threshold)
                .iter()
                .filter(|&&label| label)
                .count();
            assert!(count <= previous);
            previous = count;
        }
    }
}
