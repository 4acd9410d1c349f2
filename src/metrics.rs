/// Fraction of predictions that match the true labels. Empty input scores 0.
pub fn accuracy(predicted: &[bool], actual: &[bool]) -> f64 {
    if predicted.is_empty() || predicted.len() != actual.len() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(actual.iter())
        .filter(|(p, a)| p == a)
        .count();
    correct as f64 / predicted.len() as f64
}

/// Fraction of positive predictions that were truly positive. Returns 0 when
/// there are no positive predictions rather than dividing by zero.
pub fn precision(predicted: &[bool], actual: &[bool]) -> f64 {
    if predicted.len() != actual.len() {
        return 0.0;
    }
    let positive_predictions = predicted.iter().filter(|&&p| p).count();
    if positive_predictions == 0 {
        return 0.0;
    }
    let true_positives = predicted
        .iter()
        .zip(actual.iter())
        .filter(|(&p, &a)| p && a)
        .count();
    true_positives as f64 / positive_predictions as f64
}
