// Classification metrics
//
// Weighted-average precision/recall/F1 across classes, matching the
// reference evaluation semantics: classes are weighted by support and a
// zero denominator yields 0 rather than an error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

pub fn accuracy(targets: &[usize], predictions: &[usize]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = targets
        .iter()
        .zip(predictions)
        .filter(|(t, p)| t == p)
        .count();
    correct as f64 / targets.len() as f64
}

pub fn weighted_precision_recall_f1(targets: &[usize], predictions: &[usize]) -> ValidationMetrics {
    if targets.is_empty() {
        return ValidationMetrics::default();
    }

    let mut true_positives: HashMap<usize, usize> = HashMap::new();
    let mut predicted: HashMap<usize, usize> = HashMap::new();
    let mut support: HashMap<usize, usize> = HashMap::new();

    for (&target, &prediction) in targets.iter().zip(predictions) {
        *support.entry(target).or_insert(0) += 1;
        *predicted.entry(prediction).or_insert(0) += 1;
        if target == prediction {
            *true_positives.entry(target).or_insert(0) += 1;
        }
    }

    let total = targets.len() as f64;
    let mut metrics = ValidationMetrics::default();

    for (&class, &class_support) in &support {
        let tp = *true_positives.get(&class).unwrap_or(&0) as f64;
        let predicted_count = *predicted.get(&class).unwrap_or(&0) as f64;

        let precision = if predicted_count > 0.0 { tp / predicted_count } else { 0.0 };
        let recall = tp / class_support as f64;
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let weight = class_support as f64 / total;
        metrics.precision += weight * precision;
        metrics.recall += weight * recall;
        metrics.f1_score += weight * f1;
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_perfect_predictions_score_one() {
        let targets = vec![0, 0, 1, 1, 2];
        let metrics = weighted_precision_recall_f1(&targets, &targets);
        assert!((metrics.precision - 1.0).abs() < 1e-12);
        assert!((metrics.recall - 1.0).abs() < 1e-12);
        assert!((metrics.f1_score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_never_predicted_class_contributes_zero() {
        // Class 1 is never predicted: precision for it is 0 by definition,
        // not a division error
        let targets = vec![0, 1, 1];
        let predictions = vec![0, 0, 0];
        let metrics = weighted_precision_recall_f1(&targets, &predictions);

        assert!(metrics.recall < 1.0);
        assert!(metrics.f1_score < 1.0);
        assert!(metrics.precision.is_finite());
    }

    #[test]
    fn test_weighted_by_support() {
        // 4 samples of class 0 (all correct), 1 of class 1 (wrong):
        // recall = 0.8 * 1.0 + 0.2 * 0.0
        let targets = vec![0, 0, 0, 0, 1];
        let predictions = vec![0, 0, 0, 0, 0];
        let metrics = weighted_precision_recall_f1(&targets, &predictions);
        assert!((metrics.recall - 0.8).abs() < 1e-12);
    }
}
