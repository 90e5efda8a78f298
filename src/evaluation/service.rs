//! Metric computation for the evaluate stage.

use tracing::{info, warn};

use crate::common::error::{AttrResult, AttritionError};

use super::domain::{ConfusionMatrix, EvalReport};

fn check_binary(name: &str, values: &[u8]) -> AttrResult<()> {
    match values.iter().find(|&&v| v > 1) {
        Some(bad) => Err(AttritionError::invalid(format!("{name} must be 0 or 1, got {bad}"))),
        None => Ok(()),
    }
}

/// Counts with fixed label order, so a class missing from both inputs still gets its row.
pub fn confusion(y_true: &[u8], y_pred: &[u8]) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t, p) {
            (0, 0) => cm.true_negative += 1,
            (0, _) => cm.false_positive += 1,
            (_, 0) => cm.false_negative += 1,
            _ => cm.true_positive += 1,
        }
    }
    cm
}

/// Area under the ROC curve via the rank statistic, averaging tied ranks.
/// `None` when only one class is present.
pub fn auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|&&y| y == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 share their mean
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y == 1)
        .map(|(_, r)| r)
        .sum();
    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Accuracy, AUC and confusion counts of a scored test set.
pub fn evaluate(y_true: &[u8], y_proba: Option<&[f64]>, y_pred: &[u8]) -> AttrResult<EvalReport> {
    if y_true.is_empty() {
        return Err(AttritionError::invalid("cannot evaluate an empty test set"));
    }
    if y_true.len() != y_pred.len() {
        return Err(AttritionError::invalid(format!(
            "y_test has {} rows but predictions have {}",
            y_true.len(),
            y_pred.len()
        )));
    }
    check_binary("y_test", y_true)?;
    check_binary("predictions", y_pred)?;
    if let Some(proba) = y_proba {
        if proba.len() != y_true.len() {
            return Err(AttritionError::invalid(format!(
                "y_test has {} rows but probabilities have {}",
                y_true.len(),
                proba.len()
            )));
        }
    }

    let confusion = confusion(y_true, y_pred);
    let accuracy = confusion.correct() as f64 / y_true.len() as f64;
    let auc = match y_proba {
        Some(proba) => {
            let area = auc(y_true, proba);
            if area.is_none() {
                warn!(n = y_true.len(), "only one class present in y_test, AUC is undefined");
            }
            area
        }
        None => {
            warn!("no probabilities supplied, AUC is undefined");
            None
        }
    };

    info!(n = y_true.len(), accuracy, auc = ?auc, "model evaluated");
    Ok(EvalReport {
        n: y_true.len(),
        accuracy,
        auc,
        confusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn perfect_ranking_has_unit_auc() {
        assert_eq!(auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]), Some(0.0));
    }

    #[test]
    fn ties_count_half() {
        assert_eq!(auc(&[0, 1], &[0.5, 0.5]), Some(0.5));
        assert_eq!(auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
    }

    #[test]
    fn single_class_auc_is_undefined() {
        let report = evaluate(&[1, 1, 1], Some(&[0.2, 0.6, 0.9][..]), &[0, 1, 1]).unwrap();
        assert_eq!(report.auc, None);
        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn confusion_keeps_fixed_label_order() {
        let report = evaluate(&[0, 0, 0], None, &[0, 0, 0]).unwrap();
        assert_eq!(report.confusion.as_rows(), [[3, 0], [0, 0]]);
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn rejects_mismatched_lengths_and_labels() {
        assert!(evaluate(&[0, 1], None, &[0]).is_err());
        assert!(evaluate(&[0, 1], Some(&[0.1][..]), &[0, 1]).is_err());
        assert!(evaluate(&[0, 2], None, &[0, 1]).is_err());
        assert!(evaluate(&[], None, &[]).is_err());
    }

    proptest! {
        #[test]
        fn confusion_counts_cover_the_test_set(pairs in proptest::collection::vec((0u8..2, 0u8..2), 1..200)) {
            let (truth, pred): (Vec<u8>, Vec<u8>) = pairs.into_iter().unzip();
            let report = evaluate(&truth, None, &pred).unwrap();
            prop_assert_eq!(report.confusion.total(), truth.len());
            prop_assert_eq!(report.n, truth.len());
        }

        #[test]
        fn auc_stays_in_unit_interval(pairs in proptest::collection::vec((0u8..2, 0.0f64..1.0), 2..100)) {
            let (truth, scores): (Vec<u8>, Vec<f64>) = pairs.into_iter().unzip();
            if let Some(a) = auc(&truth, &scores) {
                prop_assert!((0.0..=1.0).contains(&a));
            }
        }
    }
}
