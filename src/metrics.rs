//! Scoring predictions against gold label indices.

use std::collections::BTreeMap;

use crate::error::{FewshotError, Result};
use crate::predictions::PredictionResult;

/// Fraction of predictions whose top-1 label equals the gold label.
pub fn accuracy(gold: &[usize], predictions: &[PredictionResult]) -> Result<f64> {
    check_lengths("accuracy", gold.len(), predictions.len())?;
    let hits = gold
        .iter()
        .zip(predictions)
        .filter(|&(&g, p)| p.best() == Some(g))
        .count();
    Ok(hits as f64 / gold.len() as f64)
}

/// Fraction of predictions whose top-k contains the gold label.
pub fn topk_accuracy(gold: &[usize], predictions: &[PredictionResult]) -> Result<f64> {
    check_lengths("topk_accuracy", gold.len(), predictions.len())?;
    let hits = gold
        .iter()
        .zip(predictions)
        .filter(|&(&g, p)| p.contains(g))
        .count();
    Ok(hits as f64 / gold.len() as f64)
}

/// Support-weighted mean of per-label F1.
///
/// Labels are the union of gold and predicted labels; a label never seen in
/// `gold` has zero support and so zero weight. Undefined precision or recall
/// counts as 0.
pub fn weighted_f1(gold: &[usize], best: &[usize]) -> Result<f64> {
    check_lengths("weighted_f1", gold.len(), best.len())?;

    #[derive(Default)]
    struct Counts {
        tp: usize,
        fp: usize,
        fn_: usize,
        support: usize,
    }

    let mut per_label: BTreeMap<usize, Counts> = BTreeMap::new();
    for (&g, &p) in gold.iter().zip(best) {
        per_label.entry(g).or_default().support += 1;
        if g == p {
            per_label.entry(g).or_default().tp += 1;
        } else {
            per_label.entry(g).or_default().fn_ += 1;
            per_label.entry(p).or_default().fp += 1;
        }
    }

    let weighted: f64 = per_label
        .values()
        .map(|c| {
            let precision = ratio(c.tp, c.tp + c.fp);
            let recall = ratio(c.tp, c.tp + c.fn_);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            f1 * c.support as f64
        })
        .sum();

    Ok(weighted / gold.len() as f64)
}

/// Top-1 labels of `predictions`; fails if any result is empty.
pub fn best_labels(predictions: &[PredictionResult]) -> Result<Vec<usize>> {
    predictions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            p.best().ok_or_else(|| {
                FewshotError::Unexpected(format!("prediction {i} has no ranked labels"))
            })
        })
        .collect()
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn check_lengths(step: &'static str, gold: usize, predicted: usize) -> Result<()> {
    if gold == 0 {
        return Err(FewshotError::EmptyInput(step));
    }
    if gold != predicted {
        return Err(FewshotError::shape(
            step,
            format!("{gold} predictions (one per gold label)"),
            format!("{predicted} predictions"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictions::LabelScore;

    fn ranked(labels: &[usize]) -> PredictionResult {
        PredictionResult {
            ranked: labels
                .iter()
                .enumerate()
                .map(|(i, &label)| LabelScore {
                    label,
                    score: 1.0 - i as f32 * 0.1,
                })
                .collect(),
        }
    }

    #[test]
    fn accuracy_uses_top_one() {
        let preds = vec![ranked(&[0, 1]), ranked(&[1, 0]), ranked(&[2, 0])];
        assert!((accuracy(&[0, 0, 2], &preds).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((topk_accuracy(&[0, 0, 2], &preds).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_f1_matches_hand_computation() {
        // label 0: tp=1 fn=1 fp=0 -> p=1 r=0.5 f1=2/3, support 2
        // label 1: tp=1 fn=0 fp=1 -> p=0.5 r=1 f1=2/3, support 1
        // label 2: tp=1 -> f1=1, support 1
        let gold = [0, 0, 1, 2];
        let best = [0, 1, 1, 2];
        let expected = (2.0 / 3.0 * 2.0 + 2.0 / 3.0 + 1.0) / 4.0;
        assert!((weighted_f1(&gold, &best).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn predicted_only_labels_carry_no_weight() {
        let gold = [0, 0];
        let best = [0, 3];
        // label 0: p=1 r=0.5 f1=2/3 support 2; label 3 has support 0
        assert!((weighted_f1(&gold, &best).unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn perfect_predictions_score_one() {
        assert_eq!(weighted_f1(&[0, 1, 2], &[0, 1, 2]).unwrap(), 1.0);
    }

    #[test]
    fn length_mismatch_and_empty_input_fail() {
        assert!(matches!(
            accuracy(&[0, 1], &[ranked(&[0])]),
            Err(FewshotError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            weighted_f1(&[], &[]),
            Err(FewshotError::EmptyInput(_))
        ));
    }
}
