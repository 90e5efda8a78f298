//! Domain primitives for evaluation reports.

use std::fmt;

use serde::Serialize;

use crate::common::error::AttrResult;
use crate::data::domain::{AttrValue, Table};

/// 2×2 confusion counts with the label order fixed to `[0, 1]`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn correct(&self) -> usize {
        self.true_negative + self.true_positive
    }

    /// `[[tn, fp], [fn, tp]]`
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }

    /// Labelled table as written by the evaluate stage.
    pub fn to_table(&self) -> AttrResult<Table> {
        let labels = ["Actual negative", "Actual positive"];
        let rows = labels
            .iter()
            .zip(self.as_rows())
            .map(|(label, counts)| {
                vec![
                    Some(AttrValue::from(*label)),
                    Some(AttrValue::Number(counts[0] as f64)),
                    Some(AttrValue::Number(counts[1] as f64)),
                ]
            })
            .collect();
        Table::from_rows(
            vec![
                String::new(),
                "Predicted negative".to_string(),
                "Predicted positive".to_string(),
            ],
            rows,
        )
    }
}

/// Metrics of one scored test set.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvalReport {
    pub n: usize,
    pub accuracy: f64,
    /// Undefined when the truth has a single class or no probabilities were given.
    pub auc: Option<f64>,
    pub confusion: ConfusionMatrix,
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.auc {
            Some(auc) => writeln!(f, "AUC on test: {auc:.3}")?,
            None => writeln!(f, "AUC on test: undefined")?,
        }
        writeln!(f, "Accuracy on test: {:.3}", self.accuracy)?;
        let [[tn, fp], [fn_, tp]] = self.confusion.as_rows();
        writeln!(f, "                 Predicted negative  Predicted positive")?;
        writeln!(f, "Actual negative  {tn:>18}  {fp:>18}")?;
        write!(f, "Actual positive  {fn_:>18}  {tp:>18}")
    }
}
