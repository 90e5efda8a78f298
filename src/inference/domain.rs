//! Domain definitions for attrition predictions.

use std::fmt;

use serde::Serialize;

use crate::common::error::AttrResult;
use crate::data::domain::{AttrValue, Table};

/// Column written by the score stage for probabilities.
pub const PROBA_COLUMN: &str = "ypred_proba";

/// Column written by the score stage for 0/1 decisions.
pub const LABEL_COLUMN: &str = "ypred_bin";

/// Human-readable outcome of a binary decision.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum AttritionLabel {
    #[serde(rename = "likely to leave")]
    LikelyToLeave,
    #[serde(rename = "not likely to leave")]
    NotLikelyToLeave,
}

impl AttritionLabel {
    pub fn from_decision(decision: u8) -> Self {
        if decision == 1 {
            AttritionLabel::LikelyToLeave
        } else {
            AttritionLabel::NotLikelyToLeave
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttritionLabel::LikelyToLeave => "likely to leave",
            AttritionLabel::NotLikelyToLeave => "not likely to leave",
        }
    }
}

impl fmt::Display for AttritionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label and positive-class probability for one employee.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: AttritionLabel,
    /// In `[0, 1]`, rounded to two decimals.
    pub probability: f64,
}

impl PredictionResult {
    /// Percentage shown on the result page, e.g. `0.37` → `"37%"`.
    pub fn percent(&self) -> String {
        format!("{}%", (self.probability * 100.0).round() as i64)
    }
}

/// Round to two decimals.
pub fn round_probability(p: f64) -> f64 {
    (p * 100.0).round() / 100.0
}

/// Batch output of the score stage, aligned with the input rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scores {
    pub labels: Vec<u8>,
    /// Unrounded positive-class probabilities.
    pub probabilities: Vec<f64>,
}

impl Scores {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn probability_table(&self) -> AttrResult<Table> {
        single_column(PROBA_COLUMN, self.probabilities.iter().copied())
    }

    pub fn label_table(&self) -> AttrResult<Table> {
        single_column(LABEL_COLUMN, self.labels.iter().map(|&l| f64::from(l)))
    }
}

fn single_column(name: &str, values: impl Iterator<Item = f64>) -> AttrResult<Table> {
    Table::from_rows(
        vec![name.to_string()],
        values.map(|v| vec![Some(AttrValue::Number(v))]).collect(),
    )
}
