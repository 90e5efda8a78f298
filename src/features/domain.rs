//! Encoding specification shared by training and online inference.
//!
//! An [`EncodingSpec`] is an ordered list of source attributes, each with its
//! rule. The clean stage, the train stage (which embeds the spec in the
//! artifact) and the online transformer all derive their column layout from
//! it, so the three paths cannot drift apart.

use serde::{Deserialize, Serialize};

use crate::common::error::{AttrResult, AttritionError};
use crate::data::domain::{AttrValue, RawAttributeRecord, NUMERIC_ATTRIBUTES};

/// Declared levels of a categorical attribute. `levels[0]` is the reference level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalLevels {
    pub name: String,
    pub levels: Vec<String>,
}

impl CategoricalLevels {
    pub fn new(name: &str, levels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            levels: levels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn rule(&self) -> EncodingRule {
        EncodingRule::OneHot {
            levels: self.levels.clone(),
        }
    }
}

/// Categoricals of the employee form. Levels are sorted so the dropped
/// reference level is the alphabetically first one.
pub fn default_categoricals() -> Vec<CategoricalLevels> {
    vec![
        CategoricalLevels::new("Gender", &["Female", "Male"]),
        CategoricalLevels::new("MaritalStatus", &["Divorced", "Married", "Single"]),
        CategoricalLevels::new("OverTime", &["No", "Yes"]),
    ]
}

/// How one source attribute becomes feature columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncodingRule {
    /// Passed through unchanged as a single column.
    Numeric,
    /// First-level-dropped one-hot: one indicator per non-reference level.
    OneHot { levels: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub source: String,
    pub rule: EncodingRule,
}

impl FeatureSpec {
    pub fn numeric(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            rule: EncodingRule::Numeric,
        }
    }

    pub fn one_hot(source: impl Into<String>, levels: Vec<String>) -> Self {
        Self {
            source: source.into(),
            rule: EncodingRule::OneHot { levels },
        }
    }

    /// Output column names, in order.
    pub fn columns(&self) -> Vec<String> {
        match &self.rule {
            EncodingRule::Numeric => vec![self.source.clone()],
            EncodingRule::OneHot { levels } => levels
                .iter()
                .skip(1)
                .map(|level| format!("{}_{level}", self.source))
                .collect(),
        }
    }

    pub fn is_indicator(&self) -> bool {
        matches!(self.rule, EncodingRule::OneHot { .. })
    }

    /// Append this attribute's encoded columns to `out`.
    pub fn encode_into(&self, value: Option<&AttrValue>, out: &mut Vec<f64>) -> AttrResult<()> {
        let Some(value) = value else {
            return Err(AttritionError::invalid(format!("attribute {} is required", self.source)));
        };
        match &self.rule {
            EncodingRule::Numeric => {
                let number = match value {
                    AttrValue::Number(n) => *n,
                    AttrValue::Text(t) => t.trim().parse::<f64>().map_err(|_| {
                        AttritionError::invalid(format!(
                            "attribute {} must be numeric, got {t:?}",
                            self.source
                        ))
                    })?,
                };
                out.push(number);
            }
            EncodingRule::OneHot { levels } => {
                let raw = value.to_string();
                let position = levels.iter().position(|l| *l == raw).ok_or_else(|| {
                    AttritionError::invalid(format!(
                        "attribute {} has unknown level {raw:?} (expected one of {levels:?})",
                        self.source
                    ))
                })?;
                out.extend((1..levels.len()).map(|i| if i == position { 1.0 } else { 0.0 }));
            }
        }
        Ok(())
    }
}

/// Ordered list of attribute encodings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodingSpec {
    features: Vec<FeatureSpec>,
}

impl EncodingSpec {
    pub fn new(features: Vec<FeatureSpec>) -> AttrResult<Self> {
        for (i, f) in features.iter().enumerate() {
            if features[..i].iter().any(|g| g.source == f.source) {
                return Err(AttritionError::invalid(format!(
                    "attribute {} is encoded twice",
                    f.source
                )));
            }
            if let EncodingRule::OneHot { levels } = &f.rule {
                if levels.len() < 2 {
                    return Err(AttritionError::invalid(format!(
                        "categorical attribute {} needs at least two levels",
                        f.source
                    )));
                }
            }
        }
        Ok(Self { features })
    }

    /// The employee form layout: eight passthrough scores, then the categoricals.
    pub fn employee_default() -> Self {
        let mut features: Vec<FeatureSpec> =
            NUMERIC_ATTRIBUTES.iter().map(|n| FeatureSpec::numeric(*n)).collect();
        features.extend(default_categoricals().iter().map(|c| FeatureSpec {
            source: c.name.clone(),
            rule: c.rule(),
        }));
        Self { features }
    }

    /// Encoding for the retained columns of a raw table: declared categoricals
    /// become one-hot groups, everything else is numeric. `excluded` columns
    /// (target, identifier) are skipped.
    pub fn resolve<S: AsRef<str>>(
        retained: &[S],
        excluded: &[&str],
        declared: &[CategoricalLevels],
    ) -> AttrResult<Self> {
        let features = retained
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| !excluded.contains(c))
            .map(|c| match declared.iter().find(|d| d.name == c) {
                Some(decl) => FeatureSpec {
                    source: c.to_string(),
                    rule: decl.rule(),
                },
                None => FeatureSpec::numeric(c),
            })
            .collect();
        Self::new(features)
    }

    /// Recover the encoding from an already-encoded column header.
    ///
    /// Dummy columns of a declared categorical must appear as one contiguous,
    /// complete group in level order; any other column is numeric.
    pub fn from_header(header: &[String], declared: &[CategoricalLevels]) -> AttrResult<Self> {
        let mut features = Vec::new();
        let mut i = 0;
        while i < header.len() {
            let column = &header[i];
            if declared.iter().any(|d| d.name == *column) {
                return Err(AttritionError::invalid(format!(
                    "column {column} is categorical but appears unencoded"
                )));
            }
            let group = declared.iter().find_map(|d| {
                let spec = FeatureSpec {
                    source: d.name.clone(),
                    rule: d.rule(),
                };
                spec.columns().contains(column).then_some(spec)
            });
            match group {
                Some(spec) => {
                    let expected = spec.columns();
                    let end = (i + expected.len()).min(header.len());
                    if header[i..end] != expected[..] {
                        return Err(AttritionError::schema_mismatch(&expected, &header[i..end]));
                    }
                    i += expected.len();
                    features.push(spec);
                }
                None => {
                    features.push(FeatureSpec::numeric(column.clone()));
                    i += 1;
                }
            }
        }
        Self::new(features)
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// Feature column names in model order.
    pub fn columns(&self) -> Vec<String> {
        self.features.iter().flat_map(|f| f.columns()).collect()
    }

    pub fn width(&self) -> usize {
        self.features
            .iter()
            .map(|f| match &f.rule {
                EncodingRule::Numeric => 1,
                EncodingRule::OneHot { levels } => levels.len() - 1,
            })
            .sum()
    }

    /// Names of the indicator (dummy) columns.
    pub fn indicator_columns(&self) -> Vec<String> {
        self.features
            .iter()
            .filter(|f| f.is_indicator())
            .flat_map(|f| f.columns())
            .collect()
    }

    /// Encode one record into values aligned with [`EncodingSpec::columns`].
    pub fn encode(&self, record: &RawAttributeRecord) -> AttrResult<Vec<f64>> {
        let mut out = Vec::with_capacity(self.width());
        for feature in &self.features {
            feature.encode_into(record.get(&feature.source), &mut out)?;
        }
        Ok(out)
    }
}

/// Ordered named numeric columns fed to the classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(columns: Vec<String>, values: Vec<f64>) -> AttrResult<Self> {
        if columns.len() != values.len() {
            return Err(AttritionError::invalid(format!(
                "feature vector has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }

    /// Indicator columns of `spec` that are set in this vector.
    pub fn active_indicators(&self, spec: &EncodingSpec) -> Vec<String> {
        spec.indicator_columns()
            .into_iter()
            .filter(|c| self.get(c) == Some(1.0))
            .collect()
    }
}
