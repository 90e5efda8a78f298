//! Core tabular and employee record definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::{AttrResult, AttritionError};

/// Integer-scored attributes collected by the form, in canonical order.
pub const NUMERIC_ATTRIBUTES: [&str; 8] = [
    "EnvironmentSatisfaction",
    "JobInvolvement",
    "JobLevel",
    "JobSatisfaction",
    "PerformanceRating",
    "RelationshipSatisfaction",
    "YearsSinceLastPromotion",
    "WorkLifeBalance",
];

/// Key column of persisted employee records.
pub const EMPLOYEE_NUMBER: &str = "EmployeeNumber";

/// Outcome column of persisted employee records.
pub const ATTRITION: &str = "Attrition";

/// A single attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    /// Parse a raw cell. Empty strings, `NA` and `NaN` are missing.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan") {
            return None;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(AttrValue::Number(n)),
            _ => Some(AttrValue::Text(trimmed.to_string())),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(_) => None,
        }
    }

    /// Integer view; fractional numbers and text are rejected.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttrValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Number(n) => write!(f, "{n}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

/// A table cell; `None` is a missing value.
pub type Cell = Option<AttrValue>;

/// In-memory table with named columns and row-major cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows, rejecting rows whose width disagrees with the header.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> AttrResult<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> AttrResult<()> {
        if row.len() != self.columns.len() {
            return Err(AttritionError::invalid(format!(
                "row {} has {} cells but the table has {} columns",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Resolve every name to a column index, reporting all absent columns at once.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> AttrResult<Vec<usize>> {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name.as_ref()) {
                Some(idx) => found.push(idx),
                None => missing.push(name.as_ref().to_string()),
            }
        }
        if missing.is_empty() {
            Ok(found)
        } else {
            Err(AttritionError::invalid(format!(
                "required columns absent: {}",
                missing.join(", ")
            )))
        }
    }

    /// Keep only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> AttrResult<Table> {
        let indices = self.require_columns(names)?;
        let columns = names.iter().map(|n| n.as_ref().to_string()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Table { columns, rows })
    }

    /// Return the column as numbers; missing or text cells are an error.
    pub fn numeric_column(&self, name: &str) -> AttrResult<Vec<f64>> {
        let idx = self.require_columns(&[name])?[0];
        self.rows
            .iter()
            .enumerate()
            .map(|(row_no, row)| match &row[idx] {
                Some(AttrValue::Number(n)) => Ok(*n),
                Some(AttrValue::Text(t)) => Err(AttritionError::invalid(format!(
                    "column {name} row {}: expected a number, got {t:?}",
                    row_no + 1
                ))),
                None => Err(AttritionError::invalid(format!(
                    "column {name} row {}: missing value",
                    row_no + 1
                ))),
            })
            .collect()
    }

    /// Every column as numbers, row-major. Used for feature matrices.
    pub fn numeric_matrix(&self) -> AttrResult<Vec<Vec<f64>>> {
        let columns: Vec<Vec<f64>> = self
            .columns
            .iter()
            .map(|c| self.numeric_column(c))
            .collect::<AttrResult<_>>()?;
        Ok((0..self.len())
            .map(|r| columns.iter().map(|col| col[r]).collect())
            .collect())
    }

    /// Row `idx` as a name → value record. Missing cells are omitted.
    pub fn record(&self, idx: usize) -> Option<RawAttributeRecord> {
        let row = self.rows.get(idx)?;
        Some(
            self.columns
                .iter()
                .zip(row)
                .filter_map(|(name, cell)| cell.clone().map(|v| (name.clone(), v)))
                .collect(),
        )
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Vec<Cell>> {
        &mut self.rows
    }
}

/// Immutable mapping from attribute name to value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawAttributeRecord {
    values: BTreeMap<String, AttrValue>,
}

impl RawAttributeRecord {
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.values.iter()
    }

    fn integer(&self, name: &str) -> AttrResult<i64> {
        match self.get(name) {
            Some(v) => v.as_integer().ok_or_else(|| {
                AttritionError::invalid(format!("{name} must be an integer, got {v}"))
            }),
            None => Err(AttritionError::invalid(format!("{name} is required"))),
        }
    }

    fn text(&self, name: &str) -> AttrResult<String> {
        self.get(name)
            .map(|v| v.to_string())
            .ok_or_else(|| AttritionError::invalid(format!("{name} is required")))
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for RawAttributeRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident, $attr:literal, [$($variant:ident),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All levels in form-display order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Source attribute name.
            pub const ATTRIBUTE: &'static str = $attr;

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AttritionError;

            fn from_str(s: &str) -> AttrResult<Self> {
                let trimmed = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|level| level.as_str() == trimmed)
                    .ok_or_else(|| {
                        AttritionError::invalid(format!(
                            "{} must be one of {:?}, got {trimmed:?}",
                            $attr,
                            [$(stringify!($variant)),+]
                        ))
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

categorical!(MaritalStatus, "MaritalStatus", [Divorced, Single, Married]);
categorical!(Gender, "Gender", [Male, Female]);
categorical!(YesNo, "OverTime", [Yes, No]);

/// Typed attributes collected for one employee.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmployeeAttributes {
    pub environment_satisfaction: i64,
    pub job_involvement: i64,
    pub job_level: i64,
    pub job_satisfaction: i64,
    pub performance_rating: i64,
    pub relationship_satisfaction: i64,
    pub years_since_last_promotion: i64,
    pub work_life_balance: i64,
    pub marital_status: MaritalStatus,
    pub gender: Gender,
    pub over_time: YesNo,
}

impl EmployeeAttributes {
    /// Validate a loosely-typed record into typed attributes.
    pub fn from_record(record: &RawAttributeRecord) -> AttrResult<Self> {
        Ok(Self {
            environment_satisfaction: record.integer("EnvironmentSatisfaction")?,
            job_involvement: record.integer("JobInvolvement")?,
            job_level: record.integer("JobLevel")?,
            job_satisfaction: record.integer("JobSatisfaction")?,
            performance_rating: record.integer("PerformanceRating")?,
            relationship_satisfaction: record.integer("RelationshipSatisfaction")?,
            years_since_last_promotion: record.integer("YearsSinceLastPromotion")?,
            work_life_balance: record.integer("WorkLifeBalance")?,
            marital_status: record.text(MaritalStatus::ATTRIBUTE)?.parse()?,
            gender: record.text(Gender::ATTRIBUTE)?.parse()?,
            over_time: record.text(YesNo::ATTRIBUTE)?.parse()?,
        })
    }

    /// Numeric scores paired with their attribute names, in canonical order.
    pub fn scores(&self) -> [(&'static str, i64); 8] {
        [
            (NUMERIC_ATTRIBUTES[0], self.environment_satisfaction),
            (NUMERIC_ATTRIBUTES[1], self.job_involvement),
            (NUMERIC_ATTRIBUTES[2], self.job_level),
            (NUMERIC_ATTRIBUTES[3], self.job_satisfaction),
            (NUMERIC_ATTRIBUTES[4], self.performance_rating),
            (NUMERIC_ATTRIBUTES[5], self.relationship_satisfaction),
            (NUMERIC_ATTRIBUTES[6], self.years_since_last_promotion),
            (NUMERIC_ATTRIBUTES[7], self.work_life_balance),
        ]
    }

    /// Loosely-typed view fed to the feature transformer.
    pub fn to_raw(&self) -> RawAttributeRecord {
        let mut pairs: Vec<(&str, AttrValue)> = self
            .scores()
            .iter()
            .map(|(name, v)| (*name, AttrValue::from(*v)))
            .collect();
        pairs.push((MaritalStatus::ATTRIBUTE, self.marital_status.as_str().into()));
        pairs.push((Gender::ATTRIBUTE, self.gender.as_str().into()));
        pairs.push((YesNo::ATTRIBUTE, self.over_time.as_str().into()));
        pairs.into_iter().collect()
    }
}

/// Persisted employee submission.
#[derive(Clone, Debug, PartialEq)]
pub struct EmployeeRecord {
    pub employee_number: i64,
    pub attributes: EmployeeAttributes,
    pub attrition: Option<YesNo>,
}

impl EmployeeRecord {
    /// Column order used by every store.
    pub fn columns() -> Vec<String> {
        let mut cols = vec![EMPLOYEE_NUMBER.to_string()];
        cols.extend(NUMERIC_ATTRIBUTES.iter().map(|s| s.to_string()));
        cols.extend(
            [MaritalStatus::ATTRIBUTE, Gender::ATTRIBUTE, YesNo::ATTRIBUTE, ATTRITION]
                .iter()
                .map(|s| s.to_string()),
        );
        cols
    }

    /// Validate a record carrying the key, attributes and optional outcome.
    pub fn from_record(record: &RawAttributeRecord) -> AttrResult<Self> {
        let employee_number = record.integer(EMPLOYEE_NUMBER)?;
        let attributes = EmployeeAttributes::from_record(record)?;
        let attrition = match record.get(ATTRITION) {
            Some(v) => Some(v.to_string().parse::<YesNo>().map_err(|_| {
                AttritionError::invalid(format!("Attrition must be Yes or No, got {v}"))
            })?),
            None => None,
        };
        Ok(Self {
            employee_number,
            attributes,
            attrition,
        })
    }

    /// Cells in [`EmployeeRecord::columns`] order.
    pub fn to_row(&self) -> Vec<Cell> {
        let mut row: Vec<Cell> = vec![Some(self.employee_number.into())];
        row.extend(
            self.attributes
                .scores()
                .iter()
                .map(|(_, v)| Some(AttrValue::from(*v))),
        );
        row.push(Some(self.attributes.marital_status.as_str().into()));
        row.push(Some(self.attributes.gender.as_str().into()));
        row.push(Some(self.attributes.over_time.as_str().into()));
        row.push(self.attrition.map(|a| a.as_str().into()));
        row
    }

    /// Parse every row of a table into records, failing on the first invalid row.
    pub fn from_table(table: &Table) -> AttrResult<Vec<Self>> {
        (0..table.len())
            .map(|i| {
                let record = table.record(i).unwrap_or_default();
                Self::from_record(&record)
                    .map_err(|e| AttritionError::invalid(format!("row {}: {e}", i + 1)))
            })
            .collect()
    }
}

/// Repository contract for employee persistence.
pub trait EmployeeRepo: Send + Sync {
    /// Short label used in log lines ("sqlite:data/employees.db").
    fn describe(&self) -> String;
    /// Append one record.
    fn add_record(&self, record: &EmployeeRecord) -> AttrResult<()>;
    /// Append every record of a delimited file, returning how many were stored.
    fn bulk_ingest(&self, path: &Path) -> AttrResult<usize>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_raw(employee_number: i64) -> RawAttributeRecord {
        let mut pairs: Vec<(&str, AttrValue)> = vec![(EMPLOYEE_NUMBER, employee_number.into())];
        for name in NUMERIC_ATTRIBUTES {
            pairs.push((name, 1i64.into()));
        }
        pairs.push(("MaritalStatus", "Divorced".into()));
        pairs.push(("Gender", "Male".into()));
        pairs.push(("OverTime", "Yes".into()));
        pairs.into_iter().collect()
    }

    #[test]
    fn parses_missing_markers() {
        assert_eq!(AttrValue::parse(""), None);
        assert_eq!(AttrValue::parse("NaN"), None);
        assert_eq!(AttrValue::parse(" NA "), None);
        assert_eq!(AttrValue::parse("3"), Some(AttrValue::Number(3.0)));
        assert_eq!(AttrValue::parse("Yes"), Some(AttrValue::Text("Yes".into())));
    }

    #[test]
    fn number_display_drops_trailing_zero() {
        assert_eq!(AttrValue::Number(2.0).to_string(), "2");
        assert_eq!(AttrValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn require_columns_reports_all_missing() {
        let table = Table::new(vec!["A".into()]);
        let err = table.require_columns(&["A", "B", "C"]).unwrap_err();
        assert!(err.to_string().contains("B, C"));
    }

    #[test]
    fn push_row_rejects_width_mismatch() {
        let mut table = Table::new(vec!["A".into(), "B".into()]);
        assert!(table.push_row(vec![Some(1.0.into())]).is_err());
        assert!(table.push_row(vec![Some(1.0.into()), None]).is_ok());
    }

    #[test]
    fn typed_record_round_trips_through_raw() {
        let record = EmployeeRecord::from_record(&sample_raw(7)).unwrap();
        assert_eq!(record.employee_number, 7);
        assert_eq!(record.attributes.gender, Gender::Male);
        assert_eq!(record.attrition, None);
        let raw = record.attributes.to_raw();
        assert_eq!(raw.get("OverTime"), Some(&AttrValue::Text("Yes".into())));
        assert_eq!(raw.get("JobLevel"), Some(&AttrValue::Number(1.0)));
        assert_eq!(raw.len(), 11);
    }

    #[test]
    fn rejects_unknown_level() {
        let mut pairs: Vec<(String, AttrValue)> = sample_raw(1)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.retain(|(k, _)| k != "Gender");
        pairs.push(("Gender".into(), "Other".into()));
        let raw: RawAttributeRecord = pairs.into_iter().collect();
        let err = EmployeeAttributes::from_record(&raw).unwrap_err();
        assert!(err.to_string().contains("Gender must be one of"));
    }

    #[test]
    fn rejects_fractional_scores() {
        let raw: RawAttributeRecord = sample_raw(1)
            .iter()
            .map(|(k, v)| {
                if k == "JobLevel" {
                    (k.clone(), AttrValue::Number(1.5))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect();
        assert!(EmployeeAttributes::from_record(&raw).is_err());
    }

    #[test]
    fn row_matches_columns() {
        let record = EmployeeRecord::from_record(&sample_raw(3)).unwrap();
        assert_eq!(record.to_row().len(), EmployeeRecord::columns().len());
    }
}
