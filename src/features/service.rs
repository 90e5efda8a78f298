//! Feature transformation for single records and whole tables.

use tracing::debug;

use crate::common::error::{AttrResult, AttritionError};
use crate::data::domain::{AttrValue, RawAttributeRecord, Table};

use super::domain::{EncodingSpec, FeatureVector};

/// Maps raw attribute records onto the fixed column layout of an [`EncodingSpec`].
///
/// Every expected column is always emitted; indicators that are not set are
/// present with value 0.
#[derive(Clone, Debug)]
pub struct FeatureTransformer {
    spec: EncodingSpec,
    columns: Vec<String>,
}

impl FeatureTransformer {
    pub fn new(spec: EncodingSpec) -> Self {
        let columns = spec.columns();
        Self { spec, columns }
    }

    pub fn spec(&self) -> &EncodingSpec {
        &self.spec
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Encode one record. Extra attributes are ignored; missing ones fail.
    pub fn transform(&self, record: &RawAttributeRecord) -> AttrResult<FeatureVector> {
        let values = self.spec.encode(record)?;
        debug!(columns = ?self.columns, "record transformed");
        FeatureVector::new(self.columns.clone(), values)
    }

    /// Encode every row of `table`, appending `passthrough` columns (the
    /// target, typically) unchanged after the feature columns.
    pub fn transform_table(&self, table: &Table, passthrough: &[&str]) -> AttrResult<Table> {
        let carried = table.require_columns(passthrough)?;
        let mut columns = self.columns.clone();
        columns.extend(passthrough.iter().map(|c| c.to_string()));

        let mut out = Table::new(columns);
        for (idx, row) in table.rows().iter().enumerate() {
            let record = table.record(idx).unwrap_or_default();
            let mut cells: Vec<Option<AttrValue>> = self
                .spec
                .encode(&record)
                .map_err(|e| AttritionError::invalid(format!("row {}: {e}", idx + 1)))?
                .into_iter()
                .map(|v| Some(AttrValue::Number(v)))
                .collect();
            cells.extend(carried.iter().map(|&i| row[i].clone()));
            out.push_row(cells)?;
        }
        Ok(out)
    }
}
