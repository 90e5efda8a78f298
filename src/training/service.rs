//! Service layer for the train stage and artifact storage dispatch.

use tracing::info;

use crate::common::config::AppCfg;
use crate::common::error::{AttrResult, AttritionError};
use crate::data::domain::{AttrValue, Table};
use crate::features::domain::{CategoricalLevels, EncodingSpec};

use super::domain::{ArtifactLocation, ArtifactStore, ClassifierArtifact};
use super::forest::{ForestParams, RandomForest};
use super::repo_fs::FsArtifactStore;
use super::repo_object::ObjectArtifactStore;

/// Read a 0/1 label column. Blank cells and other values are rejected.
pub fn binary_column(table: &Table, column: &str) -> AttrResult<Vec<u8>> {
    let idx = table.require_columns(&[column])?[0];
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row_no, row)| match &row[idx] {
            Some(AttrValue::Number(n)) if *n == 0.0 => Ok(0),
            Some(AttrValue::Number(n)) if *n == 1.0 => Ok(1),
            other => Err(AttritionError::invalid(format!(
                "column {column} row {}: expected 0 or 1, got {}",
                row_no + 1,
                other.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "nothing".into())
            ))),
        })
        .collect()
}

/// Fit a forest on `X_train`/`y_train` and package it with the encoding
/// recovered from the `X_train` header.
pub fn train(
    x_train: &Table,
    y_train: &Table,
    target: &str,
    declared: &[CategoricalLevels],
    params: &ForestParams,
) -> AttrResult<ClassifierArtifact> {
    let encoding = EncodingSpec::from_header(x_train.columns(), declared)?;
    let x = x_train.numeric_matrix()?;
    let y = binary_column(y_train, target)?;
    if x.len() != y.len() {
        return Err(AttritionError::invalid(format!(
            "X_train has {} rows but y_train has {}",
            x.len(),
            y.len()
        )));
    }

    let forest = RandomForest::fit(&x, &y, params)?;
    let artifact = ClassifierArtifact::new(forest, encoding, params.clone())?;
    let positives = y.iter().filter(|&&v| v == 1).count();
    info!(
        rows = x.len(),
        positives,
        features = artifact.feature_names.len(),
        n_estimators = params.n_estimators,
        max_depth = params.max_depth,
        fingerprint = %artifact.fingerprint(),
        "random forest trained"
    );
    Ok(artifact)
}

/// Routes each location to the local or object backend.
#[derive(Clone, Debug)]
pub struct ArtifactStores {
    fs: FsArtifactStore,
    object: ObjectArtifactStore,
}

impl ArtifactStores {
    pub fn new(cfg: &AppCfg) -> Self {
        Self {
            fs: FsArtifactStore,
            object: ObjectArtifactStore::new(&cfg.object_store),
        }
    }

    pub fn load_from(&self, raw: &str) -> AttrResult<ClassifierArtifact> {
        self.load(&ArtifactLocation::parse(raw)?)
    }

    pub fn save_to(&self, artifact: &ClassifierArtifact, raw: &str) -> AttrResult<()> {
        self.save(artifact, &ArtifactLocation::parse(raw)?)
    }

    fn backend(&self, location: &ArtifactLocation) -> &dyn ArtifactStore {
        match location {
            ArtifactLocation::Local(_) => &self.fs,
            ArtifactLocation::Object { .. } => &self.object,
        }
    }
}

impl ArtifactStore for ArtifactStores {
    fn load(&self, location: &ArtifactLocation) -> AttrResult<ClassifierArtifact> {
        self.backend(location).load(location)
    }

    fn save(&self, artifact: &ClassifierArtifact, location: &ArtifactLocation) -> AttrResult<()> {
        self.backend(location).save(artifact, location)
    }
}
