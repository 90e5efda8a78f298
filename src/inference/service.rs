//! Inference over a loaded classifier artifact.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::common::error::{AttrResult, AttritionError};
use crate::common::time;
use crate::data::domain::{RawAttributeRecord, Table};
use crate::features::domain::FeatureVector;
use crate::features::service::FeatureTransformer;
use crate::training::domain::{ArtifactLocation, ArtifactStore, ClassifierArtifact};

use super::domain::{round_probability, AttritionLabel, PredictionResult, Scores};

fn check_schema(expected: &[String], actual: &[String]) -> AttrResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(AttritionError::schema_mismatch(expected, actual))
    }
}

/// Predict one vector. Its columns must equal the artifact's in name, count and order.
pub fn predict(vector: &FeatureVector, artifact: &ClassifierArtifact) -> AttrResult<PredictionResult> {
    check_schema(&artifact.feature_names, vector.columns())?;
    let [p0, p1] = artifact.forest.predict_proba_row(vector.values())?;
    let result = PredictionResult {
        label: AttritionLabel::from_decision(u8::from(p1 > p0)),
        probability: round_probability(p1),
    };
    debug!(label = %result.label, probability = result.probability, "prediction made");
    Ok(result)
}

/// Transform with the artifact's own encoding, then predict.
pub fn predict_record(record: &RawAttributeRecord, artifact: &ClassifierArtifact) -> AttrResult<PredictionResult> {
    let vector = FeatureTransformer::new(artifact.encoding.clone()).transform(record)?;
    predict(&vector, artifact)
}

/// Score every row of an encoded feature table.
pub fn score(artifact: &ClassifierArtifact, x: &Table) -> AttrResult<Scores> {
    check_schema(&artifact.feature_names, x.columns())?;
    let mut scores = Scores::default();
    for row in x.numeric_matrix()? {
        let [p0, p1] = artifact.forest.predict_proba_row(&row)?;
        scores.labels.push(u8::from(p1 > p0));
        scores.probabilities.push(p1);
    }
    info!(rows = scores.len(), positives = scores.labels.iter().filter(|&&l| l == 1).count(), "test set scored");
    Ok(scores)
}

struct Loaded {
    artifact: Arc<ClassifierArtifact>,
    transformer: FeatureTransformer,
}

/// Serves predictions from an artifact loaded once and cached for the
/// process lifetime.
///
/// The cache holds an `Arc` snapshot; [`InferenceService::reload`] swaps in a
/// new one while callers that already hold the old snapshot finish with it.
pub struct InferenceService {
    location: ArtifactLocation,
    store: Arc<dyn ArtifactStore>,
    current: Mutex<Option<Arc<Loaded>>>,
}

impl InferenceService {
    pub fn new(location: ArtifactLocation, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            location,
            store,
            current: Mutex::new(None),
        }
    }

    pub fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    fn fetch(&self) -> AttrResult<Arc<Loaded>> {
        let artifact = Arc::new(self.store.load(&self.location)?);
        info!(
            location = %self.location,
            fingerprint = %artifact.fingerprint(),
            trained = %time::format_ms(artifact.created_ms),
            features = artifact.feature_names.len(),
            "classifier loaded"
        );
        Ok(Arc::new(Loaded {
            transformer: FeatureTransformer::new(artifact.encoding.clone()),
            artifact,
        }))
    }

    fn loaded(&self) -> AttrResult<Arc<Loaded>> {
        let mut current = self.current.lock();
        if let Some(loaded) = current.as_ref() {
            return Ok(Arc::clone(loaded));
        }
        let loaded = self.fetch()?;
        *current = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Cached artifact, loading it on first use.
    pub fn artifact(&self) -> AttrResult<Arc<ClassifierArtifact>> {
        Ok(Arc::clone(&self.loaded()?.artifact))
    }

    /// Load the artifact again and replace the cached snapshot.
    pub fn reload(&self) -> AttrResult<Arc<ClassifierArtifact>> {
        let fresh = self.fetch()?;
        let artifact = Arc::clone(&fresh.artifact);
        *self.current.lock() = Some(fresh);
        Ok(artifact)
    }

    pub fn predict(&self, vector: &FeatureVector) -> AttrResult<PredictionResult> {
        predict(vector, &self.loaded()?.artifact)
    }

    pub fn predict_record(&self, record: &RawAttributeRecord) -> AttrResult<PredictionResult> {
        let loaded = self.loaded()?;
        let vector = loaded.transformer.transform(record)?;
        predict(&vector, &loaded.artifact)
    }
}
