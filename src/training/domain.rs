//! Domain types for trained classifier artifacts and where they live.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::common::error::{AttrResult, AttritionError};
use crate::common::ids;
use crate::common::time;
use crate::features::domain::EncodingSpec;

use super::forest::{ForestParams, RandomForest};

/// Bumped when the serialized layout changes incompatibly.
pub const ARTIFACT_FORMAT: u32 = 1;

/// Trained forest plus everything needed to feed it consistently.
///
/// Artifacts are write-once: retraining produces a new value, and holders of
/// an older snapshot keep using it unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub format: u32,
    pub created_ms: i64,
    pub params: ForestParams,
    /// Encoding applied to raw records before prediction.
    pub encoding: EncodingSpec,
    /// Expected feature columns, in model order.
    pub feature_names: Vec<String>,
    pub forest: RandomForest,
}

impl ClassifierArtifact {
    pub fn new(forest: RandomForest, encoding: EncodingSpec, params: ForestParams) -> AttrResult<Self> {
        let feature_names = encoding.columns();
        if feature_names.len() != forest.n_features() {
            return Err(AttritionError::invalid(format!(
                "encoding yields {} columns but the forest was fit on {}",
                feature_names.len(),
                forest.n_features()
            )));
        }
        Ok(Self {
            format: ARTIFACT_FORMAT,
            created_ms: time::now_ms(),
            params,
            encoding,
            feature_names,
            forest,
        })
    }

    pub fn to_json(&self) -> AttrResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AttritionError::invalid(format!("cannot serialize artifact: {e}")))
    }

    /// Decode and check an artifact; `location` decorates errors.
    pub fn from_json(bytes: &[u8], location: &str) -> AttrResult<Self> {
        let artifact: Self =
            serde_json::from_slice(bytes).map_err(|e| AttritionError::artifact_load(location, e))?;
        if artifact.format != ARTIFACT_FORMAT {
            return Err(AttritionError::artifact_load(
                location,
                format!("unsupported artifact format {}", artifact.format),
            ));
        }
        if artifact.feature_names != artifact.encoding.columns() {
            return Err(AttritionError::artifact_load(
                location,
                "feature names disagree with the embedded encoding",
            ));
        }
        if artifact.feature_names.len() != artifact.forest.n_features() {
            return Err(AttritionError::artifact_load(
                location,
                "feature names disagree with the forest width",
            ));
        }
        artifact
            .forest
            .check()
            .map_err(|e| AttritionError::artifact_load(location, e))?;
        Ok(artifact)
    }

    /// Short content hash for log lines.
    pub fn fingerprint(&self) -> String {
        let created = self.created_ms.to_le_bytes();
        let trees = (self.forest.trees().len() as u64).to_le_bytes();
        let names = self.feature_names.iter().map(|n| n.as_bytes());
        ids::fingerprint(std::iter::once(&created[..]).chain(names).chain(std::iter::once(&trees[..])))
    }
}

/// Where an artifact is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactLocation {
    Local(PathBuf),
    /// `scheme://bucket/key`
    Object {
        scheme: String,
        bucket: String,
        key: String,
    },
}

impl ArtifactLocation {
    pub fn parse(raw: &str) -> AttrResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AttritionError::artifact_load(raw, "empty artifact location"));
        }
        let Some((scheme, rest)) = raw.split_once("://") else {
            return Ok(Self::Local(PathBuf::from(raw)));
        };
        if scheme == "file" {
            return Ok(Self::Local(PathBuf::from(rest)));
        }
        match rest.split_once('/') {
            Some((bucket, key)) if !scheme.is_empty() && !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::Object {
                    scheme: scheme.to_string(),
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            _ => Err(AttritionError::artifact_load(
                raw,
                "object locations must look like scheme://bucket/key",
            )),
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Object { scheme, bucket, key } => write!(f, "{scheme}://{bucket}/{key}"),
        }
    }
}

/// Repository contract for classifier artifacts.
pub trait ArtifactStore: Send + Sync {
    fn load(&self, location: &ArtifactLocation) -> AttrResult<ClassifierArtifact>;
    fn save(&self, artifact: &ClassifierArtifact, location: &ArtifactLocation) -> AttrResult<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::common::error::ErrorCode;
    use crate::features::domain::FeatureSpec;

    /// Two-feature artifact: `A` carries the signal, `B` is noise.
    pub(crate) fn tiny_artifact() -> ClassifierArtifact {
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64, (i % 2) as f64]).collect();
        let y: Vec<u8> = (0..12).map(|i| u8::from(i >= 6)).collect();
        let params = ForestParams {
            n_estimators: 4,
            max_depth: 3,
            random_state: 1,
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        let encoding = EncodingSpec::new(vec![FeatureSpec::numeric("A"), FeatureSpec::numeric("B")]).unwrap();
        ClassifierArtifact::new(forest, encoding, params).unwrap()
    }

    #[test]
    fn parses_locations() {
        assert_eq!(
            ArtifactLocation::parse("models/rf.json").unwrap(),
            ArtifactLocation::Local("models/rf.json".into())
        );
        assert_eq!(
            ArtifactLocation::parse("s3://bucket/models/rf.json").unwrap(),
            ArtifactLocation::Object {
                scheme: "s3".into(),
                bucket: "bucket".into(),
                key: "models/rf.json".into()
            }
        );
        assert_eq!(
            ArtifactLocation::parse("file:///tmp/rf.json").unwrap(),
            ArtifactLocation::Local("/tmp/rf.json".into())
        );
        for bad in ["", "s3://bucket", "s3://bucket/", "s3:///key"] {
            assert_eq!(ArtifactLocation::parse(bad).unwrap_err().code(), ErrorCode::ArtifactLoad, "{bad}");
        }
    }

    #[test]
    fn location_display_round_trips() {
        let raw = "gs://b/k/model.json";
        assert_eq!(ArtifactLocation::parse(raw).unwrap().to_string(), raw);
    }

    #[test]
    fn json_round_trip_keeps_everything() {
        let artifact = tiny_artifact();
        let bytes = artifact.to_json().unwrap();
        assert_eq!(ClassifierArtifact::from_json(&bytes, "mem").unwrap(), artifact);
    }

    #[test]
    fn corrupt_payload_is_artifact_load() {
        let err = ClassifierArtifact::from_json(b"{not json", "mem").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ArtifactLoad);
    }

    #[test]
    fn tampered_names_are_rejected() {
        let mut artifact = tiny_artifact();
        artifact.feature_names.reverse();
        let bytes = serde_json::to_vec(&artifact).unwrap();
        assert!(ClassifierArtifact::from_json(&bytes, "mem").is_err());
    }

    #[test]
    fn width_mismatch_rejected_at_construction() {
        let base = tiny_artifact();
        let encoding = EncodingSpec::new(vec![FeatureSpec::numeric("A")]).unwrap();
        assert!(ClassifierArtifact::new(base.forest, encoding, base.params).is_err());
    }
}
