//! Filesystem repository for classifier artifacts.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use crate::common::error::{AttrResult, AttritionError};
use crate::data::repo_fs::ensure_parent;

use super::domain::{ArtifactLocation, ArtifactStore, ClassifierArtifact};

/// Stores artifacts as JSON files on the local filesystem.
#[derive(Clone, Debug, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    pub fn load_path(&self, path: &Path) -> AttrResult<ClassifierArtifact> {
        let location = path.display().to_string();
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AttritionError::artifact_load(&location, "no artifact at this path"),
            _ => AttritionError::artifact_load(&location, e),
        })?;
        let artifact = ClassifierArtifact::from_json(&bytes, &location)?;
        debug!(path = %location, fingerprint = %artifact.fingerprint(), "artifact loaded");
        Ok(artifact)
    }

    /// Write through a sibling temp file and rename, so readers never see a partial artifact.
    pub fn save_path(&self, artifact: &ClassifierArtifact, path: &Path) -> AttrResult<()> {
        ensure_parent(path)?;
        let bytes = artifact.to_json()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);
        fs::write(tmp, &bytes).map_err(|e| AttritionError::io(tmp, e))?;
        fs::rename(tmp, path).map_err(|e| AttritionError::io(path, e))?;
        info!(path = %path.display(), fingerprint = %artifact.fingerprint(), bytes = bytes.len(), "artifact saved");
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn load(&self, location: &ArtifactLocation) -> AttrResult<ClassifierArtifact> {
        match location {
            ArtifactLocation::Local(path) => self.load_path(path),
            other => Err(AttritionError::artifact_load(
                other.to_string(),
                "not a local path",
            )),
        }
    }

    fn save(&self, artifact: &ClassifierArtifact, location: &ArtifactLocation) -> AttrResult<()> {
        match location {
            ArtifactLocation::Local(path) => self.save_path(artifact, path),
            other => Err(AttritionError::config(format!("{other} is not a local path"))),
        }
    }
}
