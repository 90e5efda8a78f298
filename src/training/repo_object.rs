//! Object-storage repository for classifier artifacts.
//!
//! Objects are addressed as `{endpoint}/{bucket}/{key}` and moved with plain
//! HTTP GET/PUT, which covers public buckets and pre-authorized endpoints.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::common::config::ObjectStoreCfg;
use crate::common::error::{AttrResult, AttritionError};

use super::domain::{ArtifactLocation, ArtifactStore, ClassifierArtifact};

#[derive(Clone, Debug)]
pub struct ObjectArtifactStore {
    endpoint: String,
    timeout: Duration,
}

impl ObjectArtifactStore {
    pub fn new(cfg: &ObjectStoreCfg) -> Self {
        Self {
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{}", self.endpoint, key.trim_start_matches('/'))
    }

    // Built per call: a blocking client must not be dropped on an async worker.
    fn client(&self) -> AttrResult<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AttritionError::connection(&self.endpoint, e))
    }

    fn object_url(&self, location: &ArtifactLocation) -> AttrResult<String> {
        match location {
            ArtifactLocation::Object { bucket, key, .. } => Ok(self.url(bucket, key)),
            ArtifactLocation::Local(path) => Err(AttritionError::config(format!(
                "{} is not an object location",
                path.display()
            ))),
        }
    }
}

impl ArtifactStore for ObjectArtifactStore {
    fn load(&self, location: &ArtifactLocation) -> AttrResult<ClassifierArtifact> {
        let url = self.object_url(location)?;
        let shown = location.to_string();
        debug!(location = %shown, url = %url, "fetching artifact");
        let response = self
            .client()?
            .get(&url)
            .send()
            .map_err(|e| AttritionError::connection(&url, e))?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(AttritionError::artifact_load(shown, "object not found"))
            }
            status => {
                return Err(AttritionError::artifact_load(shown, format!("HTTP {status}")))
            }
        }
        let bytes = response
            .bytes()
            .map_err(|e| AttritionError::connection(&url, e))?;
        let artifact = ClassifierArtifact::from_json(&bytes, &shown)?;
        info!(location = %shown, fingerprint = %artifact.fingerprint(), "artifact downloaded");
        Ok(artifact)
    }

    fn save(&self, artifact: &ClassifierArtifact, location: &ArtifactLocation) -> AttrResult<()> {
        let url = self.object_url(location)?;
        let body = artifact.to_json()?;
        let size = body.len();
        let response = self
            .client()?
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| AttritionError::connection(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttritionError::connection(&url, format!("upload rejected: HTTP {status}")));
        }
        info!(location = %location, bytes = size, "artifact uploaded");
        Ok(())
    }
}
