//! Runtime configuration loaded from a YAML file with environment overrides.
//!
//! Every section has serde defaults, so a partial file (or no file at all)
//! yields a usable configuration. The snapshot is passed explicitly into the
//! components that need it; nothing here is process-global.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::error::{AttrResult, AttritionError};
use crate::features::domain::{default_categoricals, CategoricalLevels};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Snapshot of configuration values consumed by the crate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    pub app: WebCfg,
    pub model: ModelCfg,
    pub features: FeaturesCfg,
    pub object_store: ObjectStoreCfg,
}

/// Web surface and online persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WebCfg {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Artifact location served by the web surface (local path or `scheme://bucket/key`).
    pub model_path: String,
    /// SQLite database file; `None` disables the relational store.
    pub db_path: Option<String>,
    /// Flat-file submission log; `None` disables it.
    pub results_csv: Option<String>,
}

impl Default for WebCfg {
    fn default() -> Self {
        Self {
            name: "Employee-Attrition-Prediction".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_path: "models/randomforest.json".to_string(),
            db_path: Some("data/employees.db".to_string()),
            results_csv: Some("data/submissions.csv".to_string()),
        }
    }
}

/// Hyperparameters and inputs for the offline pipeline stages.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCfg {
    pub get_data: GetDataCfg,
    pub clean_data: CleanCfg,
    pub split_data: SplitCfg,
    pub train_model: TrainCfg,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GetDataCfg {
    /// Source of the raw CSV (http(s) URL or local path).
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanCfg {
    /// Numeric columns whose missing cells are mean-imputed.
    pub missing_col: Vec<String>,
    /// Columns retained in the cleaned table (must include the target).
    pub columns: Vec<String>,
    /// Identifier column carried into `results_path` but never used as a feature.
    pub id_column: String,
    /// Optional CSV of retained columns plus the identifier, used for bulk ingest.
    pub results_path: Option<String>,
}

impl Default for CleanCfg {
    fn default() -> Self {
        let mut columns: Vec<String> = crate::data::domain::NUMERIC_ATTRIBUTES
            .iter()
            .map(|s| s.to_string())
            .collect();
        columns.extend(
            ["MaritalStatus", "Gender", "OverTime", "Attrition"]
                .iter()
                .map(|s| s.to_string()),
        );
        Self {
            missing_col: vec!["JobSatisfaction".to_string(), "JobInvolvement".to_string()],
            columns,
            id_column: "EmployeeNumber".to_string(),
            results_path: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitCfg {
    pub test_size: f64,
    pub random_state: u64,
}

impl Default for SplitCfg {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 42,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainCfg {
    pub max_depth: usize,
    pub n_estimators: usize,
    pub random_state: u64,
}

impl Default for TrainCfg {
    fn default() -> Self {
        Self {
            max_depth: 8,
            n_estimators: 100,
            random_state: 42,
        }
    }
}

/// Shared encoding declaration consumed by the clean, train and online paths.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesCfg {
    /// Binary target column.
    pub target: String,
    /// Categorical attributes and their levels; the first level is the reference.
    pub categorical: Vec<CategoricalLevels>,
}

impl Default for FeaturesCfg {
    fn default() -> Self {
        Self {
            target: "Attrition".to_string(),
            categorical: default_categoricals(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreCfg {
    /// Base URL; objects live at `{endpoint}/{bucket}/{key}`.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ObjectStoreCfg {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AppCfg {
    /// Load configuration from `path` (or defaults when `None`), apply
    /// environment overrides and validate the result.
    pub fn load(path: Option<&Path>) -> AttrResult<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a YAML configuration file without overrides or validation.
    pub fn from_file(path: &Path) -> AttrResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            AttritionError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AttrResult<Self> {
        serde_yaml::from_str(raw).map_err(|e| AttritionError::config(e.to_string()))
    }

    fn apply_env(&mut self) {
        fn env_opt(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.is_empty())
        }

        if let Some(v) = env_opt("ATTRITION_DB_PATH") {
            self.app.db_path = Some(v);
        }
        if let Some(v) = env_opt("ATTRITION_RESULTS_CSV") {
            self.app.results_csv = Some(v);
        }
        if let Some(v) = env_opt("ATTRITION_MODEL_PATH") {
            self.app.model_path = v;
        }
        if let Some(v) = env_opt("ATTRITION_HOST") {
            self.app.host = v;
        }
        if let Some(port) = env_opt("ATTRITION_PORT").and_then(|v| v.parse().ok()) {
            self.app.port = port;
        }
        if let Some(v) = env_opt("ATTRITION_OBJECT_ENDPOINT") {
            self.object_store.endpoint = v;
        }
    }

    /// Reject hyperparameters the pipeline cannot honour.
    pub fn validate(&self) -> AttrResult<()> {
        let split = &self.model.split_data;
        if !(split.test_size > 0.0 && split.test_size < 1.0) {
            return Err(AttritionError::config(format!(
                "model.split_data.test_size must be in (0, 1), got {}",
                split.test_size
            )));
        }
        let train = &self.model.train_model;
        if train.n_estimators == 0 {
            return Err(AttritionError::config(
                "model.train_model.n_estimators must be at least 1",
            ));
        }
        if train.max_depth == 0 {
            return Err(AttritionError::config(
                "model.train_model.max_depth must be at least 1",
            ));
        }
        if !self
            .model
            .clean_data
            .columns
            .iter()
            .any(|c| c == &self.features.target)
        {
            return Err(AttritionError::config(format!(
                "model.clean_data.columns must retain the target column {}",
                self.features.target
            )));
        }
        for cat in &self.features.categorical {
            if cat.levels.len() < 2 {
                return Err(AttritionError::config(format!(
                    "categorical attribute {} needs at least two levels",
                    cat.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = AppCfg::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.features.target, "Attrition");
        assert_eq!(cfg.model.clean_data.columns.len(), 12);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = AppCfg::from_yaml(
            "model:\n  train_model:\n    max_depth: 3\n    n_estimators: 7\n",
        )
        .unwrap();
        assert_eq!(cfg.model.train_model.max_depth, 3);
        assert_eq!(cfg.model.train_model.n_estimators, 7);
        assert_eq!(cfg.model.split_data.random_state, 42);
        assert_eq!(cfg.app.port, 5000);
    }

    #[test]
    fn rejects_bad_test_size() {
        let cfg = AppCfg::from_yaml("model:\n  split_data:\n    test_size: 1.5\n").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("test_size"));
    }

    #[test]
    fn rejects_target_not_retained() {
        let cfg = AppCfg::from_yaml("model:\n  clean_data:\n    columns: [JobLevel]\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = AppCfg::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert_eq!(err.code(), crate::common::error::ErrorCode::Config);
    }
}
