//! Training domain: the random forest, its artifacts and their storage.

pub mod domain;
pub mod forest;
pub mod repo_fs;
pub mod repo_object;
pub mod service;

pub use domain::{ArtifactLocation, ArtifactStore, ClassifierArtifact};
pub use forest::{ForestParams, RandomForest};
pub use service::ArtifactStores;
