//! Inference domain: turning encoded features into attrition predictions.

pub mod domain;
pub mod service;

pub use domain::{AttritionLabel, PredictionResult, Scores};
pub use service::InferenceService;
