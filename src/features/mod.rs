//! Feature domain: the shared encoding specification and the transformer
//! that applies it to raw attribute records.

pub mod domain;
pub mod service;

pub use domain::{CategoricalLevels, EncodingRule, EncodingSpec, FeatureSpec, FeatureVector};
pub use service::FeatureTransformer;
